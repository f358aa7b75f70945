use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use permitdesk_core::domain::decision::{
    ApplicationGroupAssignment, Decision, DecisionComment, DecisionOutcome, DecisionStatus,
    FinalApproval,
};
use permitdesk_core::ids::{
    ApplicationId, ApprovalGroupId, AssignmentId, DecisionId, FinalApprovalId, GroupMemberId,
    UserId,
};

use super::{column, parse_enum, RepositoryError};
use crate::timestamp;

fn row_to_assignment(row: &SqliteRow) -> Result<ApplicationGroupAssignment, RepositoryError> {
    Ok(ApplicationGroupAssignment {
        id: AssignmentId(column(row, "id")?),
        application_id: ApplicationId(column(row, "application_id")?),
        group_id: ApprovalGroupId(column(row, "group_id")?),
        assigned_by: UserId(column(row, "assigned_by")?),
        is_active: column(row, "is_active")?,
        assigned_at: timestamp::decode(&column::<String>(row, "assigned_at")?)?,
    })
}

/// Retires whatever assignment is currently active. Returns how many rows changed.
pub async fn deactivate_active_assignment(
    conn: &mut SqliteConnection,
    application_id: &ApplicationId,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        "UPDATE application_group_assignment SET is_active = 0
         WHERE application_id = ? AND is_active = 1",
    )
    .bind(application_id.as_str())
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn insert_assignment(
    conn: &mut SqliteConnection,
    assignment: &ApplicationGroupAssignment,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO application_group_assignment
             (id, application_id, group_id, assigned_by, is_active, assigned_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(assignment.id.as_str())
    .bind(assignment.application_id.as_str())
    .bind(assignment.group_id.as_str())
    .bind(assignment.assigned_by.as_str())
    .bind(assignment.is_active)
    .bind(timestamp::encode(assignment.assigned_at))
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find_active_assignment(
    conn: &mut SqliteConnection,
    application_id: &ApplicationId,
) -> Result<Option<ApplicationGroupAssignment>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, application_id, group_id, assigned_by, is_active, assigned_at
         FROM application_group_assignment
         WHERE application_id = ? AND is_active = 1",
    )
    .bind(application_id.as_str())
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(row_to_assignment).transpose()
}

/// Records a member's verdict. A second submission by the same member
/// replaces the earlier status rather than adding a row.
pub async fn upsert_decision(
    conn: &mut SqliteConnection,
    assignment_id: &AssignmentId,
    member_id: &GroupMemberId,
    status: DecisionStatus,
    at: DateTime<Utc>,
) -> Result<DecisionId, RepositoryError> {
    let decided_at = (status != DecisionStatus::Pending).then(|| timestamp::encode(at));
    let stamp = timestamp::encode(at);
    sqlx::query(
        "INSERT INTO decision (id, assignment_id, member_id, status, decided_at, created_at,
                               updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(assignment_id, member_id) DO UPDATE SET
             status = excluded.status,
             decided_at = excluded.decided_at,
             updated_at = excluded.updated_at",
    )
    .bind(DecisionId::generate().as_str())
    .bind(assignment_id.as_str())
    .bind(member_id.as_str())
    .bind(status.as_str())
    .bind(decided_at)
    .bind(&stamp)
    .bind(&stamp)
    .execute(&mut *conn)
    .await?;

    let id: String =
        sqlx::query_scalar("SELECT id FROM decision WHERE assignment_id = ? AND member_id = ?")
            .bind(assignment_id.as_str())
            .bind(member_id.as_str())
            .fetch_one(conn)
            .await?;

    Ok(DecisionId(id))
}

pub async fn insert_comment(
    conn: &mut SqliteConnection,
    decision_id: &DecisionId,
    author_id: &UserId,
    body: &str,
    at: DateTime<Utc>,
) -> Result<i64, RepositoryError> {
    let result = sqlx::query(
        "INSERT INTO decision_comment (decision_id, author_id, body, created_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(decision_id.as_str())
    .bind(author_id.as_str())
    .bind(body)
    .bind(timestamp::encode(at))
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Every decision recorded under the assignment, comments attached.
pub async fn list_decisions(
    conn: &mut SqliteConnection,
    assignment_id: &AssignmentId,
) -> Result<Vec<Decision>, RepositoryError> {
    let comment_rows = sqlx::query(
        "SELECT c.id, c.decision_id, c.author_id, c.body, c.created_at
         FROM decision_comment c
         JOIN decision d ON d.id = c.decision_id
         WHERE d.assignment_id = ?
         ORDER BY c.created_at, c.id",
    )
    .bind(assignment_id.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let mut comments: HashMap<String, Vec<DecisionComment>> = HashMap::new();
    for row in &comment_rows {
        let decision_id: String = column(row, "decision_id")?;
        let comment = DecisionComment {
            id: column(row, "id")?,
            decision_id: DecisionId(decision_id.clone()),
            author_id: UserId(column(row, "author_id")?),
            body: column(row, "body")?,
            created_at: timestamp::decode(&column::<String>(row, "created_at")?)?,
        };
        comments.entry(decision_id).or_default().push(comment);
    }

    let rows = sqlx::query(
        "SELECT id, assignment_id, member_id, status, decided_at, created_at, updated_at
         FROM decision WHERE assignment_id = ? ORDER BY created_at, rowid",
    )
    .bind(assignment_id.as_str())
    .fetch_all(conn)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = column(row, "id")?;
            let status: String = column(row, "status")?;
            Ok(Decision {
                comments: comments.remove(&id).unwrap_or_default(),
                id: DecisionId(id),
                assignment_id: AssignmentId(column(row, "assignment_id")?),
                member_id: GroupMemberId(column(row, "member_id")?),
                status: parse_enum(&status, "decision status", DecisionStatus::parse)?,
                decided_at: timestamp::decode_opt(column(row, "decided_at")?)?,
                created_at: timestamp::decode(&column::<String>(row, "created_at")?)?,
                updated_at: timestamp::decode(&column::<String>(row, "updated_at")?)?,
            })
        })
        .collect()
}

pub async fn insert_final_approval(
    conn: &mut SqliteConnection,
    approval: &FinalApproval,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO final_approval (id, application_id, assignment_id, approver_member_id,
                                     approver_user_id, outcome, comment, decided_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(approval.id.as_str())
    .bind(approval.application_id.as_str())
    .bind(approval.assignment_id.as_str())
    .bind(approval.approver_member_id.as_str())
    .bind(approval.approver_user_id.as_str())
    .bind(approval.outcome.as_str())
    .bind(&approval.comment)
    .bind(timestamp::encode(approval.decided_at))
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find_final_approval(
    conn: &mut SqliteConnection,
    application_id: &ApplicationId,
) -> Result<Option<FinalApproval>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, application_id, assignment_id, approver_member_id, approver_user_id,
                outcome, comment, decided_at
         FROM final_approval WHERE application_id = ?",
    )
    .bind(application_id.as_str())
    .fetch_optional(conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let outcome: String = column(&row, "outcome")?;
    Ok(Some(FinalApproval {
        id: FinalApprovalId(column(&row, "id")?),
        application_id: ApplicationId(column(&row, "application_id")?),
        assignment_id: AssignmentId(column(&row, "assignment_id")?),
        approver_member_id: GroupMemberId(column(&row, "approver_member_id")?),
        approver_user_id: UserId(column(&row, "approver_user_id")?),
        outcome: parse_enum(&outcome, "final outcome", DecisionOutcome::parse)?,
        comment: column(&row, "comment")?,
        decided_at: timestamp::decode(&column::<String>(&row, "decided_at")?)?,
    }))
}
