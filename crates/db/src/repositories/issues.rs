use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use permitdesk_core::domain::issue::{
    ApplicationIssue, IssueAssignmentType, IssuePriority, IssueStatus,
};
use permitdesk_core::ids::{ApplicationId, GroupMemberId, IssueId, ThreadId, UserId};

use super::{column, parse_enum, RepositoryError};
use crate::timestamp;

const ISSUE_COLUMNS: &str = "id, application_id, raised_by, title, description, priority,
    category, assignment_type, assigned_to_user, assigned_to_member, status, thread_id,
    resolution_comment, resolved_by, resolved_at, reopened_at, created_at, updated_at";

fn row_to_issue(row: &SqliteRow) -> Result<ApplicationIssue, RepositoryError> {
    let priority: String = column(row, "priority")?;
    let assignment_type: String = column(row, "assignment_type")?;
    let status: String = column(row, "status")?;
    Ok(ApplicationIssue {
        id: IssueId(column(row, "id")?),
        application_id: ApplicationId(column(row, "application_id")?),
        raised_by: UserId(column(row, "raised_by")?),
        title: column(row, "title")?,
        description: column(row, "description")?,
        priority: parse_enum(&priority, "issue priority", IssuePriority::parse)?,
        category: column(row, "category")?,
        assignment_type: parse_enum(
            &assignment_type,
            "issue assignment type",
            IssueAssignmentType::parse,
        )?,
        assigned_to_user: column::<Option<String>>(row, "assigned_to_user")?.map(UserId),
        assigned_to_member: column::<Option<String>>(row, "assigned_to_member")?
            .map(GroupMemberId),
        status: parse_enum(&status, "issue status", IssueStatus::parse)?,
        thread_id: column::<Option<String>>(row, "thread_id")?.map(ThreadId),
        resolution_comment: column(row, "resolution_comment")?,
        resolved_by: column::<Option<String>>(row, "resolved_by")?.map(UserId),
        resolved_at: timestamp::decode_opt(column(row, "resolved_at")?)?,
        reopened_at: timestamp::decode_opt(column(row, "reopened_at")?)?,
        created_at: timestamp::decode(&column::<String>(row, "created_at")?)?,
        updated_at: timestamp::decode(&column::<String>(row, "updated_at")?)?,
    })
}

pub async fn insert(
    conn: &mut SqliteConnection,
    issue: &ApplicationIssue,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO application_issue (id, application_id, raised_by, title, description,
                                        priority, category, assignment_type, assigned_to_user,
                                        assigned_to_member, status, thread_id,
                                        resolution_comment, resolved_by, resolved_at,
                                        reopened_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(issue.id.as_str())
    .bind(issue.application_id.as_str())
    .bind(issue.raised_by.as_str())
    .bind(&issue.title)
    .bind(&issue.description)
    .bind(issue.priority.as_str())
    .bind(&issue.category)
    .bind(issue.assignment_type.as_str())
    .bind(issue.assigned_to_user.as_ref().map(|user| user.as_str()))
    .bind(issue.assigned_to_member.as_ref().map(|member| member.as_str()))
    .bind(issue.status.as_str())
    .bind(issue.thread_id.as_ref().map(|thread| thread.as_str()))
    .bind(&issue.resolution_comment)
    .bind(issue.resolved_by.as_ref().map(|user| user.as_str()))
    .bind(timestamp::encode_opt(issue.resolved_at))
    .bind(timestamp::encode_opt(issue.reopened_at))
    .bind(timestamp::encode(issue.created_at))
    .bind(timestamp::encode(issue.updated_at))
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find(
    conn: &mut SqliteConnection,
    id: &IssueId,
) -> Result<Option<ApplicationIssue>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {ISSUE_COLUMNS} FROM application_issue WHERE id = ?"))
        .bind(id.as_str())
        .fetch_optional(conn)
        .await?;

    row.as_ref().map(row_to_issue).transpose()
}

pub async fn get(
    conn: &mut SqliteConnection,
    id: &IssueId,
) -> Result<ApplicationIssue, RepositoryError> {
    find(conn, id).await?.ok_or_else(|| RepositoryError::not_found("issue", id))
}

pub async fn list(
    conn: &mut SqliteConnection,
    application_id: &ApplicationId,
    status: Option<IssueStatus>,
) -> Result<Vec<ApplicationIssue>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {ISSUE_COLUMNS} FROM application_issue
         WHERE application_id = ? AND (? IS NULL OR status = ?)
         ORDER BY created_at, rowid"
    ))
    .bind(application_id.as_str())
    .bind(status.map(IssueStatus::as_str))
    .bind(status.map(IssueStatus::as_str))
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_issue).collect()
}

/// Open issues that gate the final decision.
pub async fn count_blocking(
    conn: &mut SqliteConnection,
    application_id: &ApplicationId,
    collaborative_issues_block: bool,
) -> Result<u32, RepositoryError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM application_issue
         WHERE application_id = ? AND status = 'OPEN'
           AND (assignment_type != 'COLLABORATIVE' OR ? = 1)",
    )
    .bind(application_id.as_str())
    .bind(collaborative_issues_block)
    .fetch_one(conn)
    .await?;

    u32::try_from(count).map_err(|_| RepositoryError::Decode(format!("issue count {count}")))
}

/// Flips an OPEN issue to RESOLVED. Returns false when the issue was not open.
pub async fn mark_resolved(
    conn: &mut SqliteConnection,
    id: &IssueId,
    resolver: &UserId,
    comment: &str,
    at: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let stamp = timestamp::encode(at);
    let updated = sqlx::query(
        "UPDATE application_issue
         SET status = 'RESOLVED', resolution_comment = ?, resolved_by = ?, resolved_at = ?,
             updated_at = ?
         WHERE id = ? AND status = 'OPEN'",
    )
    .bind(comment)
    .bind(resolver.as_str())
    .bind(&stamp)
    .bind(&stamp)
    .bind(id.as_str())
    .execute(conn)
    .await?
    .rows_affected();

    Ok(updated == 1)
}

/// Flips a RESOLVED issue back to OPEN and clears its resolution.
pub async fn mark_reopened(
    conn: &mut SqliteConnection,
    id: &IssueId,
    at: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let stamp = timestamp::encode(at);
    let updated = sqlx::query(
        "UPDATE application_issue
         SET status = 'OPEN', resolution_comment = NULL, resolved_by = NULL, resolved_at = NULL,
             reopened_at = ?, updated_at = ?
         WHERE id = ? AND status = 'RESOLVED'",
    )
    .bind(&stamp)
    .bind(&stamp)
    .bind(id.as_str())
    .execute(conn)
    .await?
    .rows_affected();

    Ok(updated == 1)
}
