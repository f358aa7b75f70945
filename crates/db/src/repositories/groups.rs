use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use permitdesk_core::domain::approval_group::{
    ApprovalGroup, ApprovalGroupMember, GroupType, MemberAvailability, MemberPermissions,
};
use permitdesk_core::ids::{ApprovalGroupId, GroupMemberId, UserId};

use super::{column, parse_enum, RepositoryError};
use crate::timestamp;

const MEMBER_COLUMNS: &str = "id, group_id, user_id, role, can_raise_issues, can_approve,
    can_reject, review_order, backup_priority, availability, is_final_approver, is_active,
    created_at";

fn row_to_member(row: &SqliteRow) -> Result<ApprovalGroupMember, RepositoryError> {
    let availability: String = column(row, "availability")?;
    Ok(ApprovalGroupMember {
        id: GroupMemberId(column(row, "id")?),
        group_id: ApprovalGroupId(column(row, "group_id")?),
        user_id: UserId(column(row, "user_id")?),
        role: column(row, "role")?,
        permissions: MemberPermissions {
            can_raise_issues: column(row, "can_raise_issues")?,
            can_approve: column(row, "can_approve")?,
            can_reject: column(row, "can_reject")?,
        },
        review_order: column(row, "review_order")?,
        backup_priority: column(row, "backup_priority")?,
        availability: parse_enum(&availability, "member availability", MemberAvailability::parse)?,
        is_final_approver: column(row, "is_final_approver")?,
        is_active: column(row, "is_active")?,
        created_at: timestamp::decode(&column::<String>(row, "created_at")?)?,
    })
}

fn row_to_group(
    row: &SqliteRow,
    members: Vec<ApprovalGroupMember>,
) -> Result<ApprovalGroup, RepositoryError> {
    let group_type: String = column(row, "group_type")?;
    let minimum_approvals: i64 = column(row, "minimum_approvals")?;
    Ok(ApprovalGroup {
        id: ApprovalGroupId(column(row, "id")?),
        name: column(row, "name")?,
        description: column(row, "description")?,
        group_type: parse_enum(&group_type, "group type", GroupType::parse)?,
        requires_all_approvals: column(row, "requires_all_approvals")?,
        minimum_approvals: u32::try_from(minimum_approvals)
            .map_err(|_| RepositoryError::Decode(format!("minimum_approvals {minimum_approvals}")))?,
        auto_assign_backups: column(row, "auto_assign_backups")?,
        is_active: column(row, "is_active")?,
        members,
        created_at: timestamp::decode(&column::<String>(row, "created_at")?)?,
        updated_at: timestamp::decode(&column::<String>(row, "updated_at")?)?,
    })
}

/// Writes the group and all of its members.
pub async fn insert(
    conn: &mut SqliteConnection,
    group: &ApprovalGroup,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO approval_group (id, name, description, group_type, requires_all_approvals,
                                     minimum_approvals, auto_assign_backups, is_active,
                                     created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(group.id.as_str())
    .bind(&group.name)
    .bind(&group.description)
    .bind(group.group_type.as_str())
    .bind(group.requires_all_approvals)
    .bind(i64::from(group.minimum_approvals))
    .bind(group.auto_assign_backups)
    .bind(group.is_active)
    .bind(timestamp::encode(group.created_at))
    .bind(timestamp::encode(group.updated_at))
    .execute(&mut *conn)
    .await?;

    for member in &group.members {
        sqlx::query(
            "INSERT INTO approval_group_member (id, group_id, user_id, role, can_raise_issues,
                                                can_approve, can_reject, review_order,
                                                backup_priority, availability,
                                                is_final_approver, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(member.id.as_str())
        .bind(group.id.as_str())
        .bind(member.user_id.as_str())
        .bind(&member.role)
        .bind(member.permissions.can_raise_issues)
        .bind(member.permissions.can_approve)
        .bind(member.permissions.can_reject)
        .bind(member.review_order)
        .bind(member.backup_priority)
        .bind(member.availability.as_str())
        .bind(member.is_final_approver)
        .bind(member.is_active)
        .bind(timestamp::encode(member.created_at))
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn members_of(
    conn: &mut SqliteConnection,
    group_id: &ApprovalGroupId,
) -> Result<Vec<ApprovalGroupMember>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {MEMBER_COLUMNS} FROM approval_group_member
         WHERE group_id = ? ORDER BY review_order, backup_priority, rowid"
    ))
    .bind(group_id.as_str())
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_member).collect()
}

pub async fn find(
    conn: &mut SqliteConnection,
    id: &ApprovalGroupId,
) -> Result<Option<ApprovalGroup>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, name, description, group_type, requires_all_approvals, minimum_approvals,
                auto_assign_backups, is_active, created_at, updated_at
         FROM approval_group WHERE id = ?",
    )
    .bind(id.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let members = members_of(conn, id).await?;
    row_to_group(&row, members).map(Some)
}

pub async fn get(
    conn: &mut SqliteConnection,
    id: &ApprovalGroupId,
) -> Result<ApprovalGroup, RepositoryError> {
    find(conn, id).await?.ok_or_else(|| RepositoryError::not_found("approval group", id))
}

pub async fn list(
    conn: &mut SqliteConnection,
    active_only: bool,
) -> Result<Vec<ApprovalGroup>, RepositoryError> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM approval_group WHERE (? = 0 OR is_active = 1) ORDER BY name, rowid",
    )
    .bind(active_only)
    .fetch_all(&mut *conn)
    .await?;

    let mut groups = Vec::with_capacity(ids.len());
    for id in ids {
        groups.push(get(conn, &ApprovalGroupId(id)).await?);
    }
    Ok(groups)
}

pub async fn find_member(
    conn: &mut SqliteConnection,
    id: &GroupMemberId,
) -> Result<Option<ApprovalGroupMember>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {MEMBER_COLUMNS} FROM approval_group_member WHERE id = ?"))
        .bind(id.as_str())
        .fetch_optional(conn)
        .await?;

    row.as_ref().map(row_to_member).transpose()
}

pub async fn set_member_availability(
    conn: &mut SqliteConnection,
    id: &GroupMemberId,
    availability: MemberAvailability,
) -> Result<ApprovalGroupMember, RepositoryError> {
    let updated = sqlx::query("UPDATE approval_group_member SET availability = ? WHERE id = ?")
        .bind(availability.as_str())
        .bind(id.as_str())
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(RepositoryError::not_found("group member", id));
    }

    find_member(conn, id).await?.ok_or_else(|| RepositoryError::not_found("group member", id))
}

pub async fn deactivate(
    conn: &mut SqliteConnection,
    id: &ApprovalGroupId,
    at: chrono::DateTime<chrono::Utc>,
) -> Result<(), RepositoryError> {
    let updated = sqlx::query("UPDATE approval_group SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(timestamp::encode(at))
        .bind(id.as_str())
        .execute(conn)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(RepositoryError::not_found("approval group", id));
    }
    Ok(())
}
