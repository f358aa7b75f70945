use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use permitdesk_core::domain::chat::{
    ChatParticipant, ChatThread, ParticipantPermissions, ParticipantRole, ParticipantSeed,
    ThreadKind, ThreadSummary,
};
use permitdesk_core::ids::{ApplicationId, IssueId, ThreadId, UserId};

use super::{column, parse_enum, RepositoryError};
use crate::timestamp;

const THREAD_COLUMNS: &str = "id, application_id, issue_id, kind, title, created_by, is_resolved,
    is_active, unread_count, last_activity_at, resolved_at, created_at, updated_at";

const PARTICIPANT_COLUMNS: &str = "thread_id, user_id, role, can_invite, can_remove, can_manage,
    can_resolve, unread_count, last_read_at, is_active, joined_at, left_at";

/// What happened when a participant was written into a thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParticipantWrite {
    Inserted,
    Reactivated,
    AlreadyActive,
}

impl ParticipantWrite {
    pub fn changed(self) -> bool {
        !matches!(self, Self::AlreadyActive)
    }
}

fn row_to_thread(row: &SqliteRow) -> Result<ChatThread, RepositoryError> {
    let kind: String = column(row, "kind")?;
    Ok(ChatThread {
        id: ThreadId(column(row, "id")?),
        application_id: column::<Option<String>>(row, "application_id")?.map(ApplicationId),
        issue_id: column::<Option<String>>(row, "issue_id")?.map(IssueId),
        kind: parse_enum(&kind, "thread kind", ThreadKind::parse)?,
        title: column(row, "title")?,
        created_by: UserId(column(row, "created_by")?),
        is_resolved: column(row, "is_resolved")?,
        is_active: column(row, "is_active")?,
        unread_count: column(row, "unread_count")?,
        last_activity_at: timestamp::decode(&column::<String>(row, "last_activity_at")?)?,
        resolved_at: timestamp::decode_opt(column(row, "resolved_at")?)?,
        created_at: timestamp::decode(&column::<String>(row, "created_at")?)?,
        updated_at: timestamp::decode(&column::<String>(row, "updated_at")?)?,
    })
}

fn row_to_participant(row: &SqliteRow) -> Result<ChatParticipant, RepositoryError> {
    let role: String = column(row, "role")?;
    Ok(ChatParticipant {
        thread_id: ThreadId(column(row, "thread_id")?),
        user_id: UserId(column(row, "user_id")?),
        role: parse_enum(&role, "participant role", ParticipantRole::parse)?,
        permissions: ParticipantPermissions {
            can_invite: column(row, "can_invite")?,
            can_remove: column(row, "can_remove")?,
            can_manage: column(row, "can_manage")?,
            can_resolve: column(row, "can_resolve")?,
        },
        unread_count: column(row, "unread_count")?,
        last_read_at: timestamp::decode_opt(column(row, "last_read_at")?)?,
        is_active: column(row, "is_active")?,
        joined_at: timestamp::decode(&column::<String>(row, "joined_at")?)?,
        left_at: timestamp::decode_opt(column(row, "left_at")?)?,
    })
}

pub async fn insert_thread(
    conn: &mut SqliteConnection,
    thread: &ChatThread,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO chat_thread (id, application_id, issue_id, kind, title, created_by,
                                  is_resolved, is_active, unread_count, last_activity_at,
                                  resolved_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(thread.id.as_str())
    .bind(thread.application_id.as_ref().map(|id| id.as_str()))
    .bind(thread.issue_id.as_ref().map(|id| id.as_str()))
    .bind(thread.kind.as_str())
    .bind(&thread.title)
    .bind(thread.created_by.as_str())
    .bind(thread.is_resolved)
    .bind(thread.is_active)
    .bind(thread.unread_count)
    .bind(timestamp::encode(thread.last_activity_at))
    .bind(timestamp::encode_opt(thread.resolved_at))
    .bind(timestamp::encode(thread.created_at))
    .bind(timestamp::encode(thread.updated_at))
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find_thread(
    conn: &mut SqliteConnection,
    id: &ThreadId,
) -> Result<Option<ChatThread>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {THREAD_COLUMNS} FROM chat_thread WHERE id = ?"))
        .bind(id.as_str())
        .fetch_optional(conn)
        .await?;

    row.as_ref().map(row_to_thread).transpose()
}

pub async fn get_thread(
    conn: &mut SqliteConnection,
    id: &ThreadId,
) -> Result<ChatThread, RepositoryError> {
    find_thread(conn, id).await?.ok_or_else(|| RepositoryError::not_found("thread", id))
}

/// Same write-lock trick as `applications::lock`, for thread-scoped operations.
pub async fn lock_thread(
    conn: &mut SqliteConnection,
    id: &ThreadId,
) -> Result<ChatThread, RepositoryError> {
    let touched = sqlx::query("UPDATE chat_thread SET id = id WHERE id = ?")
        .bind(id.as_str())
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if touched == 0 {
        return Err(RepositoryError::not_found("thread", id));
    }

    get_thread(conn, id).await
}

pub async fn find_workflow_thread(
    conn: &mut SqliteConnection,
    application_id: &ApplicationId,
) -> Result<Option<ChatThread>, RepositoryError> {
    let row = sqlx::query(&format!(
        "SELECT {THREAD_COLUMNS} FROM chat_thread WHERE application_id = ? AND kind = 'WORKFLOW'"
    ))
    .bind(application_id.as_str())
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(row_to_thread).transpose()
}

/// Resolving closes the thread; reopening makes it active again.
pub async fn set_resolution_state(
    conn: &mut SqliteConnection,
    id: &ThreadId,
    resolved: bool,
    at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    let stamp = timestamp::encode(at);
    let resolved_at = resolved.then(|| stamp.clone());
    sqlx::query(
        "UPDATE chat_thread
         SET is_resolved = ?, is_active = ?, resolved_at = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(resolved)
    .bind(!resolved)
    .bind(resolved_at)
    .bind(&stamp)
    .bind(id.as_str())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn touch_activity(
    conn: &mut SqliteConnection,
    id: &ThreadId,
    at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    let stamp = timestamp::encode(at);
    sqlx::query("UPDATE chat_thread SET last_activity_at = ?, updated_at = ? WHERE id = ?")
        .bind(&stamp)
        .bind(&stamp)
        .bind(id.as_str())
        .execute(conn)
        .await?;

    Ok(())
}

/// Threads the user actively participates in, most recent activity first.
pub async fn list_for_user(
    conn: &mut SqliteConnection,
    user_id: &UserId,
) -> Result<Vec<ThreadSummary>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT t.id, t.application_id, t.issue_id, t.kind, t.title, t.created_by,
                t.is_resolved, t.is_active, t.unread_count, t.last_activity_at, t.resolved_at,
                t.created_at, t.updated_at,
                p.role AS participant_role,
                p.unread_count AS participant_unread,
                p.last_read_at AS participant_last_read_at
         FROM chat_thread t
         JOIN chat_participant p ON p.thread_id = t.id
         WHERE p.user_id = ? AND p.is_active = 1
         ORDER BY t.last_activity_at DESC, t.rowid DESC",
    )
    .bind(user_id.as_str())
    .fetch_all(conn)
    .await?;

    rows.iter()
        .map(|row| {
            let role: String = column(row, "participant_role")?;
            Ok(ThreadSummary {
                thread: row_to_thread(row)?,
                role: parse_enum(&role, "participant role", ParticipantRole::parse)?,
                unread_count: column(row, "participant_unread")?,
                last_read_at: timestamp::decode_opt(column(row, "participant_last_read_at")?)?,
            })
        })
        .collect()
}

pub async fn find_participant(
    conn: &mut SqliteConnection,
    thread_id: &ThreadId,
    user_id: &UserId,
) -> Result<Option<ChatParticipant>, RepositoryError> {
    let row = sqlx::query(&format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM chat_participant WHERE thread_id = ? AND user_id = ?"
    ))
    .bind(thread_id.as_str())
    .bind(user_id.as_str())
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(row_to_participant).transpose()
}

pub async fn list_active_participants(
    conn: &mut SqliteConnection,
    thread_id: &ThreadId,
) -> Result<Vec<ChatParticipant>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM chat_participant
         WHERE thread_id = ? AND is_active = 1 ORDER BY joined_at, rowid"
    ))
    .bind(thread_id.as_str())
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_participant).collect()
}

/// Inserts the participant, or reactivates a row left behind by an earlier removal.
pub async fn add_participant(
    conn: &mut SqliteConnection,
    thread_id: &ThreadId,
    seed: &ParticipantSeed,
    at: DateTime<Utc>,
) -> Result<ParticipantWrite, RepositoryError> {
    let existing = find_participant(&mut *conn, thread_id, &seed.user_id).await?;
    let stamp = timestamp::encode(at);

    match existing {
        Some(participant) if participant.is_active => Ok(ParticipantWrite::AlreadyActive),
        Some(_) => {
            sqlx::query(
                "UPDATE chat_participant
                 SET role = ?, can_invite = ?, can_remove = ?, can_manage = ?, can_resolve = ?,
                     unread_count = 0, is_active = 1, joined_at = ?, left_at = NULL
                 WHERE thread_id = ? AND user_id = ?",
            )
            .bind(seed.role.as_str())
            .bind(seed.permissions.can_invite)
            .bind(seed.permissions.can_remove)
            .bind(seed.permissions.can_manage)
            .bind(seed.permissions.can_resolve)
            .bind(&stamp)
            .bind(thread_id.as_str())
            .bind(seed.user_id.as_str())
            .execute(conn)
            .await?;
            Ok(ParticipantWrite::Reactivated)
        }
        None => {
            sqlx::query(
                "INSERT INTO chat_participant (thread_id, user_id, role, can_invite, can_remove,
                                               can_manage, can_resolve, unread_count,
                                               last_read_at, is_active, joined_at, left_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, 0, NULL, 1, ?, NULL)",
            )
            .bind(thread_id.as_str())
            .bind(seed.user_id.as_str())
            .bind(seed.role.as_str())
            .bind(seed.permissions.can_invite)
            .bind(seed.permissions.can_remove)
            .bind(seed.permissions.can_manage)
            .bind(seed.permissions.can_resolve)
            .bind(&stamp)
            .execute(conn)
            .await?;
            Ok(ParticipantWrite::Inserted)
        }
    }
}

/// Marks an active participant as gone. Their unread messages leave the thread total.
pub async fn deactivate_participant(
    conn: &mut SqliteConnection,
    thread_id: &ThreadId,
    user_id: &UserId,
    at: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    drop_unread_from_thread(&mut *conn, thread_id, user_id).await?;

    let updated = sqlx::query(
        "UPDATE chat_participant SET is_active = 0, unread_count = 0, left_at = ?
         WHERE thread_id = ? AND user_id = ? AND is_active = 1",
    )
    .bind(timestamp::encode(at))
    .bind(thread_id.as_str())
    .bind(user_id.as_str())
    .execute(conn)
    .await?
    .rows_affected();

    Ok(updated == 1)
}

/// Bumps the unread counter of every active participant except `sender`,
/// and the thread total by the same amount.
pub async fn increment_unread_for_others(
    conn: &mut SqliteConnection,
    thread_id: &ThreadId,
    sender: &UserId,
) -> Result<u64, RepositoryError> {
    let bumped = sqlx::query(
        "UPDATE chat_participant SET unread_count = unread_count + 1
         WHERE thread_id = ? AND is_active = 1 AND user_id != ?",
    )
    .bind(thread_id.as_str())
    .bind(sender.as_str())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if bumped > 0 {
        sqlx::query("UPDATE chat_thread SET unread_count = unread_count + ? WHERE id = ?")
            .bind(i64::try_from(bumped).unwrap_or(i64::MAX))
            .bind(thread_id.as_str())
            .execute(conn)
            .await?;
    }

    Ok(bumped)
}

/// Zeroes the user's unread counter and stamps `last_read_at`.
pub async fn reset_unread(
    conn: &mut SqliteConnection,
    thread_id: &ThreadId,
    user_id: &UserId,
    at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    drop_unread_from_thread(&mut *conn, thread_id, user_id).await?;

    sqlx::query(
        "UPDATE chat_participant SET unread_count = 0, last_read_at = ?
         WHERE thread_id = ? AND user_id = ?",
    )
    .bind(timestamp::encode(at))
    .bind(thread_id.as_str())
    .bind(user_id.as_str())
    .execute(conn)
    .await?;

    Ok(())
}

async fn drop_unread_from_thread(
    conn: &mut SqliteConnection,
    thread_id: &ThreadId,
    user_id: &UserId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE chat_thread
         SET unread_count = MAX(0, unread_count - COALESCE(
             (SELECT unread_count FROM chat_participant WHERE thread_id = ? AND user_id = ?), 0))
         WHERE id = ?",
    )
    .bind(thread_id.as_str())
    .bind(user_id.as_str())
    .bind(thread_id.as_str())
    .execute(conn)
    .await?;

    Ok(())
}
