use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use permitdesk_core::domain::chat::{
    AttachmentRef, ChatMessage, MessageAttachment, MessageStatus, MessageType,
};
use permitdesk_core::ids::{ApplicationId, MessageId, ThreadId, UserId};

use super::{column, parse_enum, RepositoryError};
use crate::timestamp;

const MESSAGE_COLUMNS: &str = "m.id, m.thread_id, m.application_id, m.sender_id, m.content,
    m.message_type, m.status, m.parent_id, m.read_count, m.created_at, m.edited_at,
    m.deleted_at";

fn row_to_message(
    row: &SqliteRow,
    attachments: Vec<MessageAttachment>,
) -> Result<ChatMessage, RepositoryError> {
    let message_type: String = column(row, "message_type")?;
    let status: String = column(row, "status")?;
    Ok(ChatMessage {
        id: MessageId(column(row, "id")?),
        thread_id: ThreadId(column(row, "thread_id")?),
        application_id: column::<Option<String>>(row, "application_id")?.map(ApplicationId),
        sender_id: UserId(column(row, "sender_id")?),
        content: column(row, "content")?,
        message_type: parse_enum(&message_type, "message type", MessageType::parse)?,
        status: parse_enum(&status, "message status", MessageStatus::parse)?,
        parent_id: column::<Option<String>>(row, "parent_id")?.map(MessageId),
        attachments,
        read_count: column(row, "read_count")?,
        created_at: timestamp::decode(&column::<String>(row, "created_at")?)?,
        edited_at: timestamp::decode_opt(column(row, "edited_at")?)?,
        deleted_at: timestamp::decode_opt(column(row, "deleted_at")?)?,
    })
}

fn row_to_attachment(row: &SqliteRow) -> Result<MessageAttachment, RepositoryError> {
    Ok(MessageAttachment {
        id: column(row, "id")?,
        message_id: MessageId(column(row, "message_id")?),
        document_id: column(row, "document_id")?,
        file_name: column(row, "file_name")?,
        content_type: column(row, "content_type")?,
        size_bytes: column(row, "size_bytes")?,
    })
}

fn group_attachments(
    rows: &[SqliteRow],
) -> Result<HashMap<String, Vec<MessageAttachment>>, RepositoryError> {
    let mut grouped: HashMap<String, Vec<MessageAttachment>> = HashMap::new();
    for row in rows {
        let attachment = row_to_attachment(row)?;
        grouped.entry(attachment.message_id.0.clone()).or_default().push(attachment);
    }
    Ok(grouped)
}

/// Writes the message row and its attachment references.
pub async fn insert(
    conn: &mut SqliteConnection,
    message: &ChatMessage,
    attachments: &[AttachmentRef],
) -> Result<Vec<MessageAttachment>, RepositoryError> {
    sqlx::query(
        "INSERT INTO chat_message (id, thread_id, application_id, sender_id, content,
                                   message_type, status, parent_id, read_count, created_at,
                                   edited_at, deleted_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(message.id.as_str())
    .bind(message.thread_id.as_str())
    .bind(message.application_id.as_ref().map(|id| id.as_str()))
    .bind(message.sender_id.as_str())
    .bind(&message.content)
    .bind(message.message_type.as_str())
    .bind(message.status.as_str())
    .bind(message.parent_id.as_ref().map(|id| id.as_str()))
    .bind(message.read_count)
    .bind(timestamp::encode(message.created_at))
    .bind(timestamp::encode_opt(message.edited_at))
    .bind(timestamp::encode_opt(message.deleted_at))
    .execute(&mut *conn)
    .await?;

    let mut stored = Vec::with_capacity(attachments.len());
    for attachment in attachments {
        let id = sqlx::query(
            "INSERT INTO message_attachment (message_id, document_id, file_name, content_type,
                                             size_bytes, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id.as_str())
        .bind(&attachment.document_id)
        .bind(&attachment.file_name)
        .bind(&attachment.content_type)
        .bind(attachment.size_bytes)
        .bind(timestamp::encode(message.created_at))
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        stored.push(MessageAttachment {
            id,
            message_id: message.id.clone(),
            document_id: attachment.document_id.clone(),
            file_name: attachment.file_name.clone(),
            content_type: attachment.content_type.clone(),
            size_bytes: attachment.size_bytes,
        });
    }

    Ok(stored)
}

pub async fn find(
    conn: &mut SqliteConnection,
    id: &MessageId,
) -> Result<Option<ChatMessage>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {MESSAGE_COLUMNS} FROM chat_message m WHERE m.id = ?"))
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let attachment_rows = sqlx::query(
        "SELECT id, message_id, document_id, file_name, content_type, size_bytes
         FROM message_attachment WHERE message_id = ? ORDER BY id",
    )
    .bind(id.as_str())
    .fetch_all(conn)
    .await?;
    let attachments =
        attachment_rows.iter().map(row_to_attachment).collect::<Result<Vec<_>, _>>()?;

    row_to_message(&row, attachments).map(Some)
}

pub async fn get(
    conn: &mut SqliteConnection,
    id: &MessageId,
) -> Result<ChatMessage, RepositoryError> {
    find(conn, id).await?.ok_or_else(|| RepositoryError::not_found("message", id))
}

/// The newest `limit` messages older than `before`, returned oldest first.
pub async fn list(
    conn: &mut SqliteConnection,
    thread_id: &ThreadId,
    limit: u32,
    before: Option<&MessageId>,
) -> Result<Vec<ChatMessage>, RepositoryError> {
    let before = before.map(|id| id.as_str());
    let rows = sqlx::query(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM chat_message m
         WHERE m.thread_id = ?
           AND (? IS NULL OR (m.created_at, m.rowid) <
                (SELECT created_at, rowid FROM chat_message WHERE id = ?))
         ORDER BY m.created_at DESC, m.rowid DESC
         LIMIT ?"
    ))
    .bind(thread_id.as_str())
    .bind(before)
    .bind(before)
    .bind(i64::from(limit))
    .fetch_all(&mut *conn)
    .await?;

    let attachment_rows = sqlx::query(
        "SELECT a.id, a.message_id, a.document_id, a.file_name, a.content_type, a.size_bytes
         FROM message_attachment a
         JOIN chat_message m ON m.id = a.message_id
         WHERE m.thread_id = ?
         ORDER BY a.id",
    )
    .bind(thread_id.as_str())
    .fetch_all(conn)
    .await?;
    let mut attachments = group_attachments(&attachment_rows)?;

    let mut messages = rows
        .iter()
        .map(|row| {
            let id: String = column(row, "id")?;
            row_to_message(row, attachments.remove(&id).unwrap_or_default())
        })
        .collect::<Result<Vec<_>, _>>()?;
    messages.reverse();
    Ok(messages)
}

/// Replaces the content of a message that has not been deleted.
pub async fn edit(
    conn: &mut SqliteConnection,
    id: &MessageId,
    content: &str,
    at: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let updated = sqlx::query(
        "UPDATE chat_message SET content = ?, status = 'EDITED', edited_at = ?
         WHERE id = ? AND status != 'DELETED'",
    )
    .bind(content)
    .bind(timestamp::encode(at))
    .bind(id.as_str())
    .execute(conn)
    .await?
    .rows_affected();

    Ok(updated == 1)
}

/// Clears the content and keeps the row so replies and receipts still resolve.
pub async fn soft_delete(
    conn: &mut SqliteConnection,
    id: &MessageId,
    at: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let updated = sqlx::query(
        "UPDATE chat_message SET content = '', status = 'DELETED', deleted_at = ?
         WHERE id = ? AND status != 'DELETED'",
    )
    .bind(timestamp::encode(at))
    .bind(id.as_str())
    .execute(conn)
    .await?
    .rows_affected();

    Ok(updated == 1)
}

/// Returns true only for the first receipt a user records on a message.
pub async fn insert_read_receipt(
    conn: &mut SqliteConnection,
    message_id: &MessageId,
    user_id: &UserId,
    at: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let inserted = sqlx::query(
        "INSERT INTO message_read_receipt (message_id, user_id, read_at) VALUES (?, ?, ?)
         ON CONFLICT(message_id, user_id) DO NOTHING",
    )
    .bind(message_id.as_str())
    .bind(user_id.as_str())
    .bind(timestamp::encode(at))
    .execute(conn)
    .await?
    .rows_affected();

    Ok(inserted == 1)
}

pub async fn increment_read_count(
    conn: &mut SqliteConnection,
    message_id: &MessageId,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE chat_message SET read_count = read_count + 1 WHERE id = ?")
        .bind(message_id.as_str())
        .execute(conn)
        .await?;

    Ok(())
}

pub async fn star(
    conn: &mut SqliteConnection,
    message_id: &MessageId,
    user_id: &UserId,
    at: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let inserted = sqlx::query(
        "INSERT INTO message_star (message_id, user_id, starred_at) VALUES (?, ?, ?)
         ON CONFLICT(message_id, user_id) DO NOTHING",
    )
    .bind(message_id.as_str())
    .bind(user_id.as_str())
    .bind(timestamp::encode(at))
    .execute(conn)
    .await?
    .rows_affected();

    Ok(inserted == 1)
}

pub async fn unstar(
    conn: &mut SqliteConnection,
    message_id: &MessageId,
    user_id: &UserId,
) -> Result<bool, RepositoryError> {
    let removed = sqlx::query("DELETE FROM message_star WHERE message_id = ? AND user_id = ?")
        .bind(message_id.as_str())
        .bind(user_id.as_str())
        .execute(conn)
        .await?
        .rows_affected();

    Ok(removed == 1)
}

/// Messages the user starred, most recently starred first. Deleted messages drop out.
pub async fn list_starred(
    conn: &mut SqliteConnection,
    user_id: &UserId,
) -> Result<Vec<ChatMessage>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM chat_message m
         JOIN message_star s ON s.message_id = m.id
         WHERE s.user_id = ? AND m.status != 'DELETED'
         ORDER BY s.starred_at DESC, m.rowid DESC"
    ))
    .bind(user_id.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let attachment_rows = sqlx::query(
        "SELECT a.id, a.message_id, a.document_id, a.file_name, a.content_type, a.size_bytes
         FROM message_attachment a
         JOIN message_star s ON s.message_id = a.message_id
         WHERE s.user_id = ?
         ORDER BY a.id",
    )
    .bind(user_id.as_str())
    .fetch_all(conn)
    .await?;
    let mut attachments = group_attachments(&attachment_rows)?;

    rows.iter()
        .map(|row| {
            let id: String = column(row, "id")?;
            row_to_message(row, attachments.remove(&id).unwrap_or_default())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use permitdesk_core::domain::chat::{
        AttachmentRef, ChatMessage, ChatThread, MessageStatus, MessageType, ThreadKind,
    };
    use permitdesk_core::ids::{MessageId, ThreadId, UserId};

    use super::{
        edit, get, increment_read_count, insert, insert_read_receipt, list, list_starred,
        soft_delete, star, unstar,
    };
    use crate::repositories::threads;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let now = Utc::now();
        let thread = ChatThread {
            id: ThreadId::from("thr-1"),
            application_id: None,
            issue_id: None,
            kind: ThreadKind::General,
            title: "Drainage".to_string(),
            created_by: UserId::from("alice"),
            is_resolved: false,
            is_active: true,
            unread_count: 0,
            last_activity_at: now,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };
        let mut conn = pool.acquire().await.expect("acquire");
        threads::insert_thread(&mut conn, &thread).await.expect("insert thread");
        drop(conn);
        pool
    }

    fn message(id: &str, content: &str, offset_secs: i64) -> ChatMessage {
        ChatMessage {
            id: MessageId::from(id),
            thread_id: ThreadId::from("thr-1"),
            application_id: None,
            sender_id: UserId::from("alice"),
            content: content.to_string(),
            message_type: MessageType::Text,
            status: MessageStatus::Sent,
            parent_id: None,
            attachments: Vec::new(),
            read_count: 0,
            created_at: Utc::now() + Duration::seconds(offset_secs),
            edited_at: None,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn pages_come_back_oldest_first_with_attachments() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.expect("acquire");
        let plan = AttachmentRef {
            document_id: "doc-7".to_string(),
            file_name: "site-plan.pdf".to_string(),
            content_type: Some("application/pdf".to_string()),
            size_bytes: Some(2048),
        };
        insert(&mut conn, &message("msg-1", "first", 0), &[]).await.expect("insert");
        insert(&mut conn, &message("msg-2", "second", 1), &[plan]).await.expect("insert");
        insert(&mut conn, &message("msg-3", "third", 2), &[]).await.expect("insert");

        let latest = list(&mut conn, &ThreadId::from("thr-1"), 2, None).await.expect("list");
        let contents: Vec<_> = latest.iter().map(|message| message.content.as_str()).collect();
        assert_eq!(contents, vec!["second", "third"]);
        assert_eq!(latest[0].attachments.len(), 1);
        assert_eq!(latest[0].attachments[0].file_name, "site-plan.pdf");

        let older = list(&mut conn, &ThreadId::from("thr-1"), 10, Some(&MessageId::from("msg-2")))
            .await
            .expect("list");
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].id, MessageId::from("msg-1"));
    }

    #[tokio::test]
    async fn receipts_count_once_per_reader() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.expect("acquire");
        insert(&mut conn, &message("msg-1", "hello", 0), &[]).await.expect("insert");
        let bob = UserId::from("bob");

        for _ in 0..3 {
            if insert_read_receipt(&mut conn, &MessageId::from("msg-1"), &bob, Utc::now())
                .await
                .expect("receipt")
            {
                increment_read_count(&mut conn, &MessageId::from("msg-1")).await.expect("count");
            }
        }

        assert_eq!(get(&mut conn, &MessageId::from("msg-1")).await.expect("get").read_count, 1);
    }

    #[tokio::test]
    async fn deleted_messages_cannot_be_edited_and_leave_the_starred_list() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.expect("acquire");
        let id = MessageId::from("msg-1");
        let bob = UserId::from("bob");
        insert(&mut conn, &message("msg-1", "draft", 0), &[]).await.expect("insert");

        assert!(edit(&mut conn, &id, "final", Utc::now()).await.expect("edit"));
        assert!(star(&mut conn, &id, &bob, Utc::now()).await.expect("star"));
        assert!(!star(&mut conn, &id, &bob, Utc::now()).await.expect("star again"));
        assert_eq!(list_starred(&mut conn, &bob).await.expect("starred").len(), 1);

        assert!(soft_delete(&mut conn, &id, Utc::now()).await.expect("delete"));
        assert!(!edit(&mut conn, &id, "too late", Utc::now()).await.expect("edit"));
        let deleted = get(&mut conn, &id).await.expect("get");
        assert!(deleted.is_deleted());
        assert!(deleted.content.is_empty());
        assert!(list_starred(&mut conn, &bob).await.expect("starred").is_empty());

        assert!(unstar(&mut conn, &id, &bob).await.expect("unstar"));
        assert!(!unstar(&mut conn, &id, &bob).await.expect("unstar again"));
    }
}
