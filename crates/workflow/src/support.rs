use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use permitdesk_core::config::WorkflowConfig;
use permitdesk_core::directory::UserDirectory;
use permitdesk_core::domain::application::ApplicationStatus;
use permitdesk_core::domain::chat::{
    AttachmentRef, ChatMessage, ChatThread, MessageStatus, MessageType,
};
use permitdesk_core::errors::WorkflowError;
use permitdesk_core::ids::{MessageId, ThreadId, UserId};
use permitdesk_db::repositories::{messages, threads};
use permitdesk_db::Store;
use permitdesk_realtime::{ThreadBroadcaster, ThreadEvent};

/// Collaborators shared by every service.
#[derive(Clone)]
pub struct ServiceDeps {
    pub store: Store,
    pub directory: Arc<dyn UserDirectory>,
    pub publisher: EventPublisher,
    pub config: WorkflowConfig,
}

impl ServiceDeps {
    pub fn new(
        store: Store,
        directory: Arc<dyn UserDirectory>,
        publisher: EventPublisher,
        config: WorkflowConfig,
    ) -> Self {
        Self { store, directory, publisher, config }
    }

    pub(crate) async fn display_name(&self, user_id: &UserId) -> Result<String, WorkflowError> {
        Ok(self.directory.display_name(user_id).await?)
    }

    pub(crate) async fn display_names(
        &self,
        user_ids: &[UserId],
    ) -> Result<Vec<(UserId, String)>, WorkflowError> {
        let mut names = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            names.push((user_id.clone(), self.display_name(user_id).await?));
        }
        Ok(names)
    }
}

struct PendingEvent {
    thread_id: ThreadId,
    event: ThreadEvent,
    exclude_user: Option<UserId>,
}

/// Events gathered while a unit of work is open, published once it commits.
#[derive(Default)]
pub(crate) struct Outbox {
    events: Vec<PendingEvent>,
}

impl Outbox {
    pub(crate) fn push(&mut self, event: ThreadEvent, exclude_user: Option<&UserId>) {
        self.events.push(PendingEvent {
            thread_id: event.thread_id().clone(),
            event,
            exclude_user: exclude_user.cloned(),
        });
    }

    pub(crate) fn message(&mut self, message: &ChatMessage, exclude_user: &UserId) {
        self.push(
            ThreadEvent::ChatMessage {
                thread_id: message.thread_id.clone(),
                message: message.clone(),
            },
            Some(exclude_user),
        );
    }
}

/// Post-commit delivery of thread events. Without a broadcaster every publish is a no-op.
#[derive(Clone, Default)]
pub struct EventPublisher {
    broadcaster: Option<Arc<dyn ThreadBroadcaster>>,
}

impl EventPublisher {
    pub fn new(broadcaster: Arc<dyn ThreadBroadcaster>) -> Self {
        Self { broadcaster: Some(broadcaster) }
    }

    pub fn disabled() -> Self {
        Self { broadcaster: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.broadcaster.is_some()
    }

    pub(crate) async fn publish(&self, outbox: Outbox, correlation_id: &str) {
        let Some(broadcaster) = &self.broadcaster else {
            if !outbox.events.is_empty() {
                debug!(
                    correlation_id,
                    events = outbox.events.len(),
                    "realtime hub not configured, skipping broadcast"
                );
            }
            return;
        };

        for pending in outbox.events {
            let name = pending.event.name();
            match broadcaster
                .broadcast_to_thread(&pending.thread_id, pending.event, pending.exclude_user.as_ref())
                .await
            {
                Ok(delivered) => debug!(
                    correlation_id,
                    thread_id = %pending.thread_id,
                    event = name,
                    delivered,
                    "thread event published"
                ),
                Err(error) => warn!(
                    event_name = "realtime.broadcast.failed",
                    correlation_id,
                    thread_id = %pending.thread_id,
                    event = name,
                    error = %error,
                    "thread event broadcast failed"
                ),
            }
        }
    }
}

pub(crate) fn draft_message(
    thread: &ChatThread,
    sender: &UserId,
    content: String,
    message_type: MessageType,
    parent_id: Option<MessageId>,
    at: DateTime<Utc>,
) -> ChatMessage {
    ChatMessage {
        id: MessageId::generate(),
        thread_id: thread.id.clone(),
        application_id: thread.application_id.clone(),
        sender_id: sender.clone(),
        content,
        message_type,
        status: MessageStatus::Sent,
        parent_id,
        attachments: Vec::new(),
        read_count: 0,
        created_at: at,
        edited_at: None,
        deleted_at: None,
    }
}

/// Stores the message, bumps thread activity and the other participants' unread counters.
pub(crate) async fn persist_message(
    conn: &mut SqliteConnection,
    mut message: ChatMessage,
    attachments: &[AttachmentRef],
) -> Result<ChatMessage, WorkflowError> {
    message.attachments = messages::insert(&mut *conn, &message, attachments).await?;
    threads::touch_activity(&mut *conn, &message.thread_id, message.created_at).await?;
    threads::increment_unread_for_others(&mut *conn, &message.thread_id, &message.sender_id)
        .await?;
    Ok(message)
}

pub(crate) async fn post_system_message(
    conn: &mut SqliteConnection,
    thread: &ChatThread,
    actor: &UserId,
    content: String,
    at: DateTime<Utc>,
) -> Result<ChatMessage, WorkflowError> {
    let message = draft_message(thread, actor, content, MessageType::System, None, at);
    persist_message(conn, message, &[]).await
}

pub(crate) fn require_text(value: &str, field: &str) -> Result<String, WorkflowError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn ensure_open_for_review(status: ApplicationStatus) -> Result<(), WorkflowError> {
    if status.is_terminal() {
        return Err(WorkflowError::conflict(format!(
            "application is {} and no longer accepts changes",
            status.as_str()
        )));
    }
    Ok(())
}
