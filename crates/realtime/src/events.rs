use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use permitdesk_core::domain::chat::ChatMessage;
use permitdesk_core::ids::{MessageId, ThreadId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantChangeKind {
    Added,
    Removed,
}

/// Event pushed to the sessions subscribed to a thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadEvent {
    ChatMessage {
        thread_id: ThreadId,
        message: ChatMessage,
    },
    /// Transient; never persisted.
    Typing {
        thread_id: ThreadId,
        user_id: UserId,
        is_typing: bool,
    },
    ReadReceipt {
        thread_id: ThreadId,
        user_id: UserId,
        message_ids: Vec<MessageId>,
        read_at: DateTime<Utc>,
    },
    ParticipantChange {
        thread_id: ThreadId,
        actor_id: UserId,
        change: ParticipantChangeKind,
        user_ids: Vec<UserId>,
    },
    ThreadState {
        thread_id: ThreadId,
        is_resolved: bool,
        is_active: bool,
    },
}

impl ThreadEvent {
    pub fn thread_id(&self) -> &ThreadId {
        match self {
            Self::ChatMessage { thread_id, .. }
            | Self::Typing { thread_id, .. }
            | Self::ReadReceipt { thread_id, .. }
            | Self::ParticipantChange { thread_id, .. }
            | Self::ThreadState { thread_id, .. } => thread_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatMessage { .. } => "chat_message",
            Self::Typing { .. } => "typing",
            Self::ReadReceipt { .. } => "read_receipt",
            Self::ParticipantChange { .. } => "participant_change",
            Self::ThreadState { .. } => "thread_state",
        }
    }
}

/// Frame queued for one session. The transport decides how each is written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Event(ThreadEvent),
    Ping,
    Close,
}
