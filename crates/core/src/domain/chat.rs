use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ApplicationId, IssueId, MessageId, ThreadId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Owner,
    Moderator,
    Member,
}

impl ParticipantRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Moderator => "moderator",
            Self::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "owner" => Some(Self::Owner),
            "moderator" => Some(Self::Moderator),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    pub fn default_permissions(self) -> ParticipantPermissions {
        match self {
            Self::Owner => ParticipantPermissions {
                can_invite: true,
                can_remove: true,
                can_manage: true,
                can_resolve: true,
            },
            Self::Moderator => ParticipantPermissions {
                can_invite: true,
                can_remove: true,
                can_manage: true,
                can_resolve: false,
            },
            Self::Member => ParticipantPermissions::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantPermissions {
    pub can_invite: bool,
    pub can_remove: bool,
    pub can_manage: bool,
    pub can_resolve: bool,
}

impl ParticipantPermissions {
    pub fn with_resolve(mut self) -> Self {
        self.can_resolve = true;
        self
    }
}

/// Capability a caller needs to change a thread's participant list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantPermission {
    Add,
    Remove,
    Any,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreadKind {
    General,
    /// One per application, carries decision and assignment announcements.
    Workflow,
    Issue,
}

impl ThreadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "GENERAL",
            Self::Workflow => "WORKFLOW",
            Self::Issue => "ISSUE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GENERAL" => Some(Self::General),
            "WORKFLOW" => Some(Self::Workflow),
            "ISSUE" => Some(Self::Issue),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatThread {
    pub id: ThreadId,
    pub application_id: Option<ApplicationId>,
    pub issue_id: Option<IssueId>,
    pub kind: ThreadKind,
    pub title: String,
    pub created_by: UserId,
    pub is_resolved: bool,
    pub is_active: bool,
    /// Sum of the unread counters of every participant.
    pub unread_count: i64,
    pub last_activity_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatParticipant {
    pub thread_id: ThreadId,
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub permissions: ParticipantPermissions,
    pub unread_count: i64,
    pub last_read_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

/// Participant to be written into a thread, with role and rights decided up front.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParticipantSeed {
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub permissions: ParticipantPermissions,
}

impl ParticipantSeed {
    pub fn with_role(user_id: UserId, role: ParticipantRole) -> Self {
        Self { user_id, role, permissions: role.default_permissions() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    System,
    File,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::System => "SYSTEM",
            Self::File => "FILE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TEXT" => Some(Self::Text),
            "SYSTEM" => Some(Self::System),
            "FILE" => Some(Self::File),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sent,
    Edited,
    Deleted,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Edited => "EDITED",
            Self::Deleted => "DELETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SENT" => Some(Self::Sent),
            "EDITED" => Some(Self::Edited),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Reference to a document already persisted by the document service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub document_id: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttachment {
    pub id: i64,
    pub message_id: MessageId,
    pub document_id: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub application_id: Option<ApplicationId>,
    pub sender_id: UserId,
    pub content: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub parent_id: Option<MessageId>,
    pub attachments: Vec<MessageAttachment>,
    pub read_count: i64,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn is_deleted(&self) -> bool {
        self.status == MessageStatus::Deleted
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub read_at: DateTime<Utc>,
}

/// Thread as seen by one participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread: ChatThread,
    pub role: ParticipantRole,
    pub unread_count: i64,
    pub last_read_at: Option<DateTime<Utc>>,
}
