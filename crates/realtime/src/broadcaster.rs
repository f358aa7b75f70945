use async_trait::async_trait;
use thiserror::Error;

use permitdesk_core::ids::{ThreadId, UserId};

use crate::events::ThreadEvent;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("realtime hub unavailable: {0}")]
    Unavailable(String),
}

/// Seam between the workflow services and whatever delivers events to clients.
#[async_trait]
pub trait ThreadBroadcaster: Send + Sync {
    /// Delivers `event` to every session subscribed to `thread_id` except those
    /// owned by `exclude_user`. Returns the number of sessions reached.
    async fn broadcast_to_thread(
        &self,
        thread_id: &ThreadId,
        event: ThreadEvent,
        exclude_user: Option<&UserId>,
    ) -> Result<usize, BroadcastError>;
}
