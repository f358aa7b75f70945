use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use permitdesk_core::ids::{ThreadId, UserId};

use crate::broadcaster::{BroadcastError, ThreadBroadcaster};
use crate::events::{Outbound, ParticipantChangeKind, ThreadEvent};

pub type SessionSender = mpsc::UnboundedSender<Outbound>;
pub type SessionReceiver = mpsc::UnboundedReceiver<Outbound>;

struct Session {
    user_id: UserId,
    sender: SessionSender,
    subscriptions: HashSet<ThreadId>,
    connected_at: DateTime<Utc>,
}

/// Registry of connected sessions and the threads each one follows.
///
/// Wrap in `Arc` and share between the transport and the workflow services.
pub struct RealtimeHub {
    sessions: RwLock<HashMap<String, Session>>,
    closed: AtomicBool,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self { sessions: RwLock::new(HashMap::new()), closed: AtomicBool::new(false) }
    }

    /// Registers a session and hands back the receiving half of its queue.
    pub async fn register(&self, session_id: impl Into<String>, user_id: UserId) -> SessionReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        let session_id = session_id.into();
        debug!(session_id = %session_id, user_id = %user_id, "realtime session registered");
        self.sessions.write().await.insert(
            session_id,
            Session { user_id, sender, subscriptions: HashSet::new(), connected_at: Utc::now() },
        );
        receiver
    }

    pub async fn unregister(&self, session_id: &str) {
        if self.sessions.write().await.remove(session_id).is_some() {
            debug!(session_id, "realtime session unregistered");
        }
    }

    /// Returns false when the session is unknown.
    pub async fn subscribe(&self, session_id: &str, thread_id: ThreadId) -> bool {
        match self.sessions.write().await.get_mut(session_id) {
            Some(session) => {
                session.subscriptions.insert(thread_id);
                true
            }
            None => false,
        }
    }

    pub async fn unsubscribe(&self, session_id: &str, thread_id: &ThreadId) -> bool {
        match self.sessions.write().await.get_mut(session_id) {
            Some(session) => session.subscriptions.remove(thread_id),
            None => false,
        }
    }

    /// Drops every subscription `user_ids` hold on the thread. Returns how many were dropped.
    pub async fn unsubscribe_users(&self, thread_id: &ThreadId, user_ids: &[UserId]) -> usize {
        let mut dropped = 0;
        for session in self.sessions.write().await.values_mut() {
            if user_ids.contains(&session.user_id) && session.subscriptions.remove(thread_id) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(thread_id = %thread_id, dropped, "revoked realtime subscriptions");
        }
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn session_user(&self, session_id: &str) -> Option<UserId> {
        self.sessions.read().await.get(session_id).map(|session| session.user_id.clone())
    }

    pub async fn sessions_for_user(&self, user_id: &UserId) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, session)| &session.user_id == user_id)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn subscriber_count(&self, thread_id: &ThreadId) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|session| session.subscriptions.contains(thread_id))
            .count()
    }

    /// Oldest connection time among the user's sessions.
    pub async fn connected_since(&self, user_id: &UserId) -> Option<DateTime<Utc>> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|session| &session.user_id == user_id)
            .map(|session| session.connected_at)
            .min()
    }

    /// Fans `event` out to the thread's subscribers, skipping `exclude_user`.
    /// Sessions whose queue is closed are dropped from the registry.
    pub async fn broadcast(
        &self,
        thread_id: &ThreadId,
        event: &ThreadEvent,
        exclude_user: Option<&UserId>,
    ) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (session_id, session) in sessions.iter() {
                if !session.subscriptions.contains(thread_id) {
                    continue;
                }
                if exclude_user.is_some_and(|user| user == &session.user_id) {
                    continue;
                }
                if session.sender.send(Outbound::Event(event.clone())).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(session_id.clone());
                }
            }
        }

        if !closed.is_empty() {
            let mut sessions = self.sessions.write().await;
            for session_id in &closed {
                sessions.remove(session_id);
            }
            debug!(thread_id = %thread_id, pruned = closed.len(), "pruned closed realtime sessions");
        }

        delivered
    }

    pub async fn ping_all(&self) {
        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            let _ = session.sender.send(Outbound::Ping);
        }
    }

    /// Sends a close frame to every session, then forgets them all. Later broadcasts
    /// through [`ThreadBroadcaster`] report the hub as unavailable.
    pub async fn shutdown_all(&self) {
        self.closed.store(true, Ordering::Release);
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        for session in sessions.values() {
            let _ = session.sender.send(Outbound::Close);
        }
        sessions.clear();
        info!(count, event_name = "realtime.session.shutdown", "closed all realtime sessions");
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThreadBroadcaster for RealtimeHub {
    async fn broadcast_to_thread(
        &self,
        thread_id: &ThreadId,
        event: ThreadEvent,
        exclude_user: Option<&UserId>,
    ) -> Result<usize, BroadcastError> {
        if self.is_closed() {
            return Err(BroadcastError::Unavailable("hub has shut down".to_string()));
        }
        let delivered = self.broadcast(thread_id, &event, exclude_user).await;
        // Removed participants see their own removal, then nothing further.
        if let ThreadEvent::ParticipantChange {
            change: ParticipantChangeKind::Removed, user_ids, ..
        } = &event
        {
            self.unsubscribe_users(thread_id, user_ids).await;
        }
        debug!(
            thread_id = %thread_id,
            event = event.name(),
            delivered,
            "realtime event broadcast"
        );
        Ok(delivered)
    }
}
