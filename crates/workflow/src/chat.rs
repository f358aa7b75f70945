use std::collections::HashSet;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::info;

use permitdesk_core::collab::{
    can_user_manage_participants, participant_change_message, ParticipantChange,
};
use permitdesk_core::context::RequestContext;
use permitdesk_core::domain::chat::{
    AttachmentRef, ChatMessage, ChatParticipant, ChatThread, MessageType, ParticipantPermission,
    ParticipantRole, ParticipantSeed, ThreadKind, ThreadSummary,
};
use permitdesk_core::errors::WorkflowError;
use permitdesk_core::ids::{ApplicationId, MessageId, ThreadId, UserId};
use permitdesk_db::repositories::{applications, messages, threads};
use permitdesk_db::timestamp;
use permitdesk_realtime::{ParticipantChangeKind, ThreadEvent};

use crate::support::{
    draft_message, persist_message, post_system_message, require_text, Outbox, ServiceDeps,
};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewThread {
    #[serde(default)]
    pub application_id: Option<ApplicationId>,
    pub title: String,
    #[serde(default)]
    pub participant_ids: Vec<UserId>,
}

/// Body of a message or reply. Empty content is allowed when attachments are present.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

/// Threads, messages, receipts and the participant roster.
#[derive(Clone)]
pub struct ChatService {
    deps: ServiceDeps,
}

fn change_kind(change: ParticipantChange) -> ParticipantChangeKind {
    match change {
        ParticipantChange::Added => ParticipantChangeKind::Added,
        ParticipantChange::Removed => ParticipantChangeKind::Removed,
    }
}

fn dedupe<T: Eq + Hash + Clone>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

async fn active_participant(
    conn: &mut SqliteConnection,
    thread_id: &ThreadId,
    user_id: &UserId,
) -> Result<ChatParticipant, WorkflowError> {
    threads::find_participant(conn, thread_id, user_id)
        .await?
        .filter(|participant| participant.is_active)
        .ok_or_else(|| {
            WorkflowError::forbidden(format!(
                "user `{user_id}` is not an active participant of thread `{thread_id}`"
            ))
        })
}

fn outgoing_body(message: &OutgoingMessage) -> Result<(String, MessageType), WorkflowError> {
    let content = message.content.trim().to_string();
    match (content.is_empty(), message.attachments.is_empty()) {
        (true, true) => Err(WorkflowError::validation(
            "a message needs content or at least one attachment",
        )),
        (true, false) => Ok((content, MessageType::File)),
        (false, _) => Ok((content, MessageType::Text)),
    }
}

impl ChatService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    pub async fn create_thread(
        &self,
        ctx: &RequestContext,
        input: NewThread,
    ) -> Result<ChatThread, WorkflowError> {
        let title = require_text(&input.title, "thread title")?;
        let now = timestamp::now();

        let mut uow = self.deps.store.begin().await?;
        if let Some(application_id) = &input.application_id {
            applications::get(uow.conn(), application_id).await?;
        }
        let thread = ChatThread {
            id: ThreadId::generate(),
            application_id: input.application_id,
            issue_id: None,
            kind: ThreadKind::General,
            title,
            created_by: ctx.actor.clone(),
            is_resolved: false,
            is_active: true,
            unread_count: 0,
            last_activity_at: now,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };
        threads::insert_thread(uow.conn(), &thread).await?;
        let owner = ParticipantSeed::with_role(ctx.actor.clone(), ParticipantRole::Owner);
        threads::add_participant(uow.conn(), &thread.id, &owner, now).await?;
        for user_id in dedupe(input.participant_ids) {
            if user_id == ctx.actor {
                continue;
            }
            let seed = ParticipantSeed::with_role(user_id, ParticipantRole::Member);
            threads::add_participant(uow.conn(), &thread.id, &seed, now).await?;
        }
        uow.commit().await?;

        info!(
            event_name = "workflow.thread.created",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            thread_id = %thread.id,
            "chat thread created"
        );
        Ok(thread)
    }

    pub async fn list_threads(&self, user_id: &UserId) -> Result<Vec<ThreadSummary>, WorkflowError> {
        let mut conn = self.deps.store.acquire().await?;
        Ok(threads::list_for_user(&mut conn, user_id).await?)
    }

    pub async fn send_message(
        &self,
        ctx: &RequestContext,
        thread_id: &ThreadId,
        outgoing: OutgoingMessage,
    ) -> Result<ChatMessage, WorkflowError> {
        let (content, message_type) = outgoing_body(&outgoing)?;
        let now = timestamp::now();

        let mut uow = self.deps.store.begin().await?;
        let thread = threads::lock_thread(uow.conn(), thread_id).await?;
        if !thread.is_active {
            return Err(WorkflowError::not_found(format!("thread `{thread_id}` is not active")));
        }
        active_participant(uow.conn(), thread_id, &ctx.actor).await?;

        let draft = draft_message(&thread, &ctx.actor, content, message_type, None, now);
        let message = persist_message(uow.conn(), draft, &outgoing.attachments).await?;
        let mut outbox = Outbox::default();
        outbox.message(&message, &ctx.actor);

        uow.commit().await?;
        self.deps.publisher.publish(outbox, &ctx.correlation_id).await;

        info!(
            event_name = "workflow.message.sent",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            thread_id = %thread_id,
            message_id = %message.id,
            attachments = message.attachments.len(),
            "chat message sent"
        );
        Ok(message)
    }

    /// Posts into the parent's thread, keeping the parent's application binding.
    pub async fn reply_to_message(
        &self,
        ctx: &RequestContext,
        parent_id: &MessageId,
        outgoing: OutgoingMessage,
    ) -> Result<ChatMessage, WorkflowError> {
        let (content, message_type) = outgoing_body(&outgoing)?;
        let now = timestamp::now();

        let mut uow = self.deps.store.begin().await?;
        let parent = messages::get(uow.conn(), parent_id).await?;
        let thread = threads::lock_thread(uow.conn(), &parent.thread_id).await?;
        if !thread.is_active {
            return Err(WorkflowError::not_found(format!("thread `{}` is not active", thread.id)));
        }
        if parent.is_deleted() {
            return Err(WorkflowError::conflict(format!("message `{parent_id}` has been deleted")));
        }
        active_participant(uow.conn(), &thread.id, &ctx.actor).await?;

        let mut draft =
            draft_message(&thread, &ctx.actor, content, message_type, Some(parent_id.clone()), now);
        draft.application_id = parent.application_id.clone();
        let message = persist_message(uow.conn(), draft, &outgoing.attachments).await?;
        let mut outbox = Outbox::default();
        outbox.message(&message, &ctx.actor);

        uow.commit().await?;
        self.deps.publisher.publish(outbox, &ctx.correlation_id).await;

        info!(
            event_name = "workflow.message.replied",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            thread_id = %message.thread_id,
            message_id = %message.id,
            parent_id = %parent_id,
            "chat reply sent"
        );
        Ok(message)
    }

    pub async fn edit_message(
        &self,
        ctx: &RequestContext,
        message_id: &MessageId,
        content: &str,
    ) -> Result<ChatMessage, WorkflowError> {
        let content = require_text(content, "message content")?;
        let now = timestamp::now();

        let mut uow = self.deps.store.begin().await?;
        let message = messages::get(uow.conn(), message_id).await?;
        if message.sender_id != ctx.actor {
            return Err(WorkflowError::forbidden("only the sender may edit a message"));
        }
        if !messages::edit(uow.conn(), message_id, &content, now).await? {
            return Err(WorkflowError::conflict(format!("message `{message_id}` has been deleted")));
        }
        let edited = messages::get(uow.conn(), message_id).await?;
        let mut outbox = Outbox::default();
        outbox.message(&edited, &ctx.actor);

        uow.commit().await?;
        self.deps.publisher.publish(outbox, &ctx.correlation_id).await;

        info!(
            event_name = "workflow.message.edited",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            thread_id = %edited.thread_id,
            message_id = %message_id,
            "chat message edited"
        );
        Ok(edited)
    }

    /// Soft delete by the sender or a participant allowed to manage the thread.
    pub async fn delete_message(
        &self,
        ctx: &RequestContext,
        message_id: &MessageId,
    ) -> Result<ChatMessage, WorkflowError> {
        let now = timestamp::now();

        let mut uow = self.deps.store.begin().await?;
        let message = messages::get(uow.conn(), message_id).await?;
        if message.sender_id != ctx.actor {
            let participant =
                threads::find_participant(uow.conn(), &message.thread_id, &ctx.actor).await?;
            let may_manage = participant
                .filter(|participant| participant.is_active)
                .map(|participant| {
                    participant.role == ParticipantRole::Owner || participant.permissions.can_manage
                })
                .unwrap_or(false);
            if !may_manage {
                return Err(WorkflowError::forbidden(
                    "only the sender or a thread manager may delete a message",
                ));
            }
        }
        if !messages::soft_delete(uow.conn(), message_id, now).await? {
            return Err(WorkflowError::conflict(format!(
                "message `{message_id}` is already deleted"
            )));
        }
        let deleted = messages::get(uow.conn(), message_id).await?;
        let mut outbox = Outbox::default();
        outbox.message(&deleted, &ctx.actor);

        uow.commit().await?;
        self.deps.publisher.publish(outbox, &ctx.correlation_id).await;

        info!(
            event_name = "workflow.message.deleted",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            thread_id = %deleted.thread_id,
            message_id = %message_id,
            "chat message deleted"
        );
        Ok(deleted)
    }

    /// Returns whether the star was newly added.
    pub async fn star_message(
        &self,
        ctx: &RequestContext,
        message_id: &MessageId,
    ) -> Result<bool, WorkflowError> {
        let mut uow = self.deps.store.begin().await?;
        let message = messages::get(uow.conn(), message_id).await?;
        active_participant(uow.conn(), &message.thread_id, &ctx.actor).await?;
        if message.is_deleted() {
            return Err(WorkflowError::conflict(format!("message `{message_id}` has been deleted")));
        }
        let starred = messages::star(uow.conn(), message_id, &ctx.actor, timestamp::now()).await?;
        uow.commit().await?;

        info!(
            event_name = "workflow.message.starred",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            message_id = %message_id,
            changed = starred,
            "chat message starred"
        );
        Ok(starred)
    }

    pub async fn unstar_message(
        &self,
        ctx: &RequestContext,
        message_id: &MessageId,
    ) -> Result<bool, WorkflowError> {
        let mut uow = self.deps.store.begin().await?;
        messages::get(uow.conn(), message_id).await?;
        let removed = messages::unstar(uow.conn(), message_id, &ctx.actor).await?;
        uow.commit().await?;

        info!(
            event_name = "workflow.message.unstarred",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            message_id = %message_id,
            changed = removed,
            "chat message unstarred"
        );
        Ok(removed)
    }

    pub async fn list_starred(&self, user_id: &UserId) -> Result<Vec<ChatMessage>, WorkflowError> {
        let mut conn = self.deps.store.acquire().await?;
        Ok(messages::list_starred(&mut conn, user_id).await?)
    }

    /// Oldest first. `limit` defaults to 50 and is capped at 200.
    pub async fn list_messages(
        &self,
        user_id: &UserId,
        thread_id: &ThreadId,
        limit: Option<u32>,
        before: Option<&MessageId>,
    ) -> Result<Vec<ChatMessage>, WorkflowError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let mut conn = self.deps.store.acquire().await?;
        threads::get_thread(&mut conn, thread_id).await?;
        active_participant(&mut conn, thread_id, user_id).await?;
        Ok(messages::list(&mut conn, thread_id, limit, before).await?)
    }

    /// Records receipts for the given messages and clears the caller's unread counter.
    ///
    /// Returns the ids that received a first receipt from this user.
    pub async fn mark_as_read(
        &self,
        ctx: &RequestContext,
        thread_id: &ThreadId,
        message_ids: Vec<MessageId>,
    ) -> Result<Vec<MessageId>, WorkflowError> {
        let message_ids = dedupe(message_ids);
        let now = timestamp::now();

        let mut uow = self.deps.store.begin().await?;
        threads::lock_thread(uow.conn(), thread_id).await?;
        active_participant(uow.conn(), thread_id, &ctx.actor).await?;

        let mut first_reads = Vec::new();
        for message_id in &message_ids {
            let message = messages::get(uow.conn(), message_id).await?;
            if &message.thread_id != thread_id {
                return Err(WorkflowError::validation(format!(
                    "message `{message_id}` does not belong to thread `{thread_id}`"
                )));
            }
            if messages::insert_read_receipt(uow.conn(), message_id, &ctx.actor, now).await? {
                messages::increment_read_count(uow.conn(), message_id).await?;
                first_reads.push(message_id.clone());
            }
        }
        threads::reset_unread(uow.conn(), thread_id, &ctx.actor, now).await?;

        let mut outbox = Outbox::default();
        if !first_reads.is_empty() {
            outbox.push(
                ThreadEvent::ReadReceipt {
                    thread_id: thread_id.clone(),
                    user_id: ctx.actor.clone(),
                    message_ids: first_reads.clone(),
                    read_at: now,
                },
                Some(&ctx.actor),
            );
        }

        uow.commit().await?;
        self.deps.publisher.publish(outbox, &ctx.correlation_id).await;

        info!(
            event_name = "workflow.thread.read",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            thread_id = %thread_id,
            receipts = first_reads.len(),
            "messages marked as read"
        );
        Ok(first_reads)
    }

    /// Broadcast only; typing state is never stored.
    pub async fn send_typing(
        &self,
        ctx: &RequestContext,
        thread_id: &ThreadId,
        is_typing: bool,
    ) -> Result<(), WorkflowError> {
        {
            let mut conn = self.deps.store.acquire().await?;
            threads::get_thread(&mut conn, thread_id).await?;
            active_participant(&mut conn, thread_id, &ctx.actor).await?;
        }

        let mut outbox = Outbox::default();
        outbox.push(
            ThreadEvent::Typing {
                thread_id: thread_id.clone(),
                user_id: ctx.actor.clone(),
                is_typing,
            },
            Some(&ctx.actor),
        );
        self.deps.publisher.publish(outbox, &ctx.correlation_id).await;
        Ok(())
    }

    pub async fn add_participant(
        &self,
        ctx: &RequestContext,
        thread_id: &ThreadId,
        user_id: UserId,
    ) -> Result<Vec<UserId>, WorkflowError> {
        self.add_participants(ctx, thread_id, vec![user_id]).await
    }

    /// Adds every user not already active. Fails with `Conflict` only when none remain.
    pub async fn add_participants(
        &self,
        ctx: &RequestContext,
        thread_id: &ThreadId,
        user_ids: Vec<UserId>,
    ) -> Result<Vec<UserId>, WorkflowError> {
        let user_ids = dedupe(user_ids);
        if user_ids.is_empty() {
            return Err(WorkflowError::validation("at least one participant is required"));
        }
        let actor_name = self.deps.display_name(&ctx.actor).await?;
        let names = self.deps.display_names(&user_ids).await?;
        let now = timestamp::now();

        let mut uow = self.deps.store.begin().await?;
        let thread = threads::lock_thread(uow.conn(), thread_id).await?;
        let caller = threads::find_participant(uow.conn(), thread_id, &ctx.actor).await?;
        if !can_user_manage_participants(caller.as_ref(), ParticipantPermission::Add) {
            return Err(WorkflowError::forbidden(format!(
                "user `{}` may not add participants to thread `{thread_id}`",
                ctx.actor
            )));
        }

        let mut added = Vec::new();
        for (user_id, name) in names {
            let seed = ParticipantSeed::with_role(user_id.clone(), ParticipantRole::Member);
            if threads::add_participant(uow.conn(), thread_id, &seed, now).await?.changed() {
                added.push((user_id, name));
            }
        }
        if added.is_empty() {
            return Err(WorkflowError::conflict("every user is already an active participant"));
        }

        let outbox = self
            .announce_change(uow.conn(), &thread, ctx, &actor_name, &added, ParticipantChange::Added)
            .await?;
        uow.commit().await?;
        self.deps.publisher.publish(outbox, &ctx.correlation_id).await;

        let added: Vec<UserId> = added.into_iter().map(|(user_id, _)| user_id).collect();
        info!(
            event_name = "workflow.participants.added",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            thread_id = %thread_id,
            count = added.len(),
            "participants added"
        );
        Ok(added)
    }

    pub async fn remove_participant(
        &self,
        ctx: &RequestContext,
        thread_id: &ThreadId,
        user_id: UserId,
    ) -> Result<Vec<UserId>, WorkflowError> {
        self.remove_participants(ctx, thread_id, vec![user_id]).await
    }

    /// The creator can never be removed. Anyone may remove themselves.
    pub async fn remove_participants(
        &self,
        ctx: &RequestContext,
        thread_id: &ThreadId,
        user_ids: Vec<UserId>,
    ) -> Result<Vec<UserId>, WorkflowError> {
        let user_ids = dedupe(user_ids);
        if user_ids.is_empty() {
            return Err(WorkflowError::validation("at least one participant is required"));
        }
        let actor_name = self.deps.display_name(&ctx.actor).await?;
        let names = self.deps.display_names(&user_ids).await?;
        let now = timestamp::now();

        let mut uow = self.deps.store.begin().await?;
        let thread = threads::lock_thread(uow.conn(), thread_id).await?;
        if user_ids.contains(&thread.created_by) {
            return Err(WorkflowError::forbidden("the thread creator cannot be removed"));
        }
        let leaving_alone = user_ids.len() == 1 && user_ids[0] == ctx.actor;
        if !leaving_alone {
            let caller = threads::find_participant(uow.conn(), thread_id, &ctx.actor).await?;
            if !can_user_manage_participants(caller.as_ref(), ParticipantPermission::Remove) {
                return Err(WorkflowError::forbidden(format!(
                    "user `{}` may not remove participants from thread `{thread_id}`",
                    ctx.actor
                )));
            }
        }

        let mut removed = Vec::new();
        for (user_id, name) in names {
            if threads::deactivate_participant(uow.conn(), thread_id, &user_id, now).await? {
                removed.push((user_id, name));
            }
        }
        if removed.is_empty() {
            return Err(WorkflowError::not_found("none of the users is an active participant"));
        }

        let outbox = self
            .announce_change(
                uow.conn(),
                &thread,
                ctx,
                &actor_name,
                &removed,
                ParticipantChange::Removed,
            )
            .await?;
        uow.commit().await?;
        self.deps.publisher.publish(outbox, &ctx.correlation_id).await;

        let removed: Vec<UserId> = removed.into_iter().map(|(user_id, _)| user_id).collect();
        info!(
            event_name = "workflow.participants.removed",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            thread_id = %thread_id,
            count = removed.len(),
            "participants removed"
        );
        Ok(removed)
    }

    pub async fn is_active_participant(
        &self,
        thread_id: &ThreadId,
        user_id: &UserId,
    ) -> Result<bool, WorkflowError> {
        let mut conn = self.deps.store.acquire().await?;
        Ok(threads::find_participant(&mut conn, thread_id, user_id)
            .await?
            .map(|participant| participant.is_active)
            .unwrap_or(false))
    }

    /// One system message per roster change, plus the change event itself.
    async fn announce_change(
        &self,
        conn: &mut SqliteConnection,
        thread: &ChatThread,
        ctx: &RequestContext,
        actor_name: &str,
        targets: &[(UserId, String)],
        change: ParticipantChange,
    ) -> Result<Outbox, WorkflowError> {
        let content = participant_change_message(
            (&ctx.actor, actor_name),
            targets,
            change,
            self.deps.config.participant_summary_limit,
        );
        let message =
            post_system_message(conn, thread, &ctx.actor, content, timestamp::now()).await?;

        let mut outbox = Outbox::default();
        outbox.message(&message, &ctx.actor);
        outbox.push(
            ThreadEvent::ParticipantChange {
                thread_id: thread.id.clone(),
                actor_id: ctx.actor.clone(),
                change: change_kind(change),
                user_ids: targets.iter().map(|(user_id, _)| user_id.clone()).collect(),
            },
            None,
        );
        Ok(outbox)
    }
}
