use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};

use permitdesk_core::domain::chat::{ChatMessage, ChatThread, ThreadSummary};
use permitdesk_core::ids::{MessageId, ThreadId, UserId};
use permitdesk_workflow::{NewThread, OutgoingMessage};

use super::{created, done, ok, Actor, ApiResult, ApiState, Body, InRequest, Params};

pub(super) fn routes() -> Router<ApiState> {
    Router::new()
        .route("/api/v1/threads", post(create_thread).get(list_threads))
        .route("/api/v1/threads/{id}/messages", get(list_messages).post(send_message))
        .route(
            "/api/v1/threads/{id}/participants",
            post(add_participants).delete(remove_participants),
        )
        .route("/api/v1/threads/{id}/read", post(mark_as_read))
        .route("/api/v1/threads/{id}/typing", post(send_typing))
        .route("/api/v1/messages/starred", get(list_starred))
        .route("/api/v1/messages/{id}", put(edit_message).delete(delete_message))
        .route("/api/v1/messages/{id}/reply", post(reply_to_message))
        .route("/api/v1/messages/{id}/star", post(star_message).delete(unstar_message))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MessagePageQuery {
    limit: Option<u32>,
    before: Option<MessageId>,
}

#[derive(Debug, Deserialize)]
struct ParticipantsRequest {
    user_ids: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
struct ReadRequest {
    message_ids: Vec<MessageId>,
}

#[derive(Debug, Deserialize)]
struct TypingRequest {
    is_typing: bool,
}

#[derive(Debug, Deserialize)]
struct EditRequest {
    content: String,
}

#[derive(Debug, Serialize)]
struct ReadResult {
    newly_read: Vec<MessageId>,
}

/// `changed` is false when the toggle was already in the requested state.
#[derive(Debug, Serialize)]
struct StarResult {
    message_id: MessageId,
    starred: bool,
    changed: bool,
}

async fn create_thread(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Body(input): Body<NewThread>,
) -> ApiResult<ChatThread> {
    let thread = state.services.chat.create_thread(&ctx, input).await.in_request(&ctx)?;
    created("thread created", thread)
}

async fn list_threads(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
) -> ApiResult<Vec<ThreadSummary>> {
    let threads = state.services.chat.list_threads(&ctx.actor).await.in_request(&ctx)?;
    ok(format!("{} threads", threads.len()), threads)
}

async fn list_messages(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Params(page): Params<MessagePageQuery>,
) -> ApiResult<Vec<ChatMessage>> {
    let messages = state
        .services
        .chat
        .list_messages(&ctx.actor, &ThreadId::from(id), page.limit, page.before.as_ref())
        .await
        .in_request(&ctx)?;
    ok(format!("{} messages", messages.len()), messages)
}

async fn send_message(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Body(outgoing): Body<OutgoingMessage>,
) -> ApiResult<ChatMessage> {
    let message = state
        .services
        .chat
        .send_message(&ctx, &ThreadId::from(id), outgoing)
        .await
        .in_request(&ctx)?;
    created("message sent", message)
}

async fn add_participants(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Body(request): Body<ParticipantsRequest>,
) -> ApiResult<Vec<UserId>> {
    let added = state
        .services
        .chat
        .add_participants(&ctx, &ThreadId::from(id), request.user_ids)
        .await
        .in_request(&ctx)?;
    ok(format!("{} participants added", added.len()), added)
}

async fn remove_participants(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Body(request): Body<ParticipantsRequest>,
) -> ApiResult<Vec<UserId>> {
    let removed = state
        .services
        .chat
        .remove_participants(&ctx, &ThreadId::from(id), request.user_ids)
        .await
        .in_request(&ctx)?;
    ok(format!("{} participants removed", removed.len()), removed)
}

async fn mark_as_read(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Body(request): Body<ReadRequest>,
) -> ApiResult<ReadResult> {
    let newly_read = state
        .services
        .chat
        .mark_as_read(&ctx, &ThreadId::from(id), request.message_ids)
        .await
        .in_request(&ctx)?;
    ok("messages marked as read", ReadResult { newly_read })
}

async fn send_typing(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Body(request): Body<TypingRequest>,
) -> ApiResult<()> {
    state
        .services
        .chat
        .send_typing(&ctx, &ThreadId::from(id), request.is_typing)
        .await
        .in_request(&ctx)?;
    done("typing state sent")
}

async fn reply_to_message(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Body(outgoing): Body<OutgoingMessage>,
) -> ApiResult<ChatMessage> {
    let reply = state
        .services
        .chat
        .reply_to_message(&ctx, &MessageId::from(id), outgoing)
        .await
        .in_request(&ctx)?;
    created("reply sent", reply)
}

async fn edit_message(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Body(request): Body<EditRequest>,
) -> ApiResult<ChatMessage> {
    let message = state
        .services
        .chat
        .edit_message(&ctx, &MessageId::from(id), &request.content)
        .await
        .in_request(&ctx)?;
    ok("message edited", message)
}

async fn delete_message(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> ApiResult<ChatMessage> {
    let message =
        state.services.chat.delete_message(&ctx, &MessageId::from(id)).await.in_request(&ctx)?;
    ok("message deleted", message)
}

async fn star_message(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> ApiResult<StarResult> {
    let message_id = MessageId::from(id);
    let changed = state.services.chat.star_message(&ctx, &message_id).await.in_request(&ctx)?;
    ok("message starred", StarResult { message_id, starred: true, changed })
}

async fn unstar_message(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> ApiResult<StarResult> {
    let message_id = MessageId::from(id);
    let changed = state.services.chat.unstar_message(&ctx, &message_id).await.in_request(&ctx)?;
    ok("message unstarred", StarResult { message_id, starred: false, changed })
}

async fn list_starred(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
) -> ApiResult<Vec<ChatMessage>> {
    let messages = state.services.chat.list_starred(&ctx.actor).await.in_request(&ctx)?;
    ok(format!("{} starred messages", messages.len()), messages)
}
