//! WebSocket transport for the realtime hub.
//!
//! A connection registers one hub session for the `user_id` in the query string. Client
//! frames subscribe to threads, unsubscribe, or announce typing; everything the hub queues
//! for the session is written back as JSON text frames.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use permitdesk_core::context::RequestContext;
use permitdesk_core::ids::{ThreadId, UserId};
use permitdesk_realtime::{Outbound, RealtimeHub};
use permitdesk_workflow::Services;

use crate::api::{ApiError, ApiState, Envelope, Params};

#[derive(Debug, Deserialize)]
pub struct SessionParams {
    #[serde(default)]
    user_id: String,
}

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { thread_id: ThreadId },
    Unsubscribe { thread_id: ThreadId },
    Typing { thread_id: ThreadId, is_typing: bool },
}

/// Direct replies to a client frame. Thread events use their own tagged shape.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Subscribed { thread_id: ThreadId },
    Unsubscribed { thread_id: ThreadId },
    Error { message: String },
}

pub async fn ws_handler(
    State(state): State<ApiState>,
    Params(params): Params<SessionParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(hub) = state.hub.clone() else {
        let body = Envelope::failure("realtime is disabled", "SERVICE_UNAVAILABLE", "ws");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    };

    let user_id = params.user_id.trim().to_string();
    if user_id.is_empty() {
        return ApiError::bad_request("user_id query parameter is required", "ws").into_response();
    }

    let services = state.services.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, services, UserId::from(user_id)))
}

async fn handle_socket(
    socket: WebSocket,
    hub: Arc<RealtimeHub>,
    services: Services,
    user_id: UserId,
) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let mut events = hub.register(session_id.clone(), user_id.clone()).await;
    info!(
        event_name = "realtime.session.connected",
        session_id = %session_id,
        user_id = %user_id,
        "websocket session connected"
    );

    let (mut sink, mut stream) = socket.split();
    let (reply_tx, mut replies) = mpsc::unbounded_channel::<ServerFrame>();

    let writer_session = session_id.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                outbound = events.recv() => match outbound {
                    Some(Outbound::Event(event)) => match serde_json::to_string(&event) {
                        Ok(json) => Message::Text(json.into()),
                        Err(error) => {
                            warn!(session_id = %writer_session, error = %error, "could not encode thread event");
                            continue;
                        }
                    },
                    Some(Outbound::Ping) => Message::Ping(Bytes::new()),
                    Some(Outbound::Close) | None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                },
                reply = replies.recv() => match reply {
                    Some(frame) => match serde_json::to_string(&frame) {
                        Ok(json) => Message::Text(json.into()),
                        Err(error) => {
                            warn!(session_id = %writer_session, error = %error, "could not encode reply frame");
                            continue;
                        }
                    },
                    None => break,
                },
            };

            if sink.send(message).await.is_err() {
                debug!(session_id = %writer_session, "websocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let reply =
                    handle_frame(&hub, &services, &session_id, &user_id, text.as_str()).await;
                if let Some(frame) = reply {
                    let _ = reply_tx.send(frame);
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                debug!(session_id = %session_id, error = %error, "websocket receive error");
                break;
            }
        }
    }

    hub.unregister(&session_id).await;
    send_task.abort();
    info!(
        event_name = "realtime.session.disconnected",
        session_id = %session_id,
        user_id = %user_id,
        "websocket session disconnected"
    );
}

/// Applies one client frame. Subscriptions are granted to active participants only.
pub async fn handle_frame(
    hub: &RealtimeHub,
    services: &Services,
    session_id: &str,
    user_id: &UserId,
    raw: &str,
) -> Option<ServerFrame> {
    let frame = match serde_json::from_str::<ClientFrame>(raw) {
        Ok(frame) => frame,
        Err(error) => {
            return Some(ServerFrame::Error { message: format!("unreadable frame: {error}") })
        }
    };

    match frame {
        ClientFrame::Subscribe { thread_id } => {
            match services.chat.is_active_participant(&thread_id, user_id).await {
                Ok(true) => {
                    hub.subscribe(session_id, thread_id.clone()).await;
                    debug!(session_id, thread_id = %thread_id, "session subscribed to thread");
                    Some(ServerFrame::Subscribed { thread_id })
                }
                Ok(false) => Some(ServerFrame::Error {
                    message: format!("not a participant of thread `{thread_id}`"),
                }),
                Err(error) => Some(ServerFrame::Error {
                    message: error.into_interface(session_id).user_message(),
                }),
            }
        }
        ClientFrame::Unsubscribe { thread_id } => {
            hub.unsubscribe(session_id, &thread_id).await;
            Some(ServerFrame::Unsubscribed { thread_id })
        }
        ClientFrame::Typing { thread_id, is_typing } => {
            let ctx = RequestContext::new(user_id.clone(), session_id);
            match services.chat.send_typing(&ctx, &thread_id, is_typing).await {
                Ok(()) => None,
                Err(error) => Some(ServerFrame::Error {
                    message: error.into_interface(session_id).user_message(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use permitdesk_core::context::RequestContext;
    use permitdesk_core::directory::InMemoryUserDirectory;
    use permitdesk_core::config::WorkflowConfig;
    use permitdesk_core::ids::{ThreadId, UserId};
    use permitdesk_db::{connect_with_settings, migrations, Store};
    use permitdesk_realtime::{Outbound, RealtimeHub, ThreadEvent};
    use permitdesk_workflow::{EventPublisher, NewThread, OutgoingMessage, Services};

    use super::{handle_frame, ClientFrame, ServerFrame};

    async fn services(hub: Arc<RealtimeHub>) -> Services {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        Services::new(
            Store::new(pool),
            Arc::new(InMemoryUserDirectory::default()),
            EventPublisher::new(hub),
            WorkflowConfig::default(),
        )
    }

    async fn thread_with(services: &Services, owner: &str, others: &[&str]) -> ThreadId {
        services
            .chat
            .create_thread(
                &RequestContext::new(UserId::from(owner), "test"),
                NewThread {
                    application_id: None,
                    title: "Site visit".to_string(),
                    participant_ids: others.iter().map(|user| UserId::from(*user)).collect(),
                },
            )
            .await
            .expect("create thread")
            .id
    }

    #[test]
    fn client_frames_parse_from_tagged_json() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"typing","thread_id":"thr-1","is_typing":true}"#)
                .expect("parse");

        assert_eq!(
            frame,
            ClientFrame::Typing { thread_id: ThreadId::from("thr-1"), is_typing: true }
        );
    }

    #[tokio::test]
    async fn only_participants_are_subscribed() {
        let hub = Arc::new(RealtimeHub::new());
        let services = services(hub.clone()).await;
        let thread_id = thread_with(&services, "alice", &["bob"]).await;
        let _bob = hub.register("s-bob", UserId::from("bob")).await;
        let _dan = hub.register("s-dan", UserId::from("dan")).await;
        let frame = format!(r#"{{"type":"subscribe","thread_id":"{thread_id}"}}"#);

        let granted = handle_frame(&hub, &services, "s-bob", &UserId::from("bob"), &frame).await;
        let denied = handle_frame(&hub, &services, "s-dan", &UserId::from("dan"), &frame).await;

        assert_eq!(granted, Some(ServerFrame::Subscribed { thread_id: thread_id.clone() }));
        assert!(matches!(denied, Some(ServerFrame::Error { .. })));
        assert_eq!(hub.subscriber_count(&thread_id).await, 1);
    }

    #[tokio::test]
    async fn typing_frames_reach_other_subscribers() {
        let hub = Arc::new(RealtimeHub::new());
        let services = services(hub.clone()).await;
        let thread_id = thread_with(&services, "alice", &["bob"]).await;
        let mut alice = hub.register("s-alice", UserId::from("alice")).await;
        let _bob = hub.register("s-bob", UserId::from("bob")).await;
        let subscribe = format!(r#"{{"type":"subscribe","thread_id":"{thread_id}"}}"#);
        handle_frame(&hub, &services, "s-alice", &UserId::from("alice"), &subscribe).await;
        handle_frame(&hub, &services, "s-bob", &UserId::from("bob"), &subscribe).await;

        let typing =
            format!(r#"{{"type":"typing","thread_id":"{thread_id}","is_typing":true}}"#);
        let reply = handle_frame(&hub, &services, "s-bob", &UserId::from("bob"), &typing).await;

        assert_eq!(reply, None);
        match alice.try_recv().expect("alice receives typing") {
            Outbound::Event(ThreadEvent::Typing { user_id, is_typing, .. }) => {
                assert_eq!(user_id, UserId::from("bob"));
                assert!(is_typing);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn removed_participants_stop_receiving_thread_messages() {
        let hub = Arc::new(RealtimeHub::new());
        let services = services(hub.clone()).await;
        let thread_id = thread_with(&services, "alice", &["bob"]).await;
        let mut bob = hub.register("s-bob", UserId::from("bob")).await;
        let subscribe = format!(r#"{{"type":"subscribe","thread_id":"{thread_id}"}}"#);
        handle_frame(&hub, &services, "s-bob", &UserId::from("bob"), &subscribe).await;

        let alice = RequestContext::new(UserId::from("alice"), "test");
        services
            .chat
            .remove_participants(&alice, &thread_id, vec![UserId::from("bob")])
            .await
            .expect("remove bob");
        while bob.try_recv().is_ok() {}

        services
            .chat
            .send_message(
                &alice,
                &thread_id,
                OutgoingMessage { content: "secret after removal".to_string(), attachments: vec![] },
            )
            .await
            .expect("send");

        assert!(bob.try_recv().is_err(), "removed participant still receives thread events");
        assert_eq!(hub.subscriber_count(&thread_id).await, 0);

        let again = handle_frame(&hub, &services, "s-bob", &UserId::from("bob"), &subscribe).await;
        assert!(matches!(again, Some(ServerFrame::Error { .. })));
    }

    #[tokio::test]
    async fn garbage_frames_get_an_error_reply() {
        let hub = Arc::new(RealtimeHub::new());
        let services = services(hub.clone()).await;

        let reply = handle_frame(&hub, &services, "s-1", &UserId::from("alice"), "{nope").await;

        assert!(matches!(reply, Some(ServerFrame::Error { .. })));
    }
}
