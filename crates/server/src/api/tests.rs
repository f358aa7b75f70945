use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use permitdesk_core::config::WorkflowConfig;
use permitdesk_core::directory::{InMemoryUserDirectory, UserProfile};
use permitdesk_core::ids::UserId;
use permitdesk_db::{connect_with_settings, migrations, Store};
use permitdesk_realtime::RealtimeHub;
use permitdesk_workflow::{EventPublisher, Services};

use crate::api::{router, ApiState, CORRELATION_HEADER, USER_HEADER};

fn profile(id: &str, first: &str, last: &str) -> UserProfile {
    UserProfile {
        id: UserId::from(id),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: format!("{id}@council.example"),
        department: None,
    }
}

async fn app() -> Router {
    let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    let hub = Arc::new(RealtimeHub::new());
    let directory = InMemoryUserDirectory::with_users([
        profile("applicant", "Amal", "Applicant"),
        profile("alice", "Alice", "Adams"),
        profile("bob", "Bob", "Brown"),
        profile("carol", "Carol", "Chen"),
        profile("officer", "Olu", "Officer"),
    ]);
    let services = Services::new(
        Store::new(pool),
        Arc::new(directory),
        EventPublisher::new(hub.clone()),
        WorkflowConfig::default(),
    );
    router(ApiState { services, hub: Some(hub) })
}

struct Call<'a> {
    method: Method,
    uri: String,
    user: Option<&'a str>,
    correlation_id: Option<&'a str>,
    body: Option<String>,
}

impl<'a> Call<'a> {
    fn new(method: Method, uri: impl Into<String>, user: &'a str) -> Self {
        Self { method, uri: uri.into(), user: Some(user), correlation_id: None, body: None }
    }

    fn json(mut self, body: Value) -> Self {
        self.body = Some(body.to_string());
        self
    }

    async fn send(self, app: &Router) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        if let Some(user) = self.user {
            builder = builder.header(USER_HEADER, user);
        }
        if let Some(correlation_id) = self.correlation_id {
            builder = builder.header(CORRELATION_HEADER, correlation_id);
        }
        let request = match self.body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes =
            axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("read body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

fn reviewer(user: &str, is_final_approver: bool) -> Value {
    json!({
        "user_id": user,
        "permissions": { "can_raise_issues": true, "can_approve": true, "can_reject": true },
        "is_final_approver": is_final_approver
    })
}

async fn submit(app: &Router, reference: &str) -> String {
    let (status, body) = Call::new(Method::POST, "/api/v1/applications", "applicant")
        .json(json!({ "reference": reference, "title": "Rear extension" }))
        .send(app)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "SUBMITTED");
    assert_eq!(body["data"]["applicant_id"], "applicant");
    body["data"]["id"].as_str().expect("application id").to_string()
}

#[tokio::test]
async fn requests_without_an_actor_are_rejected_with_the_envelope() {
    let app = app().await;

    let (status, body) = Call {
        method: Method::GET,
        uri: "/api/v1/approval-groups".to_string(),
        user: None,
        correlation_id: Some("req-1"),
        body: None,
    }
    .send(&app)
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "BAD_REQUEST");
    assert!(body["error"].is_string());
    assert_eq!(body["correlation_id"], "req-1");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn successful_envelopes_carry_no_error_fields() {
    let app = app().await;

    let (status, body) =
        Call::new(Method::GET, "/api/v1/approval-groups", "officer").send(&app).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["data"].is_array());
    assert!(body.get("error").is_none());
    assert!(body.get("correlation_id").is_none());
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let app = app().await;

    let (status, body) = Call::new(Method::POST, "/api/v1/applications", "applicant")
        .json(json!({ "title": "No reference" }))
        .send(&app)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn group_approval_runs_through_to_collection() {
    let app = app().await;

    let (status, group) = Call::new(Method::POST, "/api/v1/approval-groups", "officer")
        .json(json!({
            "name": "Building control",
            "group_type": "UNORDERED",
            "requires_all_approvals": true,
            "members": [reviewer("alice", false), reviewer("bob", false), reviewer("carol", true)]
        }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["data"]["id"].as_str().expect("group id").to_string();

    let application = submit(&app, "PA-2024-0001").await;
    let base = format!("/api/v1/applications/{application}");

    let (status, _) = Call::new(Method::POST, format!("{base}/assign-group"), "officer")
        .json(json!({ "group_id": group_id }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, first) = Call::new(Method::POST, format!("{base}/approve"), "alice")
        .json(json!({ "comment": "Structural calcs fine" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["ready_for_final_approval"], false);

    let (status, early) = Call {
        correlation_id: Some("req-42"),
        ..Call::new(Method::POST, format!("{base}/final-decision"), "carol")
    }
    .json(json!({ "outcome": "APPROVED" }))
    .send(&app)
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(early["error"], "CONFLICT");
    assert_eq!(early["correlation_id"], "req-42");

    let (status, _) = Call::new(Method::GET, format!("{base}/final-decision"), "carol")
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for user in ["bob", "carol"] {
        let (status, _) = Call::new(Method::POST, format!("{base}/approve"), user)
            .json(json!({}))
            .send(&app)
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, readiness) =
        Call::new(Method::GET, format!("{base}/readiness"), "officer").send(&app).await;
    assert_eq!(readiness["data"]["approvals"], 3);

    let (_, decisions) =
        Call::new(Method::GET, format!("{base}/decisions"), "officer").send(&app).await;
    assert_eq!(decisions["data"].as_array().map(Vec::len), Some(3));

    let (status, _) = Call::new(Method::POST, format!("{base}/final-decision"), "alice")
        .json(json!({ "outcome": "APPROVED" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, final_approval) =
        Call::new(Method::POST, format!("{base}/final-decision"), "carol")
            .json(json!({ "outcome": "APPROVED", "comment": "Granted" }))
            .send(&app)
            .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(final_approval["data"]["outcome"], "APPROVED");

    let (_, loaded) = Call::new(Method::GET, base.clone(), "officer").send(&app).await;
    assert_eq!(loaded["data"]["status"], "APPROVED");

    let (status, collected) =
        Call::new(Method::POST, format!("{base}/collect"), "officer").send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(collected["data"]["status"], "COLLECTED");
}

#[tokio::test]
async fn issues_are_raised_and_resolved_by_their_target() {
    let app = app().await;
    let application = submit(&app, "PA-2024-0002").await;

    let (status, issue) =
        Call::new(Method::POST, format!("/api/v1/applications/{application}/issues"), "applicant")
            .json(json!({
                "title": "Missing site plan",
                "description": "Upload a 1:500 site plan",
                "assignment_type": "SPECIFIC_USER",
                "target_user": "officer"
            }))
            .send(&app)
            .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(issue["data"]["thread_id"].is_string());
    let issue_id = issue["data"]["id"].as_str().expect("issue id").to_string();

    let (status, denied) = Call::new(Method::POST, format!("/api/v1/issues/{issue_id}/resolve"), "bob")
        .json(json!({ "comment": "Not mine" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(denied["error"], "FORBIDDEN");

    let (status, resolved) =
        Call::new(Method::POST, format!("/api/v1/issues/{issue_id}/resolve"), "officer")
            .json(json!({ "comment": "Plan received" }))
            .send(&app)
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["data"]["status"], "RESOLVED");

    let (_, open) = Call::new(
        Method::GET,
        format!("/api/v1/applications/{application}/issues?status=OPEN"),
        "officer",
    )
    .send(&app)
    .await;
    assert_eq!(open["data"].as_array().map(Vec::len), Some(0));

    let (status, reopened) =
        Call::new(Method::POST, format!("/api/v1/issues/{issue_id}/reopen"), "applicant")
            .send(&app)
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reopened["data"]["status"], "OPEN");
}

#[tokio::test]
async fn chat_messages_are_visible_to_participants_only() {
    let app = app().await;

    let (status, thread) = Call::new(Method::POST, "/api/v1/threads", "alice")
        .json(json!({ "title": "Site visit", "participant_ids": ["bob"] }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let thread_id = thread["data"]["id"].as_str().expect("thread id").to_string();
    let messages = format!("/api/v1/threads/{thread_id}/messages");

    let (status, sent) = Call::new(Method::POST, messages.clone(), "bob")
        .json(json!({ "content": "Tuesday works" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let message_id = sent["data"]["id"].as_str().expect("message id").to_string();

    let (_, threads) = Call::new(Method::GET, "/api/v1/threads", "alice").send(&app).await;
    assert_eq!(threads["data"][0]["unread_count"], 1);

    let (status, listed) = Call::new(Method::GET, messages.clone(), "alice").send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"][0]["content"], "Tuesday works");

    let (status, _) = Call::new(Method::GET, messages, "carol").send(&app).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, read) = Call::new(Method::POST, format!("/api/v1/threads/{thread_id}/read"), "alice")
        .json(json!({ "message_ids": [message_id] }))
        .send(&app)
        .await;
    assert_eq!(read["data"]["newly_read"].as_array().map(Vec::len), Some(1));

    let (_, starred) =
        Call::new(Method::POST, format!("/api/v1/messages/{message_id}/star"), "alice")
            .send(&app)
            .await;
    assert_eq!(starred["data"]["changed"], true);
    let (_, listed) = Call::new(Method::GET, "/api/v1/messages/starred", "alice").send(&app).await;
    assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));

    let (status, _) = Call::new(Method::PUT, format!("/api/v1/messages/{message_id}"), "alice")
        .json(json!({ "content": "Wednesday" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, deleted) = Call::new(Method::DELETE, format!("/api/v1/messages/{message_id}"), "bob")
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["data"]["status"], "DELETED");
}

#[tokio::test]
async fn participants_are_added_and_removed_over_http() {
    let app = app().await;
    let (_, thread) = Call::new(Method::POST, "/api/v1/threads", "alice")
        .json(json!({ "title": "Drainage" }))
        .send(&app)
        .await;
    let participants =
        format!("/api/v1/threads/{}/participants", thread["data"]["id"].as_str().expect("id"));

    let (status, added) = Call::new(Method::POST, participants.clone(), "alice")
        .json(json!({ "user_ids": ["bob", "carol"] }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(added["data"].as_array().map(Vec::len), Some(2));

    let (status, _) = Call::new(Method::POST, participants.clone(), "alice")
        .json(json!({ "user_ids": ["bob"] }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, removed) = Call::new(Method::DELETE, participants, "bob")
        .json(json!({ "user_ids": ["bob"] }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["data"], json!(["bob"]));
}
