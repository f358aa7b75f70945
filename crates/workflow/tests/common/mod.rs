#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::Row;

use permitdesk_core::config::WorkflowConfig;
use permitdesk_core::context::RequestContext;
use permitdesk_core::directory::{InMemoryUserDirectory, UserProfile};
use permitdesk_core::domain::application::{Application, NewApplication};
use permitdesk_core::domain::approval_group::{
    ApprovalGroup, GroupType, MemberPermissions, NewApprovalGroup, NewGroupMember,
};
use permitdesk_core::ids::{ThreadId, UserId};
use permitdesk_db::{connect_with_settings, migrations, DbPool, Store};
use permitdesk_realtime::{BroadcastError, ThreadBroadcaster, ThreadEvent};
use permitdesk_workflow::{EventPublisher, Services};

#[derive(Clone, Debug)]
pub struct Broadcast {
    pub thread_id: ThreadId,
    pub event: ThreadEvent,
    pub exclude_user: Option<UserId>,
}

/// Keeps every broadcast so tests can assert on what reached the hub.
#[derive(Default)]
pub struct RecordingBroadcaster {
    sent: Mutex<Vec<Broadcast>>,
}

impl RecordingBroadcaster {
    pub fn sent(&self) -> Vec<Broadcast> {
        self.sent.lock().expect("broadcast log").clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sent().iter().map(|broadcast| broadcast.event.name()).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().expect("broadcast log").clear();
    }
}

#[async_trait]
impl ThreadBroadcaster for RecordingBroadcaster {
    async fn broadcast_to_thread(
        &self,
        thread_id: &ThreadId,
        event: ThreadEvent,
        exclude_user: Option<&UserId>,
    ) -> Result<usize, BroadcastError> {
        self.sent.lock().expect("broadcast log").push(Broadcast {
            thread_id: thread_id.clone(),
            event,
            exclude_user: exclude_user.cloned(),
        });
        Ok(1)
    }
}

pub struct Harness {
    pub services: Services,
    pub pool: DbPool,
    pub broadcaster: Arc<RecordingBroadcaster>,
    _dir: Option<tempfile::TempDir>,
}

fn profile(id: &str, first: &str, last: &str) -> UserProfile {
    UserProfile {
        id: UserId::from(id),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: format!("{id}@council.example"),
        department: Some("Planning".to_string()),
    }
}

fn directory() -> InMemoryUserDirectory {
    InMemoryUserDirectory::with_users([
        profile("applicant", "Amal", "Applicant"),
        profile("alice", "Alice", "Adams"),
        profile("bob", "Bob", "Brown"),
        profile("carol", "Carol", "Chen"),
        profile("dan", "Dan", "Diaz"),
        profile("erin", "Erin", "Evans"),
        profile("frank", "Frank", "Fox"),
        profile("officer", "Olu", "Officer"),
    ])
}

fn assemble(pool: DbPool, config: WorkflowConfig, dir: Option<tempfile::TempDir>) -> Harness {
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let services = Services::new(
        Store::new(pool.clone()),
        Arc::new(directory()),
        EventPublisher::new(broadcaster.clone()),
        config,
    );
    Harness { services, pool, broadcaster, _dir: dir }
}

/// Single-connection in-memory database.
pub async fn harness() -> Harness {
    harness_with(WorkflowConfig::default()).await
}

pub async fn harness_with(config: WorkflowConfig) -> Harness {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("run migrations");
    assemble(pool, config, None)
}

/// File database shared by several connections, for tests that race transactions.
pub async fn file_harness(max_connections: u32) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("permits.db").display());
    let pool = connect_with_settings(&url, max_connections, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("run migrations");
    assemble(pool, WorkflowConfig::default(), Some(dir))
}

pub fn ctx(user: &str) -> RequestContext {
    RequestContext::new(UserId::from(user), format!("test-{user}"))
}

pub fn member(user: &str, permissions: MemberPermissions, is_final_approver: bool) -> NewGroupMember {
    NewGroupMember {
        user_id: UserId::from(user),
        role: "planner".to_string(),
        permissions,
        review_order: 0,
        backup_priority: 0,
        is_final_approver,
    }
}

pub fn requires_all(members: Vec<NewGroupMember>) -> NewApprovalGroup {
    NewApprovalGroup {
        name: "Building control".to_string(),
        description: None,
        group_type: GroupType::Unordered,
        requires_all_approvals: true,
        minimum_approvals: 0,
        auto_assign_backups: false,
        members,
    }
}

/// Alice, Bob and Carol all review; Carol also gives the final decision.
pub fn three_member_group() -> NewApprovalGroup {
    requires_all(vec![
        member("alice", MemberPermissions::reviewer(), false),
        member("bob", MemberPermissions::reviewer(), false),
        member("carol", MemberPermissions::reviewer(), true),
    ])
}

pub async fn submit(services: &Services, reference: &str) -> Application {
    services
        .applications
        .submit_application(
            &ctx("applicant"),
            NewApplication {
                applicant_id: UserId::from("applicant"),
                reference: reference.to_string(),
                title: "Two-storey rear extension".to_string(),
                description: Some("Brick, pitched roof".to_string()),
            },
        )
        .await
        .expect("submit application")
}

/// Submitted application already assigned to `group`.
pub async fn under_review(services: &Services, group: NewApprovalGroup) -> (Application, ApprovalGroup) {
    let group = services.groups.create_group(&ctx("officer"), group).await.expect("create group");
    let application = submit(services, "PA-2024-0001").await;
    services
        .applications
        .assign_group(&ctx("officer"), &application.id, &group.id)
        .await
        .expect("assign group");
    (application, group)
}

pub async fn count(pool: &DbPool, sql: &str) -> i64 {
    sqlx::query(sql).fetch_one(pool).await.expect("count query").get::<i64, _>(0)
}
