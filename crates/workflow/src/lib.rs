//! Transactional orchestration of the permit workflow.
//!
//! Every mutating operation runs inside one [`permitdesk_db::UnitOfWork`]. Realtime events
//! gathered along the way are published only after the unit of work commits, so a failed
//! broadcast never undoes a write and a rolled-back write never reaches a client.

pub mod applications;
pub mod approvals;
pub mod chat;
pub mod groups;
pub mod issues;
mod support;

use std::sync::Arc;

use permitdesk_core::config::WorkflowConfig;
use permitdesk_core::directory::UserDirectory;
use permitdesk_db::Store;

pub use applications::ApplicationService;
pub use approvals::{ApprovalService, DecisionResult};
pub use chat::{ChatService, NewThread, OutgoingMessage, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use groups::ApprovalGroupService;
pub use issues::IssueService;
pub use support::{EventPublisher, ServiceDeps};

/// Every workflow service, wired to the same store, directory and publisher.
#[derive(Clone)]
pub struct Services {
    pub groups: ApprovalGroupService,
    pub applications: ApplicationService,
    pub approvals: ApprovalService,
    pub issues: IssueService,
    pub chat: ChatService,
}

impl Services {
    pub fn new(
        store: Store,
        directory: Arc<dyn UserDirectory>,
        publisher: EventPublisher,
        config: WorkflowConfig,
    ) -> Self {
        Self::from_deps(ServiceDeps::new(store, directory, publisher, config))
    }

    pub fn from_deps(deps: ServiceDeps) -> Self {
        Self {
            groups: ApprovalGroupService::new(deps.clone()),
            applications: ApplicationService::new(deps.clone()),
            approvals: ApprovalService::new(deps.clone()),
            issues: IssueService::new(deps.clone()),
            chat: ChatService::new(deps),
        }
    }
}
