use tracing::info;

use permitdesk_core::context::RequestContext;
use permitdesk_core::domain::application::{Application, ApplicationStatus, NewApplication};
use permitdesk_core::domain::chat::{
    ChatThread, ParticipantRole, ParticipantSeed, ThreadKind,
};
use permitdesk_core::domain::decision::ApplicationGroupAssignment;
use permitdesk_core::errors::WorkflowError;
use permitdesk_core::ids::{ApplicationId, ApprovalGroupId, AssignmentId, ThreadId};
use permitdesk_db::repositories::{applications, approvals, groups, threads};
use permitdesk_db::timestamp;

use crate::support::{post_system_message, Outbox, ServiceDeps};

/// Application intake, group assignment and collection.
#[derive(Clone)]
pub struct ApplicationService {
    deps: ServiceDeps,
}

impl ApplicationService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    pub async fn submit_application(
        &self,
        ctx: &RequestContext,
        input: NewApplication,
    ) -> Result<Application, WorkflowError> {
        input.validate()?;

        let now = timestamp::now();
        let application = Application {
            id: ApplicationId::generate(),
            reference: input.reference.trim().to_string(),
            title: input.title.trim().to_string(),
            description: input.description,
            applicant_id: input.applicant_id,
            status: ApplicationStatus::Submitted,
            final_approval_date: None,
            rejection_date: None,
            collected_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut uow = self.deps.store.begin().await?;
        applications::insert(uow.conn(), &application).await?;
        uow.commit().await?;

        info!(
            event_name = "workflow.application.submitted",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            application_id = %application.id,
            reference = %application.reference,
            "application submitted"
        );
        Ok(application)
    }

    pub async fn get_application(&self, id: &ApplicationId) -> Result<Application, WorkflowError> {
        let mut conn = self.deps.store.acquire().await?;
        Ok(applications::get(&mut conn, id).await?)
    }

    /// Hands the application to an approval group and opens its workflow thread.
    pub async fn assign_group(
        &self,
        ctx: &RequestContext,
        application_id: &ApplicationId,
        group_id: &ApprovalGroupId,
    ) -> Result<ApplicationGroupAssignment, WorkflowError> {
        let actor_name = self.deps.display_name(&ctx.actor).await?;
        let now = timestamp::now();

        let mut uow = self.deps.store.begin().await?;
        let mut application = applications::lock(uow.conn(), application_id).await?;
        let group = groups::find(uow.conn(), group_id)
            .await?
            .filter(|group| group.is_active)
            .ok_or_else(|| {
                WorkflowError::not_found(format!("approval group `{group_id}` not found or inactive"))
            })?;

        if !application.accepts_group_assignment() {
            return Err(WorkflowError::conflict(format!(
                "application is {} and cannot be assigned to a group",
                application.status.as_str()
            )));
        }
        if approvals::find_final_approval(uow.conn(), application_id).await?.is_some() {
            return Err(WorkflowError::conflict("a final decision has already been recorded"));
        }

        let replaced = approvals::deactivate_active_assignment(uow.conn(), application_id).await?;
        let assignment = ApplicationGroupAssignment {
            id: AssignmentId::generate(),
            application_id: application_id.clone(),
            group_id: group.id.clone(),
            assigned_by: ctx.actor.clone(),
            is_active: true,
            assigned_at: now,
        };
        approvals::insert_assignment(uow.conn(), &assignment).await?;

        if application.status == ApplicationStatus::Submitted {
            application.transition_to(ApplicationStatus::UnderReview, now)?;
            applications::save_status(uow.conn(), &application).await?;
        }

        let thread = match threads::find_workflow_thread(uow.conn(), application_id).await? {
            Some(thread) => thread,
            None => {
                let thread = ChatThread {
                    id: ThreadId::generate(),
                    application_id: Some(application_id.clone()),
                    issue_id: None,
                    kind: ThreadKind::Workflow,
                    title: format!("Application {}", application.reference),
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
                thread
            }
        };
        for member in group.active_members() {
            let seed = ParticipantSeed::with_role(member.user_id.clone(), ParticipantRole::Member);
            threads::add_participant(uow.conn(), &thread.id, &seed, now).await?;
        }

        let message = post_system_message(
            uow.conn(),
            &thread,
            &ctx.actor,
            format!("{actor_name} assigned approval group {}", group.name),
            now,
        )
        .await?;
        let mut outbox = Outbox::default();
        outbox.message(&message, &ctx.actor);

        uow.commit().await?;
        self.deps.publisher.publish(outbox, &ctx.correlation_id).await;

        info!(
            event_name = "workflow.application.group_assigned",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            application_id = %application_id,
            group_id = %group.id,
            assignment_id = %assignment.id,
            thread_id = %thread.id,
            replaced_previous = replaced > 0,
            "approval group assigned"
        );
        Ok(assignment)
    }

    /// Records that an approved permit was collected.
    pub async fn record_collection(
        &self,
        ctx: &RequestContext,
        application_id: &ApplicationId,
    ) -> Result<Application, WorkflowError> {
        let mut uow = self.deps.store.begin().await?;
        let mut application = applications::lock(uow.conn(), application_id).await?;
        application.transition_to(ApplicationStatus::Collected, timestamp::now())?;
        applications::save_status(uow.conn(), &application).await?;
        uow.commit().await?;

        info!(
            event_name = "workflow.application.collected",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            application_id = %application_id,
            "application collected"
        );
        Ok(application)
    }
}
