use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::info;

use permitdesk_core::approvals::gate::{check_final_decision, FinalDecisionRequest};
use permitdesk_core::approvals::{Readiness, ReviewPolicy};
use permitdesk_core::context::RequestContext;
use permitdesk_core::domain::application::ApplicationStatus;
use permitdesk_core::domain::approval_group::ApprovalGroup;
use permitdesk_core::domain::decision::{
    ApplicationGroupAssignment, Decision, DecisionOutcome, FinalApproval,
};
use permitdesk_core::errors::WorkflowError;
use permitdesk_core::ids::{ApplicationId, FinalApprovalId};
use permitdesk_db::repositories::{applications, approvals, groups, issues, threads};
use permitdesk_db::timestamp;

use crate::support::{post_system_message, Outbox, ServiceDeps};

/// What a member learns back after recording a decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecisionResult {
    pub decision: Decision,
    pub readiness: Readiness,
    pub ready_for_final_approval: bool,
    pub is_final_approver: bool,
}

/// Member decisions and the final approval gate.
#[derive(Clone)]
pub struct ApprovalService {
    deps: ServiceDeps,
}

async fn active_assignment(
    conn: &mut SqliteConnection,
    application_id: &ApplicationId,
) -> Result<(ApplicationGroupAssignment, ApprovalGroup), WorkflowError> {
    let assignment = approvals::find_active_assignment(&mut *conn, application_id)
        .await?
        .ok_or_else(|| {
            WorkflowError::not_found(format!(
                "application `{application_id}` has no active approval group assignment"
            ))
        })?;
    let group = groups::get(conn, &assignment.group_id).await?;
    Ok((assignment, group))
}

impl ApprovalService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    /// Upserts the caller's decision on the active assignment and recomputes readiness.
    pub async fn record_decision(
        &self,
        ctx: &RequestContext,
        application_id: &ApplicationId,
        outcome: DecisionOutcome,
        comment: Option<String>,
    ) -> Result<DecisionResult, WorkflowError> {
        let comment = comment.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
        let actor_name = self.deps.display_name(&ctx.actor).await?;
        let now = timestamp::now();

        let mut uow = self.deps.store.begin().await?;
        applications::lock(uow.conn(), application_id).await?;
        if approvals::find_final_approval(uow.conn(), application_id).await?.is_some() {
            return Err(WorkflowError::conflict(
                "the application already has a final decision",
            ));
        }
        let (assignment, group) = active_assignment(uow.conn(), application_id).await?;

        let member = group.active_member_for_user(&ctx.actor).ok_or_else(|| {
            WorkflowError::forbidden(format!(
                "user `{}` is not an active member of approval group `{}`",
                ctx.actor, group.name
            ))
        })?;
        let permitted = match outcome {
            DecisionOutcome::Approved => member.permissions.can_approve,
            DecisionOutcome::Rejected => member.permissions.can_reject,
        };
        if !permitted {
            return Err(WorkflowError::forbidden(format!(
                "member `{}` may not record a {} decision",
                member.id,
                outcome.as_str()
            )));
        }

        let decision_id =
            approvals::upsert_decision(uow.conn(), &assignment.id, &member.id, outcome.status(), now)
                .await?;
        if let Some(body) = &comment {
            approvals::insert_comment(uow.conn(), &decision_id, &ctx.actor, body, now).await?;
        }

        let decisions = approvals::list_decisions(uow.conn(), &assignment.id).await?;
        let readiness = ReviewPolicy::for_group(&group).evaluate(&decisions);
        let decision = decisions
            .iter()
            .find(|decision| decision.id == decision_id)
            .cloned()
            .ok_or_else(|| WorkflowError::internal("recorded decision could not be read back"))?;

        let mut outbox = Outbox::default();
        if let Some(thread) = threads::find_workflow_thread(uow.conn(), application_id).await? {
            let message = post_system_message(
                uow.conn(),
                &thread,
                &ctx.actor,
                format!("{actor_name} {} the application", outcome.verb()),
                now,
            )
            .await?;
            outbox.message(&message, &ctx.actor);
        }

        uow.commit().await?;
        self.deps.publisher.publish(outbox, &ctx.correlation_id).await;

        info!(
            event_name = "workflow.decision.recorded",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            application_id = %application_id,
            assignment_id = %assignment.id,
            member_id = %member.id,
            outcome = outcome.as_str(),
            verdict = ?readiness.verdict,
            "member decision recorded"
        );

        Ok(DecisionResult {
            ready_for_final_approval: readiness.is_ready(),
            is_final_approver: member.is_final_approver,
            decision,
            readiness,
        })
    }

    pub async fn list_decisions(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Decision>, WorkflowError> {
        let mut conn = self.deps.store.acquire().await?;
        let (assignment, _) = active_assignment(&mut conn, application_id).await?;
        Ok(approvals::list_decisions(&mut conn, &assignment.id).await?)
    }

    /// Live readiness of the active assignment, for display.
    pub async fn readiness(&self, application_id: &ApplicationId) -> Result<Readiness, WorkflowError> {
        let mut conn = self.deps.store.acquire().await?;
        let (assignment, group) = active_assignment(&mut conn, application_id).await?;
        let decisions = approvals::list_decisions(&mut conn, &assignment.id).await?;
        Ok(ReviewPolicy::for_group(&group).evaluate(&decisions))
    }

    /// The binding decision. Readiness and blocking issues are re-read inside the
    /// same transaction that writes the final approval.
    pub async fn render_final_decision(
        &self,
        ctx: &RequestContext,
        application_id: &ApplicationId,
        outcome: DecisionOutcome,
        comment: Option<String>,
    ) -> Result<FinalApproval, WorkflowError> {
        let comment = comment.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
        let actor_name = self.deps.display_name(&ctx.actor).await?;
        let now = timestamp::now();

        let mut uow = self.deps.store.begin().await?;
        let mut application = applications::lock(uow.conn(), application_id).await?;
        let (assignment, group) = active_assignment(uow.conn(), application_id).await?;
        let already_finalized =
            approvals::find_final_approval(uow.conn(), application_id).await?.is_some();
        let decisions = approvals::list_decisions(uow.conn(), &assignment.id).await?;
        let readiness = ReviewPolicy::for_group(&group).evaluate(&decisions);
        let blocking_issues = issues::count_blocking(
            uow.conn(),
            application_id,
            self.deps.config.collaborative_issues_block,
        )
        .await?;

        check_final_decision(&FinalDecisionRequest {
            group: &group,
            approver: &ctx.actor,
            outcome,
            application_status: application.status,
            already_finalized,
            readiness: &readiness,
            blocking_issues: blocking_issues as usize,
        })?;
        let approver = group
            .final_approver()
            .ok_or_else(|| WorkflowError::internal("final approver vanished during the decision"))?;

        let final_approval = FinalApproval {
            id: FinalApprovalId::generate(),
            application_id: application_id.clone(),
            assignment_id: assignment.id.clone(),
            approver_member_id: approver.id.clone(),
            approver_user_id: ctx.actor.clone(),
            outcome,
            comment,
            decided_at: now,
        };
        approvals::insert_final_approval(uow.conn(), &final_approval).await?;

        let next = match outcome {
            DecisionOutcome::Approved => ApplicationStatus::Approved,
            DecisionOutcome::Rejected => ApplicationStatus::Rejected,
        };
        application.transition_to(next, now)?;
        applications::save_status(uow.conn(), &application).await?;

        let mut outbox = Outbox::default();
        if let Some(thread) = threads::find_workflow_thread(uow.conn(), application_id).await? {
            let message = post_system_message(
                uow.conn(),
                &thread,
                &ctx.actor,
                format!("{actor_name} gave the final decision: {}", outcome.verb()),
                now,
            )
            .await?;
            outbox.message(&message, &ctx.actor);
        }

        uow.commit().await?;
        self.deps.publisher.publish(outbox, &ctx.correlation_id).await;

        info!(
            event_name = "workflow.final_decision.rendered",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            application_id = %application_id,
            final_approval_id = %final_approval.id,
            outcome = outcome.as_str(),
            "final decision rendered"
        );
        Ok(final_approval)
    }

    pub async fn get_final_approval(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<FinalApproval>, WorkflowError> {
        let mut conn = self.deps.store.acquire().await?;
        applications::get(&mut conn, application_id).await?;
        Ok(approvals::find_final_approval(&mut conn, application_id).await?)
    }
}
