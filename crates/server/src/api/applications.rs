use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use permitdesk_core::approvals::Readiness;
use permitdesk_core::domain::application::{Application, NewApplication};
use permitdesk_core::domain::decision::{
    ApplicationGroupAssignment, Decision, DecisionOutcome, FinalApproval,
};
use permitdesk_core::errors::WorkflowError;
use permitdesk_core::ids::{ApplicationId, ApprovalGroupId};
use permitdesk_workflow::DecisionResult;

use super::{created, ok, Actor, ApiResult, ApiState, Body, InRequest};

pub(super) fn routes() -> Router<ApiState> {
    Router::new()
        .route("/api/v1/applications", post(submit_application))
        .route("/api/v1/applications/{id}", get(get_application))
        .route("/api/v1/applications/{id}/assign-group", post(assign_group))
        .route("/api/v1/applications/{id}/approve", post(approve))
        .route("/api/v1/applications/{id}/reject", post(reject))
        .route("/api/v1/applications/{id}/readiness", get(readiness))
        .route("/api/v1/applications/{id}/decisions", get(list_decisions))
        .route(
            "/api/v1/applications/{id}/final-decision",
            post(render_final_decision).get(get_final_decision),
        )
        .route("/api/v1/applications/{id}/collect", post(record_collection))
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    reference: String,
    title: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssignGroupRequest {
    group_id: ApprovalGroupId,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DecisionRequest {
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FinalDecisionRequest {
    outcome: DecisionOutcome,
    comment: Option<String>,
}

/// The caller is the applicant.
async fn submit_application(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Body(request): Body<SubmitRequest>,
) -> ApiResult<Application> {
    let input = NewApplication {
        applicant_id: ctx.actor.clone(),
        reference: request.reference,
        title: request.title,
        description: request.description,
    };
    let application =
        state.services.applications.submit_application(&ctx, input).await.in_request(&ctx)?;
    created("application submitted", application)
}

async fn get_application(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> ApiResult<Application> {
    let application = state
        .services
        .applications
        .get_application(&ApplicationId::from(id))
        .await
        .in_request(&ctx)?;
    ok("application loaded", application)
}

async fn assign_group(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Body(request): Body<AssignGroupRequest>,
) -> ApiResult<ApplicationGroupAssignment> {
    let assignment = state
        .services
        .applications
        .assign_group(&ctx, &ApplicationId::from(id), &request.group_id)
        .await
        .in_request(&ctx)?;
    ok("approval group assigned", assignment)
}

async fn approve(
    state: State<ApiState>,
    actor: Actor,
    path: Path<String>,
    body: Body<DecisionRequest>,
) -> ApiResult<DecisionResult> {
    decide(state, actor, path, body, DecisionOutcome::Approved).await
}

async fn reject(
    state: State<ApiState>,
    actor: Actor,
    path: Path<String>,
    body: Body<DecisionRequest>,
) -> ApiResult<DecisionResult> {
    decide(state, actor, path, body, DecisionOutcome::Rejected).await
}

async fn decide(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Body(request): Body<DecisionRequest>,
    outcome: DecisionOutcome,
) -> ApiResult<DecisionResult> {
    let result = state
        .services
        .approvals
        .record_decision(&ctx, &ApplicationId::from(id), outcome, request.comment)
        .await
        .in_request(&ctx)?;
    ok(format!("decision recorded: {}", outcome.as_str()), result)
}

async fn readiness(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> ApiResult<Readiness> {
    let readiness =
        state.services.approvals.readiness(&ApplicationId::from(id)).await.in_request(&ctx)?;
    ok("readiness computed", readiness)
}

async fn list_decisions(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> ApiResult<Vec<Decision>> {
    let decisions =
        state.services.approvals.list_decisions(&ApplicationId::from(id)).await.in_request(&ctx)?;
    ok(format!("{} decisions", decisions.len()), decisions)
}

async fn render_final_decision(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Body(request): Body<FinalDecisionRequest>,
) -> ApiResult<FinalApproval> {
    let approval = state
        .services
        .approvals
        .render_final_decision(&ctx, &ApplicationId::from(id), request.outcome, request.comment)
        .await
        .in_request(&ctx)?;
    created("final decision recorded", approval)
}

async fn get_final_decision(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> ApiResult<FinalApproval> {
    let application_id = ApplicationId::from(id);
    let approval = state
        .services
        .approvals
        .get_final_approval(&application_id)
        .await
        .and_then(|approval| {
            approval.ok_or_else(|| {
                WorkflowError::not_found(format!(
                    "application `{application_id}` has no final decision"
                ))
            })
        })
        .in_request(&ctx)?;
    ok("final decision loaded", approval)
}

async fn record_collection(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> ApiResult<Application> {
    let application = state
        .services
        .applications
        .record_collection(&ctx, &ApplicationId::from(id))
        .await
        .in_request(&ctx)?;
    ok("collection recorded", application)
}
