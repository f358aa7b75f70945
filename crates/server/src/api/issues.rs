use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use permitdesk_core::domain::issue::{
    ApplicationIssue, IssueAssignmentType, IssuePriority, IssueStatus, IssueTarget, NewIssue,
};
use permitdesk_core::errors::WorkflowError;
use permitdesk_core::ids::{ApplicationId, GroupMemberId, IssueId, UserId};

use super::{created, ok, Actor, ApiResult, ApiState, Body, InRequest, Params};

pub(super) fn routes() -> Router<ApiState> {
    Router::new()
        .route("/api/v1/applications/{id}/issues", post(raise_issue).get(list_issues))
        .route("/api/v1/issues/{id}", get(get_issue))
        .route("/api/v1/issues/{id}/resolve", post(resolve_issue))
        .route("/api/v1/issues/{id}/reopen", post(reopen_issue))
}

/// Flat wire shape; the target reference must match `assignment_type`.
#[derive(Debug, Deserialize)]
struct RaiseIssueRequest {
    title: String,
    description: String,
    #[serde(default)]
    priority: IssuePriority,
    category: Option<String>,
    assignment_type: IssueAssignmentType,
    target_user: Option<UserId>,
    target_member: Option<GroupMemberId>,
    #[serde(default = "default_create_thread")]
    create_thread: bool,
}

fn default_create_thread() -> bool {
    true
}

impl RaiseIssueRequest {
    fn into_new_issue(self) -> Result<NewIssue, WorkflowError> {
        let target =
            IssueTarget::from_parts(self.assignment_type, self.target_user, self.target_member)?;
        Ok(NewIssue {
            title: self.title,
            description: self.description,
            priority: self.priority,
            category: self.category,
            target,
            create_thread: self.create_thread,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IssueListQuery {
    status: Option<IssueStatus>,
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    comment: String,
}

async fn raise_issue(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Body(request): Body<RaiseIssueRequest>,
) -> ApiResult<ApplicationIssue> {
    let input = request.into_new_issue().in_request(&ctx)?;
    let issue = state
        .services
        .issues
        .raise_issue(&ctx, &ApplicationId::from(id), input)
        .await
        .in_request(&ctx)?;
    created("issue raised", issue)
}

async fn list_issues(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Params(query): Params<IssueListQuery>,
) -> ApiResult<Vec<ApplicationIssue>> {
    let issues = state
        .services
        .issues
        .list_issues(&ApplicationId::from(id), query.status)
        .await
        .in_request(&ctx)?;
    ok(format!("{} issues", issues.len()), issues)
}

async fn get_issue(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> ApiResult<ApplicationIssue> {
    let issue = state.services.issues.get_issue(&IssueId::from(id)).await.in_request(&ctx)?;
    ok("issue loaded", issue)
}

async fn resolve_issue(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Body(request): Body<ResolveRequest>,
) -> ApiResult<ApplicationIssue> {
    let issue = state
        .services
        .issues
        .resolve_issue(&ctx, &IssueId::from(id), &request.comment)
        .await
        .in_request(&ctx)?;
    ok("issue resolved", issue)
}

async fn reopen_issue(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> ApiResult<ApplicationIssue> {
    let issue =
        state.services.issues.reopen_issue(&ctx, &IssueId::from(id)).await.in_request(&ctx)?;
    ok("issue reopened", issue)
}
