use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Router;
use serde::Deserialize;

use permitdesk_core::domain::approval_group::{
    ApprovalGroup, ApprovalGroupMember, MemberAvailability, NewApprovalGroup,
};
use permitdesk_core::ids::{ApprovalGroupId, GroupMemberId};

use super::{created, ok, Actor, ApiResult, ApiState, Body, InRequest, Params};

pub(super) fn routes() -> Router<ApiState> {
    Router::new()
        .route("/api/v1/approval-groups", post(create_group).get(list_groups))
        .route("/api/v1/approval-groups/{id}", get(get_group))
        .route("/api/v1/approval-groups/{id}/deactivate", post(deactivate_group))
        .route("/api/v1/approval-group-members/{id}/availability", put(set_availability))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GroupListQuery {
    active_only: bool,
}

#[derive(Debug, Deserialize)]
struct AvailabilityRequest {
    availability: MemberAvailability,
}

async fn create_group(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Body(input): Body<NewApprovalGroup>,
) -> ApiResult<ApprovalGroup> {
    let group = state.services.groups.create_group(&ctx, input).await.in_request(&ctx)?;
    created("approval group created", group)
}

async fn list_groups(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Params(query): Params<GroupListQuery>,
) -> ApiResult<Vec<ApprovalGroup>> {
    let groups = state.services.groups.list_groups(query.active_only).await.in_request(&ctx)?;
    ok(format!("{} approval groups", groups.len()), groups)
}

async fn get_group(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> ApiResult<ApprovalGroup> {
    let group =
        state.services.groups.get_group(&ApprovalGroupId::from(id)).await.in_request(&ctx)?;
    ok("approval group loaded", group)
}

async fn deactivate_group(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> ApiResult<ApprovalGroup> {
    let group = state
        .services
        .groups
        .deactivate_group(&ctx, &ApprovalGroupId::from(id))
        .await
        .in_request(&ctx)?;
    ok("approval group deactivated", group)
}

async fn set_availability(
    State(state): State<ApiState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Body(request): Body<AvailabilityRequest>,
) -> ApiResult<ApprovalGroupMember> {
    let member = state
        .services
        .groups
        .set_member_availability(&ctx, &GroupMemberId::from(id), request.availability)
        .await
        .in_request(&ctx)?;
    ok("member availability updated", member)
}
