use tracing::info;

use permitdesk_core::context::RequestContext;
use permitdesk_core::domain::approval_group::{
    ApprovalGroup, ApprovalGroupMember, MemberAvailability, NewApprovalGroup,
};
use permitdesk_core::errors::WorkflowError;
use permitdesk_core::ids::{ApprovalGroupId, GroupMemberId};
use permitdesk_db::repositories::groups;
use permitdesk_db::timestamp;

use crate::support::ServiceDeps;

/// Approval group definitions and member availability.
#[derive(Clone)]
pub struct ApprovalGroupService {
    deps: ServiceDeps,
}

impl ApprovalGroupService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    pub async fn create_group(
        &self,
        ctx: &RequestContext,
        input: NewApprovalGroup,
    ) -> Result<ApprovalGroup, WorkflowError> {
        input.validate()?;

        let now = timestamp::now();
        let group_id = ApprovalGroupId::generate();
        let members = input
            .members
            .into_iter()
            .map(|member| ApprovalGroupMember {
                id: GroupMemberId::generate(),
                group_id: group_id.clone(),
                user_id: member.user_id,
                role: member.role,
                permissions: member.permissions,
                review_order: member.review_order,
                backup_priority: member.backup_priority,
                availability: MemberAvailability::Available,
                is_final_approver: member.is_final_approver,
                is_active: true,
                created_at: now,
            })
            .collect();
        let group = ApprovalGroup {
            id: group_id,
            name: input.name.trim().to_string(),
            description: input.description,
            group_type: input.group_type,
            requires_all_approvals: input.requires_all_approvals,
            minimum_approvals: input.minimum_approvals,
            auto_assign_backups: input.auto_assign_backups,
            is_active: true,
            members,
            created_at: now,
            updated_at: now,
        };

        let mut uow = self.deps.store.begin().await?;
        groups::insert(uow.conn(), &group).await?;
        uow.commit().await?;

        info!(
            event_name = "workflow.group.created",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            group_id = %group.id,
            members = group.members.len(),
            "approval group created"
        );
        Ok(group)
    }

    pub async fn get_group(&self, id: &ApprovalGroupId) -> Result<ApprovalGroup, WorkflowError> {
        let mut conn = self.deps.store.acquire().await?;
        Ok(groups::get(&mut conn, id).await?)
    }

    pub async fn list_groups(&self, active_only: bool) -> Result<Vec<ApprovalGroup>, WorkflowError> {
        let mut conn = self.deps.store.acquire().await?;
        Ok(groups::list(&mut conn, active_only).await?)
    }

    pub async fn set_member_availability(
        &self,
        ctx: &RequestContext,
        member_id: &GroupMemberId,
        availability: MemberAvailability,
    ) -> Result<ApprovalGroupMember, WorkflowError> {
        let mut uow = self.deps.store.begin().await?;
        let member = groups::set_member_availability(uow.conn(), member_id, availability).await?;
        uow.commit().await?;

        info!(
            event_name = "workflow.group.member_availability_changed",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            group_id = %member.group_id,
            member_id = %member.id,
            availability = availability.as_str(),
            "group member availability changed"
        );
        Ok(member)
    }

    /// Inactive groups keep their history but can no longer be assigned.
    pub async fn deactivate_group(
        &self,
        ctx: &RequestContext,
        id: &ApprovalGroupId,
    ) -> Result<ApprovalGroup, WorkflowError> {
        let mut uow = self.deps.store.begin().await?;
        groups::deactivate(uow.conn(), id, timestamp::now()).await?;
        let group = groups::get(uow.conn(), id).await?;
        uow.commit().await?;

        info!(
            event_name = "workflow.group.deactivated",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            group_id = %id,
            "approval group deactivated"
        );
        Ok(group)
    }
}
