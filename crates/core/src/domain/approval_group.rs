use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::ids::{ApprovalGroupId, GroupMemberId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupType {
    Ordered,
    Unordered,
}

impl GroupType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ordered => "ORDERED",
            Self::Unordered => "UNORDERED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ORDERED" => Some(Self::Ordered),
            "UNORDERED" => Some(Self::Unordered),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberAvailability {
    #[default]
    Available,
    Unavailable,
    OnLeave,
}

impl MemberAvailability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Unavailable => "UNAVAILABLE",
            Self::OnLeave => "ON_LEAVE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AVAILABLE" => Some(Self::Available),
            "UNAVAILABLE" => Some(Self::Unavailable),
            "ON_LEAVE" => Some(Self::OnLeave),
            _ => None,
        }
    }

    pub fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPermissions {
    pub can_raise_issues: bool,
    pub can_approve: bool,
    pub can_reject: bool,
}

impl MemberPermissions {
    pub fn reviewer() -> Self {
        Self { can_raise_issues: true, can_approve: true, can_reject: true }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalGroupMember {
    pub id: GroupMemberId,
    pub group_id: ApprovalGroupId,
    pub user_id: UserId,
    pub role: String,
    pub permissions: MemberPermissions,
    pub review_order: i32,
    /// 0 marks a primary reviewer; 1 and above rank backups, lowest first.
    pub backup_priority: i32,
    pub availability: MemberAvailability,
    pub is_final_approver: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ApprovalGroupMember {
    pub fn is_backup(&self) -> bool {
        self.backup_priority > 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalGroup {
    pub id: ApprovalGroupId,
    pub name: String,
    pub description: Option<String>,
    pub group_type: GroupType,
    pub requires_all_approvals: bool,
    pub minimum_approvals: u32,
    pub auto_assign_backups: bool,
    pub is_active: bool,
    pub members: Vec<ApprovalGroupMember>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalGroup {
    pub fn active_members(&self) -> impl Iterator<Item = &ApprovalGroupMember> {
        self.members.iter().filter(|member| member.is_active)
    }

    pub fn final_approver(&self) -> Option<&ApprovalGroupMember> {
        self.active_members().find(|member| member.is_final_approver)
    }

    pub fn member(&self, member_id: &GroupMemberId) -> Option<&ApprovalGroupMember> {
        self.members.iter().find(|member| &member.id == member_id)
    }

    pub fn active_member_for_user(&self, user_id: &UserId) -> Option<&ApprovalGroupMember> {
        self.active_members().find(|member| &member.user_id == user_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroupMember {
    pub user_id: UserId,
    #[serde(default = "default_member_role")]
    pub role: String,
    #[serde(default)]
    pub permissions: MemberPermissions,
    #[serde(default)]
    pub review_order: i32,
    #[serde(default)]
    pub backup_priority: i32,
    #[serde(default)]
    pub is_final_approver: bool,
}

fn default_member_role() -> String {
    "reviewer".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApprovalGroup {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub group_type: GroupType,
    pub requires_all_approvals: bool,
    #[serde(default)]
    pub minimum_approvals: u32,
    #[serde(default)]
    pub auto_assign_backups: bool,
    pub members: Vec<NewGroupMember>,
}

impl NewApprovalGroup {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidGroup("group name must not be empty".to_string()));
        }
        if self.members.is_empty() {
            return Err(DomainError::InvalidGroup(
                "group must have at least one member".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for member in &self.members {
            if member.user_id.as_str().trim().is_empty() {
                return Err(DomainError::InvalidGroup("member user id must not be empty".into()));
            }
            if !seen.insert(&member.user_id) {
                return Err(DomainError::InvalidGroup(format!(
                    "user `{}` appears more than once in the group",
                    member.user_id
                )));
            }
            if member.backup_priority < 0 {
                return Err(DomainError::InvalidGroup(format!(
                    "backup_priority for `{}` must not be negative",
                    member.user_id
                )));
            }
        }

        let final_approvers = self.members.iter().filter(|member| member.is_final_approver).count();
        if final_approvers != 1 {
            return Err(DomainError::FinalApproverCount { found: final_approvers });
        }

        if !self.requires_all_approvals {
            // Backups only stand in for primaries, so they never raise the reachable count.
            let approving = self
                .members
                .iter()
                .filter(|member| member.permissions.can_approve && member.backup_priority == 0)
                .count();
            if self.minimum_approvals == 0 {
                return Err(DomainError::InvalidGroup(
                    "minimum_approvals must be at least 1 when not all approvals are required"
                        .to_string(),
                ));
            }
            if self.minimum_approvals as usize > approving {
                return Err(DomainError::InvalidGroup(format!(
                    "minimum_approvals ({}) exceeds the number of primary approving members ({approving})",
                    self.minimum_approvals
                )));
            }
        }

        Ok(())
    }
}
