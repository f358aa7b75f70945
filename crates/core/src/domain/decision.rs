use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{
    ApplicationId, ApprovalGroupId, AssignmentId, DecisionId, FinalApprovalId, GroupMemberId,
    UserId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Pending,
    Approved,
    Rejected,
}

impl DecisionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Verdict a member or the final approver can submit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionOutcome {
    Approved,
    Rejected,
}

impl DecisionOutcome {
    pub fn as_str(self) -> &'static str {
        self.status().as_str()
    }

    pub fn parse(value: &str) -> Option<Self> {
        match DecisionStatus::parse(value)? {
            DecisionStatus::Approved => Some(Self::Approved),
            DecisionStatus::Rejected => Some(Self::Rejected),
            DecisionStatus::Pending => None,
        }
    }

    pub fn status(self) -> DecisionStatus {
        match self {
            Self::Approved => DecisionStatus::Approved,
            Self::Rejected => DecisionStatus::Rejected,
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationGroupAssignment {
    pub id: AssignmentId,
    pub application_id: ApplicationId,
    pub group_id: ApprovalGroupId,
    pub assigned_by: UserId,
    pub is_active: bool,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionComment {
    pub id: i64,
    pub decision_id: DecisionId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub assignment_id: AssignmentId,
    pub member_id: GroupMemberId,
    pub status: DecisionStatus,
    pub decided_at: Option<DateTime<Utc>>,
    pub comments: Vec<DecisionComment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Decision {
    /// Latest comment wins; ties keep insertion order.
    pub fn final_comment(&self) -> Option<&DecisionComment> {
        self.comments.iter().max_by(|left, right| {
            left.created_at.cmp(&right.created_at).then(left.id.cmp(&right.id))
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalApproval {
    pub id: FinalApprovalId,
    pub application_id: ApplicationId,
    pub assignment_id: AssignmentId,
    pub approver_member_id: GroupMemberId,
    pub approver_user_id: UserId,
    pub outcome: DecisionOutcome,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}
