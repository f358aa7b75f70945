use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::ids::{ApplicationId, GroupMemberId, IssueId, ThreadId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueAssignmentType {
    Collaborative,
    GroupMember,
    SpecificUser,
}

impl IssueAssignmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collaborative => "COLLABORATIVE",
            Self::GroupMember => "GROUP_MEMBER",
            Self::SpecificUser => "SPECIFIC_USER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "COLLABORATIVE" => Some(Self::Collaborative),
            "GROUP_MEMBER" => Some(Self::GroupMember),
            "SPECIFIC_USER" => Some(Self::SpecificUser),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueStatus {
    Open,
    Resolved,
}

impl IssueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Resolved => "RESOLVED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Some(Self::Open),
            "RESOLVED" => Some(Self::Resolved),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssuePriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl IssuePriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "URGENT" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// Who an issue is addressed to, with the reference its assignment type demands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueTarget {
    Collaborative,
    GroupMember(GroupMemberId),
    SpecificUser(UserId),
}

impl IssueTarget {
    pub fn from_parts(
        assignment_type: IssueAssignmentType,
        target_user: Option<UserId>,
        target_member: Option<GroupMemberId>,
    ) -> Result<Self, DomainError> {
        match (assignment_type, target_user, target_member) {
            (IssueAssignmentType::Collaborative, None, None) => Ok(Self::Collaborative),
            (IssueAssignmentType::Collaborative, _, _) => Err(DomainError::InvalidIssueTarget(
                "COLLABORATIVE issues take no target".to_string(),
            )),
            (IssueAssignmentType::GroupMember, None, Some(member)) => Ok(Self::GroupMember(member)),
            (IssueAssignmentType::GroupMember, _, _) => Err(DomainError::InvalidIssueTarget(
                "GROUP_MEMBER issues require exactly a group member reference".to_string(),
            )),
            (IssueAssignmentType::SpecificUser, Some(user), None) => Ok(Self::SpecificUser(user)),
            (IssueAssignmentType::SpecificUser, _, _) => Err(DomainError::InvalidIssueTarget(
                "SPECIFIC_USER issues require exactly a user reference".to_string(),
            )),
        }
    }

    pub fn assignment_type(&self) -> IssueAssignmentType {
        match self {
            Self::Collaborative => IssueAssignmentType::Collaborative,
            Self::GroupMember(_) => IssueAssignmentType::GroupMember,
            Self::SpecificUser(_) => IssueAssignmentType::SpecificUser,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationIssue {
    pub id: IssueId,
    pub application_id: ApplicationId,
    pub raised_by: UserId,
    pub title: String,
    pub description: String,
    pub priority: IssuePriority,
    pub category: Option<String>,
    pub assignment_type: IssueAssignmentType,
    pub assigned_to_user: Option<UserId>,
    pub assigned_to_member: Option<GroupMemberId>,
    pub status: IssueStatus,
    pub thread_id: Option<ThreadId>,
    pub resolution_comment: Option<String>,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub reopened_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationIssue {
    pub fn is_open(&self) -> bool {
        self.status == IssueStatus::Open
    }

    /// Open GROUP_MEMBER and SPECIFIC_USER issues always gate the final decision.
    pub fn is_blocking(&self, collaborative_issues_block: bool) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.assignment_type {
            IssueAssignmentType::GroupMember | IssueAssignmentType::SpecificUser => true,
            IssueAssignmentType::Collaborative => collaborative_issues_block,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub priority: IssuePriority,
    pub category: Option<String>,
    pub target: IssueTarget,
    pub create_thread: bool,
}

impl NewIssue {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::InvariantViolation("issue title must not be empty".into()));
        }
        if self.description.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "issue description must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
