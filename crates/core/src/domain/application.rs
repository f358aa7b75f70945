use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::ids::{ApplicationId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    Collected,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::UnderReview => "UNDER_REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Collected => "COLLECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SUBMITTED" => Some(Self::Submitted),
            "UNDER_REVIEW" => Some(Self::UnderReview),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            "COLLECTED" => Some(Self::Collected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Collected)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub reference: String,
    pub title: String,
    pub description: Option<String>,
    pub applicant_id: UserId,
    pub status: ApplicationStatus,
    pub final_approval_date: Option<DateTime<Utc>>,
    pub rejection_date: Option<DateTime<Utc>>,
    pub collected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        matches!(
            (self.status, next),
            (ApplicationStatus::Submitted, ApplicationStatus::UnderReview)
                | (ApplicationStatus::UnderReview, ApplicationStatus::Approved)
                | (ApplicationStatus::UnderReview, ApplicationStatus::Rejected)
                | (ApplicationStatus::Approved, ApplicationStatus::Collected)
        )
    }

    /// Moves the application to `next`, stamping the decision or collection date.
    pub fn transition_to(
        &mut self,
        next: ApplicationStatus,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidApplicationTransition { from: self.status, to: next });
        }

        match next {
            ApplicationStatus::Approved => self.final_approval_date = Some(at),
            ApplicationStatus::Rejected => self.rejection_date = Some(at),
            ApplicationStatus::Collected => self.collected_at = Some(at),
            ApplicationStatus::Submitted | ApplicationStatus::UnderReview => {}
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    /// A group may be (re)assigned only while the application is still in review.
    pub fn accepts_group_assignment(&self) -> bool {
        matches!(self.status, ApplicationStatus::Submitted | ApplicationStatus::UnderReview)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub applicant_id: UserId,
    pub reference: String,
    pub title: String,
    pub description: Option<String>,
}

impl NewApplication {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.reference.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "application reference must not be empty".to_string(),
            ));
        }
        if self.title.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "application title must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
