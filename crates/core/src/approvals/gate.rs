use serde::{Deserialize, Serialize};

use crate::approvals::{GroupVerdict, Readiness};
use crate::domain::application::ApplicationStatus;
use crate::domain::approval_group::ApprovalGroup;
use crate::domain::decision::DecisionOutcome;
use crate::errors::WorkflowError;
use crate::ids::UserId;

/// Everything the final-approval gate looks at, read inside the deciding transaction.
#[derive(Clone, Debug)]
pub struct FinalDecisionRequest<'a> {
    pub group: &'a ApprovalGroup,
    pub approver: &'a UserId,
    pub outcome: DecisionOutcome,
    pub application_status: ApplicationStatus,
    pub already_finalized: bool,
    pub readiness: &'a Readiness,
    pub blocking_issues: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalDecisionDenial {
    NotFinalApprover { user_id: UserId },
    AlreadyFinalized,
    NotUnderReview { status: ApplicationStatus },
    OpenBlockingIssues { count: usize },
    GroupNotReady { verdict: GroupVerdict },
}

impl FinalDecisionDenial {
    pub fn reason(&self) -> String {
        match self {
            Self::NotFinalApprover { user_id } => {
                format!("user `{user_id}` is not the final approver of the assigned group")
            }
            Self::AlreadyFinalized => "a final decision has already been recorded".to_string(),
            Self::NotUnderReview { status } => {
                format!("application is {} and cannot be finally decided", status.as_str())
            }
            Self::OpenBlockingIssues { count } => {
                format!("{count} blocking issue(s) must be resolved before the final decision")
            }
            Self::GroupNotReady { verdict } => {
                format!("approval group policy is not satisfied (verdict: {verdict:?})")
            }
        }
    }
}

impl From<FinalDecisionDenial> for WorkflowError {
    fn from(denial: FinalDecisionDenial) -> Self {
        match denial {
            FinalDecisionDenial::NotFinalApprover { .. } => Self::Forbidden(denial.reason()),
            _ => Self::Conflict(denial.reason()),
        }
    }
}

/// Authorization first, then terminal state, then open issues, then the member policy.
///
/// Approving needs a `Ready` group; rejecting is also allowed once the group is `Blocked`.
pub fn check_final_decision(request: &FinalDecisionRequest<'_>) -> Result<(), FinalDecisionDenial> {
    let is_final_approver = request
        .group
        .final_approver()
        .map(|member| &member.user_id == request.approver)
        .unwrap_or(false);
    if !is_final_approver {
        return Err(FinalDecisionDenial::NotFinalApprover { user_id: request.approver.clone() });
    }

    if request.already_finalized {
        return Err(FinalDecisionDenial::AlreadyFinalized);
    }

    if request.application_status != ApplicationStatus::UnderReview {
        return Err(FinalDecisionDenial::NotUnderReview { status: request.application_status });
    }

    if request.blocking_issues > 0 {
        return Err(FinalDecisionDenial::OpenBlockingIssues { count: request.blocking_issues });
    }

    let verdict = request.readiness.verdict;
    let allowed = match request.outcome {
        DecisionOutcome::Approved => verdict == GroupVerdict::Ready,
        DecisionOutcome::Rejected => matches!(verdict, GroupVerdict::Ready | GroupVerdict::Blocked),
    };
    if !allowed {
        return Err(FinalDecisionDenial::GroupNotReady { verdict });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{check_final_decision, FinalDecisionDenial, FinalDecisionRequest};
    use crate::approvals::{GroupVerdict, Readiness, Threshold};
    use crate::domain::application::ApplicationStatus;
    use crate::domain::approval_group::{
        ApprovalGroup, ApprovalGroupMember, GroupType, MemberAvailability, MemberPermissions,
    };
    use crate::domain::decision::DecisionOutcome;
    use crate::errors::WorkflowError;
    use crate::ids::{ApprovalGroupId, GroupMemberId, UserId};

    fn group() -> ApprovalGroup {
        let member = |id: &str, is_final_approver: bool| ApprovalGroupMember {
            id: GroupMemberId::from(id),
            group_id: ApprovalGroupId::from("grp-1"),
            user_id: UserId::from(id),
            role: "planner".to_string(),
            permissions: MemberPermissions::reviewer(),
            review_order: 0,
            backup_priority: 0,
            availability: MemberAvailability::Available,
            is_final_approver,
            is_active: true,
            created_at: Utc::now(),
        };
        ApprovalGroup {
            id: ApprovalGroupId::from("grp-1"),
            name: "Panel".to_string(),
            description: None,
            group_type: GroupType::Unordered,
            requires_all_approvals: true,
            minimum_approvals: 0,
            auto_assign_backups: false,
            is_active: true,
            members: vec![member("alice", false), member("chief", true)],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn readiness(verdict: GroupVerdict) -> Readiness {
        Readiness {
            verdict,
            threshold: Threshold::All,
            required_reviewers: 2,
            approvals: 0,
            rejections: 0,
            pending: Vec::new(),
            deferred: Vec::new(),
        }
    }

    fn request<'a>(
        group: &'a ApprovalGroup,
        approver: &'a UserId,
        readiness: &'a Readiness,
        outcome: DecisionOutcome,
    ) -> FinalDecisionRequest<'a> {
        FinalDecisionRequest {
            group,
            approver,
            outcome,
            application_status: ApplicationStatus::UnderReview,
            already_finalized: false,
            readiness,
            blocking_issues: 0,
        }
    }

    #[test]
    fn only_the_flagged_final_approver_may_decide() {
        let group = group();
        let ready = readiness(GroupVerdict::Ready);
        let outsider = UserId::from("alice");

        let denial = check_final_decision(&request(&group, &outsider, &ready, DecisionOutcome::Approved))
            .expect_err("member is not the final approver");
        assert!(matches!(denial, FinalDecisionDenial::NotFinalApprover { .. }));
        assert!(matches!(WorkflowError::from(denial), WorkflowError::Forbidden(_)));
    }

    #[test]
    fn second_final_decision_is_a_conflict() {
        let group = group();
        let ready = readiness(GroupVerdict::Ready);
        let chief = UserId::from("chief");
        let mut request = request(&group, &chief, &ready, DecisionOutcome::Approved);
        request.already_finalized = true;

        let denial = check_final_decision(&request).expect_err("already finalized");
        assert_eq!(denial, FinalDecisionDenial::AlreadyFinalized);
        assert!(matches!(WorkflowError::from(denial), WorkflowError::Conflict(_)));
    }

    #[test]
    fn blocking_issues_gate_the_decision() {
        let group = group();
        let ready = readiness(GroupVerdict::Ready);
        let chief = UserId::from("chief");
        let mut request = request(&group, &chief, &ready, DecisionOutcome::Approved);
        request.blocking_issues = 2;

        assert_eq!(
            check_final_decision(&request),
            Err(FinalDecisionDenial::OpenBlockingIssues { count: 2 })
        );
    }

    #[test]
    fn approval_needs_ready_but_rejection_accepts_blocked() {
        let group = group();
        let chief = UserId::from("chief");
        let blocked = readiness(GroupVerdict::Blocked);
        let pending = readiness(GroupVerdict::Pending);

        assert!(check_final_decision(&request(&group, &chief, &blocked, DecisionOutcome::Approved))
            .is_err());
        assert!(check_final_decision(&request(&group, &chief, &blocked, DecisionOutcome::Rejected))
            .is_ok());
        assert_eq!(
            check_final_decision(&request(&group, &chief, &pending, DecisionOutcome::Rejected)),
            Err(FinalDecisionDenial::GroupNotReady { verdict: GroupVerdict::Pending })
        );
    }
}
