//! Approval-group policy evaluation.
//!
//! A group is reduced to a [`ReviewPolicy`]: the resolved set of required reviewers plus
//! the rule that turns their decisions into a [`GroupVerdict`]. Backup substitution happens
//! while resolving the reviewer set, so evaluation itself never looks at availability.

pub mod gate;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::approval_group::{ApprovalGroup, ApprovalGroupMember, GroupType};
use crate::domain::decision::{Decision, DecisionStatus};
use crate::ids::{GroupMemberId, UserId};

pub use gate::{check_final_decision, FinalDecisionDenial, FinalDecisionRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Threshold {
    All,
    AtLeast(u32),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    pub member_id: GroupMemberId,
    pub user_id: UserId,
    pub review_order: i32,
    /// Primary reviewer this member stands in for, when substituted as a backup.
    pub substitutes_for: Option<GroupMemberId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewPolicy {
    Unordered { reviewers: Vec<Reviewer>, threshold: Threshold },
    /// Reviewers sorted by `review_order`; equal orders form one stage.
    Ordered { sequence: Vec<Reviewer>, threshold: Threshold },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupVerdict {
    Pending,
    Ready,
    Blocked,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub verdict: GroupVerdict,
    pub threshold: Threshold,
    pub required_reviewers: usize,
    pub approvals: usize,
    pub rejections: usize,
    /// Required reviewers that have not decided yet.
    pub pending: Vec<GroupMemberId>,
    /// Decided reviewers whose decision waits on an earlier stage.
    pub deferred: Vec<GroupMemberId>,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.verdict == GroupVerdict::Ready
    }
}

impl ReviewPolicy {
    pub fn for_group(group: &ApprovalGroup) -> Self {
        let reviewers = required_reviewers(group);
        let threshold = if group.requires_all_approvals {
            Threshold::All
        } else {
            Threshold::AtLeast(group.minimum_approvals)
        };

        match group.group_type {
            GroupType::Unordered => Self::Unordered { reviewers, threshold },
            GroupType::Ordered => {
                let mut sequence = reviewers;
                sequence.sort_by_key(|reviewer| reviewer.review_order);
                Self::Ordered { sequence, threshold }
            }
        }
    }

    pub fn reviewers(&self) -> &[Reviewer] {
        match self {
            Self::Unordered { reviewers, .. } => reviewers,
            Self::Ordered { sequence, .. } => sequence,
        }
    }

    pub fn threshold(&self) -> Threshold {
        match self {
            Self::Unordered { threshold, .. } | Self::Ordered { threshold, .. } => *threshold,
        }
    }

    pub fn is_required(&self, member_id: &GroupMemberId) -> bool {
        self.reviewers().iter().any(|reviewer| &reviewer.member_id == member_id)
    }

    /// Computes the group verdict from the current decisions of the active assignment.
    pub fn evaluate(&self, decisions: &[Decision]) -> Readiness {
        let statuses: HashMap<&GroupMemberId, DecisionStatus> =
            decisions.iter().map(|decision| (&decision.member_id, decision.status)).collect();
        let status_of = |reviewer: &Reviewer| {
            statuses.get(&reviewer.member_id).copied().unwrap_or(DecisionStatus::Pending)
        };

        let reviewers = self.reviewers();
        let mut approvals = 0;
        let mut rejections = 0;
        let mut pending = Vec::new();
        let mut deferred = Vec::new();

        for reviewer in reviewers {
            let status = status_of(reviewer);
            if status == DecisionStatus::Pending {
                pending.push(reviewer.member_id.clone());
                continue;
            }

            let counts = match self {
                Self::Unordered { .. } => true,
                Self::Ordered { sequence, .. } => sequence
                    .iter()
                    .filter(|earlier| earlier.review_order < reviewer.review_order)
                    .all(|earlier| status_of(earlier) != DecisionStatus::Pending),
            };
            if !counts {
                deferred.push(reviewer.member_id.clone());
                continue;
            }

            match status {
                DecisionStatus::Approved => approvals += 1,
                DecisionStatus::Rejected => rejections += 1,
                DecisionStatus::Pending => {}
            }
        }

        let threshold = self.threshold();
        let verdict = match threshold {
            Threshold::All if rejections > 0 => GroupVerdict::Blocked,
            Threshold::All if approvals == reviewers.len() => GroupVerdict::Ready,
            Threshold::All => GroupVerdict::Pending,
            Threshold::AtLeast(minimum) => {
                let minimum = minimum as usize;
                if approvals >= minimum {
                    GroupVerdict::Ready
                } else if reviewers.len() - rejections < minimum {
                    GroupVerdict::Blocked
                } else {
                    GroupVerdict::Pending
                }
            }
        };

        Readiness {
            verdict,
            threshold,
            required_reviewers: reviewers.len(),
            approvals,
            rejections,
            pending,
            deferred,
        }
    }
}

/// Active approving members, with unavailable primaries swapped for backups when enabled.
pub fn required_reviewers(group: &ApprovalGroup) -> Vec<Reviewer> {
    let approving: Vec<&ApprovalGroupMember> =
        group.active_members().filter(|member| member.permissions.can_approve).collect();

    let mut primaries: Vec<&ApprovalGroupMember> =
        approving.iter().copied().filter(|member| !member.is_backup()).collect();
    primaries.sort_by(|left, right| {
        left.review_order.cmp(&right.review_order).then_with(|| left.id.cmp(&right.id))
    });

    let mut backups: Vec<&ApprovalGroupMember> = approving
        .iter()
        .copied()
        .filter(|member| member.is_backup() && member.availability.is_available())
        .collect();
    backups.sort_by(|left, right| {
        left.backup_priority
            .cmp(&right.backup_priority)
            .then_with(|| left.review_order.cmp(&right.review_order))
            .then_with(|| left.id.cmp(&right.id))
    });

    let mut used: HashSet<&GroupMemberId> = HashSet::new();
    let mut reviewers = Vec::with_capacity(primaries.len());

    for primary in primaries {
        let substitute = if group.auto_assign_backups && !primary.availability.is_available() {
            backups.iter().find(|backup| !used.contains(&backup.id)).copied()
        } else {
            None
        };

        match substitute {
            Some(backup) => {
                used.insert(&backup.id);
                reviewers.push(Reviewer {
                    member_id: backup.id.clone(),
                    user_id: backup.user_id.clone(),
                    review_order: primary.review_order,
                    substitutes_for: Some(primary.id.clone()),
                });
            }
            None => reviewers.push(Reviewer {
                member_id: primary.id.clone(),
                user_id: primary.user_id.clone(),
                review_order: primary.review_order,
                substitutes_for: None,
            }),
        }
    }

    reviewers
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{GroupVerdict, ReviewPolicy, Threshold};
    use crate::domain::approval_group::{
        ApprovalGroup, ApprovalGroupMember, GroupType, MemberAvailability, MemberPermissions,
    };
    use crate::domain::decision::{Decision, DecisionStatus};
    use crate::ids::{ApprovalGroupId, AssignmentId, DecisionId, GroupMemberId, UserId};

    fn member(id: &str, review_order: i32) -> ApprovalGroupMember {
        ApprovalGroupMember {
            id: GroupMemberId::from(id),
            group_id: ApprovalGroupId::from("grp-1"),
            user_id: UserId::from(format!("user-{id}")),
            role: "planner".to_string(),
            permissions: MemberPermissions::reviewer(),
            review_order,
            backup_priority: 0,
            availability: MemberAvailability::Available,
            is_final_approver: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn group(
        group_type: GroupType,
        requires_all: bool,
        minimum: u32,
        members: Vec<ApprovalGroupMember>,
    ) -> ApprovalGroup {
        ApprovalGroup {
            id: ApprovalGroupId::from("grp-1"),
            name: "Planning panel".to_string(),
            description: None,
            group_type,
            requires_all_approvals: requires_all,
            minimum_approvals: minimum,
            auto_assign_backups: false,
            is_active: true,
            members,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn decision(member_id: &str, status: DecisionStatus) -> Decision {
        Decision {
            id: DecisionId::from(format!("dec-{member_id}")),
            assignment_id: AssignmentId::from("asg-1"),
            member_id: GroupMemberId::from(member_id),
            status,
            decided_at: Some(Utc::now()),
            comments: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn requires_all_is_ready_only_when_every_reviewer_approved() {
        let group =
            group(GroupType::Unordered, true, 0, vec![member("a", 0), member("b", 0), member("c", 0)]);
        let policy = ReviewPolicy::for_group(&group);

        let partial = policy.evaluate(&[
            decision("a", DecisionStatus::Approved),
            decision("b", DecisionStatus::Approved),
        ]);
        assert_eq!(partial.verdict, GroupVerdict::Pending);
        assert_eq!(partial.pending, vec![GroupMemberId::from("c")]);

        let complete = policy.evaluate(&[
            decision("a", DecisionStatus::Approved),
            decision("b", DecisionStatus::Approved),
            decision("c", DecisionStatus::Approved),
        ]);
        assert!(complete.is_ready());
        assert_eq!(complete.threshold, Threshold::All);
    }

    #[test]
    fn any_rejection_blocks_a_requires_all_group() {
        let group = group(GroupType::Unordered, true, 0, vec![member("a", 0), member("b", 0)]);
        let readiness = ReviewPolicy::for_group(&group).evaluate(&[
            decision("a", DecisionStatus::Approved),
            decision("b", DecisionStatus::Rejected),
        ]);

        assert_eq!(readiness.verdict, GroupVerdict::Blocked);
        assert_eq!(readiness.rejections, 1);
    }

    #[test]
    fn threshold_counts_approvals_regardless_of_order() {
        let group = group(
            GroupType::Unordered,
            false,
            2,
            vec![member("a", 0), member("b", 0), member("c", 0)],
        );
        let policy = ReviewPolicy::for_group(&group);

        let readiness = policy.evaluate(&[
            decision("c", DecisionStatus::Approved),
            decision("b", DecisionStatus::Rejected),
            decision("a", DecisionStatus::Approved),
        ]);
        assert!(readiness.is_ready());
        assert_eq!(readiness.approvals, 2);
    }

    #[test]
    fn threshold_blocks_only_when_unreachable() {
        let group = group(
            GroupType::Unordered,
            false,
            2,
            vec![member("a", 0), member("b", 0), member("c", 0)],
        );
        let policy = ReviewPolicy::for_group(&group);

        let one_rejection = policy.evaluate(&[decision("a", DecisionStatus::Rejected)]);
        assert_eq!(one_rejection.verdict, GroupVerdict::Pending);

        let two_rejections = policy.evaluate(&[
            decision("a", DecisionStatus::Rejected),
            decision("b", DecisionStatus::Rejected),
        ]);
        assert_eq!(two_rejections.verdict, GroupVerdict::Blocked);
    }

    #[test]
    fn ordered_group_defers_late_decisions_until_earlier_stages_decide() {
        let group = group(
            GroupType::Ordered,
            false,
            1,
            vec![member("first", 1), member("second", 2), member("third", 3)],
        );
        let policy = ReviewPolicy::for_group(&group);

        let early = policy.evaluate(&[decision("third", DecisionStatus::Approved)]);
        assert_eq!(early.verdict, GroupVerdict::Pending);
        assert_eq!(early.approvals, 0);
        assert_eq!(early.deferred, vec![GroupMemberId::from("third")]);

        let unblocked = policy.evaluate(&[
            decision("first", DecisionStatus::Rejected),
            decision("second", DecisionStatus::Rejected),
            decision("third", DecisionStatus::Approved),
        ]);
        assert!(unblocked.is_ready());
        assert!(unblocked.deferred.is_empty());
    }

    #[test]
    fn reviewers_sharing_an_order_form_one_stage() {
        let group = group(
            GroupType::Ordered,
            true,
            0,
            vec![member("a", 1), member("b", 1), member("c", 2)],
        );
        let policy = ReviewPolicy::for_group(&group);

        let readiness = policy.evaluate(&[
            decision("b", DecisionStatus::Approved),
            decision("c", DecisionStatus::Approved),
        ]);
        assert_eq!(readiness.approvals, 1);
        assert_eq!(readiness.deferred, vec![GroupMemberId::from("c")]);
        assert_eq!(readiness.pending, vec![GroupMemberId::from("a")]);
    }

    #[test]
    fn final_approver_without_approve_right_is_not_a_required_reviewer() {
        let mut approver = member("c", 0);
        approver.is_final_approver = true;
        approver.permissions.can_approve = false;
        let group = group(GroupType::Unordered, true, 0, vec![member("a", 0), member("b", 0), approver]);

        let readiness = ReviewPolicy::for_group(&group).evaluate(&[
            decision("a", DecisionStatus::Approved),
            decision("b", DecisionStatus::Approved),
        ]);
        assert_eq!(readiness.required_reviewers, 2);
        assert!(readiness.is_ready());
    }

    #[test]
    fn unavailable_primary_is_replaced_by_best_backup_when_enabled() {
        let mut absent = member("primary", 1);
        absent.availability = MemberAvailability::OnLeave;
        let mut second_choice = member("backup-2", 5);
        second_choice.backup_priority = 2;
        let mut first_choice = member("backup-1", 5);
        first_choice.backup_priority = 1;

        let mut group = group(
            GroupType::Ordered,
            true,
            0,
            vec![member("other", 0), absent, second_choice, first_choice],
        );
        group.auto_assign_backups = true;

        let policy = ReviewPolicy::for_group(&group);
        let substitute = policy
            .reviewers()
            .iter()
            .find(|reviewer| reviewer.substitutes_for.is_some())
            .expect("backup substituted");
        assert_eq!(substitute.member_id, GroupMemberId::from("backup-1"));
        assert_eq!(substitute.review_order, 1);
        assert_eq!(policy.reviewers().len(), 2);
        assert!(!policy.is_required(&GroupMemberId::from("primary")));
    }

    #[test]
    fn backups_never_count_when_auto_assignment_is_off() {
        let mut absent = member("primary", 0);
        absent.availability = MemberAvailability::Unavailable;
        let mut backup = member("backup", 0);
        backup.backup_priority = 1;
        let group = group(GroupType::Unordered, true, 0, vec![absent, backup]);

        let policy = ReviewPolicy::for_group(&group);
        assert_eq!(policy.reviewers().len(), 1);
        assert!(policy.is_required(&GroupMemberId::from("primary")));

        let readiness = policy.evaluate(&[decision("backup", DecisionStatus::Approved)]);
        assert_eq!(readiness.verdict, GroupVerdict::Pending);
    }

    #[test]
    fn inactive_members_are_ignored() {
        let mut retired = member("b", 0);
        retired.is_active = false;
        let group = group(GroupType::Unordered, true, 0, vec![member("a", 0), retired]);

        let readiness =
            ReviewPolicy::for_group(&group).evaluate(&[decision("a", DecisionStatus::Approved)]);
        assert!(readiness.is_ready());
    }
}
