use crate::domain::chat::ChatParticipant;
use crate::domain::issue::{ApplicationIssue, IssueAssignmentType};
use crate::ids::UserId;

/// Facts about the caller that live outside the issue row.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResolverContext<'a> {
    /// User behind the targeted group member of a GROUP_MEMBER issue.
    pub target_member_user: Option<&'a UserId>,
    /// Caller's participant row in the issue thread, if any.
    pub participant: Option<&'a ChatParticipant>,
}

pub fn can_user_resolve_issue(
    issue: &ApplicationIssue,
    user: &UserId,
    context: ResolverContext<'_>,
) -> bool {
    match issue.assignment_type {
        IssueAssignmentType::SpecificUser => issue.assigned_to_user.as_ref() == Some(user),
        IssueAssignmentType::GroupMember => context.target_member_user == Some(user),
        IssueAssignmentType::Collaborative => match issue.thread_id {
            Some(_) => context
                .participant
                .map(|participant| {
                    participant.is_active
                        && &participant.user_id == user
                        && participant.permissions.can_resolve
                })
                .unwrap_or(false),
            None => &issue.raised_by == user,
        },
    }
}

/// Same predicate as resolving, widened to the original raiser.
pub fn can_user_reopen_issue(
    issue: &ApplicationIssue,
    user: &UserId,
    context: ResolverContext<'_>,
) -> bool {
    &issue.raised_by == user || can_user_resolve_issue(issue, user, context)
}
