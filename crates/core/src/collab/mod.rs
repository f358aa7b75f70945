//! Rules for the collaboration surface around an application: who may resolve an issue,
//! who may change a thread's participants, and how those changes are announced.

pub mod issues;
pub mod participants;

pub use issues::{can_user_reopen_issue, can_user_resolve_issue, ResolverContext};
pub use participants::{
    can_user_manage_participants, join_names, participant_change_message, ParticipantChange,
};
