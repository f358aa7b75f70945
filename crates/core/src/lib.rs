pub mod approvals;
pub mod collab;
pub mod config;
pub mod context;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod ids;

pub use approvals::{GroupVerdict, Readiness, ReviewPolicy, Reviewer, Threshold};
pub use context::RequestContext;
pub use directory::{DirectoryError, InMemoryUserDirectory, UserDirectory, UserProfile};
pub use domain::application::{Application, ApplicationStatus, NewApplication};
pub use domain::approval_group::{
    ApprovalGroup, ApprovalGroupMember, GroupType, MemberAvailability, MemberPermissions,
    NewApprovalGroup, NewGroupMember,
};
pub use domain::chat::{
    AttachmentRef, ChatMessage, ChatParticipant, ChatThread, MessageAttachment, MessageStatus,
    MessageType, ParticipantPermission, ParticipantPermissions, ParticipantRole, ParticipantSeed,
    ReadReceipt, ThreadKind, ThreadSummary,
};
pub use domain::decision::{
    ApplicationGroupAssignment, Decision, DecisionComment, DecisionOutcome, DecisionStatus,
    FinalApproval,
};
pub use domain::issue::{
    ApplicationIssue, IssueAssignmentType, IssuePriority, IssueStatus, IssueTarget, NewIssue,
};
pub use errors::{DomainError, InterfaceError, WorkflowError};
pub use ids::{
    ApplicationId, ApprovalGroupId, AssignmentId, DecisionId, FinalApprovalId, GroupMemberId,
    IssueId, MessageId, ThreadId, UserId,
};
