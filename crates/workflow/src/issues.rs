use sqlx::SqliteConnection;
use tracing::info;

use permitdesk_core::collab::{can_user_reopen_issue, can_user_resolve_issue, ResolverContext};
use permitdesk_core::context::RequestContext;
use permitdesk_core::domain::chat::{
    ChatParticipant, ChatThread, ParticipantRole, ParticipantSeed, ThreadKind,
};
use permitdesk_core::domain::issue::{ApplicationIssue, IssueStatus, IssueTarget, NewIssue};
use permitdesk_core::errors::WorkflowError;
use permitdesk_core::ids::{ApplicationId, IssueId, ThreadId, UserId};
use permitdesk_db::repositories::{applications, approvals, groups, issues, threads};
use permitdesk_db::timestamp;
use permitdesk_realtime::ThreadEvent;

use crate::support::{ensure_open_for_review, post_system_message, require_text, Outbox, ServiceDeps};

/// Issues raised against an application and their discussion threads.
#[derive(Clone)]
pub struct IssueService {
    deps: ServiceDeps,
}

fn resolver_seed(user_id: UserId) -> ParticipantSeed {
    ParticipantSeed {
        permissions: ParticipantRole::Member.default_permissions().with_resolve(),
        role: ParticipantRole::Member,
        user_id,
    }
}

/// Loads the facts `can_user_resolve_issue` needs beyond the issue row.
async fn resolver_facts(
    conn: &mut SqliteConnection,
    issue: &ApplicationIssue,
    user: &UserId,
) -> Result<(Option<UserId>, Option<ChatParticipant>), WorkflowError> {
    let target_member_user = match &issue.assigned_to_member {
        Some(member_id) => groups::find_member(&mut *conn, member_id)
            .await?
            .map(|member| member.user_id),
        None => None,
    };
    let participant = match &issue.thread_id {
        Some(thread_id) => threads::find_participant(&mut *conn, thread_id, user).await?,
        None => None,
    };
    Ok((target_member_user, participant))
}

impl IssueService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    /// Opens an issue and, unless asked not to, a thread bound to it.
    pub async fn raise_issue(
        &self,
        ctx: &RequestContext,
        application_id: &ApplicationId,
        input: NewIssue,
    ) -> Result<ApplicationIssue, WorkflowError> {
        input.validate()?;
        let raiser_name = self.deps.display_name(&ctx.actor).await?;
        let now = timestamp::now();

        let mut uow = self.deps.store.begin().await?;
        let application = applications::lock(uow.conn(), application_id).await?;
        ensure_open_for_review(application.status)?;

        let group = match approvals::find_active_assignment(uow.conn(), application_id).await? {
            Some(assignment) => Some(groups::get(uow.conn(), &assignment.group_id).await?),
            None => None,
        };
        let may_raise = application.applicant_id == ctx.actor
            || group
                .as_ref()
                .and_then(|group| group.active_member_for_user(&ctx.actor))
                .map(|member| member.permissions.can_raise_issues)
                .unwrap_or(false);
        if !may_raise {
            return Err(WorkflowError::forbidden(format!(
                "user `{}` may not raise issues on application `{application_id}`",
                ctx.actor
            )));
        }

        let (assigned_to_user, assigned_to_member, target_users) = match &input.target {
            IssueTarget::SpecificUser(user) => (Some(user.clone()), None, vec![user.clone()]),
            IssueTarget::GroupMember(member_id) => {
                let member = group
                    .as_ref()
                    .and_then(|group| group.member(member_id))
                    .filter(|member| member.is_active)
                    .ok_or_else(|| {
                        WorkflowError::not_found(format!(
                            "group member `{member_id}` is not part of the application's approval group"
                        ))
                    })?;
                (None, Some(member_id.clone()), vec![member.user_id.clone()])
            }
            IssueTarget::Collaborative => {
                let members = group
                    .as_ref()
                    .map(|group| group.active_members().map(|member| member.user_id.clone()).collect())
                    .unwrap_or_default();
                (None, None, members)
            }
        };

        let issue_id = IssueId::generate();
        let title = input.title.trim().to_string();
        let mut outbox = Outbox::default();

        let thread = if input.create_thread {
            let thread = ChatThread {
                id: ThreadId::generate(),
                application_id: Some(application_id.clone()),
                issue_id: Some(issue_id.clone()),
                kind: ThreadKind::Issue,
                title: format!("Issue: {title}"),
                created_by: ctx.actor.clone(),
                is_resolved: false,
                is_active: true,
                unread_count: 0,
                last_activity_at: now,
                resolved_at: None,
                created_at: now,
                updated_at: now,
            };
            threads::insert_thread(uow.conn(), &thread).await?;
            let owner = ParticipantSeed::with_role(ctx.actor.clone(), ParticipantRole::Owner);
            threads::add_participant(uow.conn(), &thread.id, &owner, now).await?;
            for user_id in &target_users {
                threads::add_participant(uow.conn(), &thread.id, &resolver_seed(user_id.clone()), now)
                    .await?;
            }
            Some(thread)
        } else {
            None
        };

        let issue = ApplicationIssue {
            id: issue_id,
            application_id: application_id.clone(),
            raised_by: ctx.actor.clone(),
            title,
            description: input.description.trim().to_string(),
            priority: input.priority,
            category: input.category,
            assignment_type: input.target.assignment_type(),
            assigned_to_user,
            assigned_to_member,
            status: IssueStatus::Open,
            thread_id: thread.as_ref().map(|thread| thread.id.clone()),
            resolution_comment: None,
            resolved_by: None,
            resolved_at: None,
            reopened_at: None,
            created_at: now,
            updated_at: now,
        };
        issues::insert(uow.conn(), &issue).await?;

        if let Some(thread) = &thread {
            let message = post_system_message(
                uow.conn(),
                thread,
                &ctx.actor,
                format!("{raiser_name} raised issue \"{}\": {}", issue.title, issue.description),
                now,
            )
            .await?;
            outbox.message(&message, &ctx.actor);
        }

        uow.commit().await?;
        self.deps.publisher.publish(outbox, &ctx.correlation_id).await;

        info!(
            event_name = "workflow.issue.raised",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            application_id = %application_id,
            issue_id = %issue.id,
            assignment_type = issue.assignment_type.as_str(),
            thread_id = ?issue.thread_id.as_ref().map(ThreadId::as_str),
            "issue raised"
        );
        Ok(issue)
    }

    pub async fn resolve_issue(
        &self,
        ctx: &RequestContext,
        issue_id: &IssueId,
        comment: &str,
    ) -> Result<ApplicationIssue, WorkflowError> {
        let comment = require_text(comment, "resolution comment")?;
        let actor_name = self.deps.display_name(&ctx.actor).await?;
        let now = timestamp::now();

        let mut uow = self.deps.store.begin().await?;
        let issue = issues::get(uow.conn(), issue_id).await?;
        let (target_member_user, participant) =
            resolver_facts(uow.conn(), &issue, &ctx.actor).await?;
        let context = ResolverContext {
            target_member_user: target_member_user.as_ref(),
            participant: participant.as_ref(),
        };
        if !can_user_resolve_issue(&issue, &ctx.actor, context) {
            return Err(WorkflowError::forbidden(format!(
                "user `{}` may not resolve issue `{issue_id}`",
                ctx.actor
            )));
        }
        if !issues::mark_resolved(uow.conn(), issue_id, &ctx.actor, &comment, now).await? {
            return Err(WorkflowError::conflict(format!("issue `{issue_id}` is already resolved")));
        }

        let mut outbox = Outbox::default();
        if let Some(thread_id) = &issue.thread_id {
            let thread = threads::lock_thread(uow.conn(), thread_id).await?;
            threads::set_resolution_state(uow.conn(), thread_id, true, now).await?;
            let message = post_system_message(
                uow.conn(),
                &thread,
                &ctx.actor,
                format!("{actor_name} resolved the issue: {comment}"),
                now,
            )
            .await?;
            outbox.message(&message, &ctx.actor);
            outbox.push(
                ThreadEvent::ThreadState {
                    thread_id: thread_id.clone(),
                    is_resolved: true,
                    is_active: false,
                },
                None,
            );
        }
        let resolved = issues::get(uow.conn(), issue_id).await?;

        uow.commit().await?;
        self.deps.publisher.publish(outbox, &ctx.correlation_id).await;

        info!(
            event_name = "workflow.issue.resolved",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            application_id = %resolved.application_id,
            issue_id = %issue_id,
            "issue resolved"
        );
        Ok(resolved)
    }

    /// Inverse of [`IssueService::resolve_issue`]; the raiser may also reopen.
    pub async fn reopen_issue(
        &self,
        ctx: &RequestContext,
        issue_id: &IssueId,
    ) -> Result<ApplicationIssue, WorkflowError> {
        let actor_name = self.deps.display_name(&ctx.actor).await?;
        let now = timestamp::now();

        let mut uow = self.deps.store.begin().await?;
        let issue = issues::get(uow.conn(), issue_id).await?;
        let (target_member_user, participant) =
            resolver_facts(uow.conn(), &issue, &ctx.actor).await?;
        let context = ResolverContext {
            target_member_user: target_member_user.as_ref(),
            participant: participant.as_ref(),
        };
        if !can_user_reopen_issue(&issue, &ctx.actor, context) {
            return Err(WorkflowError::forbidden(format!(
                "user `{}` may not reopen issue `{issue_id}`",
                ctx.actor
            )));
        }
        if !issues::mark_reopened(uow.conn(), issue_id, now).await? {
            return Err(WorkflowError::conflict(format!("issue `{issue_id}` is not resolved")));
        }

        let mut outbox = Outbox::default();
        if let Some(thread_id) = &issue.thread_id {
            let thread = threads::lock_thread(uow.conn(), thread_id).await?;
            threads::set_resolution_state(uow.conn(), thread_id, false, now).await?;
            let message = post_system_message(
                uow.conn(),
                &thread,
                &ctx.actor,
                format!("{actor_name} reopened the issue"),
                now,
            )
            .await?;
            outbox.message(&message, &ctx.actor);
            outbox.push(
                ThreadEvent::ThreadState {
                    thread_id: thread_id.clone(),
                    is_resolved: false,
                    is_active: true,
                },
                None,
            );
        }
        let reopened = issues::get(uow.conn(), issue_id).await?;

        uow.commit().await?;
        self.deps.publisher.publish(outbox, &ctx.correlation_id).await;

        info!(
            event_name = "workflow.issue.reopened",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor,
            application_id = %reopened.application_id,
            issue_id = %issue_id,
            "issue reopened"
        );
        Ok(reopened)
    }

    pub async fn list_issues(
        &self,
        application_id: &ApplicationId,
        status: Option<IssueStatus>,
    ) -> Result<Vec<ApplicationIssue>, WorkflowError> {
        let mut conn = self.deps.store.acquire().await?;
        applications::get(&mut conn, application_id).await?;
        Ok(issues::list(&mut conn, application_id, status).await?)
    }

    pub async fn get_issue(&self, issue_id: &IssueId) -> Result<ApplicationIssue, WorkflowError> {
        let mut conn = self.deps.store.acquire().await?;
        Ok(issues::get(&mut conn, issue_id).await?)
    }
}
