mod common;

use futures::future::join_all;

use common::{
    count, ctx, file_harness, harness, submit, three_member_group, under_review, Harness,
};
use permitdesk_core::domain::issue::{
    ApplicationIssue, IssueAssignmentType, IssuePriority, IssueStatus, IssueTarget, NewIssue,
};
use permitdesk_core::errors::WorkflowError;
use permitdesk_core::ids::{ApplicationId, GroupMemberId, UserId};

fn new_issue(target: IssueTarget) -> NewIssue {
    NewIssue {
        title: "Missing site plan".to_string(),
        description: "Upload a 1:500 site plan".to_string(),
        priority: IssuePriority::Medium,
        category: Some("documents".to_string()),
        target,
        create_thread: true,
    }
}

async fn specific_user_issue(h: &Harness) -> (ApplicationId, ApplicationIssue) {
    let application = submit(&h.services, "PA-2024-0100").await;
    let issue = h
        .services
        .issues
        .raise_issue(
            &ctx("applicant"),
            &application.id,
            new_issue(IssueTarget::SpecificUser(UserId::from("officer"))),
        )
        .await
        .expect("raise issue");
    (application.id, issue)
}

async fn thread_flags(h: &Harness, issue: &ApplicationIssue) -> (i64, i64) {
    let thread_id = issue.thread_id.as_ref().expect("issue thread");
    let resolved = count(
        &h.pool,
        &format!("SELECT is_resolved FROM chat_thread WHERE id = '{thread_id}'"),
    )
    .await;
    let active =
        count(&h.pool, &format!("SELECT is_active FROM chat_thread WHERE id = '{thread_id}'")).await;
    (resolved, active)
}

#[tokio::test]
async fn specific_user_issue_opens_one_thread_with_two_participants_and_one_message() {
    let h = harness().await;
    let (_, issue) = specific_user_issue(&h).await;

    assert_eq!(issue.assignment_type, IssueAssignmentType::SpecificUser);
    assert_eq!(issue.status, IssueStatus::Open);
    assert_eq!(count(&h.pool, "SELECT COUNT(*) FROM chat_thread").await, 1);
    assert_eq!(
        count(&h.pool, "SELECT COUNT(*) FROM chat_participant WHERE is_active = 1").await,
        2
    );
    assert_eq!(count(&h.pool, "SELECT COUNT(*) FROM chat_message").await, 1);
    assert_eq!(
        count(
            &h.pool,
            "SELECT can_resolve FROM chat_participant WHERE user_id = 'officer'"
        )
        .await,
        1
    );
}

#[tokio::test]
async fn issue_without_thread_posts_nothing() {
    let h = harness().await;
    let application = submit(&h.services, "PA-2024-0101").await;
    let mut input = new_issue(IssueTarget::SpecificUser(UserId::from("officer")));
    input.create_thread = false;

    let issue = h
        .services
        .issues
        .raise_issue(&ctx("applicant"), &application.id, input)
        .await
        .expect("raise issue");

    assert!(issue.thread_id.is_none());
    assert_eq!(count(&h.pool, "SELECT COUNT(*) FROM chat_thread").await, 0);
    assert!(h.broadcaster.sent().is_empty());
}

#[tokio::test]
async fn resolving_twice_conflicts_and_leaves_the_thread_alone() {
    let h = harness().await;
    let (_, issue) = specific_user_issue(&h).await;
    let issues = &h.services.issues;

    let resolved = issues
        .resolve_issue(&ctx("officer"), &issue.id, "Plan received")
        .await
        .expect("resolve");
    assert_eq!(resolved.status, IssueStatus::Resolved);
    assert_eq!(resolved.resolved_by, Some(UserId::from("officer")));
    assert_eq!(thread_flags(&h, &issue).await, (1, 0));
    let messages = count(&h.pool, "SELECT COUNT(*) FROM chat_message").await;

    let error = issues
        .resolve_issue(&ctx("officer"), &issue.id, "Plan received again")
        .await
        .expect_err("already resolved");

    assert!(matches!(error, WorkflowError::Conflict(_)));
    assert_eq!(thread_flags(&h, &issue).await, (1, 0));
    assert_eq!(count(&h.pool, "SELECT COUNT(*) FROM chat_message").await, messages);
}

#[tokio::test]
async fn concurrent_resolutions_leave_one_winner_and_conflicts() {
    let h = file_harness(4).await;

    for round in 0..5 {
        let application = submit(&h.services, &format!("PA-2024-02{round:02}")).await;
        let issue = h
            .services
            .issues
            .raise_issue(
                &ctx("applicant"),
                &application.id,
                new_issue(IssueTarget::SpecificUser(UserId::from("officer"))),
            )
            .await
            .expect("raise issue");

        let results = join_all((0..4).map(|attempt| {
            let issues = h.services.issues.clone();
            let issue_id = issue.id.clone();
            async move {
                issues
                    .resolve_issue(&ctx("officer"), &issue_id, &format!("Resolved by attempt {attempt}"))
                    .await
            }
        }))
        .await;

        let resolved = results.iter().filter(|result| result.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|result| matches!(result, Err(WorkflowError::Conflict(_))))
            .count();
        assert_eq!(resolved, 1, "round {round}: {results:?}");
        assert_eq!(conflicts, 3, "round {round}: {results:?}");
    }
}

#[tokio::test]
async fn reopen_and_resolve_round_trip_posts_one_message_per_transition() {
    let h = harness().await;
    let (_, issue) = specific_user_issue(&h).await;
    let issues = &h.services.issues;

    issues.resolve_issue(&ctx("officer"), &issue.id, "Done").await.expect("resolve");
    let reopened = issues.reopen_issue(&ctx("applicant"), &issue.id).await.expect("reopen");
    assert_eq!(reopened.status, IssueStatus::Open);
    assert!(reopened.resolution_comment.is_none());
    assert!(reopened.reopened_at.is_some());
    assert_eq!(thread_flags(&h, &issue).await, (0, 1));

    let again = issues.resolve_issue(&ctx("officer"), &issue.id, "Done, really").await.expect("resolve");
    assert_eq!(again.status, IssueStatus::Resolved);

    assert_eq!(
        count(&h.pool, "SELECT COUNT(*) FROM chat_message WHERE message_type = 'SYSTEM'").await,
        4,
        "raise plus three transitions"
    );
    assert_eq!(
        h.broadcaster.names().iter().filter(|name| **name == "thread_state").count(),
        3
    );
}

#[tokio::test]
async fn reopening_an_open_issue_conflicts() {
    let h = harness().await;
    let (_, issue) = specific_user_issue(&h).await;

    let error = h
        .services
        .issues
        .reopen_issue(&ctx("applicant"), &issue.id)
        .await
        .expect_err("issue is open");
    assert!(matches!(error, WorkflowError::Conflict(_)));
}

#[tokio::test]
async fn strangers_cannot_resolve_or_reopen() {
    let h = harness().await;
    let (_, issue) = specific_user_issue(&h).await;
    let issues = &h.services.issues;

    let error = issues
        .resolve_issue(&ctx("dan"), &issue.id, "Not mine")
        .await
        .expect_err("dan is not the target");
    assert!(matches!(error, WorkflowError::Forbidden(_)));

    issues.resolve_issue(&ctx("officer"), &issue.id, "Done").await.expect("resolve");
    let error = issues.reopen_issue(&ctx("dan"), &issue.id).await.expect_err("dan may not reopen");
    assert!(matches!(error, WorkflowError::Forbidden(_)));
}

#[tokio::test]
async fn resolution_needs_a_comment() {
    let h = harness().await;
    let (_, issue) = specific_user_issue(&h).await;

    let error = h
        .services
        .issues
        .resolve_issue(&ctx("officer"), &issue.id, "   ")
        .await
        .expect_err("blank comment");
    assert!(matches!(error, WorkflowError::Validation(_)));
}

#[tokio::test]
async fn only_the_applicant_or_group_members_raise_issues() {
    let h = harness().await;
    let (application, _) = under_review(&h.services, three_member_group()).await;

    let error = h
        .services
        .issues
        .raise_issue(
            &ctx("dan"),
            &application.id,
            new_issue(IssueTarget::SpecificUser(UserId::from("applicant"))),
        )
        .await
        .expect_err("dan is unrelated");
    assert!(matches!(error, WorkflowError::Forbidden(_)));
}

#[tokio::test]
async fn group_member_target_must_belong_to_the_current_group() {
    let h = harness().await;
    let (application, group) = under_review(&h.services, three_member_group()).await;
    let issues = &h.services.issues;

    let error = issues
        .raise_issue(
            &ctx("alice"),
            &application.id,
            new_issue(IssueTarget::GroupMember(GroupMemberId::from("mbr-unknown"))),
        )
        .await
        .expect_err("unknown member");
    assert!(matches!(error, WorkflowError::NotFound(_)));

    let bob = group
        .members
        .iter()
        .find(|member| member.user_id == UserId::from("bob"))
        .expect("bob")
        .id
        .clone();
    let issue = issues
        .raise_issue(&ctx("alice"), &application.id, new_issue(IssueTarget::GroupMember(bob)))
        .await
        .expect("raise for bob");

    let error = issues
        .resolve_issue(&ctx("carol"), &issue.id, "Not for me")
        .await
        .expect_err("carol is not the target member");
    assert!(matches!(error, WorkflowError::Forbidden(_)));
    issues.resolve_issue(&ctx("bob"), &issue.id, "Checked").await.expect("bob resolves");
}

#[tokio::test]
async fn collaborative_issue_gathers_the_whole_group() {
    let h = harness().await;
    let (application, _) = under_review(&h.services, three_member_group()).await;
    let issues = &h.services.issues;

    let issue = issues
        .raise_issue(&ctx("applicant"), &application.id, new_issue(IssueTarget::Collaborative))
        .await
        .expect("raise collaborative issue");
    let thread_id = issue.thread_id.clone().expect("thread");

    assert_eq!(
        count(
            &h.pool,
            &format!(
                "SELECT COUNT(*) FROM chat_participant
                 WHERE thread_id = '{thread_id}' AND is_active = 1 AND can_resolve = 1"
            )
        )
        .await,
        4
    );

    let listed = issues.list_issues(&application.id, Some(IssueStatus::Open)).await.expect("list");
    assert_eq!(listed.len(), 1);

    issues.resolve_issue(&ctx("bob"), &issue.id, "Agreed in thread").await.expect("bob resolves");
    assert!(issues
        .list_issues(&application.id, Some(IssueStatus::Open))
        .await
        .expect("list")
        .is_empty());
}
