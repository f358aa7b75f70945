use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_TABLES: &[&str] = &[
        "app_user",
        "application",
        "approval_group",
        "approval_group_member",
        "application_group_assignment",
        "decision",
        "decision_comment",
        "final_approval",
        "chat_thread",
        "application_issue",
        "chat_participant",
        "chat_message",
        "message_attachment",
        "message_read_receipt",
        "message_star",
    ];

    const MANAGED_INDEXES: &[&str] = &[
        "idx_application_status",
        "idx_application_applicant_id",
        "idx_approval_group_member_final_approver",
        "idx_approval_group_member_user_id",
        "idx_application_group_assignment_active",
        "idx_decision_comment_decision_id",
        "idx_chat_thread_workflow",
        "idx_chat_thread_issue_id",
        "idx_application_issue_application_status",
        "idx_chat_participant_user_id",
        "idx_chat_message_thread_created_at",
        "idx_message_attachment_message_id",
        "idx_message_star_user_id",
    ];

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            let managed = MANAGED_TABLES.contains(&name.as_str())
                || MANAGED_INDEXES.contains(&name.as_str());
            managed.then(|| (row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
        })
        .collect();
        signature.sort();
        signature
    }

    #[tokio::test]
    async fn migrations_create_every_managed_object() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let signature = managed_schema_signature(&pool).await;
        assert_eq!(signature.len(), MANAGED_TABLES.len() + MANAGED_INDEXES.len());
    }

    #[tokio::test]
    async fn final_approver_flag_is_unique_per_group() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO approval_group (id, name, group_type, requires_all_approvals, created_at, updated_at)
             VALUES ('grp-1', 'Panel', 'UNORDERED', 1, '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await
        .expect("insert group");

        let insert_member = |id: &'static str, user: &'static str| {
            sqlx::query(
                "INSERT INTO approval_group_member (id, group_id, user_id, role, is_final_approver, created_at)
                 VALUES (?, 'grp-1', ?, 'planner', 1, '2024-01-01T00:00:00.000000Z')",
            )
            .bind(id)
            .bind(user)
        };

        insert_member("mbr-1", "alice").execute(&pool).await.expect("first final approver");
        let second = insert_member("mbr-2", "bob").execute(&pool).await;
        assert!(second.is_err(), "second final approver must violate the partial unique index");
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        let initial_signature = managed_schema_signature(&pool).await;

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert!(
            managed_schema_signature(&pool).await.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(
            managed_schema_signature(&pool).await,
            initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }
}
