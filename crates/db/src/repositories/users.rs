use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use permitdesk_core::directory::{DirectoryError, UserDirectory, UserProfile};
use permitdesk_core::ids::UserId;

use super::{column, RepositoryError};
use crate::{timestamp, DbPool};

fn row_to_user(row: &SqliteRow) -> Result<UserProfile, RepositoryError> {
    Ok(UserProfile {
        id: UserId(column(row, "id")?),
        first_name: column(row, "first_name")?,
        last_name: column(row, "last_name")?,
        email: column(row, "email")?,
        department: column(row, "department")?,
    })
}

pub async fn upsert(conn: &mut SqliteConnection, user: &UserProfile) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO app_user (id, first_name, last_name, email, department, created_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             first_name = excluded.first_name,
             last_name = excluded.last_name,
             email = excluded.email,
             department = excluded.department",
    )
    .bind(user.id.as_str())
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(&user.department)
    .bind(timestamp::encode(timestamp::now()))
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find(
    conn: &mut SqliteConnection,
    id: &UserId,
) -> Result<Option<UserProfile>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, first_name, last_name, email, department FROM app_user WHERE id = ?",
    )
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(row_to_user).transpose()
}

/// User directory backed by the `app_user` table.
#[derive(Clone)]
pub struct SqlUserDirectory {
    pool: DbPool,
}

impl SqlUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for SqlUserDirectory {
    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<UserProfile>, DirectoryError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|error| DirectoryError::Unavailable(error.to_string()))?;
        find(&mut conn, id).await.map_err(|error| DirectoryError::Unavailable(error.to_string()))
    }
}
