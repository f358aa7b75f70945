use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use permitdesk_core::domain::application::{Application, ApplicationStatus};
use permitdesk_core::ids::{ApplicationId, UserId};

use super::{column, parse_enum, RepositoryError};
use crate::timestamp;

const APPLICATION_COLUMNS: &str = "id, reference, title, description, applicant_id, status,
    final_approval_date, rejection_date, collected_at, created_at, updated_at";

fn row_to_application(row: &SqliteRow) -> Result<Application, RepositoryError> {
    let status: String = column(row, "status")?;
    Ok(Application {
        id: ApplicationId(column(row, "id")?),
        reference: column(row, "reference")?,
        title: column(row, "title")?,
        description: column(row, "description")?,
        applicant_id: UserId(column(row, "applicant_id")?),
        status: parse_enum(&status, "application status", ApplicationStatus::parse)?,
        final_approval_date: timestamp::decode_opt(column(row, "final_approval_date")?)?,
        rejection_date: timestamp::decode_opt(column(row, "rejection_date")?)?,
        collected_at: timestamp::decode_opt(column(row, "collected_at")?)?,
        created_at: timestamp::decode(&column::<String>(row, "created_at")?)?,
        updated_at: timestamp::decode(&column::<String>(row, "updated_at")?)?,
    })
}

pub async fn insert(
    conn: &mut SqliteConnection,
    application: &Application,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO application (id, reference, title, description, applicant_id, status,
                                  final_approval_date, rejection_date, collected_at,
                                  created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(application.id.as_str())
    .bind(&application.reference)
    .bind(&application.title)
    .bind(&application.description)
    .bind(application.applicant_id.as_str())
    .bind(application.status.as_str())
    .bind(timestamp::encode_opt(application.final_approval_date))
    .bind(timestamp::encode_opt(application.rejection_date))
    .bind(timestamp::encode_opt(application.collected_at))
    .bind(timestamp::encode(application.created_at))
    .bind(timestamp::encode(application.updated_at))
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find(
    conn: &mut SqliteConnection,
    id: &ApplicationId,
) -> Result<Option<Application>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {APPLICATION_COLUMNS} FROM application WHERE id = ?"))
        .bind(id.as_str())
        .fetch_optional(conn)
        .await?;

    row.as_ref().map(row_to_application).transpose()
}

pub async fn get(
    conn: &mut SqliteConnection,
    id: &ApplicationId,
) -> Result<Application, RepositoryError> {
    find(conn, id).await?.ok_or_else(|| RepositoryError::not_found("application", id))
}

/// Takes the write lock through a no-op update on the row, then reads it.
pub async fn lock(
    conn: &mut SqliteConnection,
    id: &ApplicationId,
) -> Result<Application, RepositoryError> {
    let touched = sqlx::query("UPDATE application SET id = id WHERE id = ?")
        .bind(id.as_str())
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if touched == 0 {
        return Err(RepositoryError::not_found("application", id));
    }

    get(conn, id).await
}

/// Persists a status transition together with the dates it stamped.
pub async fn save_status(
    conn: &mut SqliteConnection,
    application: &Application,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE application
         SET status = ?, final_approval_date = ?, rejection_date = ?, collected_at = ?,
             updated_at = ?
         WHERE id = ?",
    )
    .bind(application.status.as_str())
    .bind(timestamp::encode_opt(application.final_approval_date))
    .bind(timestamp::encode_opt(application.rejection_date))
    .bind(timestamp::encode_opt(application.collected_at))
    .bind(timestamp::encode(application.updated_at))
    .bind(application.id.as_str())
    .execute(conn)
    .await?;

    Ok(())
}
