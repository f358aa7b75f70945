//! Row-level access for every permit table.
//!
//! Functions take a bare `SqliteConnection` so the same call works inside a
//! [`crate::UnitOfWork`] or on a pooled connection for reads.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use permitdesk_core::errors::WorkflowError;

pub mod applications;
pub mod approvals;
pub mod groups;
pub mod issues;
pub mod messages;
pub mod threads;
pub mod users;

pub use users::SqlUserDirectory;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(error)) => error.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<RepositoryError> for WorkflowError {
    fn from(error: RepositoryError) -> Self {
        if error.is_unique_violation() {
            return Self::Conflict(error.to_string());
        }
        match error {
            RepositoryError::NotFound { .. } => Self::NotFound(error.to_string()),
            RepositoryError::Database(_) | RepositoryError::Decode(_) => {
                Self::Internal(error.to_string())
            }
        }
    }
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|error| RepositoryError::Decode(format!("{name}: {error}")))
}

pub(crate) fn parse_enum<T>(
    value: &str,
    column_name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown {column_name} `{value}`")))
}
