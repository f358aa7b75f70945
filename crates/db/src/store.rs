use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, Transaction};

use crate::repositories::RepositoryError;
use crate::DbPool;

/// Handle to the permit database. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Store {
    pool: DbPool,
}

impl Store {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Opens a unit of work. Nothing it writes is visible until [`UnitOfWork::commit`].
    ///
    /// The write lock is taken up front, so concurrent units of work queue on the busy
    /// timeout and each one reads state the previous one committed.
    pub async fn begin(&self) -> Result<UnitOfWork, RepositoryError> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(UnitOfWork { tx })
    }

    /// Connection for read-only work outside a unit of work.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>, RepositoryError> {
        Ok(self.pool.acquire().await?)
    }
}

/// One database transaction. Dropping it without committing rolls everything back.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    pub async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
