pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod store;
pub mod timestamp;

pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{RepositoryError, SqlUserDirectory};
pub use store::{Store, UnitOfWork};
