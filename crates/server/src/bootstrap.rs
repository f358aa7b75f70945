use std::sync::Arc;

use permitdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use permitdesk_db::{connect_with_settings, migrations, DbPool, SqlUserDirectory, Store};
use permitdesk_realtime::RealtimeHub;
use permitdesk_workflow::{EventPublisher, Services};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub services: Services,
    /// Absent when `realtime.enabled` is false; every broadcast is then a no-op.
    pub hub: Option<Arc<RealtimeHub>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

#[cfg(test)]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let hub = config.realtime.enabled.then(|| Arc::new(RealtimeHub::new()));
    let publisher = match &hub {
        Some(hub) => EventPublisher::new(hub.clone()),
        None => EventPublisher::disabled(),
    };
    info!(
        event_name = "system.bootstrap.realtime",
        correlation_id = "bootstrap",
        enabled = hub.is_some(),
        "realtime hub configured"
    );

    let services = Services::new(
        Store::new(db_pool.clone()),
        Arc::new(SqlUserDirectory::new(db_pool.clone())),
        publisher,
        config.workflow.clone(),
    );

    Ok(Application { config, db_pool, services, hub })
}
