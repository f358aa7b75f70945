mod api;
mod bootstrap;
mod health;
mod ws;

use std::time::Duration;

use anyhow::Result;
use permitdesk_core::config::{AppConfig, LoadOptions};
use permitdesk_realtime::start_heartbeat;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::api::ApiState;

fn init_logging(config: &AppConfig) {
    use permitdesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let heartbeat = app.hub.as_ref().map(|hub| {
        start_heartbeat(
            hub.clone(),
            Duration::from_secs(app.config.realtime.heartbeat_interval_secs),
        )
    });

    let router = api::router(ApiState { services: app.services.clone(), hub: app.hub.clone() })
        .merge(health::router(app.db_pool.clone(), app.hub.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        realtime_enabled = app.hub.is_some(),
        "permitdesk-server listening"
    );

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.changed().await;
            })
            .await
    });

    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "permitdesk-server stopping"
    );

    // Websocket sessions get their close frame before the HTTP drain starts.
    if let Some(hub) = &app.hub {
        hub.shutdown_all().await;
    }
    let _ = stop_tx.send(true);

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "graceful shutdown window elapsed with connections still open"
        ),
    }

    if let Some(heartbeat) = heartbeat {
        heartbeat.abort();
    }
    app.db_pool.close().await;
    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "permitdesk-server stopped"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
