use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use permitdesk_db::DbPool;
use permitdesk_realtime::RealtimeHub;
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    hub: Option<Arc<RealtimeHub>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub realtime: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, hub: Option<Arc<RealtimeHub>>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, hub })
}

/// Readiness follows the database alone; a disabled hub is reported but never degrades.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "permitdesk-server runtime initialized".to_string(),
        },
        database,
        realtime: realtime_check(state.hub.as_deref()).await,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            warn!(event_name = "system.health.degraded", error = %error, "database check failed");
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn realtime_check(hub: Option<&RealtimeHub>) -> HealthCheck {
    match hub {
        Some(hub) => HealthCheck {
            status: "ready",
            detail: format!("{} connected sessions", hub.session_count().await),
        },
        None => HealthCheck { status: "disabled", detail: "realtime.enabled is false".to_string() },
    }
}
