use std::sync::Arc;
use std::time::Duration;

use crate::hub::RealtimeHub;

/// Spawns a task that pings every session each `interval`.
///
/// The task runs until aborted through the returned handle.
pub fn start_heartbeat(hub: Arc<RealtimeHub>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));

        loop {
            ticker.tick().await;
            let count = hub.session_count().await;
            tracing::debug!(count, "realtime heartbeat ping");
            hub.ping_all().await;
        }
    })
}
