//! Periodic retention cleanup
//!
//! Runs once on startup and then on every interval tick until cancelled.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::backend::StorageBackend;

/// Default cleanup interval (daily)
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Delete everything older than `retention_days` once
///
/// Errors are logged, the next interval retries.
pub async fn run_cleanup(backend: &dyn StorageBackend, retention_days: u32) -> usize {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
    debug!("running retention cleanup (deleting data before {})", cutoff);

    match backend.cleanup_old_measurements(cutoff).await {
        Ok(0) => {
            trace!("retention cleanup: no old measurements to delete");
            0
        }
        Ok(deleted) => {
            info!("retention cleanup complete: deleted {} old measurements", deleted);
            deleted
        }
        Err(e) => {
            error!("failed to cleanup old measurements: {}", e);
            0
        }
    }
}

pub fn spawn_retention_task(
    backend: Arc<dyn StorageBackend>,
    retention_days: u32,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // first tick fires immediately, which covers the startup cleanup
        let mut interval = time::interval(every);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("retention task cancelled");
                    break;
                }
                _ = interval.tick() => {
                    run_cleanup(backend.as_ref(), retention_days).await;
                }
            }
        }
    })
}
