//! In-memory storage backend (no persistence)
//!
//! This backend stores measurements in a ring buffer per metric kind.
//! It's useful for:
//! - Testing without database dependencies
//! - Deployments that only care about live data
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Limited capacity**: Ring buffer size is fixed, oldest entries are evicted

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::backend::{HealthStatus, StorageBackend};
use super::error::StorageResult;
use crate::metrics::{Measurement, MetricKind};

/// Maximum measurements to keep in memory per kind
const MAX_MEASUREMENTS_PER_KIND: usize = 1000;

/// In-memory storage backend
pub struct MemoryBackend {
    measurements: RwLock<HashMap<MetricKind, VecDeque<Measurement>>>,
    capacity: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_capacity(MAX_MEASUREMENTS_PER_KIND)
    }

    /// Create a backend keeping at most `capacity` measurements per kind
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            measurements: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Total measurements currently held
    pub async fn len(&self) -> usize {
        self.measurements.read().await.values().map(VecDeque::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn save_batch(&self, measurements: &[Measurement]) -> StorageResult<()> {
        // one write guard for the whole batch keeps it atomic for readers
        let mut guard = self.measurements.write().await;

        for measurement in measurements {
            let buffer = guard.entry(measurement.kind()).or_default();
            buffer.push_back(measurement.clone());
            if buffer.len() > self.capacity {
                buffer.pop_front();
            }
        }

        trace!("stored {} measurements in memory", measurements.len());
        Ok(())
    }

    async fn find_latest(&self) -> StorageResult<HashMap<MetricKind, Measurement>> {
        let guard = self.measurements.read().await;

        let latest = guard
            .iter()
            .filter_map(|(kind, buffer)| {
                buffer
                    .iter()
                    .max_by_key(|m| m.timestamp())
                    .map(|m| (*kind, m.clone()))
            })
            .collect();

        Ok(latest)
    }

    async fn query_range(
        &self,
        kind: MetricKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<Measurement>> {
        debug!("querying in-memory storage for {kind}");

        let guard = self.measurements.read().await;
        let mut measurements: Vec<Measurement> = guard
            .get(&kind)
            .map(|buffer| {
                buffer
                    .iter()
                    .filter(|m| m.timestamp() >= start && m.timestamp() <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        measurements.sort_by_key(Measurement::timestamp);
        Ok(measurements)
    }

    async fn cleanup_old_measurements(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut guard = self.measurements.write().await;

        let mut deleted = 0;
        for buffer in guard.values_mut() {
            let len = buffer.len();
            buffer.retain(|m| m.timestamp() >= before);
            deleted += len - buffer.len();
        }

        Ok(deleted)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let total = self.len().await;

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("total_measurements".to_string(), total.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
