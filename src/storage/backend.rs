//! Storage backend trait definition
//!
//! This module defines the persistence port the pipeline writes through.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use crate::metrics::{Measurement, MetricKind};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for persistent storage backends
///
/// Implementations must be `Send + Sync` as they are shared between the
/// orchestrator, the API handlers and the retention task.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persist a batch of measurements atomically
    ///
    /// Either every measurement of the batch becomes visible or none does.
    /// The orchestrator only broadcasts a tick after this returns `Ok`.
    async fn save_batch(&self, measurements: &[Measurement]) -> StorageResult<()>;

    /// Latest stored measurement for every kind that has one
    async fn find_latest(&self) -> StorageResult<HashMap<MetricKind, Measurement>>;

    /// Measurements of one kind between start and end (inclusive), oldest first
    async fn query_range(
        &self,
        kind: MetricKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<Measurement>>;

    /// Delete measurements older than the specified timestamp
    ///
    /// Returns the number of measurements deleted.
    async fn cleanup_old_measurements(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Lightweight check that the backend is operational
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
