//! API response and query types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::metrics::{Measurement, MetricKind};
use crate::metrics::aggregator::Summary;

/// Default look-back window of the summary route
pub const DEFAULT_SUMMARY_MINUTES: u64 = 60;

/// Longest accepted look-back window (one week)
pub const MAX_SUMMARY_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`
    pub status: String,
    pub timestamp: String,
    pub subscribers: usize,
    pub storage: StorageHealth,
}

#[derive(Debug, Serialize)]
pub struct StorageHealth {
    pub healthy: bool,
    pub message: String,
}

/// Latest stored measurement per kind
#[derive(Debug, Serialize)]
pub struct CurrentMetricsResponse {
    pub timestamp: String,
    pub metrics: BTreeMap<MetricKind, Measurement>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub minutes: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub metric_type: MetricKind,
    pub unit: &'static str,
    pub minutes: u64,
    pub from: String,
    pub to: String,
    #[serde(flatten)]
    pub summary: Summary,
}

/// Handshake parameters of the stream route
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub token: Option<String>,
}
