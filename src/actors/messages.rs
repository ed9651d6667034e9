//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Payloads**: Broadcast data fanned out by the hub, shared via `Arc`
//! 3. **Immutability**: Payloads never change after construction, so one
//!    allocation is shared by every subscriber mailbox

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer, ser::SerializeMap};
use tokio::sync::{mpsc, oneshot};

use crate::metrics::{Measurement, MetricKind, Severity};

/// Identity of one live subscriber connection
pub type SubscriberId = uuid::Uuid;

/// Outbound mailbox of a subscriber (written by the hub only)
pub type Mailbox = mpsc::Sender<Arc<Payload>>;

/// Latest accepted measurement per kind for one collection tick
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub measurements: BTreeMap<MetricKind, Arc<Measurement>>,
}

impl Snapshot {
    /// Build a snapshot; later measurements of the same kind replace earlier
    /// ones.
    pub fn from_measurements<'a>(
        timestamp: DateTime<Utc>,
        measurements: impl IntoIterator<Item = &'a Arc<Measurement>>,
    ) -> Self {
        let measurements = measurements
            .into_iter()
            .map(|m| (m.kind(), Arc::clone(m)))
            .collect();

        Self {
            timestamp,
            measurements,
        }
    }

    pub fn get(&self, kind: MetricKind) -> Option<&Measurement> {
        self.measurements.get(&kind).map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.measurements.len() + 1))?;
        map.serialize_entry("timestamp", &self.timestamp.to_rfc3339())?;
        for (kind, measurement) in &self.measurements {
            map.serialize_entry(kind.as_str(), measurement.as_ref())?;
        }
        map.end()
    }
}

/// Critical reading notification; exists only for one broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub measurement: Arc<Measurement>,
    pub level: Severity,
    pub message: String,
}

impl Alert {
    /// Returns `None` unless the measurement is critical
    pub fn from_critical(measurement: Arc<Measurement>) -> Option<Self> {
        if !measurement.is_critical() {
            return None;
        }

        let message = format!(
            "{} usage is critical: {}",
            measurement.kind(),
            measurement.value()
        );

        Some(Self {
            measurement,
            level: Severity::Critical,
            message,
        })
    }
}

impl Serialize for Alert {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("level", &self.level)?;
        map.serialize_entry("metric_type", &self.measurement.kind())?;
        map.serialize_entry("message", &self.message)?;
        map.serialize_entry("timestamp", &self.measurement.timestamp().to_rfc3339())?;
        map.end()
    }
}

/// Wire envelope pushed to subscribers
///
/// ```json
/// {"type":"snapshot","data":{"timestamp":"...","cpu":{...}}}
/// {"type":"alert","data":{"level":"critical","metric_type":"cpu","message":"..."}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Snapshot(Snapshot),
    Alert(Alert),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Snapshot(_) => "snapshot",
            Payload::Alert(_) => "alert",
        }
    }
}

/// Commands accepted on the hub's control intake
#[derive(Debug)]
pub enum HubCommand {
    /// Add a subscriber to the membership set
    Register { id: SubscriberId, mailbox: Mailbox },

    /// Remove a subscriber and close its mailbox (no-op if absent)
    Unregister { id: SubscriberId },

    /// Get fan-out statistics
    GetStats { respond_to: oneshot::Sender<HubStats> },

    /// Stop the control loop and close every mailbox
    Shutdown,
}

/// Fan-out statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Currently registered subscribers
    pub active: usize,

    /// Payloads processed by the control loop
    pub broadcasts: u64,

    /// Successful mailbox enqueues across all subscribers
    pub deliveries: u64,

    /// Subscribers disconnected because their mailbox was full
    pub evictions: u64,

    /// Broadcasts dropped because the intake was saturated
    pub dropped_broadcasts: u64,
}

/// Commands that can be sent to the collection orchestrator
#[derive(Debug)]
pub enum OrchestratorCommand {
    /// Run one tick immediately (bypassing the interval timer)
    PollNow {
        respond_to: oneshot::Sender<anyhow::Result<TickReport>>,
    },

    /// Update the collection interval
    ///
    /// The new interval takes effect after the current tick completes.
    UpdateInterval { interval_secs: u64 },

    /// Gracefully shut down the orchestrator
    Shutdown,
}

/// Outcome of one collection tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Raw samples returned by the collector
    pub collected: usize,

    /// Measurements that survived conversion and validation
    pub accepted: usize,

    /// Samples dropped during conversion or validation
    pub dropped: usize,

    /// Whether the accepted batch was persisted and broadcast
    pub broadcast: bool,

    /// Alerts raised for critical measurements
    pub alerts: usize,
}
