//! Metric value model
//!
//! Immutable measurement and classification primitives shared by the whole
//! pipeline. A [`Measurement`] is only ever built through the validating
//! [`MeasurementValue::new`] factory, so every value that reaches the
//! validator, the store or a subscriber is finite and within its unit range.
//!
//! ## Classification
//!
//! ```text
//! kind      warning    critical
//! cpu       75 %       90 %
//! memory    75 %       90 %
//! disk      75 %       90 %
//! network   50 MB/s    100 MB/s
//! ```
//!
//! The critical boundary is inclusive, a critical value is never a warning.

pub mod aggregator;
pub mod validator;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer, ser::SerializeStruct};
use uuid::Uuid;

pub use validator::{ValidationError, Validator};

/// Unit used by all percentage kinds
pub const PERCENT: &str = "%";

/// Unit used for network throughput (10^6 bytes per second)
pub const MEGABYTES_PER_SECOND: &str = "MB/s";

/// Kind of host resource a measurement describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
    Network,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Disk,
        MetricKind::Network,
    ];

    /// The only unit accepted for this kind
    pub fn expected_unit(self) -> &'static str {
        match self {
            MetricKind::Cpu | MetricKind::Memory | MetricKind::Disk => PERCENT,
            MetricKind::Network => MEGABYTES_PER_SECOND,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Disk => "disk",
            MetricKind::Network => "network",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(MetricKind::Cpu),
            "memory" => Ok(MetricKind::Memory),
            "disk" => Ok(MetricKind::Disk),
            "network" => Ok(MetricKind::Network),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// Static warning/critical thresholds for one kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
}

impl Thresholds {
    pub const fn for_kind(kind: MetricKind) -> Thresholds {
        match kind {
            MetricKind::Cpu | MetricKind::Memory | MetricKind::Disk => Thresholds {
                warning: 75.0,
                critical: 90.0,
            },
            MetricKind::Network => Thresholds {
                warning: 50.0,
                critical: 100.0,
            },
        }
    }
}

/// Classification of a value against its kind's thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Ok => f.write_str("ok"),
            Severity::Warning => f.write_str("warning"),
            Severity::Critical => f.write_str("critical"),
        }
    }
}

/// Numeric magnitude plus unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementValue {
    magnitude: f64,
    unit: String,
}

impl MeasurementValue {
    /// Build a value, rejecting non-finite, negative and out-of-unit-range
    /// magnitudes.
    pub fn new(magnitude: f64, unit: impl Into<String>) -> Result<Self, ValidationError> {
        let unit = unit.into();

        if !magnitude.is_finite() {
            return Err(ValidationError::NotFinite { unit });
        }

        if magnitude < 0.0 {
            return Err(ValidationError::Negative { magnitude, unit });
        }

        if unit == PERCENT && magnitude > 100.0 {
            return Err(ValidationError::OutOfRange {
                magnitude,
                min: 0.0,
                max: 100.0,
                unit,
            });
        }

        Ok(Self { magnitude, unit })
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn severity(&self, kind: MetricKind) -> Severity {
        let Thresholds { warning, critical } = Thresholds::for_kind(kind);
        if self.magnitude >= critical {
            Severity::Critical
        } else if self.magnitude >= warning {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }

    pub fn is_warning(&self, kind: MetricKind) -> bool {
        self.severity(kind) == Severity::Warning
    }

    pub fn is_critical(&self, kind: MetricKind) -> bool {
        self.severity(kind) == Severity::Critical
    }
}

impl fmt::Display for MeasurementValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}{}", self.magnitude, self.unit)
    }
}

/// Opaque measurement identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementId(Uuid);

impl MeasurementId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ValidationError::InvalidId(e.to_string()))
    }
}

impl Default for MeasurementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One timestamped reading of a host resource
///
/// The only mutation is [`Measurement::annotate`], which the orchestrator
/// performs before the batch is persisted. Persisted measurements are moved
/// into `Arc`s and shared read-only from then on.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    id: MeasurementId,
    kind: MetricKind,
    name: String,
    value: MeasurementValue,
    metadata: HashMap<String, String>,
    timestamp: DateTime<Utc>,
}

impl Measurement {
    pub fn new(
        kind: MetricKind,
        name: impl Into<String>,
        value: MeasurementValue,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MeasurementId::new(),
            kind,
            name: name.into(),
            value,
            metadata: HashMap::new(),
            timestamp,
        }
    }

    /// Rebuild a stored measurement, running the magnitude back through the
    /// validating factory.
    pub fn restore(
        id: MeasurementId,
        kind: MetricKind,
        name: String,
        magnitude: f64,
        unit: String,
        metadata: HashMap<String, String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id,
            kind,
            name,
            value: MeasurementValue::new(magnitude, unit)?,
            metadata,
            timestamp,
        })
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn id(&self) -> MeasurementId {
        self.id
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &MeasurementValue {
        &self.value
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn severity(&self) -> Severity {
        self.value.severity(self.kind)
    }

    pub fn is_warning(&self) -> bool {
        self.value.is_warning(self.kind)
    }

    pub fn is_critical(&self) -> bool {
        self.value.is_critical(self.kind)
    }
}

impl AsRef<Measurement> for Measurement {
    fn as_ref(&self) -> &Measurement {
        self
    }
}

impl Serialize for Measurement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Measurement", 8)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("metric_type", &self.kind)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("value", &self.value.magnitude)?;
        state.serialize_field("unit", &self.value.unit)?;
        state.serialize_field("status", &self.severity())?;
        state.serialize_field("metadata", &self.metadata)?;
        state.serialize_field("timestamp", &self.timestamp.to_rfc3339())?;
        state.end()
    }
}
