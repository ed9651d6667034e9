//! Measurement validation
//!
//! Two levels of checks:
//!
//! - [`Validator::validate`] is the hard gate: unit, sanity range, clock skew.
//! - [`Validator::is_reasonable`] is a softer plausibility check for values
//!   that are inside the hard range but unlikely to be real readings.
//!
//! The orchestrator drops a sample that fails either check and keeps going
//! with the rest of the tick.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{MEGABYTES_PER_SECOND, Measurement, MetricKind};

/// Hard ceiling for network throughput (100 Gbit/s)
pub const NETWORK_HARD_CEILING: f64 = 12_500.0;

/// Soft ceiling for network throughput; values above are flagged as implausible
pub const NETWORK_REASONABLE_CEILING: f64 = 10_000.0;

const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(5);

const DEFAULT_MAX_SAMPLE_AGE: Duration = Duration::from_secs(5 * 60);

/// Reasons a reading is rejected
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Magnitude is NaN or infinite
    NotFinite { unit: String },

    /// Magnitude is below zero
    Negative { magnitude: f64, unit: String },

    /// Magnitude is outside the hard range of its unit or kind
    OutOfRange {
        magnitude: f64,
        min: f64,
        max: f64,
        unit: String,
    },

    /// Unit does not match the one expected for the kind
    UnitMismatch {
        kind: MetricKind,
        expected: &'static str,
        actual: String,
    },

    /// Timestamp lies further in the future than the allowed clock skew
    FutureTimestamp {
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Timestamp is older than the maximum sample age
    Stale {
        timestamp: DateTime<Utc>,
        max_age: Duration,
    },

    /// In range, but not a plausible reading
    Implausible { kind: MetricKind, reason: String },

    /// Unknown metric kind name
    UnknownKind(String),

    /// Malformed measurement identifier
    InvalidId(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NotFinite { unit } => {
                write!(f, "magnitude is not a finite number (unit {unit})")
            }
            ValidationError::Negative { magnitude, unit } => {
                write!(f, "negative magnitude {magnitude}{unit}")
            }
            ValidationError::OutOfRange {
                magnitude,
                min,
                max,
                unit,
            } => write!(
                f,
                "magnitude {magnitude}{unit} outside of [{min}, {max}]{unit}"
            ),
            ValidationError::UnitMismatch {
                kind,
                expected,
                actual,
            } => write!(f, "{kind} expects unit '{expected}', got '{actual}'"),
            ValidationError::FutureTimestamp { timestamp, now } => write!(
                f,
                "timestamp {} is in the future (now {})",
                timestamp.to_rfc3339(),
                now.to_rfc3339()
            ),
            ValidationError::Stale { timestamp, max_age } => write!(
                f,
                "timestamp {} is older than {}s",
                timestamp.to_rfc3339(),
                max_age.as_secs()
            ),
            ValidationError::Implausible { kind, reason } => {
                write!(f, "implausible {kind} reading: {reason}")
            }
            ValidationError::UnknownKind(kind) => write!(f, "unknown metric kind '{kind}'"),
            ValidationError::InvalidId(msg) => write!(f, "invalid measurement id: {msg}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates measurements before they enter the pipeline
#[derive(Debug, Clone)]
pub struct Validator {
    clock_skew: Duration,
    max_sample_age: Duration,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_CLOCK_SKEW, DEFAULT_MAX_SAMPLE_AGE)
    }
}

impl Validator {
    pub fn new(clock_skew: Duration, max_sample_age: Duration) -> Self {
        Self {
            clock_skew,
            max_sample_age,
        }
    }

    /// Hard validation
    pub fn validate(&self, measurement: &Measurement) -> Result<(), ValidationError> {
        self.validate_at(measurement, Utc::now())
    }

    /// Hard validation against an explicit `now`
    pub fn validate_at(
        &self,
        measurement: &Measurement,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        let kind = measurement.kind();
        let value = measurement.value();
        let expected = kind.expected_unit();

        if value.unit() != expected {
            return Err(ValidationError::UnitMismatch {
                kind,
                expected,
                actual: value.unit().to_string(),
            });
        }

        let (min, max) = hard_range(kind);
        let magnitude = value.magnitude();
        if !(min..=max).contains(&magnitude) {
            return Err(ValidationError::OutOfRange {
                magnitude,
                min,
                max,
                unit: value.unit().to_string(),
            });
        }

        let skew =
            chrono::Duration::from_std(self.clock_skew).unwrap_or(chrono::Duration::zero());
        if measurement.timestamp() > now + skew {
            return Err(ValidationError::FutureTimestamp {
                timestamp: measurement.timestamp(),
                now,
            });
        }

        Ok(())
    }

    /// Soft plausibility check
    pub fn is_reasonable(&self, measurement: &Measurement) -> Result<(), ValidationError> {
        self.is_reasonable_at(measurement, Utc::now())
    }

    pub fn is_reasonable_at(
        &self,
        measurement: &Measurement,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        let kind = measurement.kind();
        let magnitude = measurement.value().magnitude();

        match kind {
            MetricKind::Memory | MetricKind::Disk if magnitude == 0.0 => {
                return Err(ValidationError::Implausible {
                    kind,
                    reason: "a running host never reports 0% usage".to_string(),
                });
            }
            MetricKind::Network if magnitude > NETWORK_REASONABLE_CEILING => {
                return Err(ValidationError::Implausible {
                    kind,
                    reason: format!(
                        "{magnitude:.2}{MEGABYTES_PER_SECOND} exceeds {NETWORK_REASONABLE_CEILING}{MEGABYTES_PER_SECOND}"
                    ),
                });
            }
            _ => {}
        }

        let max_age =
            chrono::Duration::from_std(self.max_sample_age).unwrap_or(chrono::Duration::MAX);
        if now - measurement.timestamp() > max_age {
            return Err(ValidationError::Stale {
                timestamp: measurement.timestamp(),
                max_age: self.max_sample_age,
            });
        }

        Ok(())
    }
}

fn hard_range(kind: MetricKind) -> (f64, f64) {
    match kind {
        MetricKind::Cpu | MetricKind::Memory | MetricKind::Disk => (0.0, 100.0),
        MetricKind::Network => (0.0, NETWORK_HARD_CEILING),
    }
}
