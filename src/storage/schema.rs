//! Database row representation of a measurement
//!
//! Metadata is stored as a JSON object string so new annotations never need a
//! migration. Timestamps are Unix milliseconds (UTC).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::error::{StorageError, StorageResult};
use crate::metrics::{Measurement, MeasurementId, MetricKind};

/// A single measurement row as stored in the database
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRow {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub magnitude: f64,
    pub unit: String,
    pub metadata: String,
    pub timestamp: i64,
}

impl MeasurementRow {
    pub fn from_measurement(measurement: &Measurement) -> StorageResult<Self> {
        Ok(Self {
            id: measurement.id().to_string(),
            kind: measurement.kind().to_string(),
            name: measurement.name().to_string(),
            magnitude: measurement.value().magnitude(),
            unit: measurement.value().unit().to_string(),
            metadata: serde_json::to_string(measurement.metadata())?,
            timestamp: measurement.timestamp().timestamp_millis(),
        })
    }

    /// Rebuild the measurement, re-running value validation
    pub fn into_measurement(self) -> StorageResult<Measurement> {
        let id = MeasurementId::parse(&self.id)?;
        let kind: MetricKind = self.kind.parse()?;
        let metadata: HashMap<String, String> = serde_json::from_str(&self.metadata)?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(self.timestamp).ok_or_else(|| {
            StorageError::CorruptRow(format!("timestamp {} out of range", self.timestamp))
        })?;

        Ok(Measurement::restore(
            id,
            kind,
            self.name,
            self.magnitude,
            self.unit,
            metadata,
            timestamp,
        )?)
    }
}
