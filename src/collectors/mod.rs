//! Collector port
//!
//! A collector produces raw, unvalidated samples. Turning them into
//! [`Measurement`](crate::metrics::Measurement)s is the orchestrator's job, so a
//! collector never has to know about units ranges or thresholds.

pub mod system;

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::metrics::MetricKind;

pub use system::SystemCollector;

/// One reading as reported by a sensor
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub kind: MetricKind,

    /// Sensor name, e.g. `cpu_usage`
    pub name: String,

    pub value: f64,

    /// Free-form sensor metadata; a `unit` key overrides the kind's default unit
    pub metadata: HashMap<String, String>,
}

impl RawSample {
    pub fn new(kind: MetricKind, name: impl Into<String>, value: f64) -> Self {
        Self {
            kind,
            name: name.into(),
            value,
            metadata: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Unit declared by the sensor, falling back to the kind's expected unit
    pub fn unit(&self) -> &str {
        self.metadata
            .get("unit")
            .map(String::as_str)
            .unwrap_or_else(|| self.kind.expected_unit())
    }
}

#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;

    /// Run every sensor once
    async fn collect_all(&self) -> anyhow::Result<Vec<RawSample>>;
}

/// Collector returning canned samples
///
/// Scripted batches are handed out one per call; once the script is
/// exhausted every call returns the fallback batch.
pub struct StaticCollector {
    name: String,
    script: Mutex<VecDeque<Vec<RawSample>>>,
    fallback: Vec<RawSample>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl StaticCollector {
    pub fn new(name: impl Into<String>, samples: Vec<RawSample>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            fallback: samples,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn scripted(name: impl Into<String>, batches: Vec<Vec<RawSample>>) -> Self {
        let mut collector = Self::new(name, Vec::new());
        collector.script = Mutex::new(batches.into());
        collector
    }

    /// Collector whose every call fails with `message`
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut collector = Self::new(name, Vec::new());
        collector.failure = Some(message.into());
        collector
    }

    /// Number of `collect_all` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Collector for StaticCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect_all(&self) -> anyhow::Result<Vec<RawSample>> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if let Some(message) = &self.failure {
            anyhow::bail!("{message}");
        }

        let scripted = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };

        Ok(scripted.unwrap_or_else(|| self.fallback.clone()))
    }
}
