//! CollectionOrchestrator - Drives one collection tick at a time
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → collect → convert/validate → save_batch ─► Snapshot → hub ─► Alerts → hub
//!     ↑        └──────────── tick_timeout ────────────┘                     │
//!     │                                                      spawn [sink, event bus]
//!     └─── Commands (PollNow, UpdateInterval, Shutdown)
//! ```
//!
//! Nothing reaches a subscriber before the batch it came from is durable. A
//! failed save aborts the tick without broadcasting. Side publishers run
//! after the broadcasts in their own task.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::collectors::{Collector, RawSample};
use crate::metrics::{Measurement, MeasurementValue, ValidationError, Validator};
use crate::publish::{EventBus, MetricsSink, TOPIC_ALERTS_CRITICAL, TOPIC_METRICS_COLLECTED};
use crate::storage::{StorageBackend, StorageError};

use super::hub::Broadcaster;
use super::messages::{Alert, OrchestratorCommand, Snapshot, TickReport};

/// Default upper bound for collection plus persistence of one tick
pub const DEFAULT_TICK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default upper bound for a single side publisher call
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Reasons a tick ended without broadcasting
#[derive(Debug)]
pub enum TickError {
    /// The collector failed; the schedule continues
    Collector(anyhow::Error),

    /// The accepted batch could not be persisted
    Persistence(StorageError),

    /// The tick exceeded its deadline
    TimedOut(Duration),

    /// Shutdown was requested mid-tick
    Cancelled,
}

impl fmt::Display for TickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickError::Collector(err) => write!(f, "collector failed: {err:#}"),
            TickError::Persistence(err) => write!(f, "failed to persist batch: {err}"),
            TickError::TimedOut(after) => write!(f, "tick timed out after {after:?}"),
            TickError::Cancelled => write!(f, "tick cancelled"),
        }
    }
}

impl std::error::Error for TickError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TickError::Collector(err) => Some(&**err),
            TickError::Persistence(err) => Some(err),
            _ => None,
        }
    }
}

/// Per-tick driver
///
/// Holds the ports it sequences; optional publishers are checked once per
/// call site.
pub struct Orchestrator {
    collector: Arc<dyn Collector>,
    store: Arc<dyn StorageBackend>,
    broadcaster: Arc<dyn Broadcaster>,
    metrics_sink: Option<Arc<dyn MetricsSink>>,
    event_bus: Option<Arc<dyn EventBus>>,
    validator: Validator,
    tick_timeout: Duration,
    publish_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        collector: Arc<dyn Collector>,
        store: Arc<dyn StorageBackend>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            collector,
            store,
            broadcaster,
            metrics_sink: None,
            event_bus: None,
            validator: Validator::default(),
            tick_timeout: DEFAULT_TICK_TIMEOUT,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_tick_timeout(mut self, tick_timeout: Duration) -> Self {
        self.tick_timeout = tick_timeout;
        self
    }

    /// Upper bound for each side publisher call
    pub fn with_publish_timeout(mut self, publish_timeout: Duration) -> Self {
        self.publish_timeout = publish_timeout;
        self
    }

    pub fn with_metrics_sink(mut self, sink: Option<Arc<dyn MetricsSink>>) -> Self {
        self.metrics_sink = sink;
        self
    }

    pub fn with_event_bus(mut self, bus: Option<Arc<dyn EventBus>>) -> Self {
        self.event_bus = bus;
        self
    }

    /// Run one tick
    ///
    /// Sample-level failures never fail the tick; they only show up in
    /// `TickReport::dropped`.
    #[instrument(skip_all, fields(collector = %self.collector.name()))]
    pub async fn tick(&self, cancel: &CancellationToken) -> Result<TickReport, TickError> {
        let persisted = self.collect_and_persist(cancel).await?;
        Ok(self.deliver(persisted))
    }

    /// Run one tick, bounding collection and persistence by the tick timeout
    ///
    /// Delivery to the hub never blocks, so once the batch is durable it is
    /// always broadcast.
    #[instrument(skip_all, fields(collector = %self.collector.name()))]
    pub async fn tick_with_deadline(
        &self,
        parent: &CancellationToken,
    ) -> Result<TickReport, TickError> {
        let cancel = parent.child_token();

        let persisted = tokio::select! {
            result = self.collect_and_persist(&cancel) => result?,
            _ = time::sleep(self.tick_timeout) => {
                cancel.cancel();
                return Err(TickError::TimedOut(self.tick_timeout));
            }
        };

        Ok(self.deliver(persisted))
    }

    async fn collect_and_persist(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Persisted, TickError> {
        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TickError::Cancelled),
            result = self.collector.collect_all() => result.map_err(TickError::Collector)?,
        };

        let mut report = TickReport {
            collected: raw.len(),
            ..TickReport::default()
        };

        let collected_at = Utc::now();
        let mut batch = Vec::with_capacity(raw.len());
        for sample in raw {
            let (kind, name) = (sample.kind, sample.name.clone());
            match self.admit(sample, collected_at) {
                Ok(measurement) => batch.push(measurement),
                Err(e) => {
                    warn!("dropping {kind} sample {name}: {e}");
                    report.dropped += 1;
                }
            }
        }
        report.accepted = batch.len();

        if batch.is_empty() {
            debug!("no samples survived validation, skipping persistence");
            return Ok(Persisted {
                report,
                batch,
                collected_at,
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TickError::Cancelled),
            result = self.store.save_batch(&batch) => result.map_err(TickError::Persistence)?,
        }
        trace!("persisted {} measurements", batch.len());

        Ok(Persisted {
            report,
            batch,
            collected_at,
        })
    }

    /// Broadcast a durable batch, then hand it to the side publishers
    fn deliver(&self, persisted: Persisted) -> TickReport {
        let Persisted {
            mut report,
            batch,
            collected_at,
        } = persisted;

        if batch.is_empty() {
            return report;
        }

        let mut side = SidePublish {
            metrics_sink: self.metrics_sink.clone(),
            event_bus: self.event_bus.clone(),
            batch: self.metrics_sink.as_ref().map(|_| batch.clone()),
            collected_event: self.event_bus.as_ref().map(|_| self.collected_event(&batch)),
            critical_events: Vec::new(),
            timeout: self.publish_timeout,
        };

        // read-only from here on
        let batch: Vec<Arc<Measurement>> = batch.into_iter().map(Arc::new).collect();

        let snapshot = Snapshot::from_measurements(collected_at, &batch);
        match self.broadcaster.broadcast(snapshot) {
            Ok(()) => report.broadcast = true,
            Err(e) => warn!("snapshot not broadcast: {e}"),
        }

        for measurement in &batch {
            let Some(alert) = Alert::from_critical(Arc::clone(measurement)) else {
                continue;
            };

            report.alerts += 1;
            if side.event_bus.is_some() {
                if let Ok(event) = serde_json::to_value(&alert) {
                    side.critical_events.push(event);
                }
            }

            if let Err(e) = self.broadcaster.broadcast_alert(alert) {
                warn!("alert for {} not broadcast: {e}", measurement.kind());
            }
        }

        if side.has_work() {
            tokio::spawn(side.run());
        }

        report
    }

    /// Convert and validate a single raw sample
    fn admit(
        &self,
        sample: RawSample,
        collected_at: chrono::DateTime<Utc>,
    ) -> Result<Measurement, ValidationError> {
        let value = MeasurementValue::new(sample.value, sample.unit())?;
        let mut measurement =
            Measurement::new(sample.kind, sample.name.as_str(), value, collected_at)
                .with_metadata(sample.metadata);

        self.validator.validate(&measurement)?;
        self.validator.is_reasonable(&measurement)?;

        measurement.annotate("collector", self.collector.name());
        measurement.annotate("source", sample.name);

        Ok(measurement)
    }

    fn collected_event(&self, batch: &[Measurement]) -> serde_json::Value {
        let kinds: Vec<&str> = batch.iter().map(|m| m.kind().as_str()).collect();
        json!({
            "collector": self.collector.name(),
            "count": batch.len(),
            "kinds": kinds,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }
}

/// Outcome of the bounded half of a tick
struct Persisted {
    report: TickReport,
    batch: Vec<Measurement>,
    collected_at: chrono::DateTime<Utc>,
}

/// Best-effort publishing of one tick, run detached from the tick itself
///
/// Every call is bounded by `timeout`; a slow or failing publisher only
/// delays the calls queued behind it in this task.
struct SidePublish {
    metrics_sink: Option<Arc<dyn MetricsSink>>,
    event_bus: Option<Arc<dyn EventBus>>,
    batch: Option<Vec<Measurement>>,
    collected_event: Option<serde_json::Value>,
    critical_events: Vec<serde_json::Value>,
    timeout: Duration,
}

impl SidePublish {
    fn has_work(&self) -> bool {
        self.metrics_sink.is_some() || self.event_bus.is_some()
    }

    async fn run(self) {
        if let (Some(sink), Some(batch)) = (&self.metrics_sink, &self.batch) {
            match time::timeout(self.timeout, sink.publish_batch(batch)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("failed to publish batch to metrics sink: {e:#}"),
                Err(_) => warn!("metrics sink timed out after {:?}", self.timeout),
            }
        }

        let Some(bus) = &self.event_bus else {
            return;
        };

        let events = self
            .collected_event
            .into_iter()
            .map(|event| (TOPIC_METRICS_COLLECTED, event))
            .chain(
                self.critical_events
                    .into_iter()
                    .map(|event| (TOPIC_ALERTS_CRITICAL, event)),
            );

        for (topic, event) in events {
            match time::timeout(self.timeout, bus.publish_event(topic, event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("failed to publish {topic} event: {e:#}"),
                Err(_) => warn!("event bus timed out on {topic} after {:?}", self.timeout),
            }
        }
    }
}

/// Actor running the orchestrator on a fixed cadence
pub struct OrchestratorActor {
    orchestrator: Orchestrator,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<OrchestratorCommand>,

    /// Current tick interval
    interval_duration: Duration,

    /// Cancelled on shutdown; every tick runs under a child token
    cancel: CancellationToken,
}

impl OrchestratorActor {
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting orchestrator with {:?} interval", self.interval_duration);

        let mut ticker = time::interval(self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("orchestrator cancelled");
                    break;
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(OrchestratorCommand::PollNow { respond_to }) => {
                            debug!("received PollNow command");
                            let result = self.run_tick().await.map_err(anyhow::Error::new);
                            let _ = respond_to.send(result);
                        }

                        Some(OrchestratorCommand::UpdateInterval { interval_secs }) => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs.max(1));
                            ticker = time::interval(self.interval_duration);
                            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        }

                        Some(OrchestratorCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    let _ = self.run_tick().await;
                }
            }
        }

        debug!("orchestrator stopped");
    }

    async fn run_tick(&self) -> Result<TickReport, TickError> {
        let result = self.orchestrator.tick_with_deadline(&self.cancel).await;

        match &result {
            Ok(report) => trace!(
                "tick done: {} collected, {} accepted, {} dropped, {} alerts",
                report.collected,
                report.accepted,
                report.dropped,
                report.alerts
            ),
            Err(TickError::Cancelled) => debug!("tick cancelled"),
            Err(e) => error!("tick failed: {e}"),
        }

        result
    }
}

/// Handle for controlling the orchestrator
#[derive(Clone)]
pub struct OrchestratorHandle {
    sender: mpsc::Sender<OrchestratorCommand>,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl OrchestratorHandle {
    /// Spawn the periodic loop on the current runtime
    pub fn spawn(orchestrator: Orchestrator, interval: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();

        let actor = OrchestratorActor {
            orchestrator,
            command_rx: cmd_rx,
            interval_duration: interval,
            cancel: cancel.clone(),
        };

        let task = tokio::spawn(actor.run());
        info!("orchestrator running every {:?}", interval);

        Self {
            sender: cmd_tx,
            cancel,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    /// Run a tick now, bypassing the interval timer
    pub async fn poll_now(&self) -> Result<TickReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(OrchestratorCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")?
    }

    /// Update the tick interval
    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(OrchestratorCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    /// Cancel any in-flight tick and wait for the loop to stop
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let _ = self.sender.send(OrchestratorCommand::Shutdown).await;

        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                error!("orchestrator task failed: {e}");
            }
        }
    }
}
