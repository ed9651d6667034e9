//! Helper functions for integration tests

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulsewire::{
    actors::{HubHandle, Orchestrator, Payload, Subscription},
    collectors::{RawSample, StaticCollector},
    config::HubConfig,
    metrics::{Measurement, MeasurementValue, MetricKind},
    storage::{HealthStatus, StorageBackend, StorageError, StorageResult},
};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

pub fn sample(kind: MetricKind, value: f64) -> RawSample {
    let name = match kind {
        MetricKind::Cpu => "cpu_usage",
        MetricKind::Memory => "memory_usage",
        MetricKind::Disk => "disk_usage",
        MetricKind::Network => "net_throughput",
    };
    RawSample::new(kind, name, value)
}

pub fn measurement_at(kind: MetricKind, magnitude: f64, at: DateTime<Utc>) -> Measurement {
    Measurement::new(
        kind,
        "sensor",
        MeasurementValue::new(magnitude, kind.expected_unit()).unwrap(),
        at,
    )
}

pub fn hub_with_mailbox(mailbox_capacity: usize) -> HubHandle {
    HubHandle::spawn(&HubConfig {
        mailbox_capacity,
        ..HubConfig::default()
    })
}

pub fn orchestrator(
    samples: Vec<RawSample>,
    store: Arc<dyn StorageBackend>,
    hub: &HubHandle,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(StaticCollector::new("static", samples)),
        store,
        Arc::new(hub.clone()),
    )
}

/// Next payload of a subscription, failing the test after one second
pub async fn next_payload(subscription: &mut Subscription) -> Arc<Payload> {
    tokio::time::timeout(Duration::from_secs(1), subscription.mailbox.recv())
        .await
        .expect("timed out waiting for payload")
        .expect("mailbox closed")
}

/// Assert that nothing is queued for the subscription
pub async fn assert_no_payload(subscription: &mut Subscription) {
    let result =
        tokio::time::timeout(Duration::from_millis(100), subscription.mailbox.recv()).await;
    assert!(result.is_err(), "unexpected payload: {result:?}");
}

pub async fn wait_for_active(hub: &HubHandle, expected: usize) {
    for _ in 0..200 {
        if hub.active_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "expected {expected} active subscribers, got {}",
        hub.active_count()
    );
}

/// Store whose writes always fail
pub struct FailingStore;

#[async_trait]
impl StorageBackend for FailingStore {
    async fn save_batch(&self, _measurements: &[Measurement]) -> StorageResult<()> {
        Err(StorageError::QueryFailed("database is locked".to_string()))
    }

    async fn find_latest(&self) -> StorageResult<HashMap<MetricKind, Measurement>> {
        Ok(HashMap::new())
    }

    async fn query_range(
        &self,
        _kind: MetricKind,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> StorageResult<Vec<Measurement>> {
        Ok(Vec::new())
    }

    async fn cleanup_old_measurements(&self, _before: DateTime<Utc>) -> StorageResult<usize> {
        Ok(0)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Err(StorageError::UnhealthyBackend("database is locked".to_string()))
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Layer recording every event's level and message
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl CapturedLogs {
    /// Messages logged at exactly `level`
    pub fn at(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = MessageVisitor(String::new());
        event.record(&mut message);
        self.events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), message.0));
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}
