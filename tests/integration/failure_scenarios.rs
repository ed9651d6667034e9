//! Failure isolation: persistence, collector, publisher and intake failures

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use pulsewire::{
    actors::{
        Broadcaster, HubError, HubHandle, Orchestrator, OrchestratorHandle, Payload, Snapshot,
        TickError,
    },
    collectors::StaticCollector,
    config::HubConfig,
    metrics::{Measurement, MetricKind},
    publish::{EventBus, MetricsSink},
    storage::{MemoryBackend, StorageBackend},
};
use tokio_util::sync::CancellationToken;

use crate::helpers::{
    FailingStore, assert_no_payload, hub_with_mailbox, next_payload, orchestrator, sample,
};

/// Sink that never answers
struct StalledSink;

#[async_trait]
impl MetricsSink for StalledSink {
    async fn publish_batch(&self, _measurements: &[Measurement]) -> anyhow::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Event bus that rejects everything
struct RejectingBus;

#[async_trait]
impl EventBus for RejectingBus {
    async fn publish_event(&self, topic: &str, _event: serde_json::Value) -> anyhow::Result<()> {
        anyhow::bail!("503 from event bus on {topic}")
    }
}

#[tokio::test]
async fn test_failed_save_is_never_visible() {
    let hub = hub_with_mailbox(16);
    let mut subscription = hub.subscribe().await;

    let orchestrator = orchestrator(
        vec![sample(MetricKind::Cpu, 99.0)],
        Arc::new(FailingStore),
        &hub,
    );

    let result = orchestrator.tick(&CancellationToken::new()).await;
    assert_matches!(result, Err(TickError::Persistence(_)));

    assert_no_payload(&mut subscription).await;
}

#[tokio::test]
async fn test_collector_failure_does_not_stop_schedule() {
    let hub = hub_with_mailbox(16);
    let collector = Arc::new(StaticCollector::failing("flaky", "sensor offline"));

    let handle = OrchestratorHandle::spawn(
        Orchestrator::new(
            collector.clone(),
            Arc::new(MemoryBackend::new()),
            Arc::new(hub.clone()),
        ),
        Duration::from_millis(20),
    );

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(collector.calls() >= 3, "schedule must keep ticking");

    let err = handle.poll_now().await.unwrap_err();
    assert!(err.to_string().contains("sensor offline"));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_saturated_intake_drops_newest() {
    // actor never started, so the intake fills up
    let (hub, _actor) = HubHandle::new(&HubConfig {
        broadcast_capacity: 1,
        ..HubConfig::default()
    });

    let snapshot = || Snapshot::from_measurements(chrono::Utc::now(), std::iter::empty());

    assert_eq!(hub.broadcast(snapshot()), Ok(()));
    assert_eq!(hub.broadcast(snapshot()), Err(HubError::Saturated));
}

#[tokio::test]
async fn test_broadcast_after_shutdown_reports_closed() {
    let hub = hub_with_mailbox(4);
    hub.shutdown().await;

    let snapshot = Snapshot::from_measurements(chrono::Utc::now(), std::iter::empty());
    let mut result = hub.broadcast(snapshot.clone());
    for _ in 0..50 {
        if result == Err(HubError::Closed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        result = hub.broadcast(snapshot.clone());
    }

    assert_eq!(result, Err(HubError::Closed));
}

#[tokio::test]
async fn test_broken_publishers_never_hold_back_a_durable_tick() {
    let hub = hub_with_mailbox(16);
    let mut subscription = hub.subscribe().await;
    let store = Arc::new(MemoryBackend::new());

    let orchestrator = orchestrator(vec![sample(MetricKind::Cpu, 95.0)], store.clone(), &hub)
        .with_tick_timeout(Duration::from_millis(500))
        .with_publish_timeout(Duration::from_millis(200))
        .with_metrics_sink(Some(Arc::new(StalledSink)))
        .with_event_bus(Some(Arc::new(RejectingBus)));

    let report = tokio::time::timeout(
        Duration::from_secs(1),
        orchestrator.tick_with_deadline(&CancellationToken::new()),
    )
    .await
    .expect("tick must not wait on publishers")
    .unwrap();

    assert!(report.broadcast);
    assert_eq!(report.alerts, 1);
    assert_eq!(store.find_latest().await.unwrap().len(), 1);

    assert_matches!(next_payload(&mut subscription).await.as_ref(), Payload::Snapshot(_));
    assert_matches!(next_payload(&mut subscription).await.as_ref(), Payload::Alert(_));
}
