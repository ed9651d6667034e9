//! End-to-end tick scenarios: collector → store → hub → subscriber

use std::sync::Arc;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use pulsewire::{
    actors::{OrchestratorHandle, Payload},
    metrics::{MetricKind, Severity},
    storage::{MemoryBackend, StorageBackend},
};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing::instrument::WithSubscriber;
use tracing_subscriber::layer::SubscriberExt;

use crate::helpers::{
    CapturedLogs, assert_no_payload, hub_with_mailbox, next_payload, orchestrator, sample,
};

#[tokio::test]
async fn test_invalid_disk_sample_is_dropped() {
    let hub = hub_with_mailbox(16);
    let mut subscription = hub.subscribe().await;
    let store = Arc::new(MemoryBackend::new());

    let orchestrator = orchestrator(
        vec![
            sample(MetricKind::Cpu, 42.0),
            sample(MetricKind::Memory, 61.5),
            sample(MetricKind::Disk, 101.0),
        ],
        store.clone(),
        &hub,
    );

    let logs = CapturedLogs::default();
    let report = orchestrator
        .tick(&CancellationToken::new())
        .with_subscriber(tracing_subscriber::registry().with(logs.clone()))
        .await
        .unwrap();
    assert_eq!(report.accepted, 2);
    assert_eq!(report.dropped, 1);

    let warnings = logs.at(Level::WARN);
    assert_eq!(warnings.len(), 1, "unexpected warnings: {warnings:?}");
    assert!(warnings[0].starts_with("dropping disk sample disk_usage"));

    let latest = store.find_latest().await.unwrap();
    let mut persisted: Vec<MetricKind> = latest.keys().copied().collect();
    persisted.sort();
    assert_eq!(persisted, vec![MetricKind::Cpu, MetricKind::Memory]);

    let payload = next_payload(&mut subscription).await;
    assert_matches!(payload.as_ref(), Payload::Snapshot(snapshot) => {
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.get(MetricKind::Disk).is_none());
    });

    assert_no_payload(&mut subscription).await;
}

#[tokio::test]
async fn test_critical_cpu_raises_alert() {
    let hub = hub_with_mailbox(16);
    let mut subscription = hub.subscribe().await;

    let orchestrator = orchestrator(
        vec![sample(MetricKind::Cpu, 95.0)],
        Arc::new(MemoryBackend::new()),
        &hub,
    );

    orchestrator.tick(&CancellationToken::new()).await.unwrap();

    let snapshot = next_payload(&mut subscription).await;
    assert_matches!(snapshot.as_ref(), Payload::Snapshot(snapshot) => {
        assert!(snapshot.get(MetricKind::Cpu).is_some());
    });

    let alert = next_payload(&mut subscription).await;
    assert_matches!(alert.as_ref(), Payload::Alert(alert) => {
        assert_eq!(alert.level, Severity::Critical);
        assert!(alert.message.contains("95.00%"), "message: {}", alert.message);
    });

    let json = serde_json::to_value(alert.as_ref()).unwrap();
    assert_eq!(json["type"], "alert");
    assert_eq!(json["data"]["level"], "critical");
}

#[tokio::test]
async fn test_periodic_ticks_reach_subscribers() {
    let hub = hub_with_mailbox(16);
    let mut subscription = hub.subscribe().await;

    let handle = OrchestratorHandle::spawn(
        orchestrator(
            vec![sample(MetricKind::Memory, 30.0)],
            Arc::new(MemoryBackend::new()),
            &hub,
        ),
        std::time::Duration::from_millis(50),
    );

    for _ in 0..3 {
        let payload = next_payload(&mut subscription).await;
        assert_eq!(payload.kind(), "snapshot");
    }

    handle.shutdown().await;
    hub.shutdown().await;
}
