//! SQLite persistence through the full pipeline

use std::sync::Arc;

use chrono::{Duration, Utc};
use pulsewire::{
    config::StorageConfig,
    metrics::MetricKind,
    storage::{StorageBackend, open_backend, retention::run_cleanup, sqlite::SqliteBackend},
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::helpers::{hub_with_mailbox, measurement_at, orchestrator, sample};

async fn backend(dir: &TempDir) -> SqliteBackend {
    SqliteBackend::new(dir.path().join("measurements.db"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_tick_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let hub = hub_with_mailbox(4);

    {
        let store = Arc::new(backend(&dir).await);
        let orchestrator = orchestrator(
            vec![sample(MetricKind::Cpu, 12.5), sample(MetricKind::Network, 7.25)],
            store.clone(),
            &hub,
        );
        orchestrator.tick(&CancellationToken::new()).await.unwrap();
        store.close().await.unwrap();
    }

    let store = backend(&dir).await;
    let latest = store.find_latest().await.unwrap();

    assert_eq!(latest.len(), 2);
    let cpu = &latest[&MetricKind::Cpu];
    assert_eq!(cpu.value().magnitude(), 12.5);
    assert_eq!(cpu.metadata()["collector"], "static");
    assert_eq!(cpu.metadata()["source"], "cpu_usage");
}

#[tokio::test]
async fn test_query_range_is_bounded_and_ordered() {
    let dir = tempfile::tempdir().unwrap();
    let store = backend(&dir).await;
    let now = Utc::now();

    store
        .save_batch(&[
            measurement_at(MetricKind::Memory, 30.0, now - Duration::minutes(5)),
            measurement_at(MetricKind::Memory, 10.0, now - Duration::minutes(90)),
            measurement_at(MetricKind::Memory, 20.0, now - Duration::minutes(30)),
            measurement_at(MetricKind::Cpu, 99.0, now - Duration::minutes(10)),
        ])
        .await
        .unwrap();

    let range = store
        .query_range(MetricKind::Memory, now - Duration::hours(1), now)
        .await
        .unwrap();

    let magnitudes: Vec<f64> = range.iter().map(|m| m.value().magnitude()).collect();
    assert_eq!(magnitudes, vec![20.0, 30.0]);
}

#[tokio::test]
async fn test_retention_cleanup_deletes_old_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = backend(&dir).await;
    let now = Utc::now();

    store
        .save_batch(&[
            measurement_at(MetricKind::Disk, 50.0, now - Duration::days(31)),
            measurement_at(MetricKind::Disk, 55.0, now - Duration::days(2)),
        ])
        .await
        .unwrap();

    assert_eq!(run_cleanup(&store, 30).await, 1);

    let health = store.health_check().await.unwrap();
    assert!(health.healthy);
    assert_eq!(health.metadata["total_measurements"], "1");
}

#[tokio::test]
async fn test_open_backend_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig::Sqlite {
        path: dir.path().join("configured.db"),
        retention_days: 7,
    };

    let store = open_backend(&config).await.unwrap();
    assert_eq!(store.health_check().await.unwrap().metadata["backend"], "sqlite");

    let memory = open_backend(&StorageConfig::Memory).await.unwrap();
    assert_eq!(memory.health_check().await.unwrap().metadata["backend"], "memory");
}
