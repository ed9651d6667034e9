//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::MeasurementRow;
use crate::metrics::{Measurement, MetricKind};

const SELECT_COLUMNS: &str =
    "SELECT id, kind, name, magnitude, unit, metadata, timestamp FROM measurements";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for WAL mode
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn row_to_measurement(row: &SqliteRow) -> StorageResult<Measurement> {
        MeasurementRow {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            name: row.try_get("name")?,
            magnitude: row.try_get("magnitude")?,
            unit: row.try_get("unit")?,
            metadata: row.try_get("metadata")?,
            timestamp: row.try_get("timestamp")?,
        }
        .into_measurement()
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, measurements), fields(count = measurements.len()))]
    async fn save_batch(&self, measurements: &[Measurement]) -> StorageResult<()> {
        if measurements.is_empty() {
            return Ok(());
        }

        let rows = measurements
            .iter()
            .map(MeasurementRow::from_measurement)
            .collect::<StorageResult<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;

        for row in rows {
            sqlx::query(
                "INSERT INTO measurements (id, kind, name, magnitude, unit, metadata, timestamp) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(row.id)
            .bind(row.kind)
            .bind(row.name)
            .bind(row.magnitude)
            .bind(row.unit)
            .bind(row.metadata)
            .bind(row.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!("inserted {} measurements", measurements.len());
        Ok(())
    }

    async fn find_latest(&self) -> StorageResult<HashMap<MetricKind, Measurement>> {
        let mut latest = HashMap::new();

        for kind in MetricKind::ALL {
            let row = sqlx::query(&format!(
                "{SELECT_COLUMNS} WHERE kind = ? ORDER BY timestamp DESC LIMIT 1"
            ))
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                latest.insert(kind, Self::row_to_measurement(&row)?);
            }
        }

        Ok(latest)
    }

    async fn query_range(
        &self,
        kind: MetricKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<Measurement>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE kind = ? AND timestamp >= ? AND timestamp <= ? ORDER BY timestamp ASC"
        ))
        .bind(kind.as_str())
        .bind(start.timestamp_millis())
        .bind(end.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_measurement).collect()
    }

    async fn cleanup_old_measurements(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM measurements WHERE timestamp < ?")
            .bind(before.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS total FROM measurements")
            .fetch_one(&self.pool)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| StorageError::UnhealthyBackend(e.to_string()))?;

        Ok(HealthStatus {
            healthy: true,
            message: format!("SQLite: {count} measurements"),
            metadata: HashMap::from([
                ("backend".to_string(), "sqlite".to_string()),
                ("path".to_string(), self.db_path.clone()),
                ("total_measurements".to_string(), count.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing SQLite pool");
        self.pool.close().await;
        Ok(())
    }
}
