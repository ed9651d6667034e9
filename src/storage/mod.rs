//! Storage backends for measurement persistence
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Batch-oriented**: One tick is written as one atomic batch
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database with WAL mode
//! - **In-Memory**: Ring buffer per kind, for tests and live-only deployments
//!
//! ## Usage
//!
//! ```no_run
//! use pulsewire::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./measurements.db").await?;
//!     let latest = backend.find_latest().await?;
//!     println!("{} kinds stored", latest.len());
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod backend;
pub mod error;
pub mod memory;
pub mod retention;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;

use crate::config::StorageConfig;

/// Build the backend described by the configuration
pub async fn open_backend(config: &StorageConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path, .. } => Ok(Arc::new(sqlite::SqliteBackend::new(path).await?)),
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::Unsupported(
            "binary built without the storage-sqlite feature".to_string(),
        )),
    }
}
