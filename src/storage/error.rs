//! Error types for storage operations

use std::fmt;

use crate::metrics::ValidationError;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug)]
pub enum StorageError {
    /// Could not open the database
    ConnectionFailed(String),

    QueryFailed(String),

    MigrationFailed(String),

    /// Metadata column is not a JSON string map
    SerializationError(String),

    /// A stored row no longer passes measurement validation
    CorruptRow(String),

    /// The configured backend is not compiled into this build
    Unsupported(String),

    IoError(std::io::Error),

    /// Pool exhausted, closed or otherwise not answering
    UnhealthyBackend(String),
}

impl StorageError {
    /// Whether the store is unreachable rather than the request being bad
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StorageError::ConnectionFailed(_) | StorageError::UnhealthyBackend(_)
        )
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(msg) => {
                write!(f, "cannot open measurement store: {msg}")
            }
            StorageError::QueryFailed(msg) => write!(f, "measurement query failed: {msg}"),
            StorageError::MigrationFailed(msg) => write!(f, "schema migration failed: {msg}"),
            StorageError::SerializationError(msg) => write!(f, "bad measurement metadata: {msg}"),
            StorageError::CorruptRow(msg) => write!(f, "stored measurement is invalid: {msg}"),
            StorageError::Unsupported(msg) => write!(f, "unsupported storage backend: {msg}"),
            StorageError::IoError(err) => write!(f, "I/O error: {err}"),
            StorageError::UnhealthyBackend(msg) => {
                write!(f, "measurement store unavailable: {msg}")
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

impl From<ValidationError> for StorageError {
    fn from(err: ValidationError) -> Self {
        StorageError::CorruptRow(err.to_string())
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::IoError(io_err),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StorageError::UnhealthyBackend(err.to_string())
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationFailed(err.to_string())
    }
}
