//! API shared state

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::actors::HubHandle;
use crate::config::{ApiSettings, ConnectionConfig};
use crate::storage::StorageBackend;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Hub that stream connections register with
    pub hub: HubHandle,

    /// Store for current-state and summary queries
    pub store: Arc<dyn StorageBackend>,

    /// Liveness settings for every stream connection
    pub connection: ConnectionConfig,

    /// Token and origin checks for the handshake
    pub settings: Arc<ApiSettings>,

    /// Cancelled when the server shuts down; closes open streams
    pub shutdown: CancellationToken,
}

impl ApiState {
    pub fn new(
        hub: HubHandle,
        store: Arc<dyn StorageBackend>,
        connection: ConnectionConfig,
        settings: ApiSettings,
    ) -> Self {
        Self {
            hub,
            store,
            connection,
            settings: Arc::new(settings),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}
