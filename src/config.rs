use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

use crate::util::EnvOverrides;

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory ring buffer (no persistence across restarts)
    Memory,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Retention period in days (measurements older than this are deleted)
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./measurements.db")
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct PipelineConfig {
    /// Seconds between two collection ticks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound for one tick (collector + persistence)
    #[serde(default = "default_tick_timeout_secs")]
    pub tick_timeout_secs: u64,

    /// Allowed clock skew for sample timestamps
    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u64,

    /// Samples older than this are considered implausible
    #[serde(default = "default_max_sample_age_secs")]
    pub max_sample_age_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            tick_timeout_secs: default_tick_timeout_secs(),
            clock_skew_secs: default_clock_skew_secs(),
            max_sample_age_secs: default_max_sample_age_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_secs(self.tick_timeout_secs)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    pub fn max_sample_age(&self) -> Duration {
        Duration::from_secs(self.max_sample_age_secs)
    }
}

fn default_interval_secs() -> u64 {
    2
}

fn default_tick_timeout_secs() -> u64 {
    10
}

fn default_clock_skew_secs() -> u64 {
    5
}

fn default_max_sample_age_secs() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct HubConfig {
    /// Per-subscriber outbound queue size
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Snapshot/alert intake size
    #[serde(default = "default_intake_capacity")]
    pub broadcast_capacity: usize,

    /// Register/unregister intake size
    #[serde(default = "default_intake_capacity")]
    pub control_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            broadcast_capacity: default_intake_capacity(),
            control_capacity: default_intake_capacity(),
        }
    }
}

fn default_mailbox_capacity() -> usize {
    256
}

fn default_intake_capacity() -> usize {
    64
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ConnectionConfig {
    /// Deadline for a single outbound write
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,

    /// Read deadline, refreshed on every pong
    #[serde(default = "default_pong_wait_secs")]
    pub pong_wait_secs: u64,

    /// Interval between pings; must be shorter than `pong_wait_secs`
    #[serde(default = "default_ping_period_secs")]
    pub ping_period_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            write_timeout_secs: default_write_timeout_secs(),
            pong_wait_secs: default_pong_wait_secs(),
            ping_period_secs: default_ping_period_secs(),
        }
    }
}

fn default_write_timeout_secs() -> u64 {
    10
}

fn default_pong_wait_secs() -> u64 {
    60
}

fn default_ping_period_secs() -> u64 {
    54
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ApiSettings {
    /// Bind address (e.g. "0.0.0.0:8080")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Optional token required for REST routes and the stream handshake
    pub auth_token: Option<String>,

    /// Origins allowed to open a stream; empty means any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            auth_token: None,
            allowed_origins: Vec::new(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], crate::util::get_default_port()))
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Webhook {
    pub url: String,

    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Storage configuration (defaults to SQLite)
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiSettings,

    /// Optional re-export of every persisted batch
    pub metrics_sink: Option<Webhook>,

    /// Optional event bus for batch and critical notifications
    pub event_bus: Option<Webhook>,
}

impl Config {
    /// Reject values that would stall the pipeline or break liveness
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pipeline.interval_secs == 0 {
            anyhow::bail!("pipeline.interval_secs must be greater than 0");
        }

        if self.pipeline.tick_timeout_secs == 0 {
            anyhow::bail!("pipeline.tick_timeout_secs must be greater than 0");
        }

        if self.hub.mailbox_capacity == 0
            || self.hub.broadcast_capacity == 0
            || self.hub.control_capacity == 0
        {
            anyhow::bail!("hub capacities must be greater than 0");
        }

        let connection = &self.connection;
        if connection.write_timeout_secs == 0 || connection.ping_period_secs == 0 {
            anyhow::bail!("connection timeouts must be greater than 0");
        }

        if connection.ping_period_secs >= connection.pong_wait_secs {
            anyhow::bail!(
                "connection.ping_period_secs ({}) must be shorter than connection.pong_wait_secs ({})",
                connection.ping_period_secs,
                connection.pong_wait_secs
            );
        }

        Ok(())
    }

    /// Apply `PULSEWIRE_*` environment overrides
    pub fn apply_env(self) -> Self {
        self.apply_overrides(EnvOverrides::from_env())
    }

    /// Apply overrides on top of the loaded values; address and port replace
    /// only their own half of `api.bind_addr`
    pub fn apply_overrides(mut self, overrides: EnvOverrides) -> Self {
        if let Some(addr) = overrides.addr {
            self.api.bind_addr.set_ip(addr);
        }

        if let Some(port) = overrides.port {
            self.api.bind_addr.set_port(port);
        }

        if let Some(token) = overrides.token {
            self.api.auth_token = Some(token);
        }

        self
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config = serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
