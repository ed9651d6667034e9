use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pulsewire::{
    actors::{HubHandle, Orchestrator, OrchestratorHandle},
    api::{ApiState, spawn_api_server},
    collectors::SystemCollector,
    config::{Config, StorageConfig, read_config_file},
    metrics::Validator,
    publish::{EventBus, MetricsSink, WebhookEventBus, WebhookSink},
    storage::{
        open_backend,
        retention::{DEFAULT_CLEANUP_INTERVAL, spawn_retention_task},
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults apply when omitted)
    #[arg(short)]
    file: Option<String>,

    /// Log level for pulsewire targets
    #[arg(short, long, default_value_t = LevelFilter::INFO)]
    level: LevelFilter,
}

fn init(level: LevelFilter) {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("pulsewire", level),
        ("pulsewire_hub", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.level);
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    }
    .apply_env();
    config.validate()?;

    let shutdown = CancellationToken::new();

    let store = open_backend(&config.storage)
        .await
        .context("failed to open storage backend")?;

    let retention = match &config.storage {
        StorageConfig::Sqlite { retention_days, .. } => Some(spawn_retention_task(
            store.clone(),
            *retention_days,
            DEFAULT_CLEANUP_INTERVAL,
            shutdown.child_token(),
        )),
        StorageConfig::Memory => None,
    };

    let hub = HubHandle::spawn(&config.hub);

    let metrics_sink = match &config.metrics_sink {
        Some(webhook) => Some(Arc::new(WebhookSink::new(webhook)?) as Arc<dyn MetricsSink>),
        None => None,
    };
    let event_bus = match &config.event_bus {
        Some(webhook) => Some(Arc::new(WebhookEventBus::new(webhook)?) as Arc<dyn EventBus>),
        None => None,
    };

    let pipeline = &config.pipeline;
    let orchestrator = Orchestrator::new(
        Arc::new(SystemCollector::new()),
        store.clone(),
        Arc::new(hub.clone()),
    )
    .with_validator(Validator::new(pipeline.clock_skew(), pipeline.max_sample_age()))
    .with_tick_timeout(pipeline.tick_timeout())
    .with_metrics_sink(metrics_sink)
    .with_event_bus(event_bus);

    let orchestrator = OrchestratorHandle::spawn(orchestrator, pipeline.interval());

    let state = ApiState::new(
        hub.clone(),
        store.clone(),
        config.connection.clone(),
        config.api.clone(),
    )
    .with_shutdown(shutdown.child_token());
    let addr = spawn_api_server(config.api.bind_addr, state).await?;
    info!("pulsewire hub ready on {addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    orchestrator.shutdown().await;
    shutdown.cancel();
    hub.shutdown().await;

    if let Some(retention) = retention {
        if let Err(e) = retention.await {
            error!("retention task failed: {e}");
        }
    }

    if let Err(e) = store.close().await {
        error!("failed to close storage: {e}");
    }

    Ok(())
}
