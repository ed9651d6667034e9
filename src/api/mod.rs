//! REST API and WebSocket server
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Hub handle** for stream registration and fan-out statistics
//! - **Storage backend** for current-state and summary queries
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check (never authenticated)
//! - `GET /api/v1/stats` - Hub fan-out statistics
//! - `GET /api/v1/metrics/current` - Latest measurement per kind
//! - `GET /api/v1/metrics/{kind}/summary?minutes=N` - Aggregates over a window
//! - `WS /api/v1/stream` - Real-time snapshot and alert stream

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{Router, http::HeaderValue, routing::get};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the router for the given state
pub fn router(state: ApiState) -> Router {
    let mut protected = Router::new()
        .route("/api/v1/stats", get(routes::stats::get_stats))
        .route("/api/v1/metrics/current", get(routes::metrics::current))
        .route("/api/v1/metrics/:kind/summary", get(routes::metrics::summary));

    if let Some(token) = state.settings.auth_token.clone() {
        protected = protected.route_layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    let allowed_origins = &state.settings.allowed_origins;
    let origins = if allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok()),
        )
    };
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/stream", get(websocket::websocket_handler))
        .merge(protected)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Spawn the API server
///
/// Starts an Axum HTTP server in a background task and returns the bound
/// address. The server stops when the state's shutdown token is cancelled.
pub async fn spawn_api_server(
    bind_addr: SocketAddr,
    state: ApiState,
) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", bind_addr);

    let shutdown = state.shutdown.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
