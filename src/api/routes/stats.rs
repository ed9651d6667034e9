//! Hub statistics endpoint

use axum::{Json, extract::State};

use crate::actors::HubStats;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;

/// GET /api/v1/stats
///
/// Fan-out counters straight from the hub control loop
pub async fn get_stats(State(state): State<ApiState>) -> ApiResult<Json<HubStats>> {
    state
        .hub
        .stats()
        .await
        .map(Json)
        .ok_or(ApiError::HubUnavailable)
}
