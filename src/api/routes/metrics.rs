//! Current-state and summary queries

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{Duration, Utc};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::api::types::{
    CurrentMetricsResponse, DEFAULT_SUMMARY_MINUTES, MAX_SUMMARY_MINUTES, SummaryQuery,
    SummaryResponse,
};
use crate::metrics::MetricKind;
use crate::metrics::aggregator::{self, AggregateError};

/// GET /api/v1/metrics/current
pub async fn current(State(state): State<ApiState>) -> ApiResult<Json<CurrentMetricsResponse>> {
    let latest = state.store.find_latest().await?;

    Ok(Json(CurrentMetricsResponse {
        timestamp: Utc::now().to_rfc3339(),
        metrics: latest.into_iter().collect(),
    }))
}

/// GET /api/v1/metrics/:kind/summary?minutes=N
pub async fn summary(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<Json<SummaryResponse>> {
    let kind: MetricKind = kind
        .parse()
        .map_err(|_| ApiError::InvalidRequest(format!("unknown metric type: {kind}")))?;

    let minutes = query.minutes.unwrap_or(DEFAULT_SUMMARY_MINUTES);
    if minutes == 0 || minutes > MAX_SUMMARY_MINUTES {
        return Err(ApiError::InvalidRequest(format!(
            "minutes must be between 1 and {MAX_SUMMARY_MINUTES}"
        )));
    }

    let to = Utc::now();
    let from = to - Duration::minutes(minutes as i64);
    let measurements = state.store.query_range(kind, from, to).await?;

    let summary = aggregator::summarize(&measurements).map_err(|e| match e {
        AggregateError::Empty => {
            ApiError::NotFound(format!("no {kind} measurements in the last {minutes} minutes"))
        }
    })?;

    Ok(Json(SummaryResponse {
        metric_type: kind,
        unit: kind.expected_unit(),
        minutes,
        from: from.to_rfc3339(),
        to: to.to_rfc3339(),
        summary,
    }))
}
