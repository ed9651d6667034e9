//! API error types and conversions

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::storage::StorageError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Query against the store failed
    Storage(StorageError),

    /// Hub control loop has stopped
    HubUnavailable,

    /// Bad path or query parameter
    InvalidRequest(String),

    /// Nothing recorded for the requested window
    NotFound(String),

    /// Stream handshake from an origin outside the allow-list
    Forbidden(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Storage(err) if err.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::HubUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match self {
            ApiError::Storage(err) => {
                error!("storage query failed: {err}");
                err.to_string()
            }
            ApiError::HubUnavailable => "hub is not running".to_string(),
            ApiError::InvalidRequest(msg) | ApiError::NotFound(msg) | ApiError::Forbidden(msg) => {
                msg
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err)
    }
}
