use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::status::DeliveryStatus;

/// Failures of the device geolocation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The user or OS denied location access. Terminal for the current
    /// acquisition attempt.
    #[error("location permission denied")]
    PermissionDenied,

    /// The sensor/provider could not resolve a fix.
    #[error("position unavailable")]
    PositionUnavailable,

    /// No fix arrived within the request bound.
    #[error("position request timed out")]
    Timeout,
}

impl LocationError {
    /// Transient errors may be retried (reduced-accuracy fallback, next poll).
    pub fn is_transient(self) -> bool {
        !matches!(self, Self::PermissionDenied)
    }

    /// Stable label used in metrics and events.
    pub fn kind(self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::PositionUnavailable => "position_unavailable",
            Self::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("invalid transition from {current:?} to {requested:?}")]
    InvalidTransition {
        current: DeliveryStatus,
        requested: DeliveryStatus,
    },

    #[error("empty point set")]
    EmptyPointSet,

    #[error("geocoding failed for {address}: {reason}")]
    GeocodingFailure { address: String, reason: String },

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error("upstream api error: {0}")]
    Upstream(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TrackingError> for AppError {
    fn from(err: TrackingError) -> Self {
        match err {
            TrackingError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            TrackingError::EmptyPointSet => AppError::BadRequest(err.to_string()),
            TrackingError::GeocodingFailure { .. } => AppError::UpstreamUnavailable(err.to_string()),
            TrackingError::Location(inner) => AppError::LocationUnavailable(inner.to_string()),
            TrackingError::Upstream(msg) => AppError::UpstreamUnavailable(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::LocationUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::UpstreamUnavailable(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
