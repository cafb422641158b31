//! Ingress for the device platform layer: raw position reports and app
//! visibility changes pushed by the courier's device.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::{AppError, LocationError};
use crate::models::sample::{AccuracyTier, GeoPoint};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/device/fix", post(report_fix))
        .route("/device/visibility", post(report_visibility))
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum DeviceReportRequest {
    Fix {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        tier: Option<AccuracyTier>,
    },
    Failure {
        error: DeviceFailure,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFailure {
    PermissionDenied,
    PositionUnavailable,
}

async fn report_fix(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DeviceReportRequest>,
) -> Result<StatusCode, AppError> {
    match payload {
        DeviceReportRequest::Fix {
            latitude,
            longitude,
            tier,
        } => {
            if !(-90.0..=90.0).contains(&latitude) {
                return Err(AppError::BadRequest(format!(
                    "latitude {latitude} out of range"
                )));
            }
            if !(-180.0..=180.0).contains(&longitude) {
                return Err(AppError::BadRequest(format!(
                    "longitude {longitude} out of range"
                )));
            }

            state.device.report_fix(
                GeoPoint {
                    lat: latitude,
                    lng: longitude,
                },
                tier.unwrap_or(AccuracyTier::High),
            );
        }
        DeviceReportRequest::Failure { error } => {
            let error = match error {
                DeviceFailure::PermissionDenied => LocationError::PermissionDenied,
                DeviceFailure::PositionUnavailable => LocationError::PositionUnavailable,
            };
            state.device.report_failure(error);
        }
    }

    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
pub struct VisibilityRequest {
    pub foreground: bool,
}

async fn report_visibility(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VisibilityRequest>,
) -> StatusCode {
    state.foreground_tx.send_replace(payload.foreground);
    StatusCode::ACCEPTED
}
