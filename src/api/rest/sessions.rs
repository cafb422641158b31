use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::orchestrator::{self, SessionRuntime};
use crate::engine::{ingest, viewport};
use crate::error::AppError;
use crate::models::sample::GeoPoint;
use crate::models::session::DeliverySession;
use crate::models::status::DeliveryStatus;
use crate::models::viewport::ViewportDirective;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", post(open_session).get(list_sessions))
        .route("/sessions/:id", get(get_session).delete(close_session))
        .route("/sessions/:id/status", put(set_status))
        .route("/sessions/:id/trajectory", get(get_trajectory))
        .route("/sessions/:id/viewport", get(get_viewport))
        .route("/sessions/:id/locate", post(locate_courier))
}

#[derive(Deserialize)]
pub struct OpenSessionRequest {
    pub delivery_id: u64,
}

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub status: DeliveryStatus,
}

#[derive(Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub delivery_id: u64,
    pub status: DeliveryStatus,
    pub restaurant_location: Option<GeoPoint>,
    pub customer_address: String,
    pub customer_location: Option<GeoPoint>,
    pub courier_location: Option<GeoPoint>,
    pub trajectory_len: usize,
    pub delivery_started_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub is_acquiring_location: bool,
}

impl SessionView {
    fn from_session(session: &DeliverySession) -> Self {
        Self {
            session_id: session.session_id,
            delivery_id: session.delivery_id,
            status: session.status,
            restaurant_location: session.restaurant_location,
            customer_address: session.customer_address.clone(),
            customer_location: session.customer_location,
            courier_location: session.courier_location(),
            trajectory_len: session.trajectory.len(),
            delivery_started_at: session.delivery_started_at,
            delivered_at: session.delivered_at,
            is_acquiring_location: session.is_acquiring_location,
        }
    }
}

#[derive(Serialize)]
pub struct LocateResponse {
    pub point: GeoPoint,
    /// Whether the fix was recorded into the trajectory (only while the
    /// delivery is en route).
    pub recorded: bool,
}

fn find(state: &AppState, id: Uuid) -> Result<Arc<SessionRuntime>, AppError> {
    state
        .sessions
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))
}

async fn open_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OpenSessionRequest>,
) -> Result<Json<SessionView>, AppError> {
    let runtime = orchestrator::open_session(&state, payload.delivery_id).await?;
    let session = runtime.session.lock().await;
    Ok(Json(SessionView::from_session(&session)))
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionView>> {
    let runtimes: Vec<Arc<SessionRuntime>> = state
        .sessions
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    let mut views = Vec::with_capacity(runtimes.len());
    for runtime in runtimes {
        let session = runtime.session.lock().await;
        views.push(SessionView::from_session(&session));
    }
    Json(views)
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let runtime = find(&state, id)?;
    let session = runtime.session.lock().await;
    Ok(Json(SessionView::from_session(&session)))
}

async fn close_session(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> StatusCode {
    // closing twice (or closing an unknown id) is deliberately a no-op
    orchestrator::close_session(&state, id).await;
    StatusCode::NO_CONTENT
}

async fn set_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetStatusRequest>,
) -> Result<Json<SessionView>, AppError> {
    let runtime = find(&state, id)?;
    orchestrator::set_status(&state, &runtime, payload.status).await?;

    let session = runtime.session.lock().await;
    Ok(Json(SessionView::from_session(&session)))
}

async fn get_trajectory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<GeoPoint>>, AppError> {
    let runtime = find(&state, id)?;
    let session = runtime.session.lock().await;
    Ok(Json(ingest::full_trajectory(&session).collect()))
}

async fn get_viewport(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ViewportDirective>, AppError> {
    let runtime = find(&state, id)?;
    let session = runtime.session.lock().await;
    let directive = viewport::compute_viewport(&orchestrator::framing_input(&session));
    Ok(Json(directive))
}

async fn locate_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LocateResponse>, AppError> {
    let runtime = find(&state, id)?;
    let (point, recorded) = orchestrator::locate_once(&state, &runtime).await?;
    Ok(Json(LocateResponse { point, recorded }))
}
