//! Ties the pieces together: session lifecycle, upstream reconciliation,
//! acquisition start/stop side effects, and event emission.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::ingest::{self, SampleRejected};
use crate::engine::transitions;
use crate::engine::viewport::{self, FramingInput};
use crate::error::{LocationError, TrackingError};
use crate::location::provider::PositionFix;
use crate::location::AcquisitionHandle;
use crate::models::event::TrackingEvent;
use crate::models::sample::GeoPoint;
use crate::models::session::DeliverySession;
use crate::models::status::DeliveryStatus;
use crate::models::viewport::ViewportDirective;
use crate::state::AppState;
use crate::upstream::DeliveryUpdate;

/// One open tracking screen. The session itself is owned here; the raw
/// acquisition handle never leaves this module.
pub struct SessionRuntime {
    pub session: Mutex<DeliverySession>,
    acquisition: Mutex<Option<AcquisitionHandle>>,
    last_viewport: Mutex<Option<ViewportDirective>>,
    halt: watch::Sender<bool>,
}

impl SessionRuntime {
    fn new(session: DeliverySession) -> Arc<Self> {
        let (halt, _) = watch::channel(false);
        Arc::new(Self {
            session: Mutex::new(session),
            acquisition: Mutex::new(None),
            last_viewport: Mutex::new(None),
            halt,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StatusEffects {
    start_acquisition: bool,
    stop_acquisition: bool,
}

/// Timestamps the first entry into an en-route or delivered state and
/// reports which acquisition side effects the new status demands.
fn apply_entry_effects(session: &mut DeliverySession, now: DateTime<Utc>) -> StatusEffects {
    let status = session.status;

    if status.is_en_route() && session.delivery_started_at.is_none() {
        session.delivery_started_at = Some(now);
    }
    if status == DeliveryStatus::Delivered && session.delivered_at.is_none() {
        session.delivered_at = Some(now);
    }

    StatusEffects {
        start_acquisition: status.is_en_route(),
        stop_acquisition: status.is_terminal(),
    }
}

/// Fetches the delivery, seeds the session (server-confirmed points replayed
/// through the monotonic gate), kicks off geocoding and acquisition as the
/// snapshot demands, and spawns the refresh poller.
pub async fn open_session(
    state: &Arc<AppState>,
    delivery_id: u64,
) -> Result<Arc<SessionRuntime>, TrackingError> {
    let snapshot = state.upstream.fetch_delivery(delivery_id).await?;

    let mut session = DeliverySession::new(
        delivery_id,
        snapshot.delivery_status,
        state.config.restaurant_location(),
        snapshot.customer.address.clone(),
        snapshot.customer.location.map(Into::into),
    );

    for tracked in &snapshot.tracking {
        ingest::merge_confirmed_point(
            &mut session,
            GeoPoint {
                lat: tracked.latitude,
                lng: tracked.longitude,
            },
            tracked.timestamp,
        );
    }

    let terminal = session.status.is_terminal();
    let effects = if terminal {
        StatusEffects::default()
    } else {
        apply_entry_effects(&mut session, Utc::now())
    };
    let needs_geocode =
        session.customer_location.is_none() && !session.customer_address.trim().is_empty();
    let session_id = session.session_id;

    let runtime = SessionRuntime::new(session);
    state.sessions.insert(session_id, runtime.clone());
    state.metrics.sessions_active.inc();
    info!(delivery_id, %session_id, "tracking session opened");

    if effects.start_acquisition {
        start_acquisition(state, &runtime).await;
    }
    if needs_geocode {
        tokio::spawn(resolve_customer_location(state.clone(), runtime.clone()));
    }
    emit_viewport(state, &runtime).await;

    if terminal {
        let _ = runtime.halt.send_replace(true);
    } else {
        tokio::spawn(run_poller(state.clone(), runtime.clone()));
    }

    Ok(runtime)
}

/// Operator-requested status change. The store is the system of record:
/// nothing changes locally unless the edge is valid and the push succeeded.
pub async fn set_status(
    state: &Arc<AppState>,
    runtime: &Arc<SessionRuntime>,
    requested: DeliveryStatus,
) -> Result<DeliveryStatus, TrackingError> {
    let mut session = runtime.session.lock().await;

    let new_status = match transitions::transition(session.status, requested) {
        Ok(status) => status,
        Err(err) => {
            state
                .metrics
                .status_transitions_total
                .with_label_values(&["rejected"])
                .inc();
            return Err(err);
        }
    };

    let delivery_id = session.delivery_id;
    if let Err(err) = state
        .upstream
        .push_update(delivery_id, DeliveryUpdate::status(new_status))
        .await
    {
        state
            .metrics
            .status_transitions_total
            .with_label_values(&["upstream_error"])
            .inc();
        return Err(err);
    }

    session.status = new_status;
    let effects = apply_entry_effects(&mut session, Utc::now());
    let session_id = session.session_id;
    drop(session);

    state
        .metrics
        .status_transitions_total
        .with_label_values(&["applied"])
        .inc();
    info!(delivery_id, status = ?new_status, "delivery status updated");

    apply_acquisition_effects(state, runtime, effects).await;
    emit(
        state,
        TrackingEvent::StatusChanged {
            session_id,
            delivery_id,
            status: new_status,
        },
    );
    emit_viewport(state, runtime).await;

    Ok(new_status)
}

/// Re-fetches the delivery and reconciles. The server is authoritative when
/// it is further along; a server status *behind* the local one (manual admin
/// rollback) is ignored. New server-side tracking points are merged through
/// the monotonic gate, covering the courier's own app pushing from another
/// device.
pub async fn refresh(
    state: &Arc<AppState>,
    runtime: &Arc<SessionRuntime>,
) -> Result<(), TrackingError> {
    let delivery_id = { runtime.session.lock().await.delivery_id };
    let snapshot = state.upstream.fetch_delivery(delivery_id).await?;

    let mut adopted = None;
    let mut effects = StatusEffects::default();
    let mut framing_changed = false;

    {
        let mut session = runtime.session.lock().await;

        for tracked in &snapshot.tracking {
            let merged = ingest::merge_confirmed_point(
                &mut session,
                GeoPoint {
                    lat: tracked.latitude,
                    lng: tracked.longitude,
                },
                tracked.timestamp,
            );
            framing_changed |= merged;
        }

        if snapshot.delivery_status != session.status {
            if !session.status.is_terminal()
                && snapshot.delivery_status.rank() > session.status.rank()
            {
                session.status = snapshot.delivery_status;
                effects = apply_entry_effects(&mut session, Utc::now());
                adopted = Some((session.session_id, snapshot.delivery_status));
                framing_changed = true;
            } else {
                warn!(
                    delivery_id,
                    local = ?session.status,
                    server = ?snapshot.delivery_status,
                    "server status not ahead of local; ignoring"
                );
            }
        }

        if session.customer_location.is_none() {
            if let Some(wire) = snapshot.customer.location {
                session.customer_location = Some(wire.into());
                framing_changed = true;
            }
        }
    }

    if let Some((session_id, status)) = adopted {
        info!(delivery_id, status = ?status, "adopted server-reported status");
        apply_acquisition_effects(state, runtime, effects).await;
        emit(
            state,
            TrackingEvent::StatusChanged {
                session_id,
                delivery_id,
                status,
            },
        );
    }
    if framing_changed {
        emit_viewport(state, runtime).await;
    }

    Ok(())
}

/// Manual "locate the courier now": one-shot fix with the reduced-accuracy
/// fallback, recorded into the trajectory only while the delivery is en
/// route. Lets the operator retry after acquisition failures.
pub async fn locate_once(
    state: &Arc<AppState>,
    runtime: &Arc<SessionRuntime>,
) -> Result<(GeoPoint, bool), TrackingError> {
    let fix = state.location.request_one_shot().await?;

    let (delivery_id, accepted) = {
        let mut session = runtime.session.lock().await;
        let delivery_id = session.delivery_id;
        let result = ingest::accept_sample(&mut session, fix.point, fix.tier, Utc::now());
        match result {
            Ok(()) => (delivery_id, true),
            Err(rejected) => {
                state
                    .metrics
                    .samples_rejected_total
                    .with_label_values(&[rejected.reason()])
                    .inc();
                (delivery_id, false)
            }
        }
    };

    if accepted {
        state.metrics.samples_accepted_total.inc();
        if let Err(err) = state
            .upstream
            .push_update(delivery_id, DeliveryUpdate::position(fix.point))
            .await
        {
            warn!(delivery_id, error = %err, "failed to push tracking point upstream");
        }
        emit_viewport(state, runtime).await;
    }

    Ok((fix.point, accepted))
}

/// Stops acquisition and the poller, and forgets the session. Safe to call
/// for an unknown or already-closed session.
pub async fn close_session(state: &Arc<AppState>, session_id: Uuid) -> bool {
    let Some((_, runtime)) = state.sessions.remove(&session_id) else {
        return false;
    };

    stop_acquisition(&runtime).await;
    let _ = runtime.halt.send_replace(true);
    state.metrics.sessions_active.dec();
    info!(%session_id, "tracking session closed");
    true
}

/// Periodic upstream reconciliation while the screen is open. An explicit
/// simplification over a push channel; courier movement granularity is
/// already bounded by the emission throttle.
async fn run_poller(state: Arc<AppState>, runtime: Arc<SessionRuntime>) {
    let mut halt_rx = runtime.halt.subscribe();
    if *halt_rx.borrow_and_update() {
        return;
    }

    let mut interval = tokio::time::interval(state.config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the opening snapshot was fetched moments ago; skip the immediate tick
    interval.tick().await;

    loop {
        tokio::select! {
            _ = halt_rx.changed() => break,
            _ = interval.tick() => {
                let started = Instant::now();
                let outcome = refresh(&state, &runtime).await;
                let elapsed = started.elapsed().as_secs_f64();
                match outcome {
                    Ok(()) => {
                        state
                            .metrics
                            .refresh_latency_seconds
                            .with_label_values(&["success"])
                            .observe(elapsed);
                    }
                    Err(err) => {
                        state
                            .metrics
                            .refresh_latency_seconds
                            .with_label_values(&["error"])
                            .observe(elapsed);
                        warn!(error = %err, "refresh poll failed");
                    }
                }
            }
        }
    }

    debug!("session poller stopped");
}

async fn apply_acquisition_effects(
    state: &Arc<AppState>,
    runtime: &Arc<SessionRuntime>,
    effects: StatusEffects,
) {
    if effects.stop_acquisition {
        stop_acquisition(runtime).await;
        // terminal states also end the refresh loop; the session stays
        // readable until the screen closes it
        let _ = runtime.halt.send_replace(true);
    }
    if effects.start_acquisition {
        start_acquisition(state, runtime).await;
    }
}

async fn start_acquisition(state: &Arc<AppState>, runtime: &Arc<SessionRuntime>) {
    let mut acquisition = runtime.acquisition.lock().await;
    if acquisition.as_ref().is_some_and(|handle| !handle.is_stopped()) {
        return;
    }

    state.location.ensure_ready().await;

    let (sample_tx, sample_rx) = mpsc::channel(16);
    let (error_tx, error_rx) = mpsc::channel(16);
    *acquisition = Some(state.location.start_continuous(sample_tx, error_tx));
    drop(acquisition);

    runtime.session.lock().await.is_acquiring_location = true;
    tokio::spawn(run_sample_pump(
        state.clone(),
        runtime.clone(),
        sample_rx,
        error_rx,
    ));
    debug!("continuous location acquisition started");
}

async fn stop_acquisition(runtime: &SessionRuntime) {
    if let Some(handle) = runtime.acquisition.lock().await.take() {
        handle.stop();
    }
    runtime.session.lock().await.is_acquiring_location = false;
}

/// Drains the acquisition channels into the session until they close.
async fn run_sample_pump(
    state: Arc<AppState>,
    runtime: Arc<SessionRuntime>,
    mut samples: mpsc::Receiver<PositionFix>,
    mut errors: mpsc::Receiver<LocationError>,
) {
    let mut errors_open = true;
    loop {
        tokio::select! {
            fix = samples.recv() => match fix {
                Some(fix) => ingest_device_fix(&state, &runtime, fix).await,
                None => break,
            },
            err = errors.recv(), if errors_open => match err {
                Some(err) => handle_location_error(&state, &runtime, err).await,
                None => errors_open = false,
            },
        }
    }
}

async fn ingest_device_fix(state: &Arc<AppState>, runtime: &Arc<SessionRuntime>, fix: PositionFix) {
    let accepted = {
        let mut session = runtime.session.lock().await;
        if !session.is_acquiring_location {
            // fix was already in flight when acquisition stopped
            debug!(
                delivery_id = session.delivery_id,
                "dropping fix after acquisition stop"
            );
            return;
        }

        match ingest::accept_sample(&mut session, fix.point, fix.tier, Utc::now()) {
            Ok(()) => Some(session.delivery_id),
            Err(rejected) => {
                state
                    .metrics
                    .samples_rejected_total
                    .with_label_values(&[rejected.reason()])
                    .inc();
                match rejected {
                    SampleRejected::Stale => warn!(
                        delivery_id = session.delivery_id,
                        "dropping out-of-order sample"
                    ),
                    SampleRejected::Inactive => debug!(
                        delivery_id = session.delivery_id,
                        "dropping sample outside active delivery"
                    ),
                }
                None
            }
        }
    };

    let Some(delivery_id) = accepted else {
        return;
    };

    state.metrics.samples_accepted_total.inc();
    if let Err(err) = state
        .upstream
        .push_update(delivery_id, DeliveryUpdate::position(fix.point))
        .await
    {
        warn!(delivery_id, error = %err, "failed to push tracking point upstream");
    }
    emit_viewport(state, runtime).await;
}

async fn handle_location_error(
    state: &Arc<AppState>,
    runtime: &Arc<SessionRuntime>,
    err: LocationError,
) {
    state
        .metrics
        .acquisition_errors_total
        .with_label_values(&[err.kind()])
        .inc();

    let (session_id, delivery_id) = {
        let session = runtime.session.lock().await;
        (session.session_id, session.delivery_id)
    };
    warn!(delivery_id, error = %err, "location acquisition error");
    emit(
        state,
        TrackingEvent::TrackingError {
            session_id,
            delivery_id,
            kind: err.kind().to_string(),
            message: err.to_string(),
        },
    );

    if !err.is_transient() {
        // permission revoked: acquisition stays off until the operator
        // intervenes; status controls keep working without GPS
        stop_acquisition(runtime).await;
    }
}

/// At-most-once geocoding of the customer address, spaced by the upstream
/// client's rate-limit delay. Failure leaves the marker absent and surfaces
/// a non-fatal warning.
async fn resolve_customer_location(state: Arc<AppState>, runtime: Arc<SessionRuntime>) {
    let (delivery_id, session_id, address) = {
        let mut session = runtime.session.lock().await;
        if session.customer_location.is_some() || session.geocode_attempted {
            return;
        }
        session.geocode_attempted = true;
        (
            session.delivery_id,
            session.session_id,
            session.customer_address.clone(),
        )
    };

    match state.upstream.geocode(&address).await {
        Ok(point) => {
            {
                let mut session = runtime.session.lock().await;
                // a refresh may have resolved it from the server meanwhile
                if session.customer_location.is_none() {
                    session.customer_location = Some(point);
                }
            }
            emit_viewport(&state, &runtime).await;
        }
        Err(err) => {
            warn!(delivery_id, error = %err, "customer address could not be geocoded");
            emit(
                &state,
                TrackingEvent::TrackingError {
                    session_id,
                    delivery_id,
                    kind: "geocoding_failure".to_string(),
                    message: err.to_string(),
                },
            );
        }
    }
}

pub fn framing_input(session: &DeliverySession) -> FramingInput {
    FramingInput {
        restaurant: session.restaurant_location,
        courier: ingest::last_known_courier_location(session),
        customer: session.customer_location,
        delivery_active: session.status.is_en_route(),
    }
}

/// Recomputes the framing and emits it only when it differs from the last
/// directive sent for this session.
async fn emit_viewport(state: &Arc<AppState>, runtime: &Arc<SessionRuntime>) {
    let (input, session_id, delivery_id) = {
        let session = runtime.session.lock().await;
        (framing_input(&session), session.session_id, session.delivery_id)
    };
    let directive = viewport::compute_viewport(&input);

    {
        let mut last = runtime.last_viewport.lock().await;
        if last.as_ref() == Some(&directive) {
            return;
        }
        *last = Some(directive.clone());
    }

    emit(
        state,
        TrackingEvent::ViewportChanged {
            session_id,
            delivery_id,
            directive,
        },
    );
}

fn emit(state: &AppState, event: TrackingEvent) {
    let _ = state.events_tx.send(event);
}
