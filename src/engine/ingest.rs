//! Trajectory ingest: append-only, monotonic timestamps, active-status gate.

use chrono::{DateTime, Utc};

use crate::models::sample::{AccuracyTier, GeoPoint, TrackingSample};
use crate::models::session::DeliverySession;

/// Why a sample was dropped. Internal outcome, never surfaced to the UI;
/// drops are logged and counted instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRejected {
    /// Delivery is not en route; no samples are accepted.
    Inactive,
    /// Older than the last accepted sample; out-of-order network delivery
    /// is rejected rather than reordered.
    Stale,
}

impl SampleRejected {
    pub fn reason(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Stale => "stale",
        }
    }
}

/// Appends a device sample if and only if the delivery is en route and the
/// acceptance timestamp does not move backwards.
pub fn accept_sample(
    session: &mut DeliverySession,
    point: GeoPoint,
    tier: AccuracyTier,
    accepted_at: DateTime<Utc>,
) -> Result<(), SampleRejected> {
    if !session.status.is_en_route() {
        return Err(SampleRejected::Inactive);
    }

    if let Some(last) = session.trajectory.last() {
        if accepted_at < last.recorded_at {
            return Err(SampleRejected::Stale);
        }
    }

    session.trajectory.push(TrackingSample {
        point,
        recorded_at: accepted_at,
        tier,
    });
    session.last_sample_accepted_at = Some(accepted_at);
    Ok(())
}

/// Merges a server-confirmed tracking point into the trajectory. Used when
/// seeding a session from a snapshot and when reconciling refresh deltas;
/// only the monotonic rule applies, and the point directly preceding the
/// current tail is skipped so our own pushed samples are not echoed back in.
pub fn merge_confirmed_point(
    session: &mut DeliverySession,
    point: GeoPoint,
    recorded_at: DateTime<Utc>,
) -> bool {
    if let Some(last) = session.trajectory.last() {
        if recorded_at <= last.recorded_at || point == last.point {
            return false;
        }
    }

    session.trajectory.push(TrackingSample {
        point,
        recorded_at,
        // accuracy does not survive the round trip through the store
        tier: AccuracyTier::Reduced,
    });
    session.last_sample_accepted_at = Some(recorded_at);
    true
}

pub fn last_known_courier_location(session: &DeliverySession) -> Option<GeoPoint> {
    session.courier_location()
}

/// Read-only projection of the traveled path, oldest first. Re-iterable.
pub fn full_trajectory(session: &DeliverySession) -> impl Iterator<Item = GeoPoint> + '_ {
    session.trajectory.iter().map(|sample| sample.point)
}
