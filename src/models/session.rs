use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::sample::{GeoPoint, TrackingSample};
use crate::models::status::DeliveryStatus;

/// In-memory aggregate for one open tracking screen. Two screens tracking the
/// same delivery hold independent sessions reconciled only through the
/// external API.
#[derive(Debug, Clone, Serialize)]
pub struct DeliverySession {
    pub session_id: Uuid,
    pub delivery_id: u64,
    pub status: DeliveryStatus,
    pub restaurant_location: Option<GeoPoint>,
    pub customer_address: String,
    pub customer_location: Option<GeoPoint>,
    pub trajectory: Vec<TrackingSample>,
    pub delivery_started_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_sample_accepted_at: Option<DateTime<Utc>>,
    pub is_acquiring_location: bool,
    /// Guards the at-most-once geocoding attempt per unresolved address.
    #[serde(skip)]
    pub geocode_attempted: bool,
}

impl DeliverySession {
    pub fn new(
        delivery_id: u64,
        status: DeliveryStatus,
        restaurant_location: Option<GeoPoint>,
        customer_address: String,
        customer_location: Option<GeoPoint>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            delivery_id,
            status,
            restaurant_location,
            customer_address,
            customer_location,
            trajectory: Vec::new(),
            delivery_started_at: None,
            delivered_at: None,
            last_sample_accepted_at: None,
            is_acquiring_location: false,
            geocode_attempted: false,
        }
    }

    /// Always the last trajectory point, never tracked separately.
    pub fn courier_location(&self) -> Option<GeoPoint> {
        self.trajectory.last().map(|sample| sample.point)
    }
}
