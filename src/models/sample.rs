use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Accuracy mode the fix was resolved with. `High` is a GPS-grade fix,
/// `Reduced` a network/WiFi fix accepted when GPS cannot resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyTier {
    High,
    Reduced,
}

/// One accepted courier position. `recorded_at` is the acceptance time,
/// not the sensor time. Samples are never mutated once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSample {
    pub point: GeoPoint,
    pub recorded_at: DateTime<Utc>,
    pub tier: AccuracyTier,
}
