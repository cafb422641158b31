use serde::Serialize;
use uuid::Uuid;

use crate::models::status::DeliveryStatus;
use crate::models::viewport::ViewportDirective;

/// Events fanned out to the rendering/UI layer over the websocket stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingEvent {
    StatusChanged {
        session_id: Uuid,
        delivery_id: u64,
        status: DeliveryStatus,
    },
    ViewportChanged {
        session_id: Uuid,
        delivery_id: u64,
        directive: ViewportDirective,
    },
    TrackingError {
        session_id: Uuid,
        delivery_id: u64,
        kind: String,
        message: String,
    },
    /// Hint for the device layer to keep the display awake while continuous
    /// acquisition is running.
    KeepDisplayAwake { active: bool },
}
