use serde::{Deserialize, Serialize};

/// Delivery lifecycle as owned by the external order store. The tracker
/// caches a copy per session; snake_case matches the store's wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Preparing,
    OutForDelivery,
    InTransit,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// True while the courier is on the road and position samples are accepted.
    pub fn is_en_route(self) -> bool {
        matches!(self, Self::OutForDelivery | Self::InTransit)
    }

    /// Position along the lifecycle, used to decide whether a server-reported
    /// status is further along than the locally cached one. `Cancelled` ranks
    /// last since it is adoptable from any non-terminal state.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Preparing => 1,
            Self::OutForDelivery => 2,
            Self::InTransit => 3,
            Self::Delivered => 4,
            Self::Cancelled => 5,
        }
    }
}
