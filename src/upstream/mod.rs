//! Client for the order store and geocoding collaborators. The exact framing
//! is owned by that layer; this module pins down just the contract the
//! tracking core depends on.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::error::TrackingError;
use crate::models::sample::GeoPoint;
use crate::models::status::DeliveryStatus;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WirePoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<WirePoint> for GeoPoint {
    fn from(wire: WirePoint) -> Self {
        GeoPoint {
            lat: wire.latitude,
            lng: wire.longitude,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerInfo {
    pub address: String,
    #[serde(default)]
    pub location: Option<WirePoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackedPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
}

/// `GET /delivery/{id}` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySnapshot {
    pub delivery_status: DeliveryStatus,
    pub customer: CustomerInfo,
    #[serde(default)]
    pub delivery_person: Option<String>,
    #[serde(default)]
    pub tracking: Vec<TrackedPoint>,
}

/// `PUT /delivery/{id}` body. Both a status change and a tracking point may
/// ride in one update.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl DeliveryUpdate {
    pub fn status(status: DeliveryStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn position(point: GeoPoint) -> Self {
        Self {
            latitude: Some(point.lat),
            longitude: Some(point.lng),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GeocodeRequest<'a> {
    address: &'a str,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct GeocodeResponse {
    latitude: f64,
    longitude: f64,
}

#[async_trait]
pub trait DeliveryApi: Send + Sync {
    async fn fetch_delivery(&self, delivery_id: u64) -> Result<DeliverySnapshot, TrackingError>;

    async fn push_update(
        &self,
        delivery_id: u64,
        update: DeliveryUpdate,
    ) -> Result<(), TrackingError>;

    async fn geocode(&self, address: &str) -> Result<GeoPoint, TrackingError>;
}

pub struct HttpDeliveryApi {
    client: reqwest::Client,
    base_url: String,
    geocode_delay: Duration,
}

impl HttpDeliveryApi {
    pub fn new(base_url: impl Into<String>, geocode_delay: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            geocode_delay,
        }
    }
}

#[async_trait]
impl DeliveryApi for HttpDeliveryApi {
    async fn fetch_delivery(&self, delivery_id: u64) -> Result<DeliverySnapshot, TrackingError> {
        let url = format!("{}/delivery/{}", self.base_url, delivery_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| TrackingError::Upstream(format!("GET {url}: {err}")))?;

        response
            .json::<DeliverySnapshot>()
            .await
            .map_err(|err| TrackingError::Upstream(format!("GET {url}: invalid body: {err}")))
    }

    async fn push_update(
        &self,
        delivery_id: u64,
        update: DeliveryUpdate,
    ) -> Result<(), TrackingError> {
        let url = format!("{}/delivery/{}", self.base_url, delivery_id);

        self.client
            .put(&url)
            .json(&update)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| TrackingError::Upstream(format!("PUT {url}: {err}")))?;

        Ok(())
    }

    async fn geocode(&self, address: &str) -> Result<GeoPoint, TrackingError> {
        // The third-party geocoder is rate limited; space requests out.
        sleep(self.geocode_delay).await;

        let url = format!("{}/geocoding", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&GeocodeRequest { address })
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| TrackingError::GeocodingFailure {
                address: address.to_string(),
                reason: err.to_string(),
            })?;

        let resolved = response.json::<GeocodeResponse>().await.map_err(|err| {
            TrackingError::GeocodingFailure {
                address: address.to_string(),
                reason: format!("invalid body: {err}"),
            }
        })?;

        Ok(GeoPoint {
            lat: resolved.latitude,
            lng: resolved.longitude,
        })
    }
}
