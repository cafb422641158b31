use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::orchestrator::SessionRuntime;
use crate::location::provider::{DeviceGateway, EventWakeLock};
use crate::location::{LocationService, LocationTuning};
use crate::models::event::TrackingEvent;
use crate::observability::metrics::Metrics;
use crate::upstream::DeliveryApi;

pub struct AppState {
    pub config: Config,
    pub sessions: DashMap<Uuid, Arc<SessionRuntime>>,
    pub events_tx: broadcast::Sender<TrackingEvent>,
    /// App visibility as reported by the device layer; drives wake-lock
    /// reacquisition in the acquisition loop.
    pub foreground_tx: watch::Sender<bool>,
    pub upstream: Arc<dyn DeliveryApi>,
    pub location: Arc<LocationService>,
    pub device: Arc<DeviceGateway>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config, upstream: Arc<dyn DeliveryApi>) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let (foreground_tx, foreground_rx) = watch::channel(true);

        let device = Arc::new(DeviceGateway::new());
        let wake = Arc::new(EventWakeLock::new(events_tx.clone()));
        let location = Arc::new(LocationService::new(
            device.clone(),
            wake,
            foreground_rx,
            LocationTuning::from_config(&config),
        ));

        Self {
            config,
            sessions: DashMap::new(),
            events_tx,
            foreground_tx,
            upstream,
            location,
            device,
            metrics: Metrics::new(),
        }
    }
}
