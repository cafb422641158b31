use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Notify};
use tracing::debug;

use crate::error::LocationError;
use crate::models::event::TrackingEvent;
use crate::models::sample::{AccuracyTier, GeoPoint};

/// One position request against the platform sensor layer.
#[derive(Debug, Clone, Copy)]
pub struct FixRequest {
    /// `High` requires a GPS-grade fix; `Reduced` accepts network-grade too.
    pub tier: AccuracyTier,
    pub timeout: Duration,
    /// Oldest cached fix the caller is willing to accept.
    pub max_age: Duration,
}

/// A resolved device position. `fixed_at` is sensor time; acceptance time is
/// stamped later by ingest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub point: GeoPoint,
    pub tier: AccuracyTier,
    pub fixed_at: DateTime<Utc>,
}

#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn acquire(&self, request: FixRequest) -> Result<PositionFix, LocationError>;
}

/// Display keep-awake hint, held while continuous acquisition runs. The
/// platform may drop it on its own; the acquisition loop reasserts it when
/// the app returns to the foreground.
pub trait WakeLock: Send + Sync {
    fn acquire(&self);
    fn release(&self);
}

/// Relays the wake hint to the device layer over the event stream.
pub struct EventWakeLock {
    events_tx: broadcast::Sender<TrackingEvent>,
}

impl EventWakeLock {
    pub fn new(events_tx: broadcast::Sender<TrackingEvent>) -> Self {
        Self { events_tx }
    }
}

impl WakeLock for EventWakeLock {
    fn acquire(&self) {
        let _ = self
            .events_tx
            .send(TrackingEvent::KeepDisplayAwake { active: true });
    }

    fn release(&self) {
        let _ = self
            .events_tx
            .send(TrackingEvent::KeepDisplayAwake { active: false });
    }
}

#[derive(Debug, Clone, Copy)]
struct DeviceReport {
    outcome: Result<PositionFix, LocationError>,
    reported_at: DateTime<Utc>,
}

/// Production provider: the device layer pushes raw fixes and failures over
/// HTTP, and `acquire` resolves against the latest report: cached when fresh
/// enough, otherwise by waiting for the next push within the timeout.
pub struct DeviceGateway {
    latest: Mutex<Option<DeviceReport>>,
    notify: Notify,
}

impl DeviceGateway {
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    pub fn report_fix(&self, point: GeoPoint, tier: AccuracyTier) {
        self.store(DeviceReport {
            outcome: Ok(PositionFix {
                point,
                tier,
                fixed_at: Utc::now(),
            }),
            reported_at: Utc::now(),
        });
    }

    pub fn report_failure(&self, error: LocationError) {
        self.store(DeviceReport {
            outcome: Err(error),
            reported_at: Utc::now(),
        });
    }

    fn store(&self, report: DeviceReport) {
        *self
            .latest
            .lock()
            .expect("device gateway lock poisoned") = Some(report);
        self.notify.notify_waiters();
    }

    fn latest(&self) -> Option<DeviceReport> {
        *self.latest.lock().expect("device gateway lock poisoned")
    }

    fn cached_fix(&self, request: &FixRequest) -> Option<PositionFix> {
        if request.max_age.is_zero() {
            return None;
        }

        let report = self.latest()?;
        let fix = report.outcome.ok()?;

        if !tier_ok(request.tier, fix.tier) {
            return None;
        }

        let age_ms = Utc::now()
            .signed_duration_since(fix.fixed_at)
            .num_milliseconds();
        if age_ms <= request.max_age.as_millis() as i64 {
            Some(fix)
        } else {
            None
        }
    }

    /// A report pushed after the request started resolves it; older failures
    /// are not replayed.
    fn fresh_outcome(
        &self,
        request: &FixRequest,
        started: DateTime<Utc>,
    ) -> Option<Result<PositionFix, LocationError>> {
        let report = self.latest()?;
        if report.reported_at <= started {
            return None;
        }

        match report.outcome {
            Ok(fix) if tier_ok(request.tier, fix.tier) => Some(Ok(fix)),
            Ok(_) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

impl Default for DeviceGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn tier_ok(requested: AccuracyTier, actual: AccuracyTier) -> bool {
    requested == AccuracyTier::Reduced || actual == AccuracyTier::High
}

#[async_trait]
impl GeolocationProvider for DeviceGateway {
    async fn acquire(&self, request: FixRequest) -> Result<PositionFix, LocationError> {
        let started = Utc::now();

        if let Some(fix) = self.cached_fix(&request) {
            return Ok(fix);
        }

        let wait_for_report = async {
            loop {
                let notified = self.notify.notified();
                if let Some(outcome) = self.fresh_outcome(&request, started) {
                    return outcome;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(request.timeout, wait_for_report).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(tier = ?request.tier, "no device report within request timeout");
                Err(LocationError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{DeviceGateway, FixRequest, GeolocationProvider};
    use crate::error::LocationError;
    use crate::models::sample::{AccuracyTier, GeoPoint};

    const POINT: GeoPoint = GeoPoint {
        lat: -29.68,
        lng: -53.80,
    };

    fn request(tier: AccuracyTier, timeout_ms: u64, max_age_ms: u64) -> FixRequest {
        FixRequest {
            tier,
            timeout: Duration::from_millis(timeout_ms),
            max_age: Duration::from_millis(max_age_ms),
        }
    }

    #[tokio::test]
    async fn fresh_cached_fix_is_returned_immediately() {
        let gateway = DeviceGateway::new();
        gateway.report_fix(POINT, AccuracyTier::High);

        let fix = gateway
            .acquire(request(AccuracyTier::Reduced, 50, 30_000))
            .await
            .unwrap();

        assert_eq!(fix.point, POINT);
        assert_eq!(fix.tier, AccuracyTier::High);
    }

    #[tokio::test]
    async fn high_accuracy_request_ignores_reduced_cache() {
        let gateway = DeviceGateway::new();
        gateway.report_fix(POINT, AccuracyTier::Reduced);

        let result = gateway
            .acquire(request(AccuracyTier::High, 50, 30_000))
            .await;

        assert_eq!(result, Err(LocationError::Timeout));
    }

    #[tokio::test]
    async fn zero_max_age_refuses_cached_fix() {
        let gateway = DeviceGateway::new();
        gateway.report_fix(POINT, AccuracyTier::High);

        let result = gateway.acquire(request(AccuracyTier::High, 50, 0)).await;

        assert_eq!(result, Err(LocationError::Timeout));
    }

    #[tokio::test]
    async fn report_during_request_resolves_it() {
        let gateway = DeviceGateway::new();

        let (outcome, ()) = tokio::join!(
            gateway.acquire(request(AccuracyTier::High, 500, 0)),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                gateway.report_fix(POINT, AccuracyTier::High);
            }
        );

        assert_eq!(outcome.unwrap().point, POINT);
    }

    #[tokio::test]
    async fn failure_during_request_is_surfaced() {
        let gateway = DeviceGateway::new();

        let (outcome, ()) = tokio::join!(
            gateway.acquire(request(AccuracyTier::High, 500, 0)),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                gateway.report_failure(LocationError::PermissionDenied);
            }
        );

        assert_eq!(outcome, Err(LocationError::PermissionDenied));
    }

    #[tokio::test]
    async fn failure_before_request_is_not_replayed() {
        let gateway = DeviceGateway::new();
        gateway.report_failure(LocationError::PositionUnavailable);

        let result = gateway.acquire(request(AccuracyTier::High, 50, 0)).await;

        assert_eq!(result, Err(LocationError::Timeout));
    }
}
