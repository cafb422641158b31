//! Location acquisition: one-shot requests with a reduced-accuracy fallback
//! tier, and a throttled continuous loop behind a cancellable handle.

pub mod provider;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, OnceCell};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::LocationError;
use crate::location::provider::{FixRequest, GeolocationProvider, PositionFix, WakeLock};
use crate::models::sample::AccuracyTier;

#[derive(Debug, Clone, Copy)]
pub struct LocationTuning {
    pub one_shot_timeout: Duration,
    pub emit_throttle: Duration,
    pub continuous_max_age: Duration,
    pub fallback_max_age: Duration,
}

impl LocationTuning {
    pub fn from_config(config: &Config) -> Self {
        Self {
            one_shot_timeout: config.one_shot_timeout,
            emit_throttle: config.emit_throttle,
            continuous_max_age: config.continuous_max_age,
            fallback_max_age: config.fallback_max_age,
        }
    }
}

/// Cancellable continuous acquisition. Dropping the handle stops the loop as
/// well; `stop` is idempotent and effective before the next emission.
pub struct AcquisitionHandle {
    stop: watch::Sender<bool>,
}

impl AcquisitionHandle {
    pub fn stop(&self) {
        let _ = self.stop.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }
}

pub struct LocationService {
    provider: Arc<dyn GeolocationProvider>,
    wake: Arc<dyn WakeLock>,
    foreground: watch::Receiver<bool>,
    tuning: LocationTuning,
    ready: OnceCell<()>,
}

impl LocationService {
    pub fn new(
        provider: Arc<dyn GeolocationProvider>,
        wake: Arc<dyn WakeLock>,
        foreground: watch::Receiver<bool>,
        tuning: LocationTuning,
    ) -> Self {
        Self {
            provider,
            wake,
            foreground,
            tuning,
            ready: OnceCell::new(),
        }
    }

    /// One-time provider warm-up, memoized per service instance. The probe
    /// outcome is irrelevant; failing before the first device report is
    /// normal.
    pub async fn ensure_ready(&self) {
        self.ready
            .get_or_init(|| async {
                let probe = FixRequest {
                    tier: AccuracyTier::Reduced,
                    timeout: Duration::from_millis(250),
                    max_age: self.tuning.fallback_max_age,
                };
                if let Err(err) = self.provider.acquire(probe).await {
                    debug!(error = %err, "location warm-up probe failed");
                }
            })
            .await;
    }

    /// High accuracy first, no cached fix accepted. GPS-denied environments
    /// often still resolve via network positioning, so transient failures get
    /// exactly one reduced-accuracy retry with a relaxed cache window.
    /// Permission denial is surfaced as-is.
    pub async fn request_one_shot(&self) -> Result<PositionFix, LocationError> {
        self.ensure_ready().await;

        let first = FixRequest {
            tier: AccuracyTier::High,
            timeout: self.tuning.one_shot_timeout,
            max_age: Duration::ZERO,
        };

        match self.provider.acquire(first).await {
            Ok(fix) => Ok(fix),
            Err(LocationError::PermissionDenied) => Err(LocationError::PermissionDenied),
            Err(err) => {
                warn!(error = %err, "high-accuracy fix failed, retrying at reduced accuracy");
                let fallback = FixRequest {
                    tier: AccuracyTier::Reduced,
                    timeout: self.tuning.one_shot_timeout,
                    max_age: self.tuning.fallback_max_age,
                };
                self.provider.acquire(fallback).await
            }
        }
    }

    /// Spawns the continuous loop: one provider request per throttle period,
    /// cached fixes accepted within the continuous window. Samples and errors
    /// flow out over the given channels; the loop ends on stop, on a dropped
    /// sample receiver, or permanently on permission denial.
    pub fn start_continuous(
        &self,
        samples: mpsc::Sender<PositionFix>,
        errors: mpsc::Sender<LocationError>,
    ) -> AcquisitionHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let provider = self.provider.clone();
        let wake = self.wake.clone();
        let mut foreground = self.foreground.clone();
        let tuning = self.tuning;

        tokio::spawn(async move {
            wake.acquire();

            let mut interval = tokio::time::interval(tuning.emit_throttle);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut watch_visibility = true;

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    changed = foreground.changed(), if watch_visibility => {
                        match changed {
                            Ok(()) => {
                                // the platform drops the hint in background;
                                // reassert it when the app comes back
                                if *foreground.borrow() {
                                    wake.acquire();
                                }
                            }
                            Err(_) => watch_visibility = false,
                        }
                    }
                    _ = interval.tick() => {
                        let request = FixRequest {
                            tier: AccuracyTier::Reduced,
                            timeout: tuning.emit_throttle,
                            max_age: tuning.continuous_max_age,
                        };

                        let outcome = tokio::select! {
                            _ = stop_rx.changed() => break,
                            outcome = provider.acquire(request) => outcome,
                        };

                        match outcome {
                            Ok(fix) => {
                                if *stop_rx.borrow() {
                                    break;
                                }
                                if samples.send(fix).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                let _ = errors.send(err).await;
                                if !err.is_transient() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }

            wake.release();
            debug!("continuous acquisition loop stopped");
        });

        AcquisitionHandle { stop: stop_tx }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::{mpsc, watch};

    use super::{LocationService, LocationTuning};
    use crate::error::LocationError;
    use crate::location::provider::{FixRequest, GeolocationProvider, PositionFix, WakeLock};
    use crate::models::sample::{AccuracyTier, GeoPoint};

    const POINT: GeoPoint = GeoPoint {
        lat: -29.68,
        lng: -53.80,
    };

    fn fix() -> PositionFix {
        PositionFix {
            point: POINT,
            tier: AccuracyTier::High,
            fixed_at: Utc::now(),
        }
    }

    fn tuning() -> LocationTuning {
        LocationTuning {
            one_shot_timeout: Duration::from_secs(30),
            emit_throttle: Duration::from_secs(10),
            continuous_max_age: Duration::from_secs(30),
            fallback_max_age: Duration::from_secs(60),
        }
    }

    /// Replays a script of outcomes and records every request it saw. Once
    /// the script runs dry it keeps answering with the last scripted outcome.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<PositionFix, LocationError>>>,
        last: Result<PositionFix, LocationError>,
        requests: Mutex<Vec<FixRequest>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<PositionFix, LocationError>>) -> Arc<Self> {
            let last = *script.last().expect("non-empty script");
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last,
                requests: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }

        fn requests(&self) -> Vec<FixRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GeolocationProvider for ScriptedProvider {
        async fn acquire(&self, request: FixRequest) -> Result<PositionFix, LocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            self.script.lock().unwrap().pop_front().unwrap_or(self.last)
        }
    }

    #[derive(Default)]
    struct CountingWakeLock {
        acquired: AtomicUsize,
        released: AtomicUsize,
    }

    impl WakeLock for CountingWakeLock {
        fn acquire(&self) {
            self.acquired.fetch_add(1, Ordering::SeqCst);
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn service(
        provider: Arc<ScriptedProvider>,
        wake: Arc<CountingWakeLock>,
    ) -> (LocationService, watch::Sender<bool>) {
        let (foreground_tx, foreground_rx) = watch::channel(true);
        let service = LocationService::new(provider, wake, foreground_rx, tuning());
        (service, foreground_tx)
    }

    #[tokio::test]
    async fn one_shot_falls_back_to_reduced_on_unavailable() {
        // first entry feeds the warm-up probe
        let provider = ScriptedProvider::new(vec![
            Err(LocationError::Timeout),
            Err(LocationError::PositionUnavailable),
            Ok(fix()),
        ]);
        let (service, _fg) = service(provider.clone(), Arc::default());
        service.ensure_ready().await;

        let resolved = service.request_one_shot().await.unwrap();
        assert_eq!(resolved.point, POINT);

        // warm-up probe + high attempt + reduced retry
        let requests = provider.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].tier, AccuracyTier::High);
        assert_eq!(requests[1].max_age, Duration::ZERO);
        assert_eq!(requests[2].tier, AccuracyTier::Reduced);
        assert_eq!(requests[2].max_age, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn one_shot_falls_back_on_timeout_too() {
        let provider = ScriptedProvider::new(vec![
            Err(LocationError::Timeout),
            Err(LocationError::Timeout),
            Ok(fix()),
        ]);
        let (service, _fg) = service(provider.clone(), Arc::default());
        service.ensure_ready().await;

        assert!(service.request_one_shot().await.is_ok());
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn one_shot_does_not_retry_after_permission_denial() {
        let provider = ScriptedProvider::new(vec![
            Err(LocationError::Timeout),
            Err(LocationError::PermissionDenied),
        ]);
        let (service, _fg) = service(provider.clone(), Arc::default());
        service.ensure_ready().await;

        let result = service.request_one_shot().await;
        assert_eq!(result, Err(LocationError::PermissionDenied));
        // warm-up probe + the single high attempt
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn one_shot_surfaces_second_failure() {
        let provider = ScriptedProvider::new(vec![
            Err(LocationError::Timeout),
            Err(LocationError::Timeout),
            Err(LocationError::Timeout),
        ]);
        let (service, _fg) = service(provider.clone(), Arc::default());
        service.ensure_ready().await;

        assert_eq!(service.request_one_shot().await, Err(LocationError::Timeout));
    }

    #[tokio::test]
    async fn ensure_ready_probes_exactly_once() {
        let provider = ScriptedProvider::new(vec![Ok(fix())]);
        let (service, _fg) = service(provider.clone(), Arc::default());

        service.ensure_ready().await;
        service.ensure_ready().await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_emits_at_most_once_per_throttle() {
        let provider = ScriptedProvider::new(vec![Ok(fix())]);
        let (service, _fg) = service(provider, Arc::default());

        let (sample_tx, mut sample_rx) = mpsc::channel(8);
        let (error_tx, _error_rx) = mpsc::channel(8);
        let handle = service.start_continuous(sample_tx, error_tx);

        let started = tokio::time::Instant::now();
        sample_rx.recv().await.expect("first sample");
        sample_rx.recv().await.expect("second sample");
        assert!(started.elapsed() >= Duration::from_secs(10));

        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_closes_the_stream() {
        let provider = ScriptedProvider::new(vec![Ok(fix())]);
        let wake = Arc::new(CountingWakeLock::default());
        let (service, _fg) = service(provider, wake.clone());

        let (sample_tx, mut sample_rx) = mpsc::channel(8);
        let (error_tx, _error_rx) = mpsc::channel(8);
        let handle = service.start_continuous(sample_tx, error_tx);

        sample_rx.recv().await.expect("first sample");
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());

        // loop exits and drops its sender
        while sample_rx.recv().await.is_some() {}
        assert_eq!(wake.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permission_denial_ends_the_loop() {
        let provider = ScriptedProvider::new(vec![Err(LocationError::PermissionDenied)]);
        let (service, _fg) = service(provider, Arc::default());

        let (sample_tx, mut sample_rx) = mpsc::channel(8);
        let (error_tx, mut error_rx) = mpsc::channel(8);
        let _handle = service.start_continuous(sample_tx, error_tx);

        assert_eq!(
            error_rx.recv().await,
            Some(LocationError::PermissionDenied)
        );
        assert_eq!(sample_rx.recv().await.map(|fix| fix.point), None);
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_return_reasserts_the_wake_hint() {
        let provider = ScriptedProvider::new(vec![Ok(fix())]);
        let wake = Arc::new(CountingWakeLock::default());
        let (service, foreground) = service(provider, wake.clone());

        let (sample_tx, mut sample_rx) = mpsc::channel(8);
        let (error_tx, _error_rx) = mpsc::channel(8);
        let handle = service.start_continuous(sample_tx, error_tx);
        sample_rx.recv().await.expect("loop running");

        let before = wake.acquired.load(Ordering::SeqCst);
        foreground.send_replace(false);
        foreground.send_replace(true);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(wake.acquired.load(Ordering::SeqCst) > before);
        handle.stop();
    }
}
