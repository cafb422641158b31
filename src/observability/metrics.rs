use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub samples_accepted_total: IntCounter,
    pub samples_rejected_total: IntCounterVec,
    pub sessions_active: IntGauge,
    pub status_transitions_total: IntCounterVec,
    pub refresh_latency_seconds: HistogramVec,
    pub acquisition_errors_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let samples_accepted_total = IntCounter::new(
            "samples_accepted_total",
            "Total courier position samples appended to a trajectory",
        )
        .expect("valid samples_accepted_total metric");

        let samples_rejected_total = IntCounterVec::new(
            Opts::new(
                "samples_rejected_total",
                "Total position samples dropped, by reason",
            ),
            &["reason"],
        )
        .expect("valid samples_rejected_total metric");

        let sessions_active = IntGauge::new(
            "sessions_active",
            "Currently open delivery tracking sessions",
        )
        .expect("valid sessions_active metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "status_transitions_total",
                "Total delivery status transition attempts, by outcome",
            ),
            &["outcome"],
        )
        .expect("valid status_transitions_total metric");

        let refresh_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "refresh_latency_seconds",
                "Latency of upstream refresh polls in seconds",
            ),
            &["outcome"],
        )
        .expect("valid refresh_latency_seconds metric");

        let acquisition_errors_total = IntCounterVec::new(
            Opts::new(
                "acquisition_errors_total",
                "Total location acquisition failures, by kind",
            ),
            &["kind"],
        )
        .expect("valid acquisition_errors_total metric");

        registry
            .register(Box::new(samples_accepted_total.clone()))
            .expect("register samples_accepted_total");
        registry
            .register(Box::new(samples_rejected_total.clone()))
            .expect("register samples_rejected_total");
        registry
            .register(Box::new(sessions_active.clone()))
            .expect("register sessions_active");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register status_transitions_total");
        registry
            .register(Box::new(refresh_latency_seconds.clone()))
            .expect("register refresh_latency_seconds");
        registry
            .register(Box::new(acquisition_errors_total.clone()))
            .expect("register acquisition_errors_total");

        Self {
            registry,
            samples_accepted_total,
            samples_rejected_total,
            sessions_active,
            status_transitions_total,
            refresh_latency_seconds,
            acquisition_errors_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
