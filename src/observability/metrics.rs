use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub deliveries_created_total: IntCounterVec,
    pub transitions_total: IntCounterVec,
    pub transition_latency_seconds: HistogramVec,
    pub notifications_emitted_total: IntCounterVec,
    pub notification_streams_active: IntGauge,
    pub emails_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let deliveries_created_total = IntCounterVec::new(
            Opts::new(
                "deliveries_created_total",
                "Delivery creation requests by outcome",
            ),
            &["outcome"],
        )
        .expect("valid deliveries_created_total metric");

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Delivery status transitions by outcome"),
            &["outcome"],
        )
        .expect("valid transitions_total metric");

        let transition_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "transition_latency_seconds",
                "Latency of lock, validate and write for a transition in seconds",
            ),
            &["outcome"],
        )
        .expect("valid transition_latency_seconds metric");

        let notifications_emitted_total = IntCounterVec::new(
            Opts::new(
                "notifications_emitted_total",
                "Notifications persisted by notification type",
            ),
            &["type"],
        )
        .expect("valid notifications_emitted_total metric");

        let notification_streams_active = IntGauge::new(
            "notification_streams_active",
            "Currently open notification stream subscriptions",
        )
        .expect("valid notification_streams_active metric");

        let emails_total = IntCounterVec::new(
            Opts::new("emails_total", "Outgoing emails by outcome"),
            &["outcome"],
        )
        .expect("valid emails_total metric");

        registry
            .register(Box::new(deliveries_created_total.clone()))
            .expect("register deliveries_created_total");
        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(transition_latency_seconds.clone()))
            .expect("register transition_latency_seconds");
        registry
            .register(Box::new(notifications_emitted_total.clone()))
            .expect("register notifications_emitted_total");
        registry
            .register(Box::new(notification_streams_active.clone()))
            .expect("register notification_streams_active");
        registry
            .register(Box::new(emails_total.clone()))
            .expect("register emails_total");

        Self {
            registry,
            deliveries_created_total,
            transitions_total,
            transition_latency_seconds,
            notifications_emitted_total,
            notification_streams_active,
            emails_total,
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
