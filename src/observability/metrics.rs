use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub assignments_total: IntCounterVec,
    pub location_reports_total: IntCounterVec,
    pub tracking_lookups_total: IntCounterVec,
    pub notifications_total: IntCounterVec,
    pub notifications_in_queue: IntGauge,
    pub notification_latency_seconds: HistogramVec,
    pub tracking_id_collisions_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Order status transitions by outcome"),
            &["outcome"],
        )
        .expect("valid order_transitions_total metric");

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Driver assignments by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let location_reports_total = IntCounterVec::new(
            Opts::new("location_reports_total", "Driver location reports by outcome"),
            &["outcome"],
        )
        .expect("valid location_reports_total metric");

        let tracking_lookups_total = IntCounterVec::new(
            Opts::new("tracking_lookups_total", "Public tracking lookups by outcome"),
            &["outcome"],
        )
        .expect("valid tracking_lookups_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Notification deliveries by outcome"),
            &["outcome"],
        )
        .expect("valid notifications_total metric");

        let notifications_in_queue = IntGauge::new(
            "notifications_in_queue",
            "Order events waiting for notification fan-out",
        )
        .expect("valid notifications_in_queue metric");

        let notification_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "notification_latency_seconds",
                "Latency of notification fan-out per order event in seconds",
            ),
            &["outcome"],
        )
        .expect("valid notification_latency_seconds metric");

        let tracking_id_collisions_total = IntCounter::new(
            "tracking_id_collisions_total",
            "Generated tracking ids that were already taken",
        )
        .expect("valid tracking_id_collisions_total metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(location_reports_total.clone()))
            .expect("register location_reports_total");
        registry
            .register(Box::new(tracking_lookups_total.clone()))
            .expect("register tracking_lookups_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(notifications_in_queue.clone()))
            .expect("register notifications_in_queue");
        registry
            .register(Box::new(notification_latency_seconds.clone()))
            .expect("register notification_latency_seconds");
        registry
            .register(Box::new(tracking_id_collisions_total.clone()))
            .expect("register tracking_id_collisions_total");

        Self {
            registry,
            transitions_total,
            assignments_total,
            location_reports_total,
            tracking_lookups_total,
            notifications_total,
            notifications_in_queue,
            notification_latency_seconds,
            tracking_id_collisions_total,
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
