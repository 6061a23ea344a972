use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub orders_in_queue: IntGauge,
    pub assignment_latency_seconds: HistogramVec,
    pub driver_load: GaugeVec,
    pub geofence_events_total: IntCounterVec,
    pub serviceability_checks_total: IntCounterVec,
    pub surge_rule_failures_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Total assignment attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let orders_in_queue = IntGauge::new(
            "orders_in_queue",
            "Current number of orders waiting for auto-dispatch",
        )
        .expect("valid orders_in_queue metric");

        let assignment_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of auto-assignment in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let driver_load = GaugeVec::new(
            Opts::new("driver_load", "Driver active orders over capacity [0..1]"),
            &["driver_id"],
        )
        .expect("valid driver_load metric");

        let geofence_events_total = IntCounterVec::new(
            Opts::new("geofence_events_total", "Geofence transitions by event type"),
            &["event_type"],
        )
        .expect("valid geofence_events_total metric");

        let serviceability_checks_total = IntCounterVec::new(
            Opts::new(
                "serviceability_checks_total",
                "Serviceability checks by result",
            ),
            &["result"],
        )
        .expect("valid serviceability_checks_total metric");

        let surge_rule_failures_total = IntCounterVec::new(
            Opts::new(
                "surge_rule_failures_total",
                "Surge rule evaluations downgraded to not-satisfied",
            ),
            &["condition"],
        )
        .expect("valid surge_rule_failures_total metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(orders_in_queue.clone()))
            .expect("register orders_in_queue");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(driver_load.clone()))
            .expect("register driver_load");
        registry
            .register(Box::new(geofence_events_total.clone()))
            .expect("register geofence_events_total");
        registry
            .register(Box::new(serviceability_checks_total.clone()))
            .expect("register serviceability_checks_total");
        registry
            .register(Box::new(surge_rule_failures_total.clone()))
            .expect("register surge_rule_failures_total");

        Self {
            registry,
            assignments_total,
            orders_in_queue,
            assignment_latency_seconds,
            driver_load,
            geofence_events_total,
            serviceability_checks_total,
            surge_rule_failures_total,
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
