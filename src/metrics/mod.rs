use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

// ============================================================================
// Metrics - Prometheus Counters for the Fulfillment Core
// ============================================================================
//
// - Orchestrated operations by outcome (ok / error kind)
// - Stock reservations by outcome (reserved / insufficient / not_found)
// - Units released back to stock
// - Operation latency
// - Dropped notifications
//
// Scraped via GET /metrics on the API server.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub operations: IntCounterVec,
    pub operation_duration: HistogramVec,
    pub stock_reservations: IntCounterVec,
    pub stock_units_released: IntCounter,
    pub notifications_failed: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new(
                "fulfillment_operations_total",
                "Orchestrated operations by outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "fulfillment_operation_duration_seconds",
                "Orchestrated operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let stock_reservations = IntCounterVec::new(
            Opts::new(
                "stock_reservations_total",
                "Stock reservation attempts by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(stock_reservations.clone()))?;

        let stock_units_released = IntCounter::new(
            "stock_units_released_total",
            "Units credited back to stock by cancellations and deletions",
        )?;
        registry.register(Box::new(stock_units_released.clone()))?;

        let notifications_failed = IntCounter::new(
            "notifications_failed_total",
            "Notifications dropped after a sink failure",
        )?;
        registry.register(Box::new(notifications_failed.clone()))?;

        Ok(Self {
            registry,
            operations,
            operation_duration,
            stock_reservations,
            stock_units_released,
            notifications_failed,
        })
    }

    /// Registry handle for the /metrics endpoint.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_operation(&self, operation: &str, outcome: &str, duration_secs: f64) {
        self.operations
            .with_label_values(&[operation, outcome])
            .inc();
        self.operation_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_reservation(&self, outcome: &str) {
        self.stock_reservations.with_label_values(&[outcome]).inc();
    }

    pub fn record_release(&self, units: i32) {
        self.stock_units_released.inc_by(units.max(0) as u64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("failed to create metrics")
    }
}
