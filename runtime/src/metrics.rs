//! Prometheus metrics for watch cycles and trigger deliveries.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `shipwatch_containers_watched` | Gauge | `watcher` |
//! | `shipwatch_updates_available` | Gauge | `watcher` |
//! | `shipwatch_container_errors` | Gauge | `watcher` |
//! | `shipwatch_cycles_total` | Counter | `watcher` |
//! | `shipwatch_cycles_skipped_total` | Counter | `watcher` |
//! | `shipwatch_trigger_deliveries_total` | Counter | `trigger`, `status` |
//! | `shipwatch_events_lagged_total` | Counter | `subscriber` |
//!
//! Gauges hold the values of the last completed cycle.

use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use shipwatch_core::error::{Result, WatchError};
use shipwatch_core::model::CycleStats;

fn metrics_error(e: prometheus::Error) -> WatchError {
    WatchError::Other(format!("metrics: {}", e))
}

/// Engine metrics registered in their own registry.
#[derive(Clone)]
pub struct EngineMetrics {
    registry: Registry,
    containers_watched: GaugeVec,
    updates_available: GaugeVec,
    container_errors: GaugeVec,
    cycles_total: CounterVec,
    cycles_skipped_total: CounterVec,
    trigger_deliveries_total: CounterVec,
    events_lagged_total: CounterVec,
}

impl EngineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let gauge = |name: &str, help: &str| -> Result<GaugeVec> {
            let gauge = GaugeVec::new(Opts::new(name, help), &["watcher"]).map_err(metrics_error)?;
            registry
                .register(Box::new(gauge.clone()))
                .map_err(metrics_error)?;
            Ok(gauge)
        };
        let counter = |name: &str, help: &str, labels: &[&str]| -> Result<CounterVec> {
            let counter = CounterVec::new(Opts::new(name, help), labels).map_err(metrics_error)?;
            registry
                .register(Box::new(counter.clone()))
                .map_err(metrics_error)?;
            Ok(counter)
        };

        let containers_watched = gauge(
            "shipwatch_containers_watched",
            "Containers watched in the last cycle",
        )?;
        let updates_available = gauge(
            "shipwatch_updates_available",
            "Containers with an available update in the last cycle",
        )?;
        let container_errors = gauge(
            "shipwatch_container_errors",
            "Containers that failed to resolve in the last cycle",
        )?;
        let cycles_total = counter("shipwatch_cycles_total", "Watch cycles run", &["watcher"])?;
        let cycles_skipped_total = counter(
            "shipwatch_cycles_skipped_total",
            "Scheduled ticks skipped because a cycle was still running",
            &["watcher"],
        )?;
        let trigger_deliveries_total = counter(
            "shipwatch_trigger_deliveries_total",
            "Trigger deliveries by outcome",
            &["trigger", "status"],
        )?;
        let events_lagged_total = counter(
            "shipwatch_events_lagged_total",
            "Events a slow subscriber missed because the event channel overflowed",
            &["subscriber"],
        )?;

        Ok(Self {
            registry,
            containers_watched,
            updates_available,
            container_errors,
            cycles_total,
            cycles_skipped_total,
            trigger_deliveries_total,
            events_lagged_total,
        })
    }

    pub fn cycle_completed(&self, watcher: &str, stats: &CycleStats) {
        self.cycles_total.with_label_values(&[watcher]).inc();
        self.containers_watched
            .with_label_values(&[watcher])
            .set(stats.watched as f64);
        self.updates_available
            .with_label_values(&[watcher])
            .set(stats.updates as f64);
        self.container_errors
            .with_label_values(&[watcher])
            .set(stats.errors as f64);
    }

    pub fn cycle_skipped(&self, watcher: &str) {
        self.cycles_skipped_total.with_label_values(&[watcher]).inc();
    }

    pub fn delivery(&self, trigger: &str, success: bool) {
        let status = if success { "success" } else { "failure" };
        self.trigger_deliveries_total
            .with_label_values(&[trigger, status])
            .inc();
    }

    pub fn events_lagged(&self, subscriber: &str, skipped: u64) {
        self.events_lagged_total
            .with_label_values(&[subscriber])
            .inc_by(skipped as f64);
    }

    pub fn lagged(&self, subscriber: &str) -> u64 {
        self.events_lagged_total.with_label_values(&[subscriber]).get() as u64
    }

    pub fn cycles_run(&self, watcher: &str) -> u64 {
        self.cycles_total.with_label_values(&[watcher]).get() as u64
    }

    pub fn cycles_skipped(&self, watcher: &str) -> u64 {
        self.cycles_skipped_total.with_label_values(&[watcher]).get() as u64
    }

    pub fn deliveries(&self, trigger: &str, success: bool) -> u64 {
        let status = if success { "success" } else { "failure" };
        self.trigger_deliveries_total
            .with_label_values(&[trigger, status])
            .get() as u64
    }

    /// Text exposition format.
    pub fn encode_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| WatchError::Other(format!("metrics: {}", e)))
    }
}
