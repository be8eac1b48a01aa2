//! Process-wide metrics registry.
//!
//! Holds the core pipeline metrics plus a few gauges sampled from the
//! scheduler. There is no HTTP exporter; [`encode_metrics`] renders the
//! registry as Prometheus text for the shutdown log.

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};

use releasewatch_core::Scheduler;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    if let Err(e) = register_metrics(&registry) {
        tracing::warn!("Failed to register metrics: {}", e);
    }
    registry
});

// =============================================================================
// Scheduler Metrics
// =============================================================================

/// Whether the update loop is running (1) or not (0).
pub static SCHEDULER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "releasewatch_scheduler_running",
        "Whether the update loop is running",
    )
    .unwrap()
});

/// Completed polling rounds.
pub static SCHEDULER_TICKS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "releasewatch_scheduler_ticks",
        "Polling rounds completed since startup",
    )
    .unwrap()
});

/// Configured providers.
pub static PROVIDERS_CONFIGURED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "releasewatch_providers_configured",
        "Providers known to the scheduler",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(SCHEDULER_RUNNING.clone()))?;
    registry.register(Box::new(SCHEDULER_TICKS.clone()))?;
    registry.register(Box::new(PROVIDERS_CONFIGURED.clone()))?;

    // Pipeline, dispatch and provider metrics
    releasewatch_core::metrics::register(registry)
}

/// Encode all registered metrics in Prometheus text format.
pub fn encode_metrics() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Sample scheduler state into the gauges above.
pub fn collect_dynamic_metrics(scheduler: &Scheduler) {
    let status = scheduler.status();
    SCHEDULER_RUNNING.set(i64::from(status.running));
    SCHEDULER_TICKS.set(i64::try_from(status.ticks).unwrap_or(i64::MAX));
    PROVIDERS_CONFIGURED.set(status.providers as i64);
}
