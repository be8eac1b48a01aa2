//! Prometheus metrics for the release pipeline.
//!
//! Counters cover candidate screening, dispatch outcomes and provider
//! failures. Nothing is exported over HTTP; the daemon renders the registry
//! as text when it shuts down.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

// =============================================================================
// Candidate screening
// =============================================================================

/// Candidates seen by the shared pipeline, by outcome.
pub static CANDIDATES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "releasewatch_candidates_total",
            "Release candidates screened by the pipeline",
        ),
        // "accepted", "no_key", "no_section", "duplicate", "filtered", "history_error", "fetch_failed"
        &["result"],
    )
    .unwrap()
});

/// Time spent in one provider poll.
pub static POLL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "releasewatch_poll_duration_seconds",
            "Duration of a single provider poll",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["provider"],
    )
    .unwrap()
});

// =============================================================================
// Dispatch
// =============================================================================

/// Dispatch attempts by outcome.
pub static DISPATCH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "releasewatch_dispatch_total",
            "Releases handed to the download client",
        ),
        // "recorded", "already_recorded", "unrecorded", "rejected"
        &["result"],
    )
    .unwrap()
});

/// Releases accepted by the client but missing from history.
pub static UNRECORDED_RELEASES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "releasewatch_unrecorded_releases",
        "Accepted releases whose history write is pending",
    )
    .unwrap()
});

// =============================================================================
// Providers
// =============================================================================

/// Provider failures by provider name and error kind.
pub static PROVIDER_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "releasewatch_provider_errors_total",
            "Failed provider calls",
        ),
        // kind: "timeout", "connection", "http", "too_large", "parse", "protocol", "rate_limited", "unknown"
        &["provider", "kind"],
    )
    .unwrap()
});

/// API cooldowns entered after a rate-limit response.
pub static COOLDOWNS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "releasewatch_cooldowns_total",
        "Cooldowns entered after the API call limit was hit",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Every metric defined here, for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CANDIDATES_TOTAL.clone()),
        Box::new(POLL_DURATION.clone()),
        Box::new(DISPATCH_TOTAL.clone()),
        Box::new(UNRECORDED_RELEASES.clone()),
        Box::new(PROVIDER_ERRORS_TOTAL.clone()),
        Box::new(COOLDOWNS_TOTAL.clone()),
    ]
}

/// Register every metric with `registry`.
pub fn register(registry: &Registry) -> prometheus::Result<()> {
    for metric in all_metrics() {
        registry.register(metric)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_exposes_all_families() {
        let registry = Registry::new();
        register(&registry).unwrap();

        CANDIDATES_TOTAL.with_label_values(&["accepted"]).inc();
        POLL_DURATION.with_label_values(&["feed"]).observe(0.2);
        DISPATCH_TOTAL.with_label_values(&["recorded"]).inc();
        PROVIDER_ERRORS_TOTAL
            .with_label_values(&["btn", "timeout"])
            .inc();
        COOLDOWNS_TOTAL.inc();
        UNRECORDED_RELEASES.set(0);

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        for expected in [
            "releasewatch_candidates_total",
            "releasewatch_poll_duration_seconds",
            "releasewatch_dispatch_total",
            "releasewatch_unrecorded_releases",
            "releasewatch_provider_errors_total",
            "releasewatch_cooldowns_total",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        register(&registry).unwrap();
        assert!(register(&registry).is_err());
    }
}
