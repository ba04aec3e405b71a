//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Dispatch (searches sent, failures, throttle denials)
//! - Queue (enqueued entries, depth)
//! - Reconciliation (runs, upserts, deletions)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Dispatch metrics
// =============================================================================

/// Search dispatches total by outcome.
pub static DISPATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("seekarr_dispatches_total", "Total search dispatches"),
        &["outcome"], // "sent", "failed", "rate_limited", "auth_rejected"
    )
    .unwrap()
});

/// Dispatch request duration in seconds.
pub static DISPATCH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "seekarr_dispatch_duration_seconds",
            "Duration of remote search submissions",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .unwrap()
});

/// Throttle denials by reason.
pub static THROTTLE_DENIALS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("seekarr_throttle_denials_total", "Dispatch denials by the throttle"),
        &["reason"], // "rate_limit", "daily_budget_exhausted", "paused"
    )
    .unwrap()
});

// =============================================================================
// Queue metrics
// =============================================================================

/// Entries enqueued total.
pub static ENQUEUED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("seekarr_enqueued_total", "Registry entries enqueued"),
        &["kind"], // "gap", "upgrade"
    )
    .unwrap()
});

/// Current queue depth across all connections.
pub static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("seekarr_queue_depth", "Queue entries awaiting dispatch").unwrap()
});

// =============================================================================
// Reconciliation metrics
// =============================================================================

/// Reconciliation runs by result.
pub static SYNC_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("seekarr_sync_runs_total", "Reconciliation passes"),
        &["result"], // "ok", "failed"
    )
    .unwrap()
});

/// Mirror rows deleted by reconciliation (with their registry cascade).
pub static SYNC_DELETIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("seekarr_sync_deletions_total", "Mirror rows removed by reconciliation"),
        &["content_type"], // "episode", "movie"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(DISPATCHES_TOTAL.clone()),
        Box::new(DISPATCH_DURATION.clone()),
        Box::new(THROTTLE_DENIALS.clone()),
        Box::new(ENQUEUED_TOTAL.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(SYNC_RUNS.clone()),
        Box::new(SYNC_DELETIONS.clone()),
    ]
}
