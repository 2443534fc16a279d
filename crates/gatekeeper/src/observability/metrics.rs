//! Metrics definitions for the gatekeeper core.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gk_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `verb`: 8 values (grq, rrq, urq, arq, drq, brq, lrq, irr)
//! - `outcome`: 4 values (confirm, reject, ignore, in_progress)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle the
/// embedder serves scrapes from.
///
/// Must be called before any metrics are recorded. The request histogram
/// buckets are sub-millisecond-heavy: the fast path never blocks on more
/// than registry locks.
///
/// # Errors
///
/// Returns an error if the recorder fails to install (e.g. already
/// installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gk_request".to_string()),
            &[
                0.000_1, 0.000_25, 0.000_5, 0.001, 0.002_5, 0.005, 0.010, 0.025, 0.050, 0.100,
            ],
        )
        .map_err(|e| format!("Failed to set request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Record one handled RAS request.
pub fn record_request(verb: &'static str, outcome: &'static str, duration: Duration) {
    counter!("gk_requests_total", "verb" => verb, "outcome" => outcome).increment(1);
    histogram!("gk_request_duration_seconds", "verb" => verb).record(duration.as_secs_f64());
}

/// Count a completed registration (new endpoint).
pub fn record_registration() {
    counter!("gk_registrations_total").increment(1);
}

/// Count a newly admitted call.
pub fn record_call_admitted() {
    counter!("gk_calls_admitted_total").increment(1);
}

/// Track the live registration count.
pub fn set_endpoints_active(count: usize) {
    gauge!("gk_endpoints_active").set(count as f64);
}

/// Track the live call count.
pub fn set_calls_active(count: usize) {
    gauge!("gk_calls_active").set(count as f64);
}

/// Track unreserved pool bandwidth (100 bits/s units).
pub fn set_bandwidth_available(available: u64) {
    gauge!("gk_bandwidth_available").set(available as f64);
}

/// Track the deferred-work queue depth.
pub fn set_deferred_depth(depth: usize) {
    gauge!("gk_deferred_depth").set(depth as f64);
}

/// Count a deferred request dropped because the queue was full.
pub fn record_deferred_dropped() {
    counter!("gk_deferred_dropped_total").increment(1);
}

/// Count a deferred result discarded because a newer request superseded it.
pub fn record_deferred_superseded() {
    counter!("gk_deferred_superseded_total").increment(1);
}

/// Count one monitor sweep.
pub fn record_monitor_sweep(expired_endpoints: usize, dropped_calls: usize) {
    counter!("gk_monitor_sweeps_total").increment(1);
    if expired_endpoints > 0 {
        counter!("gk_endpoints_expired_total").increment(expired_endpoints as u64);
    }
    if dropped_calls > 0 {
        counter!("gk_calls_heartbeat_dropped_total").increment(dropped_calls as u64);
    }
}
