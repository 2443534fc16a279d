//! Running gatekeeper statistics.
//!
//! Plain atomics owned by the gatekeeper instance, not process-wide
//! statics, so two gatekeepers in one process do not share counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Totals and peaks since the gatekeeper started.
#[derive(Debug, Default)]
pub struct GatekeeperStats {
    total_registrations: AtomicU64,
    peak_registrations: AtomicU64,
    total_calls: AtomicU64,
    peak_calls: AtomicU64,
    rejected_requests: AtomicU64,
    /// Calls that went silent past the heartbeat deadline but were kept.
    stale_calls: AtomicU64,
}

/// Point-in-time copy for reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_registrations: u64,
    pub peak_registrations: u64,
    pub total_calls: u64,
    pub peak_calls: u64,
    pub rejected_requests: u64,
    pub stale_calls: u64,
}

impl GatekeeperStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a new registration and track the active-count peak.
    pub fn record_registration(&self, active_now: u64) {
        self.total_registrations.fetch_add(1, Ordering::Relaxed);
        update_peak(&self.peak_registrations, active_now);
    }

    /// Count a new call and track the active-count peak.
    pub fn record_call(&self, active_now: u64) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        update_peak(&self.peak_calls, active_now);
    }

    pub fn record_reject(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_call(&self) {
        self.stale_calls.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_registrations: self.total_registrations.load(Ordering::Relaxed),
            peak_registrations: self.peak_registrations.load(Ordering::Relaxed),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            peak_calls: self.peak_calls.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            stale_calls: self.stale_calls.load(Ordering::Relaxed),
        }
    }
}

fn update_peak(peak: &AtomicU64, observed: u64) {
    let mut current = peak.load(Ordering::Relaxed);
    while observed > current {
        match peak.compare_exchange_weak(current, observed, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
}
