//! Liveness monitor background task.
//!
//! One periodic sweep distinguishes "slow" from "dead" without operator
//! intervention: registrations whose lease lapsed are removed through the
//! same unregistration path URQ uses, and calls that go silent past the
//! heartbeat interval are first probed with an InfoRequest, then either
//! force-disengaged or counted as stale, per policy.
//!
//! The sweep iterates over registry snapshots and does all per-record work
//! on cloned `Arc`s, so no registry-wide lock is held across more than one
//! record's processing.
//!
//! # Graceful Shutdown
//!
//! The task supports graceful shutdown via a cancellation token. When the
//! token is cancelled, the task completes its current sweep and exits
//! cleanly.

use crate::gatekeeper::Gatekeeper;
use crate::observability::metrics;
use crate::registry::HeartbeatStatus;
use ras_protocol::{DisengageReason, InfoRequest, RasPush};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// What one sweep did. Returned for logging and assertions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    /// Registrations removed because their lease lapsed.
    pub expired_endpoints: usize,
    /// Calls probed with an InfoRequest after one silent interval.
    pub probed_calls: usize,
    /// Calls force-disengaged after a second silent interval.
    pub dropped_calls: usize,
    /// Calls kept past the deadline and counted as stale.
    pub stale_calls: usize,
}

/// Start the monitor background task.
///
/// Sweeps every `monitor_interval_seconds` until the cancellation token is
/// triggered.
#[instrument(skip_all, name = "gk.task.monitor")]
pub async fn start_monitor(gatekeeper: Arc<Gatekeeper>, cancel_token: CancellationToken) {
    let interval_seconds = gatekeeper.config().monitor_interval_seconds.max(1);
    info!(
        target: "gk.task.monitor",
        interval = interval_seconds,
        ttl_default = gatekeeper.config().default_ttl_seconds,
        heartbeat = gatekeeper.config().info_response_rate_seconds,
        "Starting monitor task"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let summary = sweep_once(&gatekeeper);
                if summary != SweepSummary::default() {
                    info!(
                        target: "gk.task.monitor",
                        expired = summary.expired_endpoints,
                        probed = summary.probed_calls,
                        dropped = summary.dropped_calls,
                        stale = summary.stale_calls,
                        "Sweep cleaned up"
                    );
                }
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "gk.task.monitor",
                    "Monitor task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "gk.task.monitor", "Monitor task stopped");
}

/// Run one sweep: age out registrations, then verify call heartbeats.
///
/// Exposed separately so tests can drive sweeps without waiting on the
/// interval.
pub fn sweep_once(gatekeeper: &Gatekeeper) -> SweepSummary {
    let mut summary = SweepSummary::default();

    for endpoint in gatekeeper.endpoints().snapshot() {
        if endpoint.has_exceeded_time_to_live() {
            gatekeeper.expire_endpoint(&endpoint);
            summary.expired_endpoints += 1;
        }
    }

    sweep_calls(gatekeeper, &mut summary);

    metrics::record_monitor_sweep(summary.expired_endpoints, summary.dropped_calls);
    summary
}

fn sweep_calls(gatekeeper: &Gatekeeper, summary: &mut SweepSummary) {
    let heartbeat_seconds = gatekeeper.config().info_response_rate_seconds;
    if heartbeat_seconds == 0 {
        return;
    }
    let deadline = Duration::from_secs(u64::from(heartbeat_seconds));

    for call in gatekeeper.calls().snapshot() {
        let elapsed = call.heartbeat_elapsed();
        match call.heartbeat_status() {
            HeartbeatStatus::Confirmed if elapsed > deadline => {
                debug!(
                    target: "gk.task.monitor",
                    call_id = %call.call_id(),
                    silent_for = elapsed.as_secs(),
                    "Call silent past heartbeat interval, probing"
                );
                call.mark_unconfirmed();
                probe_call_legs(gatekeeper, &call);
                summary.probed_calls += 1;
            }
            HeartbeatStatus::Unconfirmed if elapsed > deadline.saturating_mul(2) => {
                if gatekeeper.config().disengage_on_heartbeat_fail {
                    warn!(
                        target: "gk.task.monitor",
                        call_id = %call.call_id(),
                        silent_for = elapsed.as_secs(),
                        "Call failed heartbeat verification, force disengaging"
                    );
                    gatekeeper.force_disengage(
                        &call.call_id(),
                        DisengageReason::ForcedDrop,
                        true,
                    );
                    summary.dropped_calls += 1;
                } else {
                    warn!(
                        target: "gk.task.monitor",
                        call_id = %call.call_id(),
                        "Call failed heartbeat verification, keeping as stale"
                    );
                    call.mark_stale();
                    gatekeeper.stats().record_stale_call();
                    summary.stale_calls += 1;
                }
            }
            _ => {}
        }
    }
}

/// Push an out-of-band InfoRequest to every endpoint owning a leg.
fn probe_call_legs(gatekeeper: &Gatekeeper, call: &crate::registry::GatekeeperCall) {
    for leg in call.legs() {
        let Some(endpoint) = gatekeeper.endpoints().find_by_identifier(&leg) else {
            continue;
        };
        if let Some(ras) = endpoint.ras_addresses().first() {
            gatekeeper.sink().send_push(
                *ras,
                RasPush::InfoRequest(InfoRequest {
                    seq: gatekeeper.next_push_seq(),
                    call_id: Some(call.call_id()),
                }),
            );
        }
    }
}
