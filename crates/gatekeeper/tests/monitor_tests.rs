//! Integration tests for the liveness monitor.
//!
//! Uses the paused Tokio clock to simulate leases and heartbeat intervals
//! lapsing without real waiting. Sweeps are driven directly so each
//! assertion sits on a known point of the timeline.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use gatekeeper::tasks::{start_monitor, sweep_once};
use gatekeeper::GatekeeperConfig;
use gk_test_utils::{irr, GatekeeperHarness, RrqBuilder};
use ras_protocol::RasPush;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POOL: u64 = 10_000;

fn harness() -> GatekeeperHarness {
    let config = GatekeeperConfig {
        total_bandwidth: POOL,
        info_response_rate_seconds: 60,
        ..GatekeeperConfig::default()
    };
    GatekeeperHarness::with_config(config)
}

#[tokio::test(start_paused = true)]
async fn test_lapsed_lease_removes_registration() {
    let harness = harness();
    harness.handle(RrqBuilder::new(1, &["1001"]).time_to_live(60).build());
    assert_eq!(harness.gatekeeper().active_registrations(), 1);

    // One second short of the lease: still alive.
    tokio::time::advance(Duration::from_secs(59)).await;
    sweep_once(harness.gatekeeper());
    assert_eq!(harness.gatekeeper().active_registrations(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    let summary = sweep_once(harness.gatekeeper());
    assert_eq!(summary.expired_endpoints, 1);
    assert_eq!(harness.gatekeeper().active_registrations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_keep_alive_defers_expiry() {
    let harness = harness();
    let endpoint_id = {
        use gatekeeper::Disposition;
        use ras_protocol::RasReply;
        match harness.handle(RrqBuilder::new(1, &["1001"]).time_to_live(60).build()) {
            Disposition::Confirm(RasReply::RegistrationConfirm(rcf)) => rcf.endpoint_id,
            other => panic!("registration failed: {other:?}"),
        }
    };

    tokio::time::advance(Duration::from_secs(40)).await;
    harness.handle(RrqBuilder::keep_alive(2, endpoint_id).build());

    // 81s after registration, but only 41s after the refresh.
    tokio::time::advance(Duration::from_secs(41)).await;
    sweep_once(harness.gatekeeper());
    assert_eq!(harness.gatekeeper().active_registrations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_ttl_never_expires() {
    let config = GatekeeperConfig {
        default_ttl_seconds: 0,
        ..GatekeeperConfig::default()
    };
    let harness = GatekeeperHarness::with_config(config);
    harness.register("1001", "10.0.0.1:1720");

    tokio::time::advance(Duration::from_secs(86_400)).await;
    sweep_once(harness.gatekeeper());
    assert_eq!(harness.gatekeeper().active_registrations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_call_is_probed_then_dropped() {
    let harness = harness();
    let caller = harness.register("1001", "10.0.0.1:1720");
    harness.register("1002", "10.0.0.2:1720");
    harness.admit(2, caller, "1002", 640);
    assert_eq!(harness.gatekeeper().bandwidth().available(), POOL - 640);

    // First silent interval: probe, don't drop.
    tokio::time::advance(Duration::from_secs(61)).await;
    let summary = sweep_once(harness.gatekeeper());
    assert_eq!(summary.probed_calls, 1);
    assert_eq!(summary.dropped_calls, 0);
    assert_eq!(harness.gatekeeper().active_calls(), 1);
    assert!(harness
        .sink()
        .pushes()
        .iter()
        .any(|(_, push)| matches!(push, RasPush::InfoRequest(_))));

    // Second silent interval: the call is dead.
    tokio::time::advance(Duration::from_secs(61)).await;
    let summary = sweep_once(harness.gatekeeper());
    assert_eq!(summary.dropped_calls, 1);
    assert_eq!(harness.gatekeeper().active_calls(), 0);
    assert_eq!(harness.gatekeeper().bandwidth().available(), POOL);
    assert!(harness
        .sink()
        .pushes()
        .iter()
        .any(|(_, push)| matches!(push, RasPush::Disengage(_))));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_rescues_probed_call() {
    let harness = harness();
    let caller = harness.register("1001", "10.0.0.1:1720");
    harness.register("1002", "10.0.0.2:1720");
    let call_id = harness.admit(2, caller.clone(), "1002", 640);

    tokio::time::advance(Duration::from_secs(61)).await;
    sweep_once(harness.gatekeeper());

    // The endpoint answers the probe; the call is healthy again.
    harness.handle(irr(3, caller, &[call_id]));

    tokio::time::advance(Duration::from_secs(61)).await;
    let summary = sweep_once(harness.gatekeeper());
    assert_eq!(summary.dropped_calls, 0);
    // Silent again since the heartbeat, so it is re-probed, not dropped.
    assert_eq!(summary.probed_calls, 1);
    assert_eq!(harness.gatekeeper().active_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_failure_only_counts_when_drop_disabled() {
    let config = GatekeeperConfig {
        total_bandwidth: POOL,
        info_response_rate_seconds: 60,
        disengage_on_heartbeat_fail: false,
        ..GatekeeperConfig::default()
    };
    let harness = GatekeeperHarness::with_config(config);
    let caller = harness.register("1001", "10.0.0.1:1720");
    harness.register("1002", "10.0.0.2:1720");
    harness.admit(2, caller, "1002", 640);

    tokio::time::advance(Duration::from_secs(61)).await;
    sweep_once(harness.gatekeeper());
    tokio::time::advance(Duration::from_secs(61)).await;
    let summary = sweep_once(harness.gatekeeper());

    assert_eq!(summary.dropped_calls, 0);
    assert_eq!(summary.stale_calls, 1);
    // The call survives, but the books record it went stale.
    assert_eq!(harness.gatekeeper().active_calls(), 1);
    assert_eq!(harness.gatekeeper().stats().snapshot().stale_calls, 1);

    // A later sweep does not count the same call twice.
    tokio::time::advance(Duration::from_secs(61)).await;
    let summary = sweep_once(harness.gatekeeper());
    assert_eq!(summary.stale_calls, 0);
    assert_eq!(harness.gatekeeper().stats().snapshot().stale_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_task_sweeps_on_interval() {
    let config = GatekeeperConfig {
        monitor_interval_seconds: 5,
        ..GatekeeperConfig::default()
    };
    let harness = GatekeeperHarness::with_config(config);
    harness.handle(RrqBuilder::new(1, &["1001"]).time_to_live(60).build());

    let cancel_token = CancellationToken::new();
    let task = tokio::spawn(start_monitor(
        std::sync::Arc::clone(harness.gatekeeper()),
        cancel_token.clone(),
    ));

    // Let the lease lapse and give the task a tick to notice.
    tokio::time::advance(Duration::from_secs(61)).await;
    tokio::time::advance(Duration::from_secs(5)).await;
    tokio::task::yield_now().await;
    assert_eq!(harness.gatekeeper().active_registrations(), 0);

    cancel_token.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("monitor should stop after cancellation")
        .expect("monitor should not panic");
}
