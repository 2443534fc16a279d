//! Integration tests for the admission flow.
//!
//! Drives ARQ/BRQ/DRQ traffic through the full engine path and asserts on
//! call registry state and exact bandwidth accounting:
//! - Admission grants and destination resolution
//! - Bandwidth adjustment and release
//! - Two legs of one call collapsing onto a single record
//! - Policy rejections consuming nothing

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use common::types::CallId;
use gatekeeper::{Disposition, GatekeeperConfig};
use gk_test_utils::{brq, drq, ArqBuilder, GatekeeperHarness, RrqBuilder};
use ras_protocol::{
    AdmissionRejectReason, CallDirection, CallModel, RasReply,
};
use std::sync::Arc;

const POOL: u64 = 10_000;

fn harness() -> GatekeeperHarness {
    let config = GatekeeperConfig {
        total_bandwidth: POOL,
        ..GatekeeperConfig::default()
    };
    GatekeeperHarness::with_config(config)
}

fn confirm(disposition: Disposition) -> RasReply {
    match disposition {
        Disposition::Confirm(reply) => reply,
        other => panic!("expected confirm, got {other:?}"),
    }
}

fn reject(disposition: Disposition) -> RasReply {
    match disposition {
        Disposition::Reject(reply) => reply,
        other => panic!("expected reject, got {other:?}"),
    }
}

#[tokio::test]
async fn test_admission_grants_bandwidth_and_destination() {
    let harness = harness();
    let caller = harness.register("1001", "10.0.0.1:1720");
    harness.register("1002", "10.0.0.2:1720");

    let call_id = CallId::new();
    let reply = confirm(harness.handle(
        ArqBuilder::new(2, caller)
            .call_id(call_id)
            .to_alias("1002")
            .bandwidth(640)
            .build(),
    ));

    let RasReply::AdmissionConfirm(acf) = reply else {
        panic!("expected ACF, got {reply:?}");
    };
    assert_eq!(acf.bandwidth, 640);
    assert_eq!(acf.dest_signal_address.to_string(), "10.0.0.2:1720");
    assert_eq!(acf.call_model, CallModel::Direct);

    let gk = harness.gatekeeper();
    assert_eq!(gk.active_calls(), 1);
    assert_eq!(gk.bandwidth().available(), POOL - 640);
}

#[tokio::test]
async fn test_bandwidth_reduction_returns_capacity() {
    let harness = harness();
    let caller = harness.register("1001", "10.0.0.1:1720");
    harness.register("1002", "10.0.0.2:1720");
    let call_id = harness.admit(2, caller.clone(), "1002", 640);

    let reply = confirm(harness.handle(brq(3, caller, call_id, 320)));

    let RasReply::BandwidthConfirm(bcf) = reply else {
        panic!("expected BCF, got {reply:?}");
    };
    assert_eq!(bcf.bandwidth, 320);
    // Net charge is now 320; the difference went back to the pool.
    assert_eq!(harness.gatekeeper().bandwidth().available(), POOL - 320);
}

#[tokio::test]
async fn test_disengage_releases_everything() {
    let harness = harness();
    let caller = harness.register("1001", "10.0.0.1:1720");
    harness.register("1002", "10.0.0.2:1720");
    let call_id = harness.admit(2, caller.clone(), "1002", 640);

    let reply = confirm(harness.handle(drq(3, caller, call_id)));

    assert!(matches!(reply, RasReply::DisengageConfirm(_)));
    let gk = harness.gatekeeper();
    assert_eq!(gk.active_calls(), 0);
    assert_eq!(gk.bandwidth().available(), POOL);
}

#[tokio::test]
async fn test_disengage_unknown_call_confirms_anyway() {
    let harness = harness();
    let caller = harness.register("1001", "10.0.0.1:1720");

    // A DRQ can race cleanup that already removed the call; confirming is
    // the correct answer either way.
    let reply = confirm(harness.handle(drq(2, caller, CallId::new())));
    assert!(matches!(reply, RasReply::DisengageConfirm(_)));
}

#[tokio::test]
async fn test_both_legs_collapse_to_one_call() {
    let harness = harness();
    let caller = harness.register("1001", "10.0.0.1:1720");
    let callee = harness.register("1002", "10.0.0.2:1720");

    let call_id = CallId::new();
    confirm(harness.handle(
        ArqBuilder::new(2, caller)
            .call_id(call_id)
            .to_alias("1002")
            .bandwidth(640)
            .build(),
    ));
    confirm(harness.handle(
        ArqBuilder::new(3, callee)
            .call_id(call_id)
            .direction(CallDirection::Answering)
            .from_alias("1001")
            .bandwidth(640)
            .build(),
    ));

    // One record, one charge.
    let gk = harness.gatekeeper();
    assert_eq!(gk.active_calls(), 1);
    assert_eq!(gk.bandwidth().available(), POOL - 640);

    let call = gk.calls().find(&call_id).unwrap();
    assert_eq!(call.legs().len(), 2);
}

#[tokio::test]
async fn test_registered_only_calling_rejects_unknown_destination() {
    let config = GatekeeperConfig {
        total_bandwidth: POOL,
        registered_only_calls: true,
        ..GatekeeperConfig::default()
    };
    let harness = GatekeeperHarness::with_config(config);
    let caller = harness.register("1001", "10.0.0.1:1720");

    let reply = reject(harness.handle(
        ArqBuilder::new(2, caller)
            .to_alias("9999")
            .bandwidth(640)
            .build(),
    ));

    assert!(matches!(reply, RasReply::AdmissionReject(..)));
    // Nothing created, nothing charged.
    let gk = harness.gatekeeper();
    assert_eq!(gk.active_calls(), 0);
    assert_eq!(gk.bandwidth().available(), POOL);
}

#[tokio::test]
async fn test_unknown_destination_rejects_called_party_not_registered() {
    let harness = harness();
    let caller = harness.register("1001", "10.0.0.1:1720");

    let reply = reject(harness.handle(
        ArqBuilder::new(2, caller)
            .to_alias("nowhere")
            .bandwidth(640)
            .build(),
    ));

    assert_eq!(
        reply,
        RasReply::AdmissionReject(2, AdmissionRejectReason::CalledPartyNotRegistered)
    );
}

#[tokio::test]
async fn test_admission_from_unregistered_endpoint_rejected() {
    let harness = harness();
    harness.register("1002", "10.0.0.2:1720");

    let reply = reject(harness.handle(
        ArqBuilder::new(2, common::types::EndpointId::from("bogus:1"))
            .to_alias("1002")
            .build(),
    ));

    assert_eq!(
        reply,
        RasReply::AdmissionReject(2, AdmissionRejectReason::InvalidEndpointIdentifier)
    );
}

#[tokio::test]
async fn test_exhausted_pool_rejects_without_partial_charge() {
    let config = GatekeeperConfig {
        total_bandwidth: 1000,
        ..GatekeeperConfig::default()
    };
    let harness = GatekeeperHarness::with_config(config);
    let caller = harness.register("1001", "10.0.0.1:1720");
    harness.register("1002", "10.0.0.2:1720");
    harness.admit(2, caller.clone(), "1002", 640);

    let reply = reject(harness.handle(
        ArqBuilder::new(3, caller)
            .call_id(CallId::new())
            .to_alias("1002")
            .bandwidth(640)
            .build(),
    ));

    assert_eq!(
        reply,
        RasReply::AdmissionReject(3, AdmissionRejectReason::RequestDenied)
    );
    assert_eq!(harness.gatekeeper().bandwidth().available(), 1000 - 640);
    assert_eq!(harness.gatekeeper().active_calls(), 1);
}

#[tokio::test]
async fn test_gatekeeper_routed_admission_returns_own_address() {
    let config = GatekeeperConfig {
        total_bandwidth: POOL,
        gatekeeper_routed: true,
        signal_address: Some("10.0.0.254:1720".parse().unwrap()),
        ..GatekeeperConfig::default()
    };
    let harness = GatekeeperHarness::with_config(config);
    let caller = harness.register("1001", "10.0.0.1:1720");
    harness.register("1002", "10.0.0.2:1720");

    let reply = confirm(harness.handle(
        ArqBuilder::new(2, caller)
            .to_alias("1002")
            .bandwidth(640)
            .build(),
    ));

    let RasReply::AdmissionConfirm(acf) = reply else {
        panic!("expected ACF, got {reply:?}");
    };
    assert_eq!(acf.call_model, CallModel::GatekeeperRouted);
    assert_eq!(acf.dest_signal_address.to_string(), "10.0.0.254:1720");
}

#[tokio::test]
async fn test_prefix_routed_admission_reaches_gateway() {
    let harness = harness();
    let caller = harness.register("1001", "10.0.0.1:1720");
    confirm(harness.handle(
        RrqBuilder::new(1, &["trunk"])
            .signal_address("10.0.0.9:1720")
            .prefixes(&["9"])
            .build(),
    ));

    let reply = confirm(harness.handle(
        ArqBuilder::new(2, caller)
            .to_alias("95551234")
            .bandwidth(640)
            .build(),
    ));

    let RasReply::AdmissionConfirm(acf) = reply else {
        panic!("expected ACF, got {reply:?}");
    };
    assert_eq!(acf.dest_signal_address.to_string(), "10.0.0.9:1720");
}

#[tokio::test]
async fn test_location_lookup_resolves_registered_alias() {
    let harness = harness();
    harness.register("1002", "10.0.0.2:1720");

    let reply = confirm(harness.handle(gk_test_utils::lrq(5, &["1002"])));

    let RasReply::LocationConfirm(lcf) = reply else {
        panic!("expected LCF, got {reply:?}");
    };
    assert_eq!(lcf.seq, 5);
    assert_eq!(lcf.signal_address.to_string(), "10.0.0.2:1720");
}

/// Charged bandwidth plus pool headroom must equal capacity at every
/// observable instant, even with admissions, adjustments and disengages
/// racing each other.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_traffic_conserves_bandwidth() {
    let harness = Arc::new(harness());
    let caller = harness.register("1001", "10.0.0.1:1720");
    harness.register("1002", "10.0.0.2:1720");

    let mut handles = Vec::new();
    for task in 0..8u32 {
        let harness = Arc::clone(&harness);
        let caller = caller.clone();
        handles.push(tokio::spawn(async move {
            let base = 100 * (task + 1);
            for round in 0..20u32 {
                let call_id = CallId::new();
                let arq = ArqBuilder::new(base + round, caller.clone())
                    .call_id(call_id)
                    .to_alias("1002")
                    .bandwidth(640)
                    .build();
                if matches!(harness.handle(arq), Disposition::Confirm(_)) {
                    harness.handle(brq(base + round, caller.clone(), call_id, 320));
                    harness.handle(drq(base + round, caller.clone(), call_id));
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let gk = harness.gatekeeper();
    let charged = gk.calls().total_bandwidth();
    assert_eq!(charged + gk.bandwidth().available(), POOL);
    assert_eq!(gk.active_calls(), 0);
    assert_eq!(gk.bandwidth().available(), POOL);
}

/// An embedder can tighten admission by injecting its own policy hooks
/// without touching the rest of the server.
#[tokio::test]
async fn test_injected_policy_hook_gates_admission() {
    use gatekeeper::policy::AdmissionPolicy;
    use gatekeeper::registry::{EndpointRegistry, RegisteredEndpoint};
    use gatekeeper::{Gatekeeper, NullSink, RequestEngine};
    use ras_protocol::{AdmissionRequest, TransportAddress};

    struct BlockPremiumNumbers;

    impl AdmissionPolicy for BlockPremiumNumbers {
        fn check_alias_string(
            &self,
            _endpoints: &EndpointRegistry,
            _endpoint: &RegisteredEndpoint,
            _request: &AdmissionRequest,
            alias: &str,
        ) -> bool {
            !alias.starts_with("900")
        }
    }

    let config = GatekeeperConfig {
        total_bandwidth: POOL,
        ..GatekeeperConfig::default()
    };
    let gatekeeper = Gatekeeper::new(config, Arc::new(NullSink))
        .with_policy(Box::new(BlockPremiumNumbers));
    let engine = RequestEngine::new(Arc::new(gatekeeper));
    let from: TransportAddress = "10.0.0.1:1719".parse().unwrap();

    let caller = match engine.handle(RrqBuilder::new(1, &["1001"]).build(), from) {
        Disposition::Confirm(RasReply::RegistrationConfirm(rcf)) => rcf.endpoint_id,
        other => panic!("registration failed: {other:?}"),
    };
    engine.handle(
        RrqBuilder::new(1, &["9005551234"])
            .signal_address("10.0.0.2:1720")
            .build(),
        from,
    );

    let disposition = engine.handle(
        ArqBuilder::new(2, caller)
            .to_alias("9005551234")
            .bandwidth(640)
            .build(),
        from,
    );
    let Disposition::Reject(reply) = disposition else {
        panic!("expected reject, got {disposition:?}");
    };
    assert_eq!(
        reply,
        RasReply::AdmissionReject(2, AdmissionRejectReason::SecurityDenial)
    );
    assert_eq!(engine.gatekeeper().active_calls(), 0);
    assert_eq!(engine.gatekeeper().bandwidth().available(), POOL);
}
