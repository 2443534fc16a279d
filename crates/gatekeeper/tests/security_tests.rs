//! Integration tests for request authentication.
//!
//! Runs the gatekeeper with token verification required and checks which
//! requests get through, which are rejected, and which are silently
//! dropped under the anti-reflection policy.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use common::secret::SecretString;
use gatekeeper::{Disposition, GatekeeperConfig};
use gk_test_utils::{password_token, ArqBuilder, GatekeeperHarness, RrqBuilder};
use ras_protocol::{
    AdmissionRejectReason, AuthenticationMode, RasReply, RegistrationRejectReason,
};
use std::collections::HashMap;

fn secured_config() -> GatekeeperConfig {
    GatekeeperConfig {
        total_bandwidth: 10_000,
        require_security: true,
        passwords: HashMap::from([("1001".to_string(), SecretString::from("hunter2"))]),
        ..GatekeeperConfig::default()
    }
}

fn register_secured(harness: &GatekeeperHarness, seq: u32) -> common::types::EndpointId {
    let request = RrqBuilder::new(seq, &["1001"])
        .token(password_token("1001", "hunter2", seq))
        .build();
    match harness.handle(request) {
        Disposition::Confirm(RasReply::RegistrationConfirm(rcf)) => rcf.endpoint_id,
        other => panic!("secured registration failed: {other:?}"),
    }
}

#[tokio::test]
async fn test_discovery_advertises_auth_scheme_when_required() {
    let harness = GatekeeperHarness::with_config(secured_config());

    let Disposition::Confirm(RasReply::DiscoveryConfirm(gcf)) =
        harness.handle(gk_test_utils::grq(1))
    else {
        panic!("expected GCF");
    };
    assert_eq!(gcf.auth_mode, Some(AuthenticationMode::PasswordHash));
}

#[tokio::test]
async fn test_registration_with_valid_token_accepted() {
    let harness = GatekeeperHarness::with_config(secured_config());
    register_secured(&harness, 1);
    assert_eq!(harness.gatekeeper().active_registrations(), 1);
}

#[tokio::test]
async fn test_registration_without_token_rejected() {
    let harness = GatekeeperHarness::with_config(secured_config());

    let disposition = harness.handle(RrqBuilder::new(1, &["1001"]).build());

    let Disposition::Reject(reply) = disposition else {
        panic!("expected reject, got {disposition:?}");
    };
    assert_eq!(
        reply,
        RasReply::RegistrationReject(1, RegistrationRejectReason::SecurityDenial)
    );
    assert_eq!(harness.gatekeeper().active_registrations(), 0);
}

#[tokio::test]
async fn test_registration_with_wrong_password_rejected() {
    let harness = GatekeeperHarness::with_config(secured_config());

    let disposition = harness.handle(
        RrqBuilder::new(1, &["1001"])
            .token(password_token("1001", "guessed", 1))
            .build(),
    );

    assert!(matches!(disposition, Disposition::Reject(_)));
}

#[tokio::test]
async fn test_silent_discard_drops_unauthenticated_without_reply() {
    let config = GatekeeperConfig {
        silent_discard_unauthenticated: true,
        ..secured_config()
    };
    let harness = GatekeeperHarness::with_config(config);

    let disposition = harness.handle(RrqBuilder::new(1, &["1001"]).build());

    // No reject either: replying would confirm the alias exists and
    // reflect traffic to a spoofed source.
    assert!(matches!(disposition, Disposition::Ignore));
    assert!(harness.sink().replies().is_empty());
}

#[tokio::test]
async fn test_keep_alive_skips_token_revalidation() {
    let harness = GatekeeperHarness::with_config(secured_config());
    let endpoint_id = register_secured(&harness, 1);

    // Keep-alives only refresh a lease already vetted at full
    // registration time.
    let disposition = harness.handle(RrqBuilder::keep_alive(2, endpoint_id).build());
    assert!(matches!(disposition, Disposition::Confirm(_)));
}

#[tokio::test]
async fn test_admission_requires_token_from_secured_endpoint() {
    let harness = GatekeeperHarness::with_config(secured_config());
    let caller = register_secured(&harness, 1);

    let disposition = harness.handle(
        ArqBuilder::new(2, caller.clone())
            .to_address("10.0.0.2:1720")
            .build(),
    );
    let Disposition::Reject(reply) = disposition else {
        panic!("expected reject, got {disposition:?}");
    };
    assert_eq!(
        reply,
        RasReply::AdmissionReject(2, AdmissionRejectReason::SecurityDenial)
    );

    let disposition = harness.handle(
        ArqBuilder::new(3, caller)
            .to_address("10.0.0.2:1720")
            .token(password_token("1001", "hunter2", 3))
            .build(),
    );
    assert!(matches!(
        disposition,
        Disposition::Confirm(RasReply::AdmissionConfirm(_))
    ));
}

#[tokio::test]
async fn test_token_replay_on_other_sequence_rejected() {
    let harness = GatekeeperHarness::with_config(secured_config());
    let caller = register_secured(&harness, 1);

    // Token minted for sequence 9, replayed on a request with sequence 4.
    let disposition = harness.handle(
        ArqBuilder::new(4, caller)
            .to_address("10.0.0.2:1720")
            .token(password_token("1001", "hunter2", 9))
            .build(),
    );
    assert!(matches!(disposition, Disposition::Reject(_)));
}

/// An embedder can swap the whole verification scheme by injecting its
/// own authenticator.
#[tokio::test]
async fn test_injected_authenticator_replaces_password_checks() {
    use gatekeeper::auth::{AuthDecision, Authenticator};
    use gatekeeper::{Gatekeeper, NullSink, RequestEngine};
    use ras_protocol::{CryptoToken, SequenceNumber, TransportAddress};
    use std::sync::Arc;

    struct RejectEverything;

    impl Authenticator for RejectEverything {
        fn verify(&self, _seq: SequenceNumber, _tokens: &[CryptoToken]) -> AuthDecision {
            AuthDecision::Rejected
        }
    }

    let gatekeeper = Gatekeeper::new(secured_config(), Arc::new(NullSink))
        .with_authenticator(Box::new(RejectEverything));
    let engine = RequestEngine::new(Arc::new(gatekeeper));
    let from: TransportAddress = "10.0.0.1:1719".parse().unwrap();

    // Even a token the password store would accept is refused now.
    let disposition = engine.handle(
        RrqBuilder::new(1, &["1001"])
            .token(password_token("1001", "hunter2", 1))
            .build(),
        from,
    );
    let Disposition::Reject(reply) = disposition else {
        panic!("expected reject, got {disposition:?}");
    };
    assert_eq!(
        reply,
        RasReply::RegistrationReject(1, RegistrationRejectReason::SecurityDenial)
    );
}
