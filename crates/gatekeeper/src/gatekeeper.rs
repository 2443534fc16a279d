//! The gatekeeper aggregate root.
//!
//! One instance owns the endpoint and call registries, the bandwidth pool,
//! statistics and the identifier counters for its whole lifetime; dropping
//! it drops every registration and call with it. Multiple listeners and the
//! monitor all share one instance behind an `Arc`.

use crate::auth::{Authenticator, PasswordAuthenticator};
use crate::config::GatekeeperConfig;
use crate::outbound::RasSink;
use crate::policy::{AdmissionPolicy, DefaultPolicy};
use crate::registry::{BandwidthPool, CallRegistry, EndpointRegistry};
use crate::router::{RemoteLocator, Router};
use crate::stats::GatekeeperStats;
use common::types::EndpointId;
use ras_protocol::SequenceNumber;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Gatekeeper state and policy. See the crate docs for the architecture.
pub struct Gatekeeper {
    config: GatekeeperConfig,
    endpoints: EndpointRegistry,
    calls: CallRegistry,
    bandwidth: BandwidthPool,
    stats: GatekeeperStats,
    policy: Box<dyn AdmissionPolicy>,
    authenticator: Box<dyn Authenticator>,
    router: Router,
    sink: Arc<dyn RasSink>,
    /// Seeded from wall-clock time at construction so identifiers stay
    /// unique across restarts.
    identifier_base: u64,
    next_identifier: AtomicU64,
    /// Sequence numbers for core-initiated pushes.
    push_seq: AtomicU32,
}

impl Gatekeeper {
    /// Create a gatekeeper with the default policy and the password
    /// authenticator built from the configured password map.
    #[must_use]
    pub fn new(config: GatekeeperConfig, sink: Arc<dyn RasSink>) -> Self {
        let bandwidth = BandwidthPool::new(
            config.total_bandwidth,
            config.default_bandwidth_per_call,
            config.max_bandwidth_per_call,
        );
        let policy = Box::new(DefaultPolicy {
            registered_only_calls: config.registered_only_calls,
            registered_only_answers: config.registered_only_answers,
        });
        let authenticator = Box::new(PasswordAuthenticator::new(
            config.passwords.clone(),
            config.clock_skew_seconds,
        ));
        let router = Router::new(
            config.gatekeeper_routed,
            config.signal_address,
            config.alias_can_be_host,
        );

        Self {
            endpoints: EndpointRegistry::new(),
            calls: CallRegistry::new(),
            bandwidth,
            stats: GatekeeperStats::new(),
            policy,
            authenticator,
            router,
            sink,
            identifier_base: chrono::Utc::now().timestamp().unsigned_abs(),
            next_identifier: AtomicU64::new(1),
            push_seq: AtomicU32::new(1),
            config,
        }
    }

    /// Replace the admission policy hooks.
    #[must_use]
    pub fn with_policy(mut self, policy: Box<dyn AdmissionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the authenticator.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Box<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Enable cross-gatekeeper lookups on the deferred path.
    #[must_use]
    pub fn with_remote_locator(mut self, locator: Arc<dyn RemoteLocator>) -> Self {
        self.router.set_remote_locator(locator);
        self
    }

    #[must_use]
    pub fn config(&self) -> &GatekeeperConfig {
        &self.config
    }

    /// Identifier this gatekeeper answers to.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.config.gatekeeper_identifier
    }

    #[must_use]
    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }

    #[must_use]
    pub fn calls(&self) -> &CallRegistry {
        &self.calls
    }

    #[must_use]
    pub fn bandwidth(&self) -> &BandwidthPool {
        &self.bandwidth
    }

    #[must_use]
    pub fn stats(&self) -> &GatekeeperStats {
        &self.stats
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub fn sink(&self) -> &Arc<dyn RasSink> {
        &self.sink
    }

    pub(crate) fn policy(&self) -> &dyn AdmissionPolicy {
        self.policy.as_ref()
    }

    pub(crate) fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    #[must_use]
    pub fn active_registrations(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn active_calls(&self) -> usize {
        self.calls.len()
    }

    /// Mint an endpoint identifier unique over this gatekeeper's lifetime
    /// (and, thanks to the time-seeded base, across restarts).
    pub(crate) fn create_endpoint_identifier(&self) -> EndpointId {
        let n = self.next_identifier.fetch_add(1, Ordering::Relaxed);
        EndpointId(format!("{}:{n}", self.identifier_base))
    }

    /// Next sequence number for a core-initiated push.
    pub(crate) fn next_push_seq(&self) -> SequenceNumber {
        self.push_seq.fetch_add(1, Ordering::Relaxed)
    }
}
