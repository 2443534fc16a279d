//! Per-message request engine.
//!
//! One [`RequestEngine::handle`] call per decoded datagram: identify the
//! target gatekeeper, resolve the sending endpoint, verify security, then
//! dispatch to the matching admission-controller method. Each step may
//! short-circuit to a reject, or to a silent drop for traffic we refuse to
//! reflect.
//!
//! The fast path never awaits anything; requests the controller cannot
//! answer from local state (remote alias lookups) come back as
//! [`Disposition::InProgress`] and finish on the bounded worker pool in
//! [`deferred`], which delivers the final reply through the outbound sink.

mod deferred;

pub(crate) use deferred::DeferredWork;
use deferred::{DeferredPool, SubmitOutcome};

use crate::auth::{AuthDecision, AuthState};
use crate::controller::Outcome;
use crate::gatekeeper::Gatekeeper;
use crate::observability::metrics;
use crate::registry::RegisteredEndpoint;
use ras_protocol::{
    AdmissionRejectReason, AdmissionRequest, BandwidthRejectReason, BandwidthRequest,
    DisengageRejectReason, DisengageRequest, DiscoveryRejectReason, DiscoveryRequest,
    InfoRejectReason, InfoResponse, LocationRejectReason, LocationRequest, RasReply, RasRequest,
    RegistrationRejectReason, RegistrationRequest, SequenceNumber, TransportAddress,
    UnregRejectReason, UnregistrationRequest, PROTOCOL_VERSION,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// What the listener should do with the datagram it just handed us.
#[derive(Debug)]
pub enum Disposition {
    /// Send this confirm.
    Confirm(RasReply),
    /// Send this reject.
    Reject(RasReply),
    /// Send nothing. Malformed or unauthenticated traffic we refuse to
    /// reflect or to confirm an identifier's existence to.
    Ignore,
    /// Send a Request-In-Progress now; the final confirm or reject arrives
    /// through the outbound sink once a deferred worker finishes.
    InProgress {
        seq: SequenceNumber,
        retry_after_seconds: u32,
    },
}

impl Disposition {
    /// Outcome label for metrics and logs.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Disposition::Confirm(_) => "confirm",
            Disposition::Reject(_) => "reject",
            Disposition::Ignore => "ignore",
            Disposition::InProgress { .. } => "in_progress",
        }
    }
}

/// Per-request state threaded through the handling steps. Dropped once the
/// reply is built (or handed to a deferred worker).
struct RequestContext {
    seq: SequenceNumber,
    reply_addr: TransportAddress,
    auth: AuthState,
    endpoint: Option<Arc<RegisteredEndpoint>>,
}

/// The per-message state machine shared by every listener thread.
///
/// Construction spawns the deferred worker pool, so it must happen inside a
/// Tokio runtime. Dropping the engine closes the work queue and the workers
/// drain and exit.
pub struct RequestEngine {
    gatekeeper: Arc<Gatekeeper>,
    deferred: DeferredPool,
}

impl RequestEngine {
    #[must_use]
    pub fn new(gatekeeper: Arc<Gatekeeper>) -> Self {
        let deferred = DeferredPool::start(Arc::clone(&gatekeeper));
        Self {
            gatekeeper,
            deferred,
        }
    }

    #[must_use]
    pub fn gatekeeper(&self) -> &Arc<Gatekeeper> {
        &self.gatekeeper
    }

    /// Handle one decoded RAS request.
    ///
    /// Synchronous: listener threads call this directly per datagram. The
    /// only blocking is on registry and pool locks, held for bounded
    /// lookups and swaps.
    #[instrument(skip_all, fields(verb = request.verb(), seq = request.seq(), from = %reply_addr))]
    pub fn handle(&self, request: RasRequest, reply_addr: TransportAddress) -> Disposition {
        let started = std::time::Instant::now();
        let verb = request.verb();

        let disposition = match request {
            RasRequest::Discovery(grq) => self.handle_discovery(&grq),
            RasRequest::Registration(rrq) => self.handle_registration(rrq, reply_addr),
            RasRequest::Unregistration(urq) => self.handle_unregistration(&urq, reply_addr),
            RasRequest::Admission(arq) => self.handle_admission(arq, reply_addr),
            RasRequest::Disengage(drq) => self.handle_disengage(&drq, reply_addr),
            RasRequest::Bandwidth(brq) => self.handle_bandwidth(&brq, reply_addr),
            RasRequest::Location(lrq) => self.handle_location(lrq, reply_addr),
            RasRequest::InfoResponse(irr) => self.handle_info_response(&irr, reply_addr),
        };

        if matches!(disposition, Disposition::Reject(_)) {
            self.gatekeeper.stats().record_reject();
        }
        metrics::record_request(verb, disposition.outcome(), started.elapsed());
        disposition
    }

    fn handle_discovery(&self, grq: &DiscoveryRequest) -> Disposition {
        if grq.protocol_version < PROTOCOL_VERSION {
            debug!(target: "gk.engine", announced = grq.protocol_version, "GRQ protocol too old");
            return Disposition::Reject(RasReply::DiscoveryReject(
                grq.seq,
                DiscoveryRejectReason::InvalidRevision,
            ));
        }
        if !self.target_matches(grq.gatekeeper_id.as_deref()) {
            return Disposition::Reject(RasReply::DiscoveryReject(
                grq.seq,
                DiscoveryRejectReason::TerminalExcluded,
            ));
        }
        settle(self.gatekeeper.on_discovery(grq))
    }

    fn handle_registration(
        &self,
        rrq: RegistrationRequest,
        reply_addr: TransportAddress,
    ) -> Disposition {
        if !self.target_matches(rrq.gatekeeper_id.as_deref()) {
            return Disposition::Reject(RasReply::RegistrationReject(
                rrq.seq,
                RegistrationRejectReason::DiscoveryRequired,
            ));
        }
        if rrq.protocol_version < PROTOCOL_VERSION {
            return Disposition::Reject(RasReply::RegistrationReject(
                rrq.seq,
                RegistrationRejectReason::InvalidRevision,
            ));
        }

        let mut context = RequestContext {
            seq: rrq.seq,
            reply_addr,
            auth: AuthState::Unknown,
            endpoint: None,
        };

        // A keep-alive only refreshes a lease we already vetted; a full
        // registration re-validates credentials per policy.
        if !rrq.keep_alive && self.gatekeeper.config().require_security {
            match self.verify_security(&mut context, &rrq.tokens) {
                SecurityCheck::Passed => {}
                SecurityCheck::Silent => return Disposition::Ignore,
                SecurityCheck::Failed => {
                    return Disposition::Reject(RasReply::RegistrationReject(
                        rrq.seq,
                        RegistrationRejectReason::SecurityDenial,
                    ));
                }
            }
        }

        settle(self.gatekeeper.on_registration(rrq))
    }

    fn handle_unregistration(
        &self,
        urq: &UnregistrationRequest,
        reply_addr: TransportAddress,
    ) -> Disposition {
        // URQ may identify the registration by identifier or, failing that,
        // by one of its signal addresses.
        let endpoint = urq
            .endpoint_id
            .as_ref()
            .and_then(|id| self.gatekeeper.endpoints().find_by_identifier(id))
            .or_else(|| {
                self.gatekeeper
                    .endpoints()
                    .find_by_signal_addresses(&urq.call_signal_addresses)
            });
        let Some(endpoint) = endpoint else {
            debug!(target: "gk.engine", "URQ from unknown registration");
            return Disposition::Reject(RasReply::UnregistrationReject(
                urq.seq,
                UnregRejectReason::NotCurrentlyRegistered,
            ));
        };

        let mut context = self.context_for(urq.seq, reply_addr, endpoint);
        match self.verify_endpoint_security(&mut context, &urq.tokens) {
            SecurityCheck::Passed => {}
            SecurityCheck::Silent => return Disposition::Ignore,
            SecurityCheck::Failed => {
                return Disposition::Reject(RasReply::UnregistrationReject(
                    urq.seq,
                    UnregRejectReason::SecurityDenial,
                ));
            }
        }

        let Some(endpoint) = context.endpoint.as_ref() else {
            return Disposition::Reject(RasReply::UnregistrationReject(
                urq.seq,
                UnregRejectReason::UndefinedReason,
            ));
        };
        settle(self.gatekeeper.on_unregistration(urq, endpoint))
    }

    fn handle_admission(&self, arq: AdmissionRequest, reply_addr: TransportAddress) -> Disposition {
        let Some(endpoint) = self
            .gatekeeper
            .endpoints()
            .find_by_identifier(&arq.endpoint_id)
        else {
            debug!(target: "gk.engine", endpoint = %arq.endpoint_id, "ARQ from unregistered endpoint");
            return Disposition::Reject(RasReply::AdmissionReject(
                arq.seq,
                AdmissionRejectReason::InvalidEndpointIdentifier,
            ));
        };

        let mut context = self.context_for(arq.seq, reply_addr, endpoint);
        match self.verify_endpoint_security(&mut context, &arq.tokens) {
            SecurityCheck::Passed => {}
            SecurityCheck::Silent => return Disposition::Ignore,
            SecurityCheck::Failed => {
                return Disposition::Reject(RasReply::AdmissionReject(
                    arq.seq,
                    AdmissionRejectReason::SecurityDenial,
                ));
            }
        }

        let Some(endpoint) = context.endpoint.clone() else {
            return Disposition::Reject(RasReply::AdmissionReject(
                arq.seq,
                AdmissionRejectReason::UndefinedReason,
            ));
        };
        match self.gatekeeper.on_admission(arq, &endpoint) {
            Outcome::Reply(reply) => settle(reply),
            Outcome::Deferred(work) => self.defer(work, &context),
        }
    }

    fn handle_disengage(
        &self,
        drq: &DisengageRequest,
        reply_addr: TransportAddress,
    ) -> Disposition {
        let Some(endpoint) = self
            .gatekeeper
            .endpoints()
            .find_by_identifier(&drq.endpoint_id)
        else {
            return Disposition::Reject(RasReply::DisengageReject(
                drq.seq,
                DisengageRejectReason::NotRegistered,
            ));
        };

        let mut context = self.context_for(drq.seq, reply_addr, endpoint);
        match self.verify_endpoint_security(&mut context, &drq.tokens) {
            SecurityCheck::Passed => {}
            SecurityCheck::Silent => return Disposition::Ignore,
            SecurityCheck::Failed => {
                return Disposition::Reject(RasReply::DisengageReject(
                    drq.seq,
                    DisengageRejectReason::SecurityDenial,
                ));
            }
        }

        let Some(endpoint) = context.endpoint.as_ref() else {
            return Disposition::Reject(RasReply::DisengageReject(
                drq.seq,
                DisengageRejectReason::UndefinedReason,
            ));
        };
        settle(self.gatekeeper.on_disengage(drq, endpoint))
    }

    fn handle_bandwidth(
        &self,
        brq: &BandwidthRequest,
        reply_addr: TransportAddress,
    ) -> Disposition {
        let Some(endpoint) = self
            .gatekeeper
            .endpoints()
            .find_by_identifier(&brq.endpoint_id)
        else {
            return Disposition::Reject(RasReply::BandwidthReject(
                brq.seq,
                BandwidthRejectReason::NotBound,
            ));
        };

        let mut context = self.context_for(brq.seq, reply_addr, endpoint);
        match self.verify_endpoint_security(&mut context, &brq.tokens) {
            SecurityCheck::Passed => {}
            SecurityCheck::Silent => return Disposition::Ignore,
            SecurityCheck::Failed => {
                return Disposition::Reject(RasReply::BandwidthReject(
                    brq.seq,
                    BandwidthRejectReason::SecurityDenial,
                ));
            }
        }

        let Some(endpoint) = context.endpoint.as_ref() else {
            return Disposition::Reject(RasReply::BandwidthReject(
                brq.seq,
                BandwidthRejectReason::UndefinedReason,
            ));
        };
        settle(self.gatekeeper.on_bandwidth(brq, endpoint))
    }

    fn handle_location(&self, lrq: LocationRequest, reply_addr: TransportAddress) -> Disposition {
        if !self.target_matches(lrq.gatekeeper_id.as_deref()) {
            return Disposition::Reject(RasReply::LocationReject(
                lrq.seq,
                LocationRejectReason::UndefinedReason,
            ));
        }

        // LRQs arrive from peers with no registration here; there is no
        // endpoint to resolve and nothing to authenticate against.
        let context = RequestContext {
            seq: lrq.seq,
            reply_addr: lrq.reply_address.unwrap_or(reply_addr),
            auth: AuthState::Unknown,
            endpoint: None,
        };
        match self.gatekeeper.on_location(lrq) {
            Outcome::Reply(reply) => settle(reply),
            Outcome::Deferred(work) => self.defer(work, &context),
        }
    }

    fn handle_info_response(
        &self,
        irr: &InfoResponse,
        reply_addr: TransportAddress,
    ) -> Disposition {
        let Some(endpoint) = self
            .gatekeeper
            .endpoints()
            .find_by_identifier(&irr.endpoint_id)
        else {
            debug!(target: "gk.engine", endpoint = %irr.endpoint_id, "IRR from unknown endpoint");
            return Disposition::Reject(RasReply::InfoNak(
                irr.seq,
                InfoRejectReason::NotRegistered,
            ));
        };

        let mut context = self.context_for(irr.seq, reply_addr, endpoint);
        match self.verify_endpoint_security(&mut context, &irr.tokens) {
            SecurityCheck::Passed => {}
            SecurityCheck::Silent => return Disposition::Ignore,
            SecurityCheck::Failed => {
                return Disposition::Reject(RasReply::InfoNak(
                    irr.seq,
                    InfoRejectReason::SecurityDenial,
                ));
            }
        }

        let Some(endpoint) = context.endpoint.as_ref() else {
            return Disposition::Reject(RasReply::InfoNak(
                irr.seq,
                InfoRejectReason::UndefinedReason,
            ));
        };
        settle(self.gatekeeper.on_info_response(irr, endpoint))
    }

    /// Hand work to the bounded pool and answer Request-In-Progress.
    ///
    /// A duplicate of a request already in flight re-answers InProgress
    /// without spawning a second worker; a full queue degrades to the
    /// verb's resource-exhausted reject.
    fn defer(&self, work: DeferredWork, context: &RequestContext) -> Disposition {
        let full_reject = match &work {
            DeferredWork::Admission(arq) => {
                RasReply::AdmissionReject(arq.seq, AdmissionRejectReason::ResourceUnavailable)
            }
            DeferredWork::Location(lrq) => {
                RasReply::LocationReject(lrq.seq, LocationRejectReason::ResourceUnavailable)
            }
        };

        match self.deferred.submit(work, context.reply_addr, context.seq) {
            SubmitOutcome::Accepted | SubmitOutcome::AlreadyInFlight => {
                debug!(
                    target: "gk.engine",
                    seq = context.seq,
                    auth = ?context.auth,
                    "Answering in progress, completion deferred"
                );
                Disposition::InProgress {
                    seq: context.seq,
                    retry_after_seconds: self.gatekeeper.config().deferred_retry_seconds,
                }
            }
            SubmitOutcome::QueueFull => {
                debug!(target: "gk.engine", "Deferred queue full, rejecting");
                Disposition::Reject(full_reject)
            }
        }
    }

    fn context_for(
        &self,
        seq: SequenceNumber,
        reply_addr: TransportAddress,
        endpoint: Arc<RegisteredEndpoint>,
    ) -> RequestContext {
        // Newest sequence number per endpoint; deferred results for older
        // requests are discarded at delivery time.
        self.deferred.observe_seq(endpoint.identifier(), seq);
        RequestContext {
            seq,
            reply_addr,
            auth: AuthState::Unknown,
            endpoint: Some(endpoint),
        }
    }

    /// Security for endpoint-scoped requests: required by the resolved
    /// registration or globally by policy.
    fn verify_endpoint_security(
        &self,
        context: &mut RequestContext,
        tokens: &[ras_protocol::CryptoToken],
    ) -> SecurityCheck {
        let required = self.gatekeeper.config().require_security
            || context
                .endpoint
                .as_ref()
                .is_some_and(|endpoint| endpoint.auth_required());
        if !required {
            return SecurityCheck::Passed;
        }
        self.verify_security(context, tokens)
    }

    fn verify_security(
        &self,
        context: &mut RequestContext,
        tokens: &[ras_protocol::CryptoToken],
    ) -> SecurityCheck {
        match self.gatekeeper.authenticator().verify(context.seq, tokens) {
            AuthDecision::Authenticated => {
                context.auth = AuthState::Authenticated;
                SecurityCheck::Passed
            }
            AuthDecision::Rejected | AuthDecision::NoCredentials => {
                context.auth = AuthState::Failed;
                debug!(
                    target: "gk.engine",
                    seq = context.seq,
                    from = %context.reply_addr,
                    tokens = tokens.len(),
                    "Security verification failed"
                );
                if self.gatekeeper.config().silent_discard_unauthenticated {
                    SecurityCheck::Silent
                } else {
                    SecurityCheck::Failed
                }
            }
        }
    }

    fn target_matches(&self, gatekeeper_id: Option<&str>) -> bool {
        gatekeeper_id.map_or(true, |id| id == self.gatekeeper.identifier())
    }
}

enum SecurityCheck {
    Passed,
    /// Drop without a reply.
    Silent,
    Failed,
}

fn settle(reply: RasReply) -> Disposition {
    if reply.is_reject() {
        Disposition::Reject(reply)
    } else {
        Disposition::Confirm(reply)
    }
}
