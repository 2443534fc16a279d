//! Admission-control policy, one method per RAS verb.
//!
//! The engine resolves target, endpoint and security, then dispatches
//! here; these methods mutate the registries and build the confirm or
//! reject. The monitor drives teardown through the same
//! `force_disengage`/`expire_endpoint` paths URQ and DRQ use, so
//! request-driven and liveness-driven cleanup cannot diverge.
//!
//! Every multi-step mutation is commit-or-roll-back: bandwidth is the last
//! fallible step of an admission, and a failed adjustment leaves the old
//! reservation standing.

use crate::engine::DeferredWork;
use crate::gatekeeper::Gatekeeper;
use crate::observability::metrics;
use crate::registry::{AdmitOutcome, AdmitParams, AliasRemoval, RegisteredEndpoint, Registration};
use crate::router::Resolution;
use crate::errors::{AdmitError, RegistryError};
use common::types::CallId;
use ras_protocol::{
    AdmissionConfirm, AdmissionRejectReason, AdmissionRequest, AuthenticationMode,
    BandwidthConfirm, BandwidthRejectReason, BandwidthRequest, CallDirection, CallModel,
    DisengageConfirm, DisengageReason, DisengageRejectReason, DisengageRequest, DiscoveryConfirm,
    DiscoveryRequest, InfoAck, InfoResponse, LocationConfirm, LocationRejectReason,
    LocationRequest, RasPush, RasReply, RegistrationConfirm, RegistrationRejectReason,
    RegistrationRequest, TransportAddress, UnregRejectReason, UnregistrationConfirm,
    UnregistrationRequest,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// What a controller method wants the engine to do next.
pub(crate) enum Outcome {
    /// Send this confirm or reject on the fast path.
    Reply(RasReply),
    /// Answer InProgress and finish on a deferred worker.
    Deferred(DeferredWork),
}

impl Gatekeeper {
    /// GRQ. Stateless: negotiate the authentication scheme only.
    pub(crate) fn on_discovery(&self, grq: &DiscoveryRequest) -> RasReply {
        debug!(
            target: "gk.controller",
            aliases = grq.endpoint_aliases.len(),
            "GRQ accepted"
        );
        RasReply::DiscoveryConfirm(DiscoveryConfirm {
            seq: grq.seq,
            gatekeeper_id: self.identifier().to_string(),
            ras_address: self.config().ras_address,
            auth_mode: self
                .config()
                .require_security
                .then_some(AuthenticationMode::PasswordHash),
        })
    }

    /// RRQ. Keep-alives refresh the lease; full registrations create or
    /// update the record.
    #[instrument(skip_all, fields(seq = rrq.seq, keep_alive = rrq.keep_alive))]
    pub(crate) fn on_registration(&self, rrq: RegistrationRequest) -> RasReply {
        let seq = rrq.seq;

        if rrq.keep_alive {
            let refreshed = rrq
                .endpoint_id
                .as_ref()
                .and_then(|id| self.endpoints().refresh(id));
            return match refreshed {
                Some(endpoint) => {
                    debug!(
                        target: "gk.controller",
                        endpoint = %endpoint.identifier(),
                        "Keep-alive refreshed"
                    );
                    RasReply::RegistrationConfirm(RegistrationConfirm {
                        seq,
                        gatekeeper_id: self.identifier().to_string(),
                        endpoint_id: endpoint.identifier().clone(),
                        aliases: endpoint.aliases().to_vec(),
                        time_to_live: lease(endpoint.time_to_live()),
                    })
                }
                None => {
                    debug!(target: "gk.controller", "Keep-alive for unknown identifier");
                    RasReply::RegistrationReject(
                        seq,
                        RegistrationRejectReason::FullRegistrationRequired,
                    )
                }
            };
        }

        if rrq.ras_addresses.is_empty() {
            return RasReply::RegistrationReject(seq, RegistrationRejectReason::InvalidRasAddress);
        }
        if rrq.call_signal_addresses.is_empty() {
            return RasReply::RegistrationReject(
                seq,
                RegistrationRejectReason::InvalidCallSignalAddress,
            );
        }

        // Grant the smaller of our default lease and the requested one.
        let mut time_to_live = self.config().default_ttl_seconds;
        if let Some(requested) = rrq.time_to_live {
            if time_to_live > requested {
                time_to_live = requested;
            }
        }

        let registration = Registration {
            identifier: rrq.endpoint_id.clone(),
            ras_addresses: rrq.ras_addresses,
            signal_addresses: rrq.call_signal_addresses,
            aliases: rrq.aliases,
            prefixes: rrq.prefixes,
            application_info: rrq.application_info,
            time_to_live,
            auth_required: self.config().require_security,
        };

        let fresh = self.create_endpoint_identifier();
        match self.endpoints().register(
            fresh,
            registration,
            self.config().overwrite_on_same_signal_address,
        ) {
            Ok(outcome) => {
                for evicted in &outcome.evicted {
                    warn!(
                        target: "gk.controller",
                        evicted = %evicted.identifier(),
                        "Registration evicted previous holder of signal address"
                    );
                    self.teardown_endpoint_calls(evicted);
                }
                if outcome.is_new {
                    self.stats()
                        .record_registration(self.endpoints().len() as u64);
                    metrics::record_registration();
                }
                metrics::set_endpoints_active(self.endpoints().len());
                info!(
                    target: "gk.controller",
                    endpoint = %outcome.endpoint.identifier(),
                    aliases = outcome.endpoint.aliases().len(),
                    ttl = time_to_live,
                    "Registration accepted"
                );
                RasReply::RegistrationConfirm(RegistrationConfirm {
                    seq,
                    gatekeeper_id: self.identifier().to_string(),
                    endpoint_id: outcome.endpoint.identifier().clone(),
                    aliases: outcome.endpoint.aliases().to_vec(),
                    time_to_live: lease(time_to_live),
                })
            }
            Err(RegistryError::DuplicateAlias(alias)) => {
                debug!(target: "gk.controller", alias = %alias, "RRQ rejected, duplicate alias");
                RasReply::RegistrationReject(seq, RegistrationRejectReason::DuplicateAlias(alias))
            }
            Err(RegistryError::DuplicateSignalAddress(address)) => {
                debug!(
                    target: "gk.controller",
                    address = %address,
                    "RRQ rejected, duplicate signal address"
                );
                RasReply::RegistrationReject(
                    seq,
                    RegistrationRejectReason::InvalidCallSignalAddress,
                )
            }
            Err(err) => {
                // Registry corruption: degrade to a reject, keep serving.
                error!(target: "gk.controller", error = %err, "RRQ failed internally");
                RasReply::RegistrationReject(seq, RegistrationRejectReason::UndefinedReason)
            }
        }
    }

    /// URQ. Removes listed aliases, or the whole registration when none
    /// are listed or none remain.
    #[instrument(skip_all, fields(seq = urq.seq, endpoint = %endpoint.identifier()))]
    pub(crate) fn on_unregistration(
        &self,
        urq: &UnregistrationRequest,
        endpoint: &Arc<RegisteredEndpoint>,
    ) -> RasReply {
        if urq.aliases.is_empty() {
            if let Some(removed) = self.endpoints().unregister(endpoint.identifier()) {
                self.teardown_endpoint_calls(&removed);
            }
            metrics::set_endpoints_active(self.endpoints().len());
            info!(target: "gk.controller", "Unregistered");
            return RasReply::UnregistrationConfirm(UnregistrationConfirm { seq: urq.seq });
        }

        // Every listed alias must belong to this registration.
        for alias in &urq.aliases {
            let owner = self
                .endpoints()
                .find_by_alias(alias)
                .map(|ep| ep.identifier().clone());
            if owner.as_ref() != Some(endpoint.identifier()) {
                debug!(
                    target: "gk.controller",
                    alias = %alias,
                    "URQ rejected, alias not owned by registration"
                );
                return RasReply::UnregistrationReject(urq.seq, UnregRejectReason::PermissionDenied);
            }
        }

        for alias in &urq.aliases {
            if let AliasRemoval::EndpointRemoved(removed) = self
                .endpoints()
                .remove_alias(alias, Some(endpoint.identifier()))
            {
                info!(target: "gk.controller", "Last alias removed, endpoint unregistered");
                self.teardown_endpoint_calls(&removed);
            }
        }
        metrics::set_endpoints_active(self.endpoints().len());
        RasReply::UnregistrationConfirm(UnregistrationConfirm { seq: urq.seq })
    }

    /// ARQ. Collapse onto an existing call first, then policy, routing and
    /// bandwidth for a fresh admission.
    #[instrument(skip_all, fields(seq = arq.seq, call_id = %arq.call_id, endpoint = %endpoint.identifier()))]
    pub(crate) fn on_admission(
        &self,
        arq: AdmissionRequest,
        endpoint: &Arc<RegisteredEndpoint>,
    ) -> Outcome {
        let seq = arq.seq;

        // The other leg may already have admitted this call; attach to it
        // without routing or a second bandwidth charge.
        if let Some(existing) = self.calls().find(&arq.call_id) {
            let dest = existing
                .dst_host()
                .or(arq.dest_signal_address)
                .or_else(|| endpoint.signal_addresses().first().copied());
            return match dest {
                Some(dest) => Outcome::Reply(self.finish_admission(&arq, endpoint, dest)),
                None => Outcome::Reply(RasReply::AdmissionReject(
                    seq,
                    AdmissionRejectReason::IncompleteAddress,
                )),
            };
        }

        match arq.direction {
            CallDirection::Answering => {
                // Incoming call: the caller's alias or address must pass.
                let mut allowed = arq.source_aliases.iter().any(|alias| {
                    self.policy()
                        .check_alias_address(self.endpoints(), endpoint, &arq, alias)
                });
                if let Some(src) = arq.src_signal_address {
                    allowed = allowed
                        || self
                            .policy()
                            .check_signal_address(self.endpoints(), endpoint, &arq, src);
                }
                if !allowed {
                    debug!(target: "gk.controller", "ARQ rejected, not allowed to answer call");
                    return Outcome::Reply(RasReply::AdmissionReject(
                        seq,
                        AdmissionRejectReason::SecurityDenial,
                    ));
                }

                let dest = arq
                    .dest_signal_address
                    .or_else(|| endpoint.signal_addresses().first().copied());
                match dest {
                    Some(dest) => Outcome::Reply(self.finish_admission(&arq, endpoint, dest)),
                    None => Outcome::Reply(RasReply::AdmissionReject(
                        seq,
                        AdmissionRejectReason::IncompleteAddress,
                    )),
                }
            }
            CallDirection::Originating | CallDirection::Unknown => {
                self.admit_originating(arq, endpoint)
            }
        }
    }

    fn admit_originating(
        &self,
        arq: AdmissionRequest,
        endpoint: &Arc<RegisteredEndpoint>,
    ) -> Outcome {
        let seq = arq.seq;
        let mut dest = arq.dest_signal_address;
        let mut dest_endpoint: Option<Arc<RegisteredEndpoint>> = None;

        if !arq.destination_aliases.is_empty() {
            let mut denied = true;
            let mut resolved = None;
            for alias in &arq.destination_aliases {
                if self
                    .policy()
                    .check_alias_address(self.endpoints(), endpoint, &arq, alias)
                {
                    denied = false;
                    if let Resolution::Address { address, endpoint } =
                        self.router().resolve(self.endpoints(), alias)
                    {
                        resolved = Some((address, endpoint));
                        break;
                    }
                }
            }

            if denied {
                debug!(target: "gk.controller", "ARQ rejected, not allowed to make call");
                return Outcome::Reply(RasReply::AdmissionReject(
                    seq,
                    AdmissionRejectReason::SecurityDenial,
                ));
            }

            match resolved {
                Some((address, resolved_endpoint)) => {
                    dest = Some(address);
                    dest_endpoint = resolved_endpoint;
                }
                None => {
                    // Not known locally; a configured peer lookup turns
                    // this into deferred work instead of a reject.
                    if self.router().has_remote() {
                        return Outcome::Deferred(DeferredWork::Admission(arq));
                    }
                    debug!(
                        target: "gk.controller",
                        "ARQ rejected, destination alias not registered"
                    );
                    return Outcome::Reply(RasReply::AdmissionReject(
                        seq,
                        AdmissionRejectReason::CalledPartyNotRegistered,
                    ));
                }
            }
        }

        // Supplied alias and explicit address must agree on the endpoint.
        if let (Some(dest_endpoint), Some(explicit)) = (&dest_endpoint, arq.dest_signal_address) {
            let consistent = self
                .endpoints()
                .find_by_signal_address(&explicit)
                .is_some_and(|found| found.identifier() == dest_endpoint.identifier());
            if !consistent {
                debug!(
                    target: "gk.controller",
                    "ARQ rejected, destination address not for specified alias"
                );
                return Outcome::Reply(RasReply::AdmissionReject(
                    seq,
                    AdmissionRejectReason::AliasesInconsistent,
                ));
            }
        }

        let Some(dest) = dest else {
            debug!(
                target: "gk.controller",
                "ARQ rejected, must have destination address or alias"
            );
            return Outcome::Reply(RasReply::AdmissionReject(
                seq,
                AdmissionRejectReason::IncompleteAddress,
            ));
        };

        if !self
            .policy()
            .check_signal_address(self.endpoints(), endpoint, &arq, dest)
        {
            debug!(target: "gk.controller", "ARQ rejected, signal address policy");
            return Outcome::Reply(RasReply::AdmissionReject(
                seq,
                AdmissionRejectReason::SecurityDenial,
            ));
        }

        Outcome::Reply(self.finish_admission(&arq, endpoint, dest))
    }

    /// Reserve bandwidth, create or attach the call record, and build the
    /// ACF. Reservation is the last fallible step, so a reject here leaves
    /// nothing to roll back.
    pub(crate) fn finish_admission(
        &self,
        arq: &AdmissionRequest,
        endpoint: &Arc<RegisteredEndpoint>,
        dest: TransportAddress,
    ) -> RasReply {
        let params = AdmitParams {
            call_id: arq.call_id,
            direction: arq.direction,
            endpoint: endpoint.identifier().clone(),
            requested_bandwidth: arq.bandwidth,
            call_reference: arq.call_reference,
            conference_id: arq.conference_id,
            src_aliases: arq.source_aliases.clone(),
            src_host: arq.src_signal_address,
            dst_aliases: arq.destination_aliases.clone(),
            dst_host: Some(dest),
        };

        match self.calls().admit(self.bandwidth(), params) {
            Ok(outcome) => {
                endpoint.add_call(arq.call_id);
                if matches!(outcome, AdmitOutcome::New { .. }) {
                    self.stats().record_call(self.calls().len() as u64);
                    metrics::record_call_admitted();
                }
                metrics::set_calls_active(self.calls().len());
                metrics::set_bandwidth_available(self.bandwidth().available());
                info!(
                    target: "gk.controller",
                    call_id = %arq.call_id,
                    granted = outcome.granted(),
                    dest = %dest,
                    "Admission granted"
                );
                RasReply::AdmissionConfirm(AdmissionConfirm {
                    seq: arq.seq,
                    bandwidth: outcome.granted(),
                    dest_signal_address: dest,
                    call_model: if self.router().gatekeeper_routed() {
                        CallModel::GatekeeperRouted
                    } else {
                        CallModel::Direct
                    },
                    irr_frequency: Some(self.config().info_response_rate_seconds),
                })
            }
            Err(AdmitError::Bandwidth(err)) => {
                warn!(target: "gk.controller", error = %err, "ARQ rejected, not enough bandwidth");
                RasReply::AdmissionReject(arq.seq, AdmissionRejectReason::RequestDenied)
            }
            Err(AdmitError::DuplicateLeg(owner)) => {
                warn!(
                    target: "gk.controller",
                    owner = %owner,
                    "ARQ rejected, call leg already admitted for another endpoint"
                );
                RasReply::AdmissionReject(arq.seq, AdmissionRejectReason::RequestDenied)
            }
        }
    }

    /// DRQ. Idempotent: a call already torn down confirms anyway, because
    /// a client DRQ may race the monitor's forced disengage.
    #[instrument(skip_all, fields(seq = drq.seq, call_id = %drq.call_id))]
    pub(crate) fn on_disengage(
        &self,
        drq: &DisengageRequest,
        endpoint: &Arc<RegisteredEndpoint>,
    ) -> RasReply {
        match self.calls().find(&drq.call_id) {
            None => {
                debug!(target: "gk.controller", "DRQ for unknown call, confirming anyway");
                RasReply::DisengageConfirm(DisengageConfirm { seq: drq.seq })
            }
            Some(call) if !call.owns_leg(endpoint.identifier()) => {
                debug!(target: "gk.controller", "DRQ rejected, call not owned by endpoint");
                RasReply::DisengageReject(drq.seq, DisengageRejectReason::RequestToDropOther)
            }
            Some(_) => {
                self.force_disengage(&drq.call_id, drq.reason, false);
                RasReply::DisengageConfirm(DisengageConfirm { seq: drq.seq })
            }
        }
    }

    /// BRQ. Adjust the call's reservation as one atomic pool operation.
    #[instrument(skip_all, fields(seq = brq.seq, call_id = %brq.call_id))]
    pub(crate) fn on_bandwidth(
        &self,
        brq: &BandwidthRequest,
        endpoint: &Arc<RegisteredEndpoint>,
    ) -> RasReply {
        match self.calls().adjust_bandwidth(
            self.bandwidth(),
            &brq.call_id,
            endpoint.identifier(),
            brq.bandwidth,
        ) {
            Ok(granted) => {
                metrics::set_bandwidth_available(self.bandwidth().available());
                info!(target: "gk.controller", granted, "Bandwidth adjusted");
                RasReply::BandwidthConfirm(BandwidthConfirm {
                    seq: brq.seq,
                    bandwidth: granted,
                })
            }
            Err(crate::errors::AdjustError::NotFound) => {
                debug!(target: "gk.controller", "BRQ rejected, no call with ID");
                RasReply::BandwidthReject(brq.seq, BandwidthRejectReason::InvalidConferenceId)
            }
            Err(crate::errors::AdjustError::NotOwner) => {
                debug!(target: "gk.controller", "BRQ rejected, call not owned by endpoint");
                RasReply::BandwidthReject(brq.seq, BandwidthRejectReason::InvalidPermission)
            }
            Err(crate::errors::AdjustError::Bandwidth(err)) => {
                warn!(target: "gk.controller", error = %err, "BRQ rejected, no bandwidth");
                RasReply::BandwidthReject(brq.seq, BandwidthRejectReason::InsufficientResources)
            }
        }
    }

    /// LRQ. Pure lookup; never mutates a registry.
    pub(crate) fn on_location(&self, lrq: LocationRequest) -> Outcome {
        for alias in &lrq.destination_aliases {
            if let Resolution::Address { address, endpoint } =
                self.router().resolve(self.endpoints(), alias)
            {
                return Outcome::Reply(RasReply::LocationConfirm(LocationConfirm {
                    seq: lrq.seq,
                    signal_address: address,
                    ras_address: endpoint.and_then(|ep| ep.ras_addresses().first().copied()),
                }));
            }
        }
        if self.router().has_remote() {
            return Outcome::Deferred(DeferredWork::Location(lrq));
        }
        debug!(target: "gk.controller", seq = lrq.seq, "LRQ rejected, not found");
        Outcome::Reply(RasReply::LocationReject(
            lrq.seq,
            LocationRejectReason::RequestDenied,
        ))
    }

    /// IRR. Heartbeats every reported call; unknown calls are ignored.
    pub(crate) fn on_info_response(
        &self,
        irr: &InfoResponse,
        endpoint: &Arc<RegisteredEndpoint>,
    ) -> RasReply {
        for status in &irr.calls {
            if !self.calls().heartbeat(status) {
                debug!(
                    target: "gk.controller",
                    endpoint = %endpoint.identifier(),
                    call_id = %status.call_id,
                    "IRR for unknown call"
                );
            }
        }
        RasReply::InfoAck(InfoAck { seq: irr.seq })
    }

    /// Finish a deferred admission once the remote lookup resolved (or
    /// did not).
    pub(crate) fn complete_deferred_admission(
        &self,
        arq: &AdmissionRequest,
        located: Option<TransportAddress>,
    ) -> RasReply {
        // The endpoint may have unregistered while we were looking.
        let Some(endpoint) = self.endpoints().find_by_identifier(&arq.endpoint_id) else {
            return RasReply::AdmissionReject(
                arq.seq,
                AdmissionRejectReason::InvalidEndpointIdentifier,
            );
        };
        match located {
            Some(dest) => {
                if !self
                    .policy()
                    .check_signal_address(self.endpoints(), &endpoint, arq, dest)
                {
                    return RasReply::AdmissionReject(
                        arq.seq,
                        AdmissionRejectReason::SecurityDenial,
                    );
                }
                self.finish_admission(arq, &endpoint, dest)
            }
            None => RasReply::AdmissionReject(
                arq.seq,
                AdmissionRejectReason::CalledPartyNotRegistered,
            ),
        }
    }

    /// Finish a deferred location lookup.
    pub(crate) fn complete_deferred_location(
        &self,
        lrq: &LocationRequest,
        located: Option<TransportAddress>,
    ) -> RasReply {
        match located {
            Some(address) => RasReply::LocationConfirm(LocationConfirm {
                seq: lrq.seq,
                signal_address: address,
                ras_address: None,
            }),
            None => RasReply::LocationReject(lrq.seq, LocationRejectReason::RequestDenied),
        }
    }

    /// Drop a call, release its bandwidth and detach it from every leg.
    /// Optionally pushes a forced DRQ to each owning endpoint.
    ///
    /// Returns whether the call was still present.
    pub(crate) fn force_disengage(
        &self,
        call_id: &CallId,
        reason: DisengageReason,
        push: bool,
    ) -> bool {
        let Some(dropped) = self.calls().disengage(self.bandwidth(), call_id, reason) else {
            return false;
        };

        for leg in &dropped.legs {
            if let Some(other) = self.endpoints().find_by_identifier(leg) {
                other.remove_call(call_id);
                if push {
                    if let Some(ras) = other.ras_addresses().first() {
                        self.sink().send_push(
                            *ras,
                            RasPush::Disengage(DisengageRequest {
                                seq: self.next_push_seq(),
                                endpoint_id: leg.clone(),
                                call_id: *call_id,
                                reason: DisengageReason::ForcedDrop,
                                tokens: Vec::new(),
                            }),
                        );
                    }
                }
            }
        }

        metrics::set_calls_active(self.calls().len());
        metrics::set_bandwidth_available(self.bandwidth().available());
        info!(
            target: "gk.controller",
            call_id = %call_id,
            released = dropped.released,
            "Call disengaged"
        );
        true
    }

    /// Remove an endpoint whose lease lapsed, cascading call teardown.
    /// Shares the URQ code path so the monitor cannot drift from it.
    pub(crate) fn expire_endpoint(&self, endpoint: &Arc<RegisteredEndpoint>) {
        if let Some(removed) = self.endpoints().unregister(endpoint.identifier()) {
            warn!(
                target: "gk.controller",
                endpoint = %removed.identifier(),
                ttl = removed.time_to_live(),
                "Registration expired"
            );
            self.teardown_endpoint_calls(&removed);
            metrics::set_endpoints_active(self.endpoints().len());
        }
    }

    /// Force-disengage every call the (already removed) endpoint owned.
    fn teardown_endpoint_calls(&self, endpoint: &Arc<RegisteredEndpoint>) {
        for call_id in endpoint.call_ids() {
            self.force_disengage(&call_id, DisengageReason::ForcedDrop, true);
        }
    }
}

/// TTL of zero means leases are disabled and the RCF omits the field.
fn lease(time_to_live: u32) -> Option<u32> {
    (time_to_live > 0).then_some(time_to_live)
}
