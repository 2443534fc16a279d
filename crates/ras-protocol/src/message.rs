//! RAS request, confirm and reject messages.
//!
//! Field sets mirror the H.225.0 PDUs the codec decodes, minus everything
//! below the admission-control layer (fast-start proposals, transport QoS,
//! and similar signalling detail stay with the call-signalling code).

use crate::addr::{Alias, TransportAddress};
use crate::reason::{
    AdmissionRejectReason, BandwidthRejectReason, DisengageRejectReason, DiscoveryRejectReason,
    InfoRejectReason, LocationRejectReason, RegistrationRejectReason, UnregRejectReason,
};
use crate::token::CryptoToken;
use common::types::{CallId, EndpointId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request sequence number, echoed verbatim in the response.
pub type SequenceNumber = u32;

/// Protocol revision this implementation speaks. Requests announcing an
/// older revision are rejected with `InvalidRevision`.
pub const PROTOCOL_VERSION: u32 = 2;

/// Which side of the call the requesting endpoint is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    /// Endpoint is placing the call (`answerCall = FALSE`).
    Originating,
    /// Endpoint is answering the call (`answerCall = TRUE`).
    Answering,
    /// Direction not (yet) reported, e.g. in an IRR call status.
    Unknown,
}

/// Call model granted in an ACF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallModel {
    /// Endpoints signal each other directly.
    Direct,
    /// Signalling is routed through the gatekeeper.
    GatekeeperRouted,
}

/// Reason carried in a DRQ and recorded as the call's end reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisengageReason {
    NormalDrop,
    /// Dropped by the gatekeeper (heartbeat failure, endpoint removal).
    ForcedDrop,
    UndefinedReason,
}

/// Authentication scheme negotiated in a GCF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthenticationMode {
    /// HMAC-SHA256 password tokens (see `ras_protocol::token`).
    PasswordHash,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// GRQ: gatekeeper discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub seq: SequenceNumber,
    /// Announced protocol revision.
    pub protocol_version: u32,
    /// Where the endpoint listens for RAS.
    pub ras_address: TransportAddress,
    pub endpoint_aliases: Vec<Alias>,
    /// Target gatekeeper; `None` means any.
    pub gatekeeper_id: Option<String>,
}

/// RRQ: endpoint registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub seq: SequenceNumber,
    pub protocol_version: u32,
    pub gatekeeper_id: Option<String>,
    pub ras_addresses: Vec<TransportAddress>,
    pub call_signal_addresses: Vec<TransportAddress>,
    pub aliases: Vec<Alias>,
    /// Dialable prefixes this endpoint terminates (gateways).
    pub prefixes: Vec<String>,
    pub application_info: Option<String>,
    /// Requested registration lease; the grant is capped by the server.
    pub time_to_live: Option<u32>,
    /// Lightweight keep-alive: refresh the lease, change nothing else.
    pub keep_alive: bool,
    /// Required for keep-alive; assigned by us on full registration.
    pub endpoint_id: Option<EndpointId>,
    pub tokens: Vec<CryptoToken>,
}

/// URQ: endpoint unregistration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregistrationRequest {
    pub seq: SequenceNumber,
    pub endpoint_id: Option<EndpointId>,
    /// Fallback lookup key when no identifier is supplied.
    pub call_signal_addresses: Vec<TransportAddress>,
    /// Aliases to drop; empty means the whole registration.
    pub aliases: Vec<Alias>,
    pub tokens: Vec<CryptoToken>,
}

/// ARQ: call admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionRequest {
    pub seq: SequenceNumber,
    pub gatekeeper_id: Option<String>,
    pub endpoint_id: EndpointId,
    pub call_id: CallId,
    pub conference_id: Option<Uuid>,
    pub call_reference: u32,
    pub direction: CallDirection,
    pub source_aliases: Vec<Alias>,
    pub src_signal_address: Option<TransportAddress>,
    pub destination_aliases: Vec<Alias>,
    pub dest_signal_address: Option<TransportAddress>,
    /// Requested bandwidth in units of 100 bits/s.
    pub bandwidth: u64,
    pub tokens: Vec<CryptoToken>,
}

/// DRQ: call disengage. Also pushed gatekeeper→endpoint as a forced drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisengageRequest {
    pub seq: SequenceNumber,
    pub endpoint_id: EndpointId,
    pub call_id: CallId,
    pub reason: DisengageReason,
    pub tokens: Vec<CryptoToken>,
}

/// BRQ: bandwidth change for an admitted call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandwidthRequest {
    pub seq: SequenceNumber,
    pub endpoint_id: EndpointId,
    pub call_id: CallId,
    /// New total for the call, in units of 100 bits/s.
    pub bandwidth: u64,
    pub tokens: Vec<CryptoToken>,
}

/// LRQ: address lookup. May arrive from peers that are not registered here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRequest {
    pub seq: SequenceNumber,
    pub gatekeeper_id: Option<String>,
    pub endpoint_id: Option<EndpointId>,
    pub destination_aliases: Vec<Alias>,
    /// Where the LCF/LRJ should go, when different from the packet source.
    pub reply_address: Option<TransportAddress>,
}

/// Per-call state reported inside an IRR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStatus {
    pub call_id: CallId,
    pub direction: CallDirection,
    /// The remote party is ringing.
    pub alerting: bool,
    /// The call has been answered.
    pub connected: bool,
    /// Bandwidth the endpoint measures itself actually using.
    pub bandwidth: Option<u64>,
}

/// IRR: unsolicited or requested endpoint status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub seq: SequenceNumber,
    pub endpoint_id: EndpointId,
    pub calls: Vec<CallStatus>,
    pub tokens: Vec<CryptoToken>,
}

// ---------------------------------------------------------------------------
// Confirms
// ---------------------------------------------------------------------------

/// GCF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfirm {
    pub seq: SequenceNumber,
    pub gatekeeper_id: String,
    /// RAS address the endpoint should register against.
    pub ras_address: TransportAddress,
    /// Authentication scheme the endpoint must use, when security is on.
    pub auth_mode: Option<AuthenticationMode>,
}

/// RCF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationConfirm {
    pub seq: SequenceNumber,
    pub gatekeeper_id: String,
    pub endpoint_id: EndpointId,
    /// Aliases as registered (echo of the accepted set).
    pub aliases: Vec<Alias>,
    /// Granted lease in seconds; `None` when leases are disabled.
    pub time_to_live: Option<u32>,
}

/// UCF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregistrationConfirm {
    pub seq: SequenceNumber,
}

/// ACF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfirm {
    pub seq: SequenceNumber,
    /// Granted bandwidth in units of 100 bits/s; may be below the request.
    pub bandwidth: u64,
    /// Where to send call signalling.
    pub dest_signal_address: TransportAddress,
    pub call_model: CallModel,
    /// How often the endpoint should volunteer IRRs, in seconds.
    pub irr_frequency: Option<u32>,
}

/// DCF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisengageConfirm {
    pub seq: SequenceNumber,
}

/// BCF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandwidthConfirm {
    pub seq: SequenceNumber,
    /// Granted new total in units of 100 bits/s.
    pub bandwidth: u64,
}

/// LCF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationConfirm {
    pub seq: SequenceNumber,
    pub signal_address: TransportAddress,
    pub ras_address: Option<TransportAddress>,
}

/// IACK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoAck {
    pub seq: SequenceNumber,
}

/// IRQ: gatekeeper-initiated request for an IRR (call heartbeat probe).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoRequest {
    pub seq: SequenceNumber,
    /// Probe one call, or `None` for a full status report.
    pub call_id: Option<CallId>,
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// Any inbound RAS request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasRequest {
    Discovery(DiscoveryRequest),
    Registration(RegistrationRequest),
    Unregistration(UnregistrationRequest),
    Admission(AdmissionRequest),
    Disengage(DisengageRequest),
    Bandwidth(BandwidthRequest),
    Location(LocationRequest),
    InfoResponse(InfoResponse),
}

impl RasRequest {
    /// Sequence number to echo in the response.
    #[must_use]
    pub fn seq(&self) -> SequenceNumber {
        match self {
            RasRequest::Discovery(r) => r.seq,
            RasRequest::Registration(r) => r.seq,
            RasRequest::Unregistration(r) => r.seq,
            RasRequest::Admission(r) => r.seq,
            RasRequest::Disengage(r) => r.seq,
            RasRequest::Bandwidth(r) => r.seq,
            RasRequest::Location(r) => r.seq,
            RasRequest::InfoResponse(r) => r.seq,
        }
    }

    /// Target gatekeeper named by the request, if any.
    #[must_use]
    pub fn gatekeeper_id(&self) -> Option<&str> {
        match self {
            RasRequest::Discovery(r) => r.gatekeeper_id.as_deref(),
            RasRequest::Registration(r) => r.gatekeeper_id.as_deref(),
            RasRequest::Admission(r) => r.gatekeeper_id.as_deref(),
            RasRequest::Location(r) => r.gatekeeper_id.as_deref(),
            _ => None,
        }
    }

    /// Crypto tokens carried by the request.
    #[must_use]
    pub fn tokens(&self) -> &[CryptoToken] {
        match self {
            RasRequest::Discovery(_) | RasRequest::Location(_) => &[],
            RasRequest::Registration(r) => &r.tokens,
            RasRequest::Unregistration(r) => &r.tokens,
            RasRequest::Admission(r) => &r.tokens,
            RasRequest::Disengage(r) => &r.tokens,
            RasRequest::Bandwidth(r) => &r.tokens,
            RasRequest::InfoResponse(r) => &r.tokens,
        }
    }

    /// Short verb name for logs and metric labels.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            RasRequest::Discovery(_) => "grq",
            RasRequest::Registration(_) => "rrq",
            RasRequest::Unregistration(_) => "urq",
            RasRequest::Admission(_) => "arq",
            RasRequest::Disengage(_) => "drq",
            RasRequest::Bandwidth(_) => "brq",
            RasRequest::Location(_) => "lrq",
            RasRequest::InfoResponse(_) => "irr",
        }
    }
}

/// Any outbound RAS response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasReply {
    DiscoveryConfirm(DiscoveryConfirm),
    DiscoveryReject(SequenceNumber, DiscoveryRejectReason),
    RegistrationConfirm(RegistrationConfirm),
    RegistrationReject(SequenceNumber, RegistrationRejectReason),
    UnregistrationConfirm(UnregistrationConfirm),
    UnregistrationReject(SequenceNumber, UnregRejectReason),
    AdmissionConfirm(AdmissionConfirm),
    AdmissionReject(SequenceNumber, AdmissionRejectReason),
    DisengageConfirm(DisengageConfirm),
    DisengageReject(SequenceNumber, DisengageRejectReason),
    BandwidthConfirm(BandwidthConfirm),
    BandwidthReject(SequenceNumber, BandwidthRejectReason),
    LocationConfirm(LocationConfirm),
    LocationReject(SequenceNumber, LocationRejectReason),
    InfoAck(InfoAck),
    InfoNak(SequenceNumber, InfoRejectReason),
}

impl RasReply {
    /// Sequence number echoed from the request.
    #[must_use]
    pub fn seq(&self) -> SequenceNumber {
        match self {
            RasReply::DiscoveryConfirm(r) => r.seq,
            RasReply::RegistrationConfirm(r) => r.seq,
            RasReply::UnregistrationConfirm(r) => r.seq,
            RasReply::AdmissionConfirm(r) => r.seq,
            RasReply::DisengageConfirm(r) => r.seq,
            RasReply::BandwidthConfirm(r) => r.seq,
            RasReply::LocationConfirm(r) => r.seq,
            RasReply::InfoAck(r) => r.seq,
            RasReply::DiscoveryReject(seq, _)
            | RasReply::RegistrationReject(seq, _)
            | RasReply::UnregistrationReject(seq, _)
            | RasReply::AdmissionReject(seq, _)
            | RasReply::DisengageReject(seq, _)
            | RasReply::BandwidthReject(seq, _)
            | RasReply::LocationReject(seq, _)
            | RasReply::InfoNak(seq, _) => *seq,
        }
    }

    #[must_use]
    pub fn is_reject(&self) -> bool {
        matches!(
            self,
            RasReply::DiscoveryReject(..)
                | RasReply::RegistrationReject(..)
                | RasReply::UnregistrationReject(..)
                | RasReply::AdmissionReject(..)
                | RasReply::DisengageReject(..)
                | RasReply::BandwidthReject(..)
                | RasReply::LocationReject(..)
                | RasReply::InfoNak(..)
        )
    }
}

/// Core-initiated push messages; fire-and-forget, best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasPush {
    /// Force a heartbeat from the endpoint.
    InfoRequest(InfoRequest),
    /// Force-drop a call.
    Disengage(DisengageRequest),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr() -> TransportAddress {
        TransportAddress::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 1719)
    }

    #[test]
    fn test_request_seq_echo() {
        let req = RasRequest::Discovery(DiscoveryRequest {
            seq: 42,
            protocol_version: PROTOCOL_VERSION,
            ras_address: addr(),
            endpoint_aliases: vec![Alias::from("1001")],
            gatekeeper_id: None,
        });
        assert_eq!(req.seq(), 42);
        assert_eq!(req.verb(), "grq");
        assert!(req.tokens().is_empty());
    }

    #[test]
    fn test_reply_seq_and_reject_detection() {
        let confirm = RasReply::DisengageConfirm(DisengageConfirm { seq: 7 });
        assert_eq!(confirm.seq(), 7);
        assert!(!confirm.is_reject());

        let reject = RasReply::AdmissionReject(9, AdmissionRejectReason::RequestDenied);
        assert_eq!(reject.seq(), 9);
        assert!(reject.is_reject());
    }

    #[test]
    fn test_gatekeeper_id_accessor() {
        let req = RasRequest::Location(LocationRequest {
            seq: 1,
            gatekeeper_id: Some("gk1".to_string()),
            endpoint_id: None,
            destination_aliases: vec![Alias::from("1002")],
            reply_address: None,
        });
        assert_eq!(req.gatekeeper_id(), Some("gk1"));
    }
}
