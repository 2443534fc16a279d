//! Decoded H.225.0 RAS message model.
//!
//! This crate is the boundary between the wire and the gatekeeper core: the
//! ASN.1 PER codec (out of scope here) produces these types on receive and
//! consumes them on send. The core never sees raw bytes.
//!
//! Message pairs follow the RAS protocol:
//!
//! | Request | Confirm | Reject |
//! |---------|---------|--------|
//! | GRQ `DiscoveryRequest` | GCF | GRJ |
//! | RRQ `RegistrationRequest` | RCF | RRJ |
//! | URQ `UnregistrationRequest` | UCF | URJ |
//! | ARQ `AdmissionRequest` | ACF | ARJ |
//! | DRQ `DisengageRequest` | DCF | DRJ |
//! | BRQ `BandwidthRequest` | BCF | BRJ |
//! | LRQ `LocationRequest` | LCF | LRJ |
//! | IRR `InfoResponse` | IACK | INAK |
//!
//! Every request carries a sequence number that its response echoes
//! verbatim; clients correlate on it.

pub mod addr;
pub mod message;
pub mod reason;
pub mod token;

pub use addr::{Alias, InvalidTransportAddress, TransportAddress, DEFAULT_RAS_PORT, DEFAULT_SIGNAL_PORT};
pub use message::{
    AdmissionConfirm, AdmissionRequest, AuthenticationMode, BandwidthConfirm, BandwidthRequest,
    CallDirection, CallModel, CallStatus, DisengageConfirm, DisengageReason, DisengageRequest,
    DiscoveryConfirm, DiscoveryRequest, InfoAck, InfoRequest, InfoResponse, LocationConfirm,
    LocationRequest, RasPush, RasReply, RasRequest, RegistrationConfirm, RegistrationRequest,
    SequenceNumber, UnregistrationConfirm, UnregistrationRequest, PROTOCOL_VERSION,
};
pub use reason::{
    AdmissionRejectReason, BandwidthRejectReason, DisengageRejectReason, DiscoveryRejectReason,
    InfoRejectReason, LocationRejectReason, RegistrationRejectReason, UnregRejectReason,
};
pub use token::CryptoToken;
