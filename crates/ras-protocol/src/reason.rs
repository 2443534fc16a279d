//! Machine-readable reject reasons, one enum per RAS verb.
//!
//! Variant names follow the H.225.0 reject-reason tags so an encoder can map
//! them one to one onto the wire.

use crate::addr::Alias;
use serde::{Deserialize, Serialize};

/// GRJ reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryRejectReason {
    /// Request named a different gatekeeper.
    TerminalExcluded,
    /// Protocol revision below the minimum we speak.
    InvalidRevision,
    SecurityDenial,
    UndefinedReason,
}

/// RRJ reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationRejectReason {
    /// Request named a different gatekeeper; client should rediscover.
    DiscoveryRequired,
    InvalidRevision,
    /// No usable RAS address in the request.
    InvalidRasAddress,
    /// No usable call signal address, or address already claimed by a
    /// different registration.
    InvalidCallSignalAddress,
    /// Alias already claimed by a different registration.
    DuplicateAlias(Alias),
    /// Keep-alive for an identifier we do not know.
    FullRegistrationRequired,
    SecurityDenial,
    UndefinedReason,
}

/// URJ reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnregRejectReason {
    NotCurrentlyRegistered,
    /// A listed alias belongs to a different registration.
    PermissionDenied,
    SecurityDenial,
    UndefinedReason,
}

/// ARJ reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdmissionRejectReason {
    /// Requesting endpoint is not registered.
    InvalidEndpointIdentifier,
    /// Policy or bandwidth denied the call.
    RequestDenied,
    /// Destination alias resolves to no registered endpoint.
    CalledPartyNotRegistered,
    /// Supplied destination alias and signal address disagree.
    AliasesInconsistent,
    /// Neither a destination alias nor a destination address supplied.
    IncompleteAddress,
    SecurityDenial,
    /// Deferred-work capacity exhausted.
    ResourceUnavailable,
    UndefinedReason,
}

/// DRJ reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisengageRejectReason {
    NotRegistered,
    /// Request tried to drop a call the endpoint does not own.
    RequestToDropOther,
    SecurityDenial,
    UndefinedReason,
}

/// BRJ reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandwidthRejectReason {
    NotBound,
    /// No call with the given identifier.
    InvalidConferenceId,
    /// Call is not owned by the requesting endpoint.
    InvalidPermission,
    /// Pool cannot satisfy the new amount.
    InsufficientResources,
    SecurityDenial,
    UndefinedReason,
}

/// LRJ reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationRejectReason {
    /// No alias resolved to an address.
    RequestDenied,
    ResourceUnavailable,
    SecurityDenial,
    UndefinedReason,
}

/// INAK reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InfoRejectReason {
    NotRegistered,
    SecurityDenial,
    UndefinedReason,
}
