//! Gatekeeper error types.
//!
//! Registry failures map onto RAS reject reasons at the controller layer;
//! internal consistency failures are logged server-side and degrade to an
//! undefined-reason reject, never a panic.

use common::types::EndpointId;
use ras_protocol::{Alias, TransportAddress};
use thiserror::Error;

/// Endpoint registry mutation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Alias already claimed by a different registration.
    #[error("alias {0} already registered")]
    DuplicateAlias(Alias),

    /// Signal address already claimed and overwrite policy is off.
    #[error("signal address {0} already registered")]
    DuplicateSignalAddress(TransportAddress),

    /// Keep-alive or update for an identifier we do not know.
    #[error("unknown endpoint identifier {0}")]
    UnknownIdentifier(EndpointId),

    /// A freshly generated identifier collided with a live registration.
    /// Indicates registry corruption; the request degrades to a reject.
    #[error("identifier collision on {0}")]
    IdentifierCollision(EndpointId),
}

/// Bandwidth pool failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BandwidthError {
    /// The pool cannot cover the request; nothing was charged.
    #[error("insufficient bandwidth: requested {requested}, available {available}")]
    Insufficient { requested: u64, available: u64 },
}

/// Call admission failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmitError {
    /// Not enough pool capacity for a fresh admission.
    #[error(transparent)]
    Bandwidth(#[from] BandwidthError),

    /// A different endpoint already owns this leg of the call.
    #[error("call leg already owned by {0}")]
    DuplicateLeg(EndpointId),
}

/// Bandwidth adjustment failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdjustError {
    /// No call with the given identifier.
    #[error("unknown call")]
    NotFound,

    /// Requesting endpoint owns no leg of the call.
    #[error("call not owned by requesting endpoint")]
    NotOwner,

    /// The pool cannot cover the increase; the old allocation stands.
    #[error(transparent)]
    Bandwidth(#[from] BandwidthError),
}
