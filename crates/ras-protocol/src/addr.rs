//! Transport addresses and alias addresses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

/// Default port for H.225.0 call signalling.
pub const DEFAULT_SIGNAL_PORT: u16 = 1720;

/// Default port for RAS (UDP).
pub const DEFAULT_RAS_PORT: u16 = 1719;

/// Address parse failure.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid transport address: {0}")]
pub struct InvalidTransportAddress(pub String);

/// A resolved transport address (host and port).
///
/// The wire form is an H.225 `TransportAddress` choice; by the time messages
/// reach the core the codec has resolved it to an IP socket address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportAddress(pub SocketAddr);

impl TransportAddress {
    #[must_use]
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(ip, port))
    }

    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.0.port()
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<SocketAddr> for TransportAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for TransportAddress {
    type Err = InvalidTransportAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>()
            .map(Self)
            .map_err(|_| InvalidTransportAddress(s.to_string()))
    }
}

/// An alias address: a dialable name for an endpoint.
///
/// H.225 distinguishes dialled digits, H.323 ids, URLs and more; the
/// gatekeeper treats them uniformly as strings, as the index key is the
/// string form either way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alias(pub String);

impl Alias {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret the alias as a literal IP address, if it is one.
    ///
    /// Used by routing when `alias_can_be_host` is enabled; DNS names are
    /// the embedder's problem, not resolved here.
    #[must_use]
    pub fn as_ip(&self) -> Option<IpAddr> {
        self.0.parse().ok()
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Alias {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Alias {
    fn from(value: String) -> Self {
        Self(value)
    }
}
