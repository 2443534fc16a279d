//! Request builders for gatekeeper tests.
//!
//! Each builder produces a complete request with sensible defaults so a
//! test only spells out what it is actually about.

use common::secret::SecretString;
use common::types::{CallId, EndpointId};
use gatekeeper::auth::PasswordAuthenticator;
use ras_protocol::{
    AdmissionRequest, Alias, BandwidthRequest, CallDirection, CallStatus, CryptoToken,
    DisengageReason, DisengageRequest, DiscoveryRequest, InfoResponse, LocationRequest,
    RasRequest, RegistrationRequest, SequenceNumber, TransportAddress, UnregistrationRequest,
    PROTOCOL_VERSION,
};

/// Default RAS address endpoints register from in tests.
pub const TEST_RAS_ADDRESS: &str = "10.0.0.1:1719";

/// Default signal address endpoints register in tests.
pub const TEST_SIGNAL_ADDRESS: &str = "10.0.0.1:1720";

fn parse_addr(s: &str) -> TransportAddress {
    s.parse().expect("test address must parse")
}

/// Mint a valid password token for an alias, as a real endpoint holding
/// the password would.
#[must_use]
pub fn password_token(alias: &str, password: &str, seq: SequenceNumber) -> CryptoToken {
    let alias = Alias::from(alias);
    let timestamp = chrono::Utc::now().timestamp();
    let hash = PasswordAuthenticator::compute_hash(
        &SecretString::from(password.to_string()),
        &alias,
        seq,
        timestamp,
    );
    CryptoToken {
        alias,
        timestamp,
        hash,
    }
}

/// GRQ with our protocol revision and no gatekeeper targeting.
#[must_use]
pub fn grq(seq: SequenceNumber) -> RasRequest {
    RasRequest::Discovery(DiscoveryRequest {
        seq,
        protocol_version: PROTOCOL_VERSION,
        ras_address: parse_addr(TEST_RAS_ADDRESS),
        endpoint_aliases: vec![Alias::from("1001")],
        gatekeeper_id: None,
    })
}

/// Registration request builder.
#[derive(Debug, Clone)]
pub struct RrqBuilder {
    inner: RegistrationRequest,
}

impl RrqBuilder {
    /// Full registration for the given aliases from the default addresses.
    #[must_use]
    pub fn new(seq: SequenceNumber, aliases: &[&str]) -> Self {
        Self {
            inner: RegistrationRequest {
                seq,
                protocol_version: PROTOCOL_VERSION,
                gatekeeper_id: None,
                ras_addresses: vec![parse_addr(TEST_RAS_ADDRESS)],
                call_signal_addresses: vec![parse_addr(TEST_SIGNAL_ADDRESS)],
                aliases: aliases.iter().map(|a| Alias::from(*a)).collect(),
                prefixes: Vec::new(),
                application_info: None,
                time_to_live: None,
                keep_alive: false,
                endpoint_id: None,
                tokens: Vec::new(),
            },
        }
    }

    /// Keep-alive refresh for an existing registration.
    #[must_use]
    pub fn keep_alive(seq: SequenceNumber, endpoint: EndpointId) -> Self {
        let mut builder = Self::new(seq, &[]);
        builder.inner.keep_alive = true;
        builder.inner.endpoint_id = Some(endpoint);
        builder
    }

    #[must_use]
    pub fn signal_address(mut self, address: &str) -> Self {
        self.inner.call_signal_addresses = vec![parse_addr(address)];
        self
    }

    #[must_use]
    pub fn ras_address(mut self, address: &str) -> Self {
        self.inner.ras_addresses = vec![parse_addr(address)];
        self
    }

    #[must_use]
    pub fn no_ras_addresses(mut self) -> Self {
        self.inner.ras_addresses.clear();
        self
    }

    #[must_use]
    pub fn prefixes(mut self, prefixes: &[&str]) -> Self {
        self.inner.prefixes = prefixes.iter().map(|p| (*p).to_string()).collect();
        self
    }

    #[must_use]
    pub fn time_to_live(mut self, seconds: u32) -> Self {
        self.inner.time_to_live = Some(seconds);
        self
    }

    #[must_use]
    pub fn updating(mut self, endpoint: EndpointId) -> Self {
        self.inner.endpoint_id = Some(endpoint);
        self
    }

    #[must_use]
    pub fn gatekeeper_id(mut self, id: &str) -> Self {
        self.inner.gatekeeper_id = Some(id.to_string());
        self
    }

    #[must_use]
    pub fn token(mut self, token: CryptoToken) -> Self {
        self.inner.tokens.push(token);
        self
    }

    #[must_use]
    pub fn build(self) -> RasRequest {
        RasRequest::Registration(self.inner)
    }
}

/// Admission request builder.
#[derive(Debug, Clone)]
pub struct ArqBuilder {
    inner: AdmissionRequest,
}

impl ArqBuilder {
    /// Originating-direction ARQ for a fresh call id.
    #[must_use]
    pub fn new(seq: SequenceNumber, endpoint: EndpointId) -> Self {
        Self {
            inner: AdmissionRequest {
                seq,
                gatekeeper_id: None,
                endpoint_id: endpoint,
                call_id: CallId::new(),
                conference_id: None,
                call_reference: 1,
                direction: CallDirection::Originating,
                source_aliases: vec![Alias::from("1001")],
                src_signal_address: None,
                destination_aliases: Vec::new(),
                dest_signal_address: None,
                bandwidth: 640,
                tokens: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn call_id(mut self, call_id: CallId) -> Self {
        self.inner.call_id = call_id;
        self
    }

    #[must_use]
    pub fn direction(mut self, direction: CallDirection) -> Self {
        self.inner.direction = direction;
        self
    }

    #[must_use]
    pub fn from_alias(mut self, alias: &str) -> Self {
        self.inner.source_aliases = vec![Alias::from(alias)];
        self
    }

    #[must_use]
    pub fn to_alias(mut self, alias: &str) -> Self {
        self.inner.destination_aliases = vec![Alias::from(alias)];
        self
    }

    #[must_use]
    pub fn to_address(mut self, address: &str) -> Self {
        self.inner.dest_signal_address = Some(parse_addr(address));
        self
    }

    #[must_use]
    pub fn bandwidth(mut self, bandwidth: u64) -> Self {
        self.inner.bandwidth = bandwidth;
        self
    }

    #[must_use]
    pub fn token(mut self, token: CryptoToken) -> Self {
        self.inner.tokens.push(token);
        self
    }

    #[must_use]
    pub fn build(self) -> RasRequest {
        RasRequest::Admission(self.inner)
    }
}

/// DRQ dropping a call with a normal end reason.
#[must_use]
pub fn drq(seq: SequenceNumber, endpoint: EndpointId, call_id: CallId) -> RasRequest {
    RasRequest::Disengage(DisengageRequest {
        seq,
        endpoint_id: endpoint,
        call_id,
        reason: DisengageReason::NormalDrop,
        tokens: Vec::new(),
    })
}

/// BRQ changing a call's total bandwidth.
#[must_use]
pub fn brq(seq: SequenceNumber, endpoint: EndpointId, call_id: CallId, bandwidth: u64) -> RasRequest {
    RasRequest::Bandwidth(BandwidthRequest {
        seq,
        endpoint_id: endpoint,
        call_id,
        bandwidth,
        tokens: Vec::new(),
    })
}

/// URQ removing the whole registration (no aliases listed).
#[must_use]
pub fn urq(seq: SequenceNumber, endpoint: EndpointId) -> RasRequest {
    RasRequest::Unregistration(UnregistrationRequest {
        seq,
        endpoint_id: Some(endpoint),
        call_signal_addresses: Vec::new(),
        aliases: Vec::new(),
        tokens: Vec::new(),
    })
}

/// URQ removing only the listed aliases.
#[must_use]
pub fn urq_aliases(seq: SequenceNumber, endpoint: EndpointId, aliases: &[&str]) -> RasRequest {
    RasRequest::Unregistration(UnregistrationRequest {
        seq,
        endpoint_id: Some(endpoint),
        call_signal_addresses: Vec::new(),
        aliases: aliases.iter().map(|a| Alias::from(*a)).collect(),
        tokens: Vec::new(),
    })
}

/// LRQ for the given destination aliases.
#[must_use]
pub fn lrq(seq: SequenceNumber, aliases: &[&str]) -> RasRequest {
    RasRequest::Location(LocationRequest {
        seq,
        gatekeeper_id: None,
        endpoint_id: None,
        destination_aliases: aliases.iter().map(|a| Alias::from(*a)).collect(),
        reply_address: None,
    })
}

/// IRR heartbeating the given calls.
#[must_use]
pub fn irr(seq: SequenceNumber, endpoint: EndpointId, call_ids: &[CallId]) -> RasRequest {
    RasRequest::InfoResponse(InfoResponse {
        seq,
        endpoint_id: endpoint,
        calls: call_ids
            .iter()
            .map(|id| CallStatus {
                call_id: *id,
                direction: CallDirection::Unknown,
                alerting: false,
                connected: true,
                bandwidth: None,
            })
            .collect(),
        tokens: Vec::new(),
    })
}
