//! Alias to signal-address resolution.
//!
//! Resolution order: gatekeeper-routed short-circuit, registered alias,
//! registered dialable prefix, literal IP alias. A configured remote
//! locator turns local misses into deferred work instead of rejects.

use crate::registry::{EndpointRegistry, RegisteredEndpoint};
use async_trait::async_trait;
use ras_protocol::{Alias, TransportAddress, DEFAULT_SIGNAL_PORT};
use std::sync::Arc;
use tracing::debug;

/// Cross-gatekeeper lookup for aliases not registered locally.
///
/// Implementations typically fan an LRQ out to neighbour gatekeepers; the
/// call may take network time, which is why it only ever runs on the
/// deferred path.
#[async_trait]
pub trait RemoteLocator: Send + Sync {
    async fn locate(&self, aliases: &[Alias]) -> Option<TransportAddress>;
}

/// Outcome of a local resolution attempt.
pub enum Resolution {
    /// Alias resolves to an address; `endpoint` is the local registration
    /// when one backs the address.
    Address {
        address: TransportAddress,
        endpoint: Option<Arc<RegisteredEndpoint>>,
    },
    NotFound,
}

/// Alias resolver.
pub struct Router {
    gatekeeper_routed: bool,
    own_signal_address: Option<TransportAddress>,
    alias_can_be_host: bool,
    remote: Option<Arc<dyn RemoteLocator>>,
}

impl Router {
    #[must_use]
    pub fn new(
        gatekeeper_routed: bool,
        own_signal_address: Option<TransportAddress>,
        alias_can_be_host: bool,
    ) -> Self {
        Self {
            gatekeeper_routed,
            own_signal_address,
            alias_can_be_host,
            remote: None,
        }
    }

    pub fn set_remote_locator(&mut self, locator: Arc<dyn RemoteLocator>) {
        self.remote = Some(locator);
    }

    #[must_use]
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    #[must_use]
    pub fn gatekeeper_routed(&self) -> bool {
        self.gatekeeper_routed
    }

    /// Resolve an alias against local state only. Never blocks on I/O.
    #[must_use]
    pub fn resolve(&self, endpoints: &EndpointRegistry, alias: &Alias) -> Resolution {
        let registered = endpoints.find_by_alias(alias);

        // Gatekeeper-routed mode: everything signals through us, but only
        // for destinations we could actually route onwards.
        if self.gatekeeper_routed {
            if let Some(own) = self.own_signal_address {
                if registered.is_some() {
                    debug!(
                        target: "gk.router",
                        alias = %alias,
                        address = %own,
                        "Resolved alias to own address, gatekeeper routed"
                    );
                    return Resolution::Address {
                        address: own,
                        endpoint: registered,
                    };
                }
            }
        }

        if let Some(endpoint) = registered {
            if let Some(address) = endpoint.signal_addresses().first().copied() {
                debug!(
                    target: "gk.router",
                    alias = %alias,
                    address = %address,
                    "Resolved alias to registered endpoint"
                );
                return Resolution::Address {
                    address,
                    endpoint: Some(endpoint),
                };
            }
        }

        if let Some(resolution) = self.resolve_prefix(endpoints, alias) {
            return resolution;
        }

        if self.alias_can_be_host {
            if let Some(ip) = alias.as_ip() {
                let address = TransportAddress::new(ip, DEFAULT_SIGNAL_PORT);
                debug!(
                    target: "gk.router",
                    alias = %alias,
                    address = %address,
                    "Resolved alias as host address"
                );
                return Resolution::Address {
                    address,
                    endpoint: None,
                };
            }
        }

        Resolution::NotFound
    }

    /// Longest registered dialable prefix owning this alias, if any.
    fn resolve_prefix(&self, endpoints: &EndpointRegistry, alias: &Alias) -> Option<Resolution> {
        let mut best: Option<(usize, Arc<RegisteredEndpoint>)> = None;
        for endpoint in endpoints.snapshot() {
            for prefix in endpoint.prefixes() {
                if alias.as_str().starts_with(prefix.as_str()) {
                    let length = prefix.len();
                    if best.as_ref().map_or(true, |(len, _)| length > *len) {
                        best = Some((length, Arc::clone(&endpoint)));
                    }
                }
            }
        }
        let (_, endpoint) = best?;
        let address = endpoint.signal_addresses().first().copied()?;
        debug!(
            target: "gk.router",
            alias = %alias,
            gateway = %endpoint.identifier(),
            "Resolved alias via dialable prefix"
        );
        Some(Resolution::Address {
            address,
            endpoint: Some(endpoint),
        })
    }

    /// Slow-path resolution through the remote locator.
    pub async fn resolve_remote(&self, aliases: &[Alias]) -> Option<TransportAddress> {
        self.remote.as_ref()?.locate(aliases).await
    }
}
