//! Pluggable admission policy hooks.
//!
//! One method per decision point, injected into the gatekeeper so an
//! embedder can tighten admission without replacing the server. Defaults
//! are permissive except for the registered-only flags.

use crate::registry::{EndpointRegistry, RegisteredEndpoint};
use ras_protocol::{AdmissionRequest, Alias, CallDirection, TransportAddress};

/// Policy decision points consulted during admission.
pub trait AdmissionPolicy: Send + Sync {
    /// May this endpoint place or take a call involving `address`?
    fn check_signal_address(
        &self,
        endpoints: &EndpointRegistry,
        endpoint: &RegisteredEndpoint,
        request: &AdmissionRequest,
        address: TransportAddress,
    ) -> bool {
        let _ = (endpoints, endpoint, request, address);
        true
    }

    /// May this endpoint place or take a call involving `alias`?
    ///
    /// The default defers to [`AdmissionPolicy::check_alias_string`] on the
    /// alias's string form.
    fn check_alias_address(
        &self,
        endpoints: &EndpointRegistry,
        endpoint: &RegisteredEndpoint,
        request: &AdmissionRequest,
        alias: &Alias,
    ) -> bool {
        self.check_alias_string(endpoints, endpoint, request, alias.as_str())
    }

    /// String-form variant of the alias check.
    fn check_alias_string(
        &self,
        endpoints: &EndpointRegistry,
        endpoint: &RegisteredEndpoint,
        request: &AdmissionRequest,
        alias: &str,
    ) -> bool {
        let _ = (endpoints, endpoint, request, alias);
        true
    }
}

/// Default policy: permissive unless a registered-only flag is set, in
/// which case the checked alias must belong to a live registration.
pub struct DefaultPolicy {
    pub registered_only_calls: bool,
    pub registered_only_answers: bool,
}

impl AdmissionPolicy for DefaultPolicy {
    fn check_alias_string(
        &self,
        endpoints: &EndpointRegistry,
        _endpoint: &RegisteredEndpoint,
        request: &AdmissionRequest,
        alias: &str,
    ) -> bool {
        let restricted = match request.direction {
            CallDirection::Answering => self.registered_only_answers,
            CallDirection::Originating | CallDirection::Unknown => self.registered_only_calls,
        };
        if !restricted {
            return true;
        }
        endpoints.find_by_alias(&Alias::from(alias)).is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::Registration;
    use common::types::{CallId, EndpointId};

    fn arq(direction: CallDirection) -> AdmissionRequest {
        AdmissionRequest {
            seq: 1,
            gatekeeper_id: None,
            endpoint_id: EndpointId::from("100:1"),
            call_id: CallId::new(),
            conference_id: None,
            call_reference: 1,
            direction,
            source_aliases: vec![Alias::from("1001")],
            src_signal_address: None,
            destination_aliases: vec![Alias::from("1002")],
            dest_signal_address: None,
            bandwidth: 640,
            tokens: Vec::new(),
        }
    }

    fn registry_with_endpoint(alias: &str) -> (EndpointRegistry, std::sync::Arc<RegisteredEndpoint>) {
        let registry = EndpointRegistry::new();
        let outcome = registry
            .register(
                EndpointId::from("100:1"),
                Registration {
                    identifier: None,
                    ras_addresses: vec!["10.0.0.1:1719".parse().unwrap()],
                    signal_addresses: vec!["10.0.0.1:1720".parse().unwrap()],
                    aliases: vec![Alias::from(alias)],
                    prefixes: Vec::new(),
                    application_info: None,
                    time_to_live: 60,
                    auth_required: false,
                },
                true,
            )
            .unwrap();
        let endpoint = outcome.endpoint;
        (registry, endpoint)
    }

    #[test]
    fn test_permissive_by_default() {
        let (registry, endpoint) = registry_with_endpoint("1001");
        let policy = DefaultPolicy {
            registered_only_calls: false,
            registered_only_answers: false,
        };

        assert!(policy.check_alias_address(
            &registry,
            &endpoint,
            &arq(CallDirection::Originating),
            &Alias::from("unregistered")
        ));
    }

    #[test]
    fn test_registered_only_calls_restricts_originating() {
        let (registry, endpoint) = registry_with_endpoint("1001");
        let policy = DefaultPolicy {
            registered_only_calls: true,
            registered_only_answers: false,
        };

        assert!(policy.check_alias_address(
            &registry,
            &endpoint,
            &arq(CallDirection::Originating),
            &Alias::from("1001")
        ));
        assert!(!policy.check_alias_address(
            &registry,
            &endpoint,
            &arq(CallDirection::Originating),
            &Alias::from("unregistered")
        ));
        // Answering direction is governed by the other flag.
        assert!(policy.check_alias_address(
            &registry,
            &endpoint,
            &arq(CallDirection::Answering),
            &Alias::from("unregistered")
        ));
    }
}
