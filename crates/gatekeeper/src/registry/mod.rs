//! Concurrent registries owned by the gatekeeper: endpoints, calls and the
//! bandwidth pool.

pub mod bandwidth;
pub mod call;
pub mod endpoint;

pub use bandwidth::BandwidthPool;
pub use call::{
    AdmitOutcome, AdmitParams, CallRegistry, DisengagedCall, GatekeeperCall, HeartbeatStatus,
};
pub use endpoint::{
    AliasRemoval, EndpointRegistry, RegisterOutcome, RegisteredEndpoint, Registration,
};
