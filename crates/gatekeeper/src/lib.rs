//! Gatehouse Gatekeeper Core Library
//!
//! This library provides the core functionality of the Gatehouse H.323
//! gatekeeper - the RAS admission-control server responsible for:
//!
//! - Endpoint registration with multi-key lookup (identifier, alias,
//!   signal address) and lease-based liveness
//! - Call admission against a finite, exactly-accounted bandwidth budget
//! - Per-message request handling with fast and deferred (slow) reply
//!   paths
//! - Alias routing, including gatekeeper-routed mode and dialable prefixes
//! - Background liveness monitoring that ages out dead endpoints and calls
//!
//! # Architecture
//!
//! ```text
//! listener threads (transport, out of scope)
//!         │ decoded RasRequest + reply address
//!         ▼
//! RequestEngine ── target / endpoint / security resolution
//!         │ dispatch, one method per RAS verb
//!         ▼
//! Gatekeeper (aggregate root)
//! ├── EndpointRegistry   identifier/alias/address indexes
//! ├── CallRegistry       call-id keyed, two-leg collapse
//! ├── BandwidthPool      one mutex, every delta linearized
//! ├── Router             alias → signal address
//! └── deferred workers ──► RasSink (final replies, pushes)
//!
//! monitor task ── TTL + heartbeat sweeps, same teardown paths as requests
//! ```
//!
//! # Key Design Decisions
//!
//! - **Decoded-message boundary**: the ASN.1 PER codec and socket I/O live
//!   with the embedder; the core consumes [`ras_protocol`] values only
//! - **Snapshot records**: registry entries are immutable `Arc` snapshots;
//!   readers never observe a half-mutated record and may keep a reference
//!   after removal from the index
//! - **Bounded deferral**: slow operations run on a fixed worker pool with
//!   a bounded queue that rejects at saturation, replacing unbounded
//!   thread growth
//! - **No panics**: internal failures degrade to undefined-reason rejects;
//!   a gatekeeper must not take the signalling plane down
//!
//! # Modules
//!
//! - [`engine`] - Per-message state machine and deferred worker pool
//! - [`registry`] - Endpoint and call registries, bandwidth pool
//! - [`tasks`] - Liveness monitor background task
//! - [`config`] - Gatekeeper configuration from environment
//! - [`policy`] - Pluggable admission policy hooks
//! - [`auth`] - Crypto-token verification
//! - [`router`] - Alias resolution
//! - [`outbound`] - Sink for core-initiated traffic
//! - [`observability`] - Metrics definitions

pub mod auth;
pub mod config;
mod controller;
pub mod engine;
pub mod errors;
mod gatekeeper;
pub mod observability;
pub mod outbound;
pub mod policy;
pub mod registry;
pub mod router;
pub mod stats;
pub mod tasks;

pub use config::GatekeeperConfig;
pub use engine::{Disposition, RequestEngine};
pub use gatekeeper::Gatekeeper;
pub use outbound::{NullSink, RasSink};
