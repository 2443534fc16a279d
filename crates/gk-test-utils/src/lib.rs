//! # Gatekeeper Test Utilities
//!
//! Shared test utilities for the Gatehouse gatekeeper.
//!
//! This crate provides:
//! - `builders` - Request builders with sensible defaults for every RAS verb
//! - `harness` - `GatekeeperHarness` wrapping an engine plus a recording
//!   sink, and stub remote locators for exercising the deferred path
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gk_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = GatekeeperHarness::new();
//!     let endpoint = harness.register("1001", "10.0.0.1:1720");
//!
//!     let arq = ArqBuilder::new(2, endpoint)
//!         .to_alias("1002")
//!         .bandwidth(640)
//!         .build();
//!     let disposition = harness.handle(arq);
//!
//!     // Assert on the disposition and on harness.sink recordings...
//! }
//! ```

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
