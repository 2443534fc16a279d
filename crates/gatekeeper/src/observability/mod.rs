//! Observability for the gatekeeper core.
//!
//! Metrics use the `gk_` prefix with bounded label sets; request verbs and
//! outcomes are small fixed vocabularies, never request-derived strings, so
//! cardinality stays flat no matter what traffic arrives.

pub mod metrics;
