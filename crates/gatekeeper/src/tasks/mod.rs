//! Background tasks owned by the embedding server.

pub mod monitor;

pub use monitor::{start_monitor, sweep_once, SweepSummary};
