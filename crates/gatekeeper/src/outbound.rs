//! Outbound message sink.
//!
//! The transport layer (out of scope here) implements [`RasSink`]; the core
//! uses it for deferred final replies and for core-initiated pushes
//! (InfoRequest probes, forced DisengageRequests). Delivery is
//! fire-and-forget, best-effort: the core cleans up locally on silence
//! rather than waiting for acknowledgements, so implementations must not
//! block.

use ras_protocol::{RasPush, RasReply, TransportAddress};

/// Fire-and-forget sender for RAS traffic the core originates.
pub trait RasSink: Send + Sync {
    /// Deliver a deferred final reply to the request's original source.
    fn send_reply(&self, to: TransportAddress, reply: RasReply);

    /// Deliver a core-initiated push message.
    fn send_push(&self, to: TransportAddress, push: RasPush);
}

/// Sink that drops everything. Useful when the embedder has no transport
/// yet or pushes are unwanted.
#[derive(Debug, Default)]
pub struct NullSink;

impl RasSink for NullSink {
    fn send_reply(&self, _to: TransportAddress, _reply: RasReply) {}

    fn send_push(&self, _to: TransportAddress, _push: RasPush) {}
}
