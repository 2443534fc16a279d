//! Gatekeeper test harness.
//!
//! `GatekeeperHarness` owns an engine wired to a recording sink, so a test
//! can drive the full request path and assert on fast dispositions,
//! deferred final replies and core-initiated pushes alike.

use crate::builders::{ArqBuilder, RrqBuilder, TEST_RAS_ADDRESS};
use async_trait::async_trait;
use common::types::{CallId, EndpointId};
use gatekeeper::router::RemoteLocator;
use gatekeeper::{Disposition, Gatekeeper, GatekeeperConfig, RasSink, RequestEngine};
use parking_lot::Mutex;
use ras_protocol::{Alias, RasPush, RasReply, RasRequest, TransportAddress};
use std::sync::Arc;
use tokio::sync::watch;

/// Sink that records everything the core sends, for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    replies: Mutex<Vec<(TransportAddress, RasReply)>>,
    pushes: Mutex<Vec<(TransportAddress, RasPush)>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deferred final replies sent so far.
    #[must_use]
    pub fn replies(&self) -> Vec<(TransportAddress, RasReply)> {
        self.replies.lock().clone()
    }

    /// Core-initiated pushes (InfoRequest probes, forced DRQs) sent so far.
    #[must_use]
    pub fn pushes(&self) -> Vec<(TransportAddress, RasPush)> {
        self.pushes.lock().clone()
    }

    pub fn clear(&self) {
        self.replies.lock().clear();
        self.pushes.lock().clear();
    }
}

impl RasSink for RecordingSink {
    fn send_reply(&self, to: TransportAddress, reply: RasReply) {
        self.replies.lock().push((to, reply));
    }

    fn send_push(&self, to: TransportAddress, push: RasPush) {
        self.pushes.lock().push((to, push));
    }
}

/// Remote locator answering every lookup with a fixed result.
pub struct StubLocator {
    result: Option<TransportAddress>,
}

impl StubLocator {
    /// Locator that resolves everything to `address`.
    #[must_use]
    pub fn resolving(address: &str) -> Self {
        Self {
            result: Some(address.parse().expect("test address must parse")),
        }
    }

    /// Locator that finds nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self { result: None }
    }
}

#[async_trait]
impl RemoteLocator for StubLocator {
    async fn locate(&self, _aliases: &[Alias]) -> Option<TransportAddress> {
        self.result
    }
}

/// Remote locator that blocks every lookup until released, so tests can
/// pile work onto the deferred queue deterministically.
pub struct GateLocator {
    result: Option<TransportAddress>,
    started_tx: watch::Sender<usize>,
    started_rx: watch::Receiver<usize>,
    release_tx: watch::Sender<bool>,
    release_rx: watch::Receiver<bool>,
}

impl GateLocator {
    #[must_use]
    pub fn resolving(address: &str) -> Self {
        let (started_tx, started_rx) = watch::channel(0);
        let (release_tx, release_rx) = watch::channel(false);
        Self {
            result: Some(address.parse().expect("test address must parse")),
            started_tx,
            started_rx,
            release_tx,
            release_rx,
        }
    }

    /// Wait until `count` lookups have entered the gate.
    pub async fn wait_for_started(&self, count: usize) {
        let mut rx = self.started_rx.clone();
        while *rx.borrow() < count {
            rx.changed().await.expect("gate sender dropped");
        }
    }

    /// Let every waiting (and future) lookup proceed.
    pub fn release(&self) {
        self.release_tx.send_replace(true);
    }

    /// How many lookups have entered the gate so far.
    #[must_use]
    pub fn started(&self) -> usize {
        *self.started_rx.borrow()
    }
}

#[async_trait]
impl RemoteLocator for GateLocator {
    async fn locate(&self, _aliases: &[Alias]) -> Option<TransportAddress> {
        self.started_tx.send_modify(|count| *count += 1);
        let mut rx = self.release_rx.clone();
        while !*rx.borrow() {
            rx.changed().await.expect("gate sender dropped");
        }
        self.result
    }
}

/// A gatekeeper with engine and recording sink, plus shortcuts for the
/// registrations and admissions most tests need as setup.
pub struct GatekeeperHarness {
    engine: RequestEngine,
    sink: Arc<RecordingSink>,
    source: TransportAddress,
}

impl Default for GatekeeperHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl GatekeeperHarness {
    /// Harness with default configuration. Must be created inside a Tokio
    /// runtime (the engine spawns its worker pool).
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(GatekeeperConfig::default())
    }

    #[must_use]
    pub fn with_config(config: GatekeeperConfig) -> Self {
        let sink = Arc::new(RecordingSink::new());
        let gatekeeper = Arc::new(Gatekeeper::new(config, Arc::clone(&sink) as Arc<dyn RasSink>));
        Self {
            engine: RequestEngine::new(gatekeeper),
            sink,
            source: TEST_RAS_ADDRESS.parse().expect("test address must parse"),
        }
    }

    /// Harness whose gatekeeper consults the given remote locator on the
    /// deferred path.
    #[must_use]
    pub fn with_remote_locator(
        config: GatekeeperConfig,
        locator: Arc<dyn RemoteLocator>,
    ) -> Self {
        let sink = Arc::new(RecordingSink::new());
        let gatekeeper = Gatekeeper::new(config, Arc::clone(&sink) as Arc<dyn RasSink>)
            .with_remote_locator(locator);
        Self {
            engine: RequestEngine::new(Arc::new(gatekeeper)),
            sink,
            source: TEST_RAS_ADDRESS.parse().expect("test address must parse"),
        }
    }

    #[must_use]
    pub fn gatekeeper(&self) -> &Arc<Gatekeeper> {
        self.engine.gatekeeper()
    }

    #[must_use]
    pub fn sink(&self) -> &RecordingSink {
        &self.sink
    }

    /// Handle a request as if it arrived from the harness source address.
    pub fn handle(&self, request: RasRequest) -> Disposition {
        self.engine.handle(request, self.source)
    }

    /// Handle a request from a specific source address.
    pub fn handle_from(&self, request: RasRequest, from: &str) -> Disposition {
        self.engine
            .handle(request, from.parse().expect("test address must parse"))
    }

    /// Register an endpoint and return its assigned identifier.
    ///
    /// # Panics
    ///
    /// Panics when the registration is not confirmed; harness setup is
    /// expected to succeed.
    pub fn register(&self, alias: &str, signal_address: &str) -> EndpointId {
        let request = RrqBuilder::new(1, &[alias])
            .signal_address(signal_address)
            .build();
        match self.handle(request) {
            Disposition::Confirm(RasReply::RegistrationConfirm(rcf)) => rcf.endpoint_id,
            other => panic!("registration of {alias} failed: {other:?}"),
        }
    }

    /// Admit a call from a registered endpoint to a registered alias and
    /// return the call id.
    ///
    /// # Panics
    ///
    /// Panics when the admission is not confirmed.
    pub fn admit(&self, seq: u32, endpoint: EndpointId, to_alias: &str, bandwidth: u64) -> CallId {
        let call_id = CallId::new();
        let request = ArqBuilder::new(seq, endpoint)
            .call_id(call_id)
            .to_alias(to_alias)
            .bandwidth(bandwidth)
            .build();
        match self.handle(request) {
            Disposition::Confirm(RasReply::AdmissionConfirm(_)) => call_id,
            other => panic!("admission to {to_alias} failed: {other:?}"),
        }
    }
}
