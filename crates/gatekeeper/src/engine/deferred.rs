//! Bounded worker pool for deferred (slow-path) requests.
//!
//! Remote alias lookups can take network time the fast path must not
//! spend. The engine answers Request-In-Progress and queues the work here;
//! a fixed set of workers finishes each operation through the controller
//! and pushes the final confirm or reject out the sink to the request's
//! original source address.
//!
//! The queue is bounded: saturation rejects at submit time instead of
//! growing without limit under load. One worker serves one request at a
//! time; a retransmission of a request already in flight is deduplicated
//! by (reply address, sequence number) and never spawns a second job.

use crate::gatekeeper::Gatekeeper;
use crate::observability::metrics;
use common::types::EndpointId;
use dashmap::DashMap;
use ras_protocol::{AdmissionRequest, LocationRequest, RasReply, SequenceNumber, TransportAddress};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// An operation the controller could not finish on the fast path.
pub(crate) enum DeferredWork {
    /// ARQ whose destination needs a remote lookup.
    Admission(AdmissionRequest),
    /// LRQ not resolvable from local registrations.
    Location(LocationRequest),
}

impl DeferredWork {
    fn endpoint(&self) -> Option<&EndpointId> {
        match self {
            DeferredWork::Admission(arq) => Some(&arq.endpoint_id),
            DeferredWork::Location(_) => None,
        }
    }
}

struct Job {
    work: DeferredWork,
    reply_to: TransportAddress,
    seq: SequenceNumber,
}

/// Result of offering work to the pool.
pub(crate) enum SubmitOutcome {
    Accepted,
    /// Same (reply address, sequence number) already being worked on; the
    /// caller re-answers InProgress and nothing new is queued.
    AlreadyInFlight,
    /// Queue saturated; the caller degrades to a reject.
    QueueFull,
}

type InFlightKey = (TransportAddress, SequenceNumber);

/// Fixed-size worker pool fed by a bounded queue.
pub(crate) struct DeferredPool {
    tx: mpsc::Sender<Job>,
    in_flight: Arc<DashMap<InFlightKey, ()>>,
    /// Newest sequence number seen per endpoint; used to discard results
    /// that were superseded while a worker held them.
    latest_seq: Arc<DashMap<EndpointId, SequenceNumber>>,
}

impl DeferredPool {
    /// Spawn the workers. Must run inside a Tokio runtime. Workers exit
    /// when the pool (and with it the queue sender) is dropped.
    pub(crate) fn start(gatekeeper: Arc<Gatekeeper>) -> Self {
        let workers = gatekeeper.config().deferred_workers.max(1);
        let depth = gatekeeper.config().deferred_queue_depth.max(1);

        let (tx, rx) = mpsc::channel::<Job>(depth);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let in_flight: Arc<DashMap<InFlightKey, ()>> = Arc::new(DashMap::new());
        let latest_seq: Arc<DashMap<EndpointId, SequenceNumber>> = Arc::new(DashMap::new());

        info!(
            target: "gk.engine.deferred",
            workers,
            queue_depth = depth,
            "Starting deferred worker pool"
        );

        for worker in 0..workers {
            let gatekeeper = Arc::clone(&gatekeeper);
            let rx = Arc::clone(&rx);
            let in_flight = Arc::clone(&in_flight);
            let latest_seq = Arc::clone(&latest_seq);
            tokio::spawn(async move {
                run_worker(worker, gatekeeper, rx, in_flight, latest_seq).await;
            });
        }

        Self {
            tx,
            in_flight,
            latest_seq,
        }
    }

    /// Record the newest sequence number seen from an endpoint.
    pub(crate) fn observe_seq(&self, endpoint: &EndpointId, seq: SequenceNumber) {
        self.latest_seq
            .entry(endpoint.clone())
            .and_modify(|newest| {
                if seq > *newest {
                    *newest = seq;
                }
            })
            .or_insert(seq);
    }

    /// Offer work to the pool.
    pub(crate) fn submit(
        &self,
        work: DeferredWork,
        reply_to: TransportAddress,
        seq: SequenceNumber,
    ) -> SubmitOutcome {
        let key = (reply_to, seq);
        if self.in_flight.insert(key, ()).is_some() {
            debug!(
                target: "gk.engine.deferred",
                seq,
                from = %reply_to,
                "Duplicate of request already in flight"
            );
            return SubmitOutcome::AlreadyInFlight;
        }

        match self.tx.try_send(Job {
            work,
            reply_to,
            seq,
        }) {
            Ok(()) => {
                metrics::set_deferred_depth(self.in_flight.len());
                SubmitOutcome::Accepted
            }
            Err(_) => {
                self.in_flight.remove(&key);
                metrics::record_deferred_dropped();
                SubmitOutcome::QueueFull
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    gatekeeper: Arc<Gatekeeper>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    in_flight: Arc<DashMap<InFlightKey, ()>>,
    latest_seq: Arc<DashMap<EndpointId, SequenceNumber>>,
) {
    loop {
        // Hold the receiver lock only for the dequeue, not the work.
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            debug!(target: "gk.engine.deferred", worker, "Queue closed, worker exiting");
            break;
        };

        // Skip work the endpoint has already abandoned.
        if is_superseded(&latest_seq, &job) {
            in_flight.remove(&(job.reply_to, job.seq));
            metrics::set_deferred_depth(in_flight.len());
            metrics::record_deferred_superseded();
            continue;
        }

        let reply = complete(&gatekeeper, &job.work).await;

        in_flight.remove(&(job.reply_to, job.seq));
        metrics::set_deferred_depth(in_flight.len());

        // A newer request from the same endpoint makes this result stale;
        // stale results are dropped, never delivered or retried.
        if is_superseded(&latest_seq, &job) {
            debug!(
                target: "gk.engine.deferred",
                worker,
                seq = job.seq,
                "Discarding superseded deferred result"
            );
            metrics::record_deferred_superseded();
            continue;
        }

        gatekeeper.sink().send_reply(job.reply_to, reply);
    }
}

fn is_superseded(latest_seq: &DashMap<EndpointId, SequenceNumber>, job: &Job) -> bool {
    job.work.endpoint().is_some_and(|endpoint| {
        latest_seq
            .get(endpoint)
            .is_some_and(|newest| *newest > job.seq)
    })
}

/// Run the slow lookup and finish the operation through the controller.
async fn complete(gatekeeper: &Gatekeeper, work: &DeferredWork) -> RasReply {
    match work {
        DeferredWork::Admission(arq) => {
            let located = gatekeeper
                .router()
                .resolve_remote(&arq.destination_aliases)
                .await;
            gatekeeper.complete_deferred_admission(arq, located)
        }
        DeferredWork::Location(lrq) => {
            let located = gatekeeper
                .router()
                .resolve_remote(&lrq.destination_aliases)
                .await;
            gatekeeper.complete_deferred_location(lrq, located)
        }
    }
}
