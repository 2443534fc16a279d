//! Active call records and the call registry.
//!
//! A call is identified by its call id; the two legs of one physical call
//! (originating and answering) collapse onto a single record so bandwidth
//! is charged once, not once per leg. All per-call mutation goes through
//! the record's own mutex, linearizing ARQ/BRQ/DRQ/IRR traffic per call id.

use crate::errors::{AdjustError, AdmitError};
use crate::registry::bandwidth::BandwidthPool;
use chrono::{DateTime, Utc};
use common::types::{CallId, EndpointId};
use parking_lot::{Mutex, RwLock};
use ras_protocol::{Alias, CallDirection, DisengageReason, TransportAddress};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Heartbeat verification state, driven by IRRs and the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatStatus {
    /// A heartbeat arrived within the last interval.
    Confirmed,
    /// One interval passed silently; an InfoRequest probe is out.
    Unconfirmed,
    /// Two intervals passed silently and policy keeps the call anyway;
    /// counted once in statistics.
    Stale,
}

#[derive(Debug)]
struct CallState {
    legs: HashMap<CallDirection, EndpointId>,
    src_aliases: Vec<Alias>,
    src_host: Option<TransportAddress>,
    dst_aliases: Vec<Alias>,
    dst_host: Option<TransportAddress>,
    /// Bandwidth currently charged against the pool.
    bandwidth: u64,
    /// Bandwidth the endpoint reports actually using (IRR detail).
    observed_bandwidth: Option<u64>,
    alerting_at: Option<DateTime<Utc>>,
    connected_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    end_reason: Option<DisengageReason>,
    last_heartbeat: Instant,
    heartbeat: HeartbeatStatus,
}

/// An admitted call.
#[derive(Debug)]
pub struct GatekeeperCall {
    call_id: CallId,
    conference_id: Option<Uuid>,
    call_reference: u32,
    created_at: DateTime<Utc>,
    state: Mutex<CallState>,
}

impl GatekeeperCall {
    #[must_use]
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    #[must_use]
    pub fn conference_id(&self) -> Option<Uuid> {
        self.conference_id
    }

    #[must_use]
    pub fn call_reference(&self) -> u32 {
        self.call_reference
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Bandwidth currently charged for this call.
    #[must_use]
    pub fn bandwidth(&self) -> u64 {
        self.state.lock().bandwidth
    }

    #[must_use]
    pub fn observed_bandwidth(&self) -> Option<u64> {
        self.state.lock().observed_bandwidth
    }

    /// Endpoints owning a leg of this call.
    #[must_use]
    pub fn legs(&self) -> Vec<EndpointId> {
        self.state.lock().legs.values().cloned().collect()
    }

    #[must_use]
    pub fn owns_leg(&self, endpoint: &EndpointId) -> bool {
        self.state.lock().legs.values().any(|id| id == endpoint)
    }

    #[must_use]
    pub fn dst_host(&self) -> Option<TransportAddress> {
        self.state.lock().dst_host
    }

    #[must_use]
    pub fn alerting_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().alerting_at
    }

    #[must_use]
    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().connected_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().ended_at
    }

    #[must_use]
    pub fn end_reason(&self) -> Option<DisengageReason> {
        self.state.lock().end_reason
    }

    #[must_use]
    pub fn heartbeat_status(&self) -> HeartbeatStatus {
        self.state.lock().heartbeat
    }

    /// Time since the last heartbeat (or admission).
    #[must_use]
    pub fn heartbeat_elapsed(&self) -> Duration {
        self.state.lock().last_heartbeat.elapsed()
    }

    /// Record a heartbeat, optionally with the endpoint's own bandwidth
    /// measurement.
    pub fn record_heartbeat(&self, observed_bandwidth: Option<u64>) {
        let mut state = self.state.lock();
        state.last_heartbeat = Instant::now();
        state.heartbeat = HeartbeatStatus::Confirmed;
        if let Some(observed) = observed_bandwidth {
            state.observed_bandwidth = Some(observed);
        }
    }

    /// Record reported call progress. Timestamps are set once; later
    /// reports repeating the same state do not move them.
    pub fn record_progress(&self, alerting: bool, connected: bool) {
        let mut state = self.state.lock();
        if alerting && state.alerting_at.is_none() {
            state.alerting_at = Some(Utc::now());
        }
        if connected && state.connected_at.is_none() {
            state.connected_at = Some(Utc::now());
        }
    }

    /// Monitor transition: first silent interval.
    pub fn mark_unconfirmed(&self) {
        self.state.lock().heartbeat = HeartbeatStatus::Unconfirmed;
    }

    /// Monitor transition: second silent interval, call kept by policy.
    pub fn mark_stale(&self) {
        self.state.lock().heartbeat = HeartbeatStatus::Stale;
    }
}

/// Parameters for admitting a call leg.
#[derive(Debug, Clone)]
pub struct AdmitParams {
    pub call_id: CallId,
    pub direction: CallDirection,
    pub endpoint: EndpointId,
    pub requested_bandwidth: u64,
    pub call_reference: u32,
    pub conference_id: Option<Uuid>,
    pub src_aliases: Vec<Alias>,
    pub src_host: Option<TransportAddress>,
    pub dst_aliases: Vec<Alias>,
    pub dst_host: Option<TransportAddress>,
}

/// Result of a successful admission.
#[derive(Debug)]
pub enum AdmitOutcome {
    /// First leg; bandwidth was reserved.
    New {
        call: Arc<GatekeeperCall>,
        granted: u64,
    },
    /// Second leg (or a retransmission) attached to an existing record;
    /// no additional bandwidth charged.
    Attached {
        call: Arc<GatekeeperCall>,
        granted: u64,
    },
}

impl AdmitOutcome {
    #[must_use]
    pub fn call(&self) -> &Arc<GatekeeperCall> {
        match self {
            AdmitOutcome::New { call, .. } | AdmitOutcome::Attached { call, .. } => call,
        }
    }

    #[must_use]
    pub fn granted(&self) -> u64 {
        match self {
            AdmitOutcome::New { granted, .. } | AdmitOutcome::Attached { granted, .. } => *granted,
        }
    }
}

/// A call removed from the registry by disengage.
pub struct DisengagedCall {
    pub call: Arc<GatekeeperCall>,
    pub released: u64,
    pub legs: Vec<EndpointId>,
}

/// Registry of active calls.
#[derive(Default)]
pub struct CallRegistry {
    inner: RwLock<HashMap<CallId, Arc<GatekeeperCall>>>,
}

impl CallRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a call leg, collapsing onto an existing record when the call
    /// id is already tracked (the same physical call reported by its other
    /// leg). Bandwidth is reserved only for a genuinely new call, and the
    /// reservation fails closed before any record is created.
    pub fn admit(
        &self,
        pool: &BandwidthPool,
        params: AdmitParams,
    ) -> Result<AdmitOutcome, AdmitError> {
        let mut inner = self.inner.write();

        if let Some(call) = inner.get(&params.call_id).cloned() {
            let mut state = call.state.lock();
            match state.legs.get(&params.direction) {
                Some(owner) if *owner == params.endpoint => {
                    // Retransmission of an admission we already granted.
                    let granted = state.bandwidth;
                    drop(state);
                    return Ok(AdmitOutcome::Attached { call, granted });
                }
                Some(owner) => {
                    return Err(AdmitError::DuplicateLeg(owner.clone()));
                }
                None => {}
            }
            state.legs.insert(params.direction, params.endpoint);
            if state.src_host.is_none() {
                state.src_host = params.src_host;
            }
            if state.dst_host.is_none() {
                state.dst_host = params.dst_host;
            }
            if state.src_aliases.is_empty() {
                state.src_aliases = params.src_aliases;
            }
            if state.dst_aliases.is_empty() {
                state.dst_aliases = params.dst_aliases;
            }
            let granted = state.bandwidth;
            drop(state);
            return Ok(AdmitOutcome::Attached { call, granted });
        }

        let granted = pool.allocate(params.requested_bandwidth)?;

        let call = Arc::new(GatekeeperCall {
            call_id: params.call_id,
            conference_id: params.conference_id,
            call_reference: params.call_reference,
            created_at: Utc::now(),
            state: Mutex::new(CallState {
                legs: HashMap::from([(params.direction, params.endpoint)]),
                src_aliases: params.src_aliases,
                src_host: params.src_host,
                dst_aliases: params.dst_aliases,
                dst_host: params.dst_host,
                bandwidth: granted,
                observed_bandwidth: None,
                alerting_at: None,
                connected_at: None,
                ended_at: None,
                end_reason: None,
                last_heartbeat: Instant::now(),
                heartbeat: HeartbeatStatus::Confirmed,
            }),
        });
        inner.insert(params.call_id, Arc::clone(&call));

        Ok(AdmitOutcome::New { call, granted })
    }

    /// Remove a call and release its bandwidth.
    ///
    /// Idempotent: disengaging a call that is already gone returns `None`
    /// and is not an error (a DRQ may race the monitor's auto-disengage).
    pub fn disengage(
        &self,
        pool: &BandwidthPool,
        call_id: &CallId,
        reason: DisengageReason,
    ) -> Option<DisengagedCall> {
        let call = self.inner.write().remove(call_id)?;

        let (released, legs) = {
            let mut state = call.state.lock();
            state.ended_at = Some(Utc::now());
            state.end_reason = Some(reason);
            let released = state.bandwidth;
            state.bandwidth = 0;
            (released, state.legs.values().cloned().collect())
        };
        pool.release(released);

        Some(DisengagedCall {
            call,
            released,
            legs,
        })
    }

    /// Atomically replace the call's bandwidth reservation.
    ///
    /// The old amount is released and the new amount claimed as one pool
    /// operation; a failed upsize leaves the original allocation intact.
    pub fn adjust_bandwidth(
        &self,
        pool: &BandwidthPool,
        call_id: &CallId,
        endpoint: &EndpointId,
        requested: u64,
    ) -> Result<u64, AdjustError> {
        let call = self
            .inner
            .read()
            .get(call_id)
            .cloned()
            .ok_or(AdjustError::NotFound)?;

        let mut state = call.state.lock();
        if !state.legs.values().any(|id| id == endpoint) {
            return Err(AdjustError::NotOwner);
        }
        let granted = pool.adjust(state.bandwidth, requested)?;
        state.bandwidth = granted;
        Ok(granted)
    }

    /// Record a reported heartbeat for a call, including any call-state
    /// detail it carries. Unknown calls are a no-op (`false`).
    pub fn heartbeat(&self, status: &ras_protocol::CallStatus) -> bool {
        let Some(call) = self.inner.read().get(&status.call_id).cloned() else {
            return false;
        };
        call.record_heartbeat(status.bandwidth);
        call.record_progress(status.alerting, status.connected);
        true
    }

    #[must_use]
    pub fn find(&self, call_id: &CallId) -> Option<Arc<GatekeeperCall>> {
        self.inner.read().get(call_id).cloned()
    }

    /// Clone of every active call, for lock-free iteration.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<GatekeeperCall>> {
        self.inner.read().values().cloned().collect()
    }

    /// Total bandwidth charged across active calls.
    #[must_use]
    pub fn total_bandwidth(&self) -> u64 {
        self.snapshot().iter().map(|c| c.bandwidth()).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn pool() -> BandwidthPool {
        BandwidthPool::new(10_000, 2560, 200_000)
    }

    fn status(call_id: CallId, bandwidth: Option<u64>) -> ras_protocol::CallStatus {
        ras_protocol::CallStatus {
            call_id,
            direction: CallDirection::Unknown,
            alerting: false,
            connected: true,
            bandwidth,
        }
    }

    fn params(call_id: CallId, direction: CallDirection, ep: &str, bw: u64) -> AdmitParams {
        AdmitParams {
            call_id,
            direction,
            endpoint: EndpointId::from(ep),
            requested_bandwidth: bw,
            call_reference: 1,
            conference_id: None,
            src_aliases: vec![Alias::from("1001")],
            src_host: None,
            dst_aliases: vec![Alias::from("1002")],
            dst_host: "10.0.0.2:1720".parse().ok(),
        }
    }

    #[test]
    fn test_admit_charges_once_for_both_legs() {
        let registry = CallRegistry::new();
        let pool = pool();
        let call_id = CallId::new();

        let first = registry
            .admit(&pool, params(call_id, CallDirection::Originating, "ep-a", 640))
            .unwrap();
        assert!(matches!(first, AdmitOutcome::New { .. }));
        assert_eq!(pool.available(), 10_000 - 640);

        let second = registry
            .admit(&pool, params(call_id, CallDirection::Answering, "ep-b", 640))
            .unwrap();
        assert!(matches!(second, AdmitOutcome::Attached { .. }));
        assert_eq!(second.granted(), 640);

        // One record, one charge.
        assert_eq!(registry.len(), 1);
        assert_eq!(pool.available(), 10_000 - 640);
        assert_eq!(registry.total_bandwidth(), 640);
    }

    #[test]
    fn test_admit_retransmission_is_idempotent() {
        let registry = CallRegistry::new();
        let pool = pool();
        let call_id = CallId::new();

        registry
            .admit(&pool, params(call_id, CallDirection::Originating, "ep-a", 640))
            .unwrap();
        let again = registry
            .admit(&pool, params(call_id, CallDirection::Originating, "ep-a", 640))
            .unwrap();

        assert!(matches!(again, AdmitOutcome::Attached { .. }));
        assert_eq!(registry.len(), 1);
        assert_eq!(pool.available(), 10_000 - 640);
    }

    #[test]
    fn test_admit_rejects_leg_stolen_by_other_endpoint() {
        let registry = CallRegistry::new();
        let pool = pool();
        let call_id = CallId::new();

        registry
            .admit(&pool, params(call_id, CallDirection::Originating, "ep-a", 640))
            .unwrap();
        let err = registry
            .admit(&pool, params(call_id, CallDirection::Originating, "ep-b", 640))
            .unwrap_err();

        assert_eq!(err, AdmitError::DuplicateLeg(EndpointId::from("ep-a")));
    }

    #[test]
    fn test_admit_insufficient_bandwidth_creates_nothing() {
        let registry = CallRegistry::new();
        let pool = BandwidthPool::new(100, 2560, 200_000);

        let err = registry
            .admit(
                &pool,
                params(CallId::new(), CallDirection::Originating, "ep-a", 640),
            )
            .unwrap_err();

        assert!(matches!(err, AdmitError::Bandwidth(_)));
        assert!(registry.is_empty());
        assert_eq!(pool.available(), 100);
    }

    #[test]
    fn test_disengage_releases_and_is_idempotent() {
        let registry = CallRegistry::new();
        let pool = pool();
        let call_id = CallId::new();

        registry
            .admit(&pool, params(call_id, CallDirection::Originating, "ep-a", 640))
            .unwrap();

        let dropped = registry
            .disengage(&pool, &call_id, DisengageReason::NormalDrop)
            .unwrap();
        assert_eq!(dropped.released, 640);
        assert_eq!(dropped.call.end_reason(), Some(DisengageReason::NormalDrop));
        assert_eq!(pool.available(), 10_000);
        assert!(registry.is_empty());

        // Second disengage for the same call is a no-op, not an error.
        assert!(registry
            .disengage(&pool, &call_id, DisengageReason::NormalDrop)
            .is_none());
        assert_eq!(pool.available(), 10_000);
    }

    #[test]
    fn test_adjust_bandwidth_owner_checks() {
        let registry = CallRegistry::new();
        let pool = pool();
        let call_id = CallId::new();

        registry
            .admit(&pool, params(call_id, CallDirection::Originating, "ep-a", 640))
            .unwrap();

        let err = registry
            .adjust_bandwidth(&pool, &call_id, &EndpointId::from("ep-x"), 320)
            .unwrap_err();
        assert_eq!(err, AdjustError::NotOwner);

        let granted = registry
            .adjust_bandwidth(&pool, &call_id, &EndpointId::from("ep-a"), 320)
            .unwrap();
        assert_eq!(granted, 320);
        assert_eq!(pool.available(), 10_000 - 320);
    }

    #[test]
    fn test_heartbeat_updates_state() {
        let registry = CallRegistry::new();
        let pool = pool();
        let call_id = CallId::new();

        registry
            .admit(&pool, params(call_id, CallDirection::Originating, "ep-a", 640))
            .unwrap();
        let call = registry.find(&call_id).unwrap();
        call.mark_unconfirmed();
        assert_eq!(call.heartbeat_status(), HeartbeatStatus::Unconfirmed);

        assert!(registry.heartbeat(&status(call_id, Some(480))));
        assert_eq!(call.heartbeat_status(), HeartbeatStatus::Confirmed);
        assert_eq!(call.observed_bandwidth(), Some(480));
        assert!(call.connected_at().is_some());

        // Unknown calls never fail.
        assert!(!registry.heartbeat(&status(CallId::new(), None)));
    }

    #[test]
    fn test_progress_timestamps_set_once() {
        let registry = CallRegistry::new();
        let pool = pool();
        let call_id = CallId::new();

        registry
            .admit(&pool, params(call_id, CallDirection::Originating, "ep-a", 640))
            .unwrap();
        let call = registry.find(&call_id).unwrap();
        assert!(call.alerting_at().is_none());

        registry.heartbeat(&ras_protocol::CallStatus {
            call_id,
            direction: CallDirection::Originating,
            alerting: true,
            connected: false,
            bandwidth: None,
        });
        let ringing_since = call.alerting_at();
        assert!(ringing_since.is_some());
        assert!(call.connected_at().is_none());

        registry.heartbeat(&status(call_id, None));
        assert!(call.connected_at().is_some());
        // A repeated report does not move the original timestamps.
        assert_eq!(call.alerting_at(), ringing_since);
    }
}
