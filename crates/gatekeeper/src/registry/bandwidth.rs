//! Shared bandwidth pool.
//!
//! All units are 100 bits/s, as on the RAS wire. Every delta goes through
//! one mutex held for the whole read-modify-write, so concurrent
//! ARQ/BRQ/DRQ traffic cannot lose an update or leak a reservation.

use crate::errors::BandwidthError;
use parking_lot::Mutex;

/// Finite bandwidth budget shared by every active call.
#[derive(Debug)]
pub struct BandwidthPool {
    capacity: u64,
    default_per_call: u64,
    max_per_call: u64,
    available: Mutex<u64>,
}

impl BandwidthPool {
    #[must_use]
    pub fn new(capacity: u64, default_per_call: u64, max_per_call: u64) -> Self {
        Self {
            capacity,
            default_per_call,
            max_per_call,
            available: Mutex::new(capacity),
        }
    }

    /// Reserve bandwidth for a new call.
    ///
    /// The grant is capped at the per-call default (a first allocation never
    /// gets more than that without a later BRQ) and the per-call maximum.
    /// If the capped amount exceeds what is left in the pool the whole
    /// reservation fails and nothing is charged.
    pub fn allocate(&self, requested: u64) -> Result<u64, BandwidthError> {
        let want = requested
            .min(self.default_per_call)
            .min(self.max_per_call);

        let mut available = self.available.lock();
        if want > *available {
            return Err(BandwidthError::Insufficient {
                requested: want,
                available: *available,
            });
        }
        *available -= want;
        Ok(want)
    }

    /// Atomically replace an existing reservation with a new amount.
    ///
    /// A failed upsize leaves the old reservation intact; a downsize always
    /// succeeds and returns capacity to the pool.
    pub fn adjust(&self, old: u64, requested: u64) -> Result<u64, BandwidthError> {
        let want = requested.min(self.max_per_call);

        let mut available = self.available.lock();
        if want > old {
            let delta = want - old;
            if delta > *available {
                return Err(BandwidthError::Insufficient {
                    requested: want,
                    available: *available,
                });
            }
            *available -= delta;
        } else {
            *available = (*available + (old - want)).min(self.capacity);
        }
        Ok(want)
    }

    /// Return a reservation to the pool.
    pub fn release(&self, amount: u64) {
        let mut available = self.available.lock();
        *available = available.saturating_add(amount).min(self.capacity);
    }

    /// Bandwidth currently unreserved.
    #[must_use]
    pub fn available(&self) -> u64 {
        *self.available.lock()
    }

    /// Total pool capacity.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}
