//! Registered endpoint records and the multi-key endpoint registry.
//!
//! A registration record describes an endpoint registered with the
//! gatekeeper; it deliberately has no relationship to any live signalling
//! object, only opaque addresses and identifiers.
//!
//! Records are immutable snapshots behind `Arc`: any mutation beyond a
//! keep-alive timestamp refresh builds a replacement record and swaps every
//! index under one write lock, so readers never observe a half-mutated
//! record and may keep using a reference after the record leaves the index.

use crate::errors::RegistryError;
use common::types::{CallId, EndpointId};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use ras_protocol::{Alias, TransportAddress};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// A registration record.
#[derive(Debug)]
pub struct RegisteredEndpoint {
    identifier: EndpointId,
    ras_addresses: Vec<TransportAddress>,
    signal_addresses: Vec<TransportAddress>,
    aliases: Vec<Alias>,
    prefixes: Vec<String>,
    application_info: Option<String>,
    time_to_live: u32,
    auth_required: bool,
    registered_at: DateTime<Utc>,
    /// Refreshed in place by keep-alives; everything else is copy-on-write.
    last_registration: Mutex<Instant>,
    /// Back-references to calls this endpoint owns a leg of.
    active_calls: Mutex<HashSet<CallId>>,
}

impl RegisteredEndpoint {
    #[must_use]
    pub fn identifier(&self) -> &EndpointId {
        &self.identifier
    }

    #[must_use]
    pub fn ras_addresses(&self) -> &[TransportAddress] {
        &self.ras_addresses
    }

    #[must_use]
    pub fn signal_addresses(&self) -> &[TransportAddress] {
        &self.signal_addresses
    }

    #[must_use]
    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    #[must_use]
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    #[must_use]
    pub fn application_info(&self) -> Option<&str> {
        self.application_info.as_deref()
    }

    /// Granted registration lease in seconds; zero means no expiry.
    #[must_use]
    pub fn time_to_live(&self) -> u32 {
        self.time_to_live
    }

    /// Whether requests from this endpoint must carry valid tokens.
    #[must_use]
    pub fn auth_required(&self) -> bool {
        self.auth_required
    }

    #[must_use]
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Refresh the lease, as a lightweight registration does.
    pub fn touch(&self) {
        *self.last_registration.lock() = Instant::now();
    }

    /// Whether the lease has lapsed.
    #[must_use]
    pub fn has_exceeded_time_to_live(&self) -> bool {
        if self.time_to_live == 0 {
            return false;
        }
        self.last_registration.lock().elapsed().as_secs() > u64::from(self.time_to_live)
    }

    pub fn add_call(&self, call_id: CallId) {
        self.active_calls.lock().insert(call_id);
    }

    pub fn remove_call(&self, call_id: &CallId) {
        self.active_calls.lock().remove(call_id);
    }

    /// Snapshot of the owned call set.
    #[must_use]
    pub fn call_ids(&self) -> Vec<CallId> {
        self.active_calls.lock().iter().copied().collect()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.active_calls.lock().len()
    }
}

/// Parameters for a full (non-keep-alive) registration.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Existing identifier when this updates a live registration.
    pub identifier: Option<EndpointId>,
    pub ras_addresses: Vec<TransportAddress>,
    pub signal_addresses: Vec<TransportAddress>,
    pub aliases: Vec<Alias>,
    pub prefixes: Vec<String>,
    pub application_info: Option<String>,
    /// Granted lease in seconds.
    pub time_to_live: u32,
    pub auth_required: bool,
}

/// Result of a successful registration.
#[derive(Debug)]
pub struct RegisterOutcome {
    pub endpoint: Arc<RegisteredEndpoint>,
    /// Registrations evicted by the same-signal-address overwrite policy.
    /// Their calls still need tearing down by the caller.
    pub evicted: Vec<Arc<RegisteredEndpoint>>,
    pub is_new: bool,
}

/// Result of removing a single alias.
pub enum AliasRemoval {
    /// Alias unknown, or owned by a different registration.
    NotFound,
    /// Alias removed; the registration remains with the returned record.
    Removed(Arc<RegisteredEndpoint>),
    /// That was the last alias; the whole registration is gone.
    EndpointRemoved(Arc<RegisteredEndpoint>),
}

#[derive(Default)]
struct Indexes {
    by_identifier: HashMap<EndpointId, Arc<RegisteredEndpoint>>,
    by_alias: HashMap<Alias, EndpointId>,
    by_address: HashMap<TransportAddress, EndpointId>,
}

/// Multi-key registry of registered endpoints.
///
/// Lookups clone an `Arc` under the read lock and hold nothing afterwards;
/// mutations keep all three indexes consistent under one write lock.
#[derive(Default)]
pub struct EndpointRegistry {
    inner: RwLock<Indexes>,
}

impl EndpointRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update an endpoint.
    ///
    /// `fresh_identifier` is used only when the registration does not match
    /// an existing record. Conflicting signal addresses evict their holders
    /// when `overwrite_on_same_signal_address` is set and reject otherwise;
    /// conflicting aliases always reject.
    pub fn register(
        &self,
        fresh_identifier: EndpointId,
        registration: Registration,
        overwrite_on_same_signal_address: bool,
    ) -> Result<RegisterOutcome, RegistryError> {
        let mut inner = self.inner.write();

        let existing = registration
            .identifier
            .as_ref()
            .and_then(|id| inner.by_identifier.get(id))
            .cloned();
        let self_id = existing.as_ref().map(|ep| ep.identifier.clone());

        // Signal-address conflicts first: they decide eviction.
        let mut evicted_ids: Vec<EndpointId> = Vec::new();
        for address in &registration.signal_addresses {
            if let Some(owner) = inner.by_address.get(address) {
                if Some(owner) != self_id.as_ref() {
                    if overwrite_on_same_signal_address {
                        if !evicted_ids.contains(owner) {
                            evicted_ids.push(owner.clone());
                        }
                    } else {
                        return Err(RegistryError::DuplicateSignalAddress(*address));
                    }
                }
            }
        }

        // Alias conflicts reject unless the holder is being evicted anyway.
        for alias in &registration.aliases {
            if let Some(owner) = inner.by_alias.get(alias) {
                if Some(owner) != self_id.as_ref() && !evicted_ids.contains(owner) {
                    return Err(RegistryError::DuplicateAlias(alias.clone()));
                }
            }
        }

        let mut evicted = Vec::new();
        for id in &evicted_ids {
            if let Some(record) = remove_locked(&mut inner, id) {
                debug!(
                    target: "gk.registry.endpoint",
                    evicted = %record.identifier(),
                    "Overwriting registration with duplicate signal address"
                );
                evicted.push(record);
            }
        }

        let (identifier, is_new) = match &existing {
            Some(record) => (record.identifier.clone(), false),
            None => {
                if inner.by_identifier.contains_key(&fresh_identifier) {
                    return Err(RegistryError::IdentifierCollision(fresh_identifier));
                }
                (fresh_identifier, true)
            }
        };

        // Carry forward state that survives a re-registration.
        let (registered_at, active_calls) = match &existing {
            Some(record) => (record.registered_at, record.active_calls.lock().clone()),
            None => (Utc::now(), HashSet::new()),
        };

        if let Some(record) = &existing {
            unindex_locked(&mut inner, record);
        }

        let mut aliases = registration.aliases;
        aliases.dedup();

        let record = Arc::new(RegisteredEndpoint {
            identifier,
            ras_addresses: registration.ras_addresses,
            signal_addresses: registration.signal_addresses,
            aliases,
            prefixes: registration.prefixes,
            application_info: registration.application_info,
            time_to_live: registration.time_to_live,
            auth_required: registration.auth_required,
            registered_at,
            last_registration: Mutex::new(Instant::now()),
            active_calls: Mutex::new(active_calls),
        });
        index_locked(&mut inner, &record);

        Ok(RegisterOutcome {
            endpoint: record,
            evicted,
            is_new,
        })
    }

    /// Refresh the lease of an existing registration (keep-alive).
    pub fn refresh(&self, identifier: &EndpointId) -> Option<Arc<RegisteredEndpoint>> {
        let record = self.inner.read().by_identifier.get(identifier).cloned()?;
        record.touch();
        Some(record)
    }

    /// Remove a registration and all its index entries.
    pub fn unregister(&self, identifier: &EndpointId) -> Option<Arc<RegisteredEndpoint>> {
        remove_locked(&mut self.inner.write(), identifier)
    }

    /// Remove one alias; removing the last alias removes the registration.
    pub fn remove_alias(&self, alias: &Alias, owner: Option<&EndpointId>) -> AliasRemoval {
        let mut inner = self.inner.write();

        let Some(owner_id) = inner.by_alias.get(alias).cloned() else {
            return AliasRemoval::NotFound;
        };
        if let Some(expected) = owner {
            if *expected != owner_id {
                return AliasRemoval::NotFound;
            }
        }
        let Some(record) = inner.by_identifier.get(&owner_id).cloned() else {
            return AliasRemoval::NotFound;
        };

        let remaining: Vec<Alias> = record
            .aliases
            .iter()
            .filter(|a| *a != alias)
            .cloned()
            .collect();

        if remaining.is_empty() {
            if let Some(removed) = remove_locked(&mut inner, &owner_id) {
                return AliasRemoval::EndpointRemoved(removed);
            }
            return AliasRemoval::NotFound;
        }

        // Copy-on-write: replace the record so readers never see a
        // half-updated alias list.
        inner.by_alias.remove(alias);
        let replacement = Arc::new(RegisteredEndpoint {
            identifier: record.identifier.clone(),
            ras_addresses: record.ras_addresses.clone(),
            signal_addresses: record.signal_addresses.clone(),
            aliases: remaining,
            prefixes: record.prefixes.clone(),
            application_info: record.application_info.clone(),
            time_to_live: record.time_to_live,
            auth_required: record.auth_required,
            registered_at: record.registered_at,
            last_registration: Mutex::new(*record.last_registration.lock()),
            active_calls: Mutex::new(record.active_calls.lock().clone()),
        });
        inner
            .by_identifier
            .insert(replacement.identifier.clone(), Arc::clone(&replacement));
        AliasRemoval::Removed(replacement)
    }

    #[must_use]
    pub fn find_by_identifier(&self, identifier: &EndpointId) -> Option<Arc<RegisteredEndpoint>> {
        self.inner.read().by_identifier.get(identifier).cloned()
    }

    #[must_use]
    pub fn find_by_alias(&self, alias: &Alias) -> Option<Arc<RegisteredEndpoint>> {
        let inner = self.inner.read();
        let id = inner.by_alias.get(alias)?;
        inner.by_identifier.get(id).cloned()
    }

    #[must_use]
    pub fn find_by_signal_address(
        &self,
        address: &TransportAddress,
    ) -> Option<Arc<RegisteredEndpoint>> {
        let inner = self.inner.read();
        let id = inner.by_address.get(address)?;
        inner.by_identifier.get(id).cloned()
    }

    /// First registration matching any of the given signal addresses.
    #[must_use]
    pub fn find_by_signal_addresses(
        &self,
        addresses: &[TransportAddress],
    ) -> Option<Arc<RegisteredEndpoint>> {
        let inner = self.inner.read();
        for address in addresses {
            if let Some(id) = inner.by_address.get(address) {
                if let Some(record) = inner.by_identifier.get(id) {
                    return Some(Arc::clone(record));
                }
            }
        }
        None
    }

    /// Clone of every live registration, for lock-free iteration.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<RegisteredEndpoint>> {
        self.inner.read().by_identifier.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_identifier.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_identifier.is_empty()
    }
}

fn index_locked(inner: &mut Indexes, record: &Arc<RegisteredEndpoint>) {
    inner
        .by_identifier
        .insert(record.identifier.clone(), Arc::clone(record));
    for alias in &record.aliases {
        inner
            .by_alias
            .insert(alias.clone(), record.identifier.clone());
    }
    for address in &record.signal_addresses {
        inner.by_address.insert(*address, record.identifier.clone());
    }
}

fn unindex_locked(inner: &mut Indexes, record: &Arc<RegisteredEndpoint>) {
    for alias in &record.aliases {
        if inner.by_alias.get(alias) == Some(&record.identifier) {
            inner.by_alias.remove(alias);
        }
    }
    for address in &record.signal_addresses {
        if inner.by_address.get(address) == Some(&record.identifier) {
            inner.by_address.remove(address);
        }
    }
    inner.by_identifier.remove(&record.identifier);
}

fn remove_locked(inner: &mut Indexes, identifier: &EndpointId) -> Option<Arc<RegisteredEndpoint>> {
    let record = inner.by_identifier.get(identifier).cloned()?;
    unindex_locked(inner, &record);
    Some(record)
}
