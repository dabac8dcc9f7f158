//! Concurrent transaction registry
//!
//! Two sharded maps track the lifecycle of every transaction id: in-flight
//! (active, not yet prepared) and prepared (durable-intent, awaiting the
//! final commit or rollback). A bounded history of finalized ids lets a
//! late append to an already-committed transaction be rejected instead of
//! silently starting an orphaned buffer.
//!
//! # Concurrency
//!
//! The registry uses `DashMap` for both maps, providing fine-grained
//! per-key locking and safe concurrent get/insert/remove without any
//! external locking by callers. `get_or_create` is atomic per key: two
//! concurrent first-touches of the same id observe the same buffer.

use crate::error::{Result, StoreError};
use crate::message::TransactionId;
use crate::transaction::buffer::TransactionBuffer;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Bounded record of recently finalized transaction ids
struct FinalizedHistory {
    order: VecDeque<TransactionId>,
    ids: HashSet<TransactionId>,
    limit: usize,
}

impl FinalizedHistory {
    fn new(limit: usize) -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            limit,
        }
    }

    fn record(&mut self, txid: TransactionId) {
        if self.limit == 0 {
            return;
        }
        if self.ids.insert(txid.clone()) {
            self.order.push_back(txid);
            while self.order.len() > self.limit {
                if let Some(evicted) = self.order.pop_front() {
                    self.ids.remove(&evicted);
                }
            }
        }
    }

    fn contains(&self, txid: &TransactionId) -> bool {
        self.ids.contains(txid)
    }

    fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }
}

/// Registry of in-flight and prepared transaction buffers
///
/// Invariant: a transaction id lives in at most one of the two maps at any
/// time; promotion from in-flight to prepared is the only move between them.
pub struct TransactionRegistry {
    in_flight: DashMap<TransactionId, Arc<TransactionBuffer>>,
    prepared: DashMap<TransactionId, Arc<TransactionBuffer>>,
    finalized: Mutex<FinalizedHistory>,
}

impl TransactionRegistry {
    pub fn new(finalized_history_limit: usize) -> Self {
        Self {
            in_flight: DashMap::new(),
            prepared: DashMap::new(),
            finalized: Mutex::new(FinalizedHistory::new(finalized_history_limit)),
        }
    }

    /// Look up the buffer for `txid`, creating an empty in-flight one if the
    /// id has never been seen
    ///
    /// A buffer stays mutable while prepared, so a prepared id resolves to
    /// its prepared buffer rather than shadowing it with a fresh in-flight
    /// entry. An id that was already committed or rolled back is a protocol
    /// violation by the caller and is rejected.
    pub fn get_or_create(&self, txid: &TransactionId) -> Result<Arc<TransactionBuffer>> {
        if let Some(buffer) = self.prepared.get(txid) {
            return Ok(Arc::clone(buffer.value()));
        }
        if self.finalized.lock().contains(txid) {
            return Err(StoreError::TransactionFinalized(txid.clone()));
        }
        let buffer = self
            .in_flight
            .entry(txid.clone())
            .or_insert_with(|| Arc::new(TransactionBuffer::new()));
        Ok(Arc::clone(buffer.value()))
    }

    /// Move `txid` from in-flight to prepared; no-op for unknown ids
    pub fn promote(&self, txid: &TransactionId) {
        if let Some((id, buffer)) = self.in_flight.remove(txid) {
            self.prepared.insert(id, buffer);
            debug!(txid = %txid, "transaction prepared");
        }
    }

    /// Atomically remove and return the buffer for `txid` from the prepared
    /// map (if `was_prepared`) or the in-flight map
    ///
    /// Removing the buffer before replay is what guarantees replay never
    /// runs concurrently with an append to the same buffer.
    pub fn take_for_commit(
        &self,
        txid: &TransactionId,
        was_prepared: bool,
    ) -> Option<Arc<TransactionBuffer>> {
        let taken = if was_prepared {
            self.prepared.remove(txid)
        } else {
            self.in_flight.remove(txid)
        };
        taken.map(|(id, buffer)| {
            self.finalized.lock().record(id);
            buffer
        })
    }

    /// Drop `txid` from both maps unconditionally; safe to call on unknown
    /// ids
    ///
    /// The id is recorded as finalized only when a buffer was actually
    /// removed, so rolling back a never-used id leaves it usable later.
    pub fn remove(&self, txid: &TransactionId) {
        let from_in_flight = self.in_flight.remove(txid).is_some();
        let from_prepared = self.prepared.remove(txid).is_some();
        if from_in_flight || from_prepared {
            self.finalized.lock().record(txid.clone());
        }
    }

    /// Point-in-time enumeration of every prepared transaction
    pub fn snapshot_prepared(&self) -> Vec<(TransactionId, Arc<TransactionBuffer>)> {
        self.prepared
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Discard all in-flight buffers (crash recovery: unprepared work is
    /// presumed lost)
    pub fn clear_in_flight(&self) {
        self.in_flight.clear();
    }

    /// Discard everything, including the finalized-id history
    pub fn clear(&self) {
        self.in_flight.clear();
        self.prepared.clear();
        self.finalized.lock().clear();
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn prepared_count(&self) -> usize {
        self.prepared.len()
    }
}
