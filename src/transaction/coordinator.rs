//! Transaction coordination over non-transactional stores
//!
//! The coordinator owns the registry of transaction buffers and drives the
//! prepare/commit/rollback state machine:
//!
//! ```text
//! absent -> in-flight -> prepared -> absent   (two-phase path)
//! absent -> in-flight -> absent               (one-phase commit or rollback)
//! ```
//!
//! It also owns the recovery-mode flag: while a restart is replaying
//! prepared transactions to the recovery listener, every add/remove routed
//! through the decorators is suppressed so the replay cannot re-buffer its
//! own operations.

use crate::error::{Result, StoreError};
use crate::message::{Message, MessageAck, MessageId, TransactionId};
use crate::store::{MessageStore, PersistenceAdapter, TopicMessageStore};
use crate::transaction::buffer::TransactionBuffer;
use crate::transaction::command::{AddCommand, RemoveCommand};
use crate::transaction::decorator::{TransactionalMessageStore, TransactionalTopicStore};
use crate::transaction::registry::TransactionRegistry;
#[cfg(feature = "metrics")]
use metrics::counter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hook run by the broker layer around the durable commit point
pub type CommitHook = Box<dyn FnOnce() + Send>;

/// Callback invoked once per prepared transaction found at recovery time
///
/// The broker framework above decides whether to re-commit or discard the
/// reported work; the coordinator never executes it against the live stores.
pub trait TransactionRecoveryListener {
    fn recover(
        &mut self,
        txid: &TransactionId,
        messages: &[Message],
        acks: &[MessageAck],
    ) -> Result<()>;
}

/// Configuration for the transaction coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How many finalized transaction ids to remember for late-append
    /// detection; 0 disables the check
    pub finalized_history_limit: usize,
    /// Also report local (non-XA) prepared transactions to the recovery
    /// listener; normally only distributed transactions are recoverable
    pub recover_local_transactions: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            finalized_history_limit: 4096,
            recover_local_transactions: false,
        }
    }
}

/// Makes a set of non-transactional message stores participate in atomic
/// units of work
///
/// Wrap each underlying store with [`wrap`](TransactionCoordinator::wrap) or
/// [`wrap_topic`](TransactionCoordinator::wrap_topic); operations arriving
/// through the decorators are buffered per transaction id and replayed
/// against the persistence adapter when the transaction commits.
pub struct TransactionCoordinator {
    registry: TransactionRegistry,
    adapter: Arc<dyn PersistenceAdapter>,
    recovering: AtomicBool,
    config: CoordinatorConfig,
}

impl TransactionCoordinator {
    pub fn new(adapter: Arc<dyn PersistenceAdapter>) -> Self {
        Self::with_config(adapter, CoordinatorConfig::default())
    }

    pub fn with_config(adapter: Arc<dyn PersistenceAdapter>, config: CoordinatorConfig) -> Self {
        info!("transaction coordinator initialized");
        Self {
            registry: TransactionRegistry::new(config.finalized_history_limit),
            adapter,
            recovering: AtomicBool::new(false),
            config,
        }
    }

    /// Decorate a plain store so its operations enlist in transactions
    pub fn wrap(self: &Arc<Self>, store: Arc<dyn MessageStore>) -> TransactionalMessageStore {
        TransactionalMessageStore::new(store, Arc::clone(self))
    }

    /// Decorate a topic-capable store, additionally intercepting
    /// subscription acknowledgment
    pub fn wrap_topic<S>(self: &Arc<Self>, store: Arc<S>) -> TransactionalTopicStore
    where
        S: TopicMessageStore + 'static,
    {
        let as_plain: Arc<dyn MessageStore> = store.clone();
        TransactionalTopicStore::new(store, as_plain, Arc::clone(self))
    }

    /// Promote an in-flight transaction to prepared (phase one of 2PC)
    ///
    /// An unknown id is a no-op: the transaction was already finalized
    /// concurrently, or never buffered any work.
    pub fn prepare(&self, txid: &TransactionId) {
        self.registry.promote(txid);
    }

    /// Finalize a transaction by replaying its buffer against the
    /// persistence adapter
    ///
    /// `pre_commit` runs before the transaction id is released;
    /// `post_commit` runs only after a successful replay (or immediately
    /// when the id is unknown, which supports idempotent retry after a
    /// crash between commit-decision and commit-execution).
    ///
    /// Replay may block on durable I/O. A replay failure is surfaced as
    /// [`StoreError::CommitFailed`] after the adapter transaction has been
    /// rolled back; the buffer is discarded either way and the commit is
    /// not retried by this layer.
    pub fn commit(
        &self,
        txid: &TransactionId,
        was_prepared: bool,
        pre_commit: Option<CommitHook>,
        post_commit: Option<CommitHook>,
    ) -> Result<()> {
        if let Some(hook) = pre_commit {
            hook();
        }

        let Some(buffer) = self.registry.take_for_commit(txid, was_prepared) else {
            debug!(txid = %txid, "commit of unknown transaction, treating as already finalized");
            if let Some(hook) = post_commit {
                hook();
            }
            return Ok(());
        };

        match buffer.commit(self.adapter.as_ref()) {
            Ok(()) => {
                debug!(
                    txid = %txid,
                    adds = buffer.add_count(),
                    removes = buffer.remove_count(),
                    "transaction committed"
                );
                #[cfg(feature = "metrics")]
                counter!("persistq_transactions_committed_total").increment(1);
                if let Some(hook) = post_commit {
                    hook();
                }
                Ok(())
            }
            Err(source) => {
                warn!(txid = %txid, error = %source, "transaction replay failed");
                #[cfg(feature = "metrics")]
                counter!("persistq_transactions_failed_total").increment(1);
                Err(StoreError::CommitFailed {
                    txid: txid.clone(),
                    source: Box::new(source),
                })
            }
        }
    }

    /// Discard a transaction from both registries; never fails, even for
    /// unknown ids
    pub fn rollback(&self, txid: &TransactionId) {
        self.registry.remove(txid);
        debug!(txid = %txid, "transaction rolled back");
        #[cfg(feature = "metrics")]
        counter!("persistq_transactions_rolled_back_total").increment(1);
    }

    /// Replay prepared transactions to `listener` after a restart
    ///
    /// In-flight, unprepared work did not survive the crash and is
    /// discarded without being reported. Prepared transactions remain in
    /// the registry afterwards, so the broker can still commit or roll
    /// them back once it has decided their fate. The recovery-mode flag is
    /// cleared even when the listener fails.
    pub fn recover(&self, listener: &mut dyn TransactionRecoveryListener) -> Result<()> {
        self.registry.clear_in_flight();
        self.recovering.store(true, Ordering::SeqCst);
        let result = self.report_prepared(listener);
        self.recovering.store(false, Ordering::SeqCst);
        result
    }

    fn report_prepared(&self, listener: &mut dyn TransactionRecoveryListener) -> Result<()> {
        for (txid, buffer) in self.registry.snapshot_prepared() {
            if !txid.is_distributed() && !self.config.recover_local_transactions {
                debug!(txid = %txid, "skipping local transaction during recovery");
                continue;
            }
            listener.recover(&txid, &buffer.pending_messages(), &buffer.pending_acks())?;
            #[cfg(feature = "metrics")]
            counter!("persistq_transactions_recovered_total").increment(1);
        }
        info!(
            prepared = self.registry.prepared_count(),
            "transaction recovery pass complete"
        );
        Ok(())
    }

    /// Whether a recovery pass is currently replaying prepared transactions
    pub fn is_recovering(&self) -> bool {
        self.recovering.load(Ordering::SeqCst)
    }

    /// Lifecycle hook; the coordinator needs no startup work of its own
    pub fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Lifecycle hook; drops all registry state
    pub fn stop(&self) -> Result<()> {
        self.clear();
        Ok(())
    }

    /// Unconditionally drop both registries, the finalized-id history and
    /// the recovery flag; used on store teardown or reset
    pub fn clear(&self) {
        self.registry.clear();
        self.recovering.store(false, Ordering::SeqCst);
        info!("transaction coordinator cleared");
    }

    pub fn in_flight_count(&self) -> usize {
        self.registry.in_flight_count()
    }

    pub fn prepared_count(&self) -> usize {
        self.registry.prepared_count()
    }

    // ==================== Decorator entry points ====================
    //
    // Every store mutation funnels through here: dropped during recovery,
    // buffered when the payload carries a transaction id, and otherwise
    // delegated synchronously with no ambient transaction.

    pub(crate) fn add_message(
        &self,
        destination: &Arc<dyn MessageStore>,
        message: &Message,
    ) -> Result<()> {
        if self.is_recovering() {
            return Ok(());
        }
        match &message.transaction_id {
            Some(txid) => {
                let buffer = self.registry.get_or_create(txid)?;
                buffer.push_add(AddCommand::new(Arc::clone(destination), message.clone()));
                Ok(())
            }
            None => destination.add_message(None, message),
        }
    }

    pub(crate) fn remove_message(
        &self,
        destination: &Arc<dyn MessageStore>,
        ack: &MessageAck,
    ) -> Result<()> {
        if self.is_recovering() {
            return Ok(());
        }
        match &ack.transaction_id {
            Some(txid) => {
                let buffer = self.registry.get_or_create(txid)?;
                buffer.push_remove(RemoveCommand::remove(Arc::clone(destination), ack.clone()));
                Ok(())
            }
            None => destination.remove_message(None, ack),
        }
    }

    pub(crate) fn acknowledge(
        &self,
        destination: &Arc<dyn TopicMessageStore>,
        client_id: &str,
        subscription_name: &str,
        message_id: &MessageId,
        ack: &MessageAck,
    ) -> Result<()> {
        if self.is_recovering() {
            return Ok(());
        }
        match &ack.transaction_id {
            Some(txid) => {
                let buffer = self.registry.get_or_create(txid)?;
                buffer.push_remove(RemoveCommand::acknowledge(
                    Arc::clone(destination),
                    client_id,
                    subscription_name,
                    message_id.clone(),
                    ack.clone(),
                ));
                Ok(())
            }
            None => destination.acknowledge(None, client_id, subscription_name, message_id, ack),
        }
    }
}
