//! Ordered pending work for a single transaction
//!
//! A buffer records every add and remove submitted under one transaction id
//! and knows how to replay itself atomically: all adds run before any
//! removes, each group in original submission order, inside one adapter
//! transaction.

use crate::error::Result;
use crate::message::{Message, MessageAck};
use crate::store::PersistenceAdapter;
use crate::transaction::command::{AddCommand, RemoveCommand};
use parking_lot::Mutex;
use tracing::warn;

/// Buffered adds and removes for one transaction id
///
/// Appends are serialized by an interior mutex, so destinations enlisting
/// operations from different threads land in the same ordered sequences.
/// A buffer is discarded after commit or rollback and never reused.
#[derive(Debug)]
pub struct TransactionBuffer {
    inner: Mutex<BufferInner>,
}

#[derive(Debug, Default)]
struct BufferInner {
    adds: Vec<AddCommand>,
    removes: Vec<RemoveCommand>,
}

impl TransactionBuffer {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(BufferInner::default()),
        }
    }

    pub fn push_add(&self, cmd: AddCommand) {
        self.inner.lock().adds.push(cmd);
    }

    pub fn push_remove(&self, cmd: RemoveCommand) {
        self.inner.lock().removes.push(cmd);
    }

    /// Payloads of the buffered adds, in submission order
    pub fn pending_messages(&self) -> Vec<Message> {
        self.inner
            .lock()
            .adds
            .iter()
            .map(|cmd| cmd.message().clone())
            .collect()
    }

    /// Payloads of the buffered removes, in submission order
    pub fn pending_acks(&self) -> Vec<MessageAck> {
        self.inner
            .lock()
            .removes
            .iter()
            .map(|cmd| cmd.ack().clone())
            .collect()
    }

    pub fn add_count(&self) -> usize {
        self.inner.lock().adds.len()
    }

    pub fn remove_count(&self) -> usize {
        self.inner.lock().removes.len()
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.adds.is_empty() && inner.removes.is_empty()
    }

    /// Replay every buffered command inside one adapter transaction
    ///
    /// Adds run first, then removes, each group in submission order. On the
    /// first command failure the adapter transaction is rolled back and the
    /// original error is re-raised; the buffer performs no partial cleanup
    /// of its own. On success the adapter transaction is committed.
    pub fn commit(&self, adapter: &dyn PersistenceAdapter) -> Result<()> {
        let inner = self.inner.lock();
        let ctx = adapter.begin_transaction()?;

        for cmd in inner.adds.iter() {
            if let Err(err) = cmd.run(&ctx) {
                if let Err(rb_err) = adapter.rollback_transaction(&ctx) {
                    warn!(error = %rb_err, "rollback after failed replay also failed");
                }
                return Err(err);
            }
        }
        for cmd in inner.removes.iter() {
            if let Err(err) = cmd.run(&ctx) {
                if let Err(rb_err) = adapter.rollback_transaction(&ctx) {
                    warn!(error = %rb_err, "rollback after failed replay also failed");
                }
                return Err(err);
            }
        }

        adapter.commit_transaction(&ctx)
    }
}
