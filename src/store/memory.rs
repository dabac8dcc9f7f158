//! In-memory implementations of the store collaborators
//!
//! These back the embedded/in-memory mode and the test suite. Every mutation
//! is appended to an operation journal tagged with the adapter transaction it
//! ran under, so callers can assert on execution order and transaction
//! bracketing.

use crate::error::{Result, StoreError};
use crate::message::{Destination, Message, MessageAck, MessageId};
use crate::store::{MessageStore, PersistenceAdapter, TopicMessageStore, TxContext};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A recorded store mutation, tagged with the id of the adapter transaction
/// it executed under (`None` for non-transactional calls)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Add {
        ctx: Option<u64>,
        message_id: MessageId,
    },
    Remove {
        ctx: Option<u64>,
        message_id: MessageId,
    },
    Acknowledge {
        ctx: Option<u64>,
        client_id: String,
        subscription_name: String,
        message_id: MessageId,
    },
}

/// Non-transactional in-memory store for point-to-point destinations
pub struct MemoryMessageStore {
    destination: Destination,
    messages: Mutex<Vec<Message>>,
    journal: Mutex<Vec<JournalEntry>>,
}

impl MemoryMessageStore {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            messages: Mutex::new(Vec::new()),
            journal: Mutex::new(Vec::new()),
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.lock().iter().any(|m| &m.id == id)
    }

    /// Snapshot of every mutation applied to this store, in execution order
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().clone()
    }

    fn record(&self, entry: JournalEntry) {
        self.journal.lock().push(entry);
    }
}

impl MessageStore for MemoryMessageStore {
    fn add_message(&self, ctx: Option<&TxContext>, message: &Message) -> Result<()> {
        self.messages.lock().push(message.clone());
        self.record(JournalEntry::Add {
            ctx: ctx.map(TxContext::id),
            message_id: message.id.clone(),
        });
        debug!(destination = %self.destination, message_id = %message.id, "message stored");
        Ok(())
    }

    fn remove_message(&self, ctx: Option<&TxContext>, ack: &MessageAck) -> Result<()> {
        // An ack for a message this store never saw is not an error; the
        // message may have been produced before this store was attached.
        self.messages.lock().retain(|m| m.id != ack.message_id);
        self.record(JournalEntry::Remove {
            ctx: ctx.map(TxContext::id),
            message_id: ack.message_id.clone(),
        });
        debug!(destination = %self.destination, message_id = %ack.message_id, "message removed");
        Ok(())
    }
}

/// Non-transactional in-memory store for publish/subscribe destinations
pub struct MemoryTopicStore {
    base: MemoryMessageStore,
    acked: Mutex<HashMap<(String, String), Vec<MessageId>>>,
}

impl MemoryTopicStore {
    pub fn new(destination: Destination) -> Self {
        Self {
            base: MemoryMessageStore::new(destination),
            acked: Mutex::new(HashMap::new()),
        }
    }

    pub fn destination(&self) -> &Destination {
        self.base.destination()
    }

    pub fn message_count(&self) -> usize {
        self.base.message_count()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.base.contains(id)
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.base.journal()
    }

    /// Message ids acknowledged by a durable subscription, in ack order
    pub fn acked_for(&self, client_id: &str, subscription_name: &str) -> Vec<MessageId> {
        self.acked
            .lock()
            .get(&(client_id.to_string(), subscription_name.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

impl MessageStore for MemoryTopicStore {
    fn add_message(&self, ctx: Option<&TxContext>, message: &Message) -> Result<()> {
        self.base.add_message(ctx, message)
    }

    fn remove_message(&self, ctx: Option<&TxContext>, ack: &MessageAck) -> Result<()> {
        self.base.remove_message(ctx, ack)
    }
}

impl TopicMessageStore for MemoryTopicStore {
    fn acknowledge(
        &self,
        ctx: Option<&TxContext>,
        client_id: &str,
        subscription_name: &str,
        message_id: &MessageId,
        _ack: &MessageAck,
    ) -> Result<()> {
        self.acked
            .lock()
            .entry((client_id.to_string(), subscription_name.to_string()))
            .or_default()
            .push(message_id.clone());
        self.base.record(JournalEntry::Acknowledge {
            ctx: ctx.map(TxContext::id),
            client_id: client_id.to_string(),
            subscription_name: subscription_name.to_string(),
            message_id: message_id.clone(),
        });
        Ok(())
    }
}

/// In-memory transaction engine tracking begun, committed and rolled-back
/// contexts
#[derive(Default)]
pub struct MemoryPersistenceAdapter {
    active: Mutex<HashSet<u64>>,
    committed: Mutex<Vec<u64>>,
    rolled_back: Mutex<Vec<u64>>,
}

impl MemoryPersistenceAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Context ids committed so far, in commit order
    pub fn committed(&self) -> Vec<u64> {
        self.committed.lock().clone()
    }

    /// Context ids rolled back so far, in rollback order
    pub fn rolled_back(&self) -> Vec<u64> {
        self.rolled_back.lock().clone()
    }
}

impl PersistenceAdapter for MemoryPersistenceAdapter {
    fn begin_transaction(&self) -> Result<TxContext> {
        let ctx = TxContext::fresh();
        self.active.lock().insert(ctx.id());
        Ok(ctx)
    }

    fn commit_transaction(&self, ctx: &TxContext) -> Result<()> {
        if !self.active.lock().remove(&ctx.id()) {
            return Err(StoreError::store(
                "commit-transaction",
                format!("unknown context {}", ctx.id()),
            ));
        }
        self.committed.lock().push(ctx.id());
        Ok(())
    }

    fn rollback_transaction(&self, ctx: &TxContext) -> Result<()> {
        if !self.active.lock().remove(&ctx.id()) {
            return Err(StoreError::store(
                "rollback-transaction",
                format!("unknown context {}", ctx.id()),
            ));
        }
        self.rolled_back.lock().push(ctx.id());
        Ok(())
    }
}
