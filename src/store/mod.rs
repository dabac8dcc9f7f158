//! Store capability traits and the transactional-adapter boundary
//!
//! The traits here describe the external collaborators of the transaction
//! layer: the non-transactional message stores it decorates and the
//! persistence adapter whose begin/commit/rollback brackets a replay.
//! Implementations own durability; this crate only coordinates when their
//! operations execute relative to transaction boundaries.

pub mod memory;

use crate::error::Result;
use crate::message::{Message, MessageAck, MessageId};
use std::sync::atomic::{AtomicU64, Ordering};

pub use memory::{JournalEntry, MemoryMessageStore, MemoryPersistenceAdapter, MemoryTopicStore};

/// Execution context for store operations running inside an adapter
/// transaction.
///
/// A fresh context is produced by every [`PersistenceAdapter::begin_transaction`]
/// call; store primitives receive it (or `None` when there is no ambient
/// transaction) and the adapter keys its durable unit of work off it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxContext {
    id: u64,
}

impl TxContext {
    /// Create a context with a process-unique id
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Synchronous add/remove primitives of a destination store
///
/// `ctx` is the adapter transaction the operation runs under, `None` when
/// the call has no ambient transaction.
pub trait MessageStore: Send + Sync {
    fn add_message(&self, ctx: Option<&TxContext>, message: &Message) -> Result<()>;

    fn remove_message(&self, ctx: Option<&TxContext>, ack: &MessageAck) -> Result<()>;
}

/// A store for publish/subscribe destinations, which additionally supports
/// per-subscription acknowledgment
pub trait TopicMessageStore: MessageStore {
    fn acknowledge(
        &self,
        ctx: Option<&TxContext>,
        client_id: &str,
        subscription_name: &str,
        message_id: &MessageId,
        ack: &MessageAck,
    ) -> Result<()>;
}

/// The transaction engine of the durable persistence layer
///
/// `begin_transaction` must be callable repeatedly and yield a fresh context
/// each time; commit and rollback act on the context they are given.
pub trait PersistenceAdapter: Send + Sync {
    fn begin_transaction(&self) -> Result<TxContext>;

    fn commit_transaction(&self, ctx: &TxContext) -> Result<()>;

    fn rollback_transaction(&self, ctx: &TxContext) -> Result<()>;
}

/// Completion handle for the asynchronous add/remove surface
///
/// Buffering a transactional operation is synchronous and in-memory, so
/// handles are created already resolved. The type exists to keep the
/// capability surface of the decorators compatible with callers that expect
/// a completion token from asynchronous store writes.
#[derive(Debug)]
#[must_use = "a write completion carries the outcome of the store call"]
pub struct WriteCompletion {
    result: Result<()>,
}

impl WriteCompletion {
    /// An already-successful completion
    pub fn done() -> Self {
        Self { result: Ok(()) }
    }

    /// Wrap the outcome of a synchronous store call
    pub fn from_result(result: Result<()>) -> Self {
        Self { result }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Resolve the completion, yielding the outcome of the write
    pub fn wait(self) -> Result<()> {
        self.result
    }
}
