#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # persistq
//!
//! persistq adds transactional semantics to otherwise non-transactional
//! message stores inside a broker's persistence tier. Plain stores only
//! support immediate add/remove; this crate makes any number of them
//! participate in atomic, all-or-nothing units of work, including
//! distributed (two-phase) transactions that survive a crash and are
//! replayed to a recovery listener on restart.
//!
//! ## How it works
//!
//! - Each underlying store is wrapped in a decorator
//!   ([`TransactionalMessageStore`] / [`TransactionalTopicStore`]) that
//!   presents the same add/remove/acknowledge surface to the layers above.
//! - Operations carrying a transaction id are not executed; they are
//!   buffered as commands in a per-transaction [`TransactionBuffer`].
//! - On commit, the [`TransactionCoordinator`] replays the buffer against
//!   the real stores inside a single [`PersistenceAdapter`] transaction:
//!   all adds first, then all removes, each in submission order.
//! - On restart, prepared-but-uncommitted XA transactions are reported to a
//!   [`TransactionRecoveryListener`]; buffering is suppressed for the
//!   duration so the replay cannot re-enter itself.
//!
//! ## Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use persistq::{
//!     Destination, LocalTransactionId, MemoryMessageStore, MemoryPersistenceAdapter, Message,
//!     MessageId, MessageStore, Result, TransactionCoordinator, TransactionId,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let adapter = Arc::new(MemoryPersistenceAdapter::new());
//!     let coordinator = Arc::new(TransactionCoordinator::new(adapter));
//!
//!     let orders = Arc::new(MemoryMessageStore::new(Destination::new("orders")));
//!     let store = coordinator.wrap(orders.clone());
//!
//!     let txid = TransactionId::Local(LocalTransactionId::new("conn-1", 1));
//!     let message = Message::new(
//!         MessageId::new("m-1"),
//!         Destination::new("orders"),
//!         Bytes::from_static(b"payload"),
//!     )
//!     .in_transaction(txid.clone());
//!
//!     // Buffered, not yet visible in the underlying store.
//!     store.add_message(None, &message)?;
//!     assert_eq!(orders.message_count(), 0);
//!
//!     // Replayed atomically on commit.
//!     coordinator.commit(&txid, false, None, None)?;
//!     assert_eq!(orders.message_count(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`transaction`]: buffers, registry, coordinator and store decorators
//! - [`store`]: capability traits for the external collaborators, plus
//!   in-memory implementations
//! - [`message`]: message, acknowledgment and transaction identity types
//! - [`error`]: error types and the [`Result`] alias

pub mod error;
pub mod message;
pub mod store;
pub mod transaction;

pub use error::{Result, StoreError};
pub use message::{
    Destination, LocalTransactionId, Message, MessageAck, MessageId, TransactionId,
    XaTransactionId,
};
pub use store::{
    JournalEntry, MemoryMessageStore, MemoryPersistenceAdapter, MemoryTopicStore, MessageStore,
    PersistenceAdapter, TopicMessageStore, TxContext, WriteCompletion,
};
pub use transaction::{
    CommitHook, CoordinatorConfig, TransactionBuffer, TransactionCoordinator,
    TransactionRecoveryListener, TransactionalMessageStore, TransactionalTopicStore,
};
