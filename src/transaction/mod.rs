//! Transactional semantics over non-transactional message stores
//!
//! This module is the coordination engine of the persistence tier. It
//! provides:
//!
//! - per-transaction buffering of pending adds and removes
//! - the prepare/commit/rollback state machine, including the two-phase
//!   (XA) path
//! - decorators that intercept store operations and route them through the
//!   buffer
//! - the crash-recovery protocol that replays prepared-but-uncommitted
//!   transactions to an external listener
//!
//! Nothing here persists anything itself; durability belongs to the
//! [`PersistenceAdapter`](crate::store::PersistenceAdapter) and the
//! underlying stores.

mod buffer;
mod command;
mod coordinator;
mod decorator;
mod registry;

pub use buffer::TransactionBuffer;
pub use command::{AddCommand, RemoveCommand};
pub use coordinator::{
    CommitHook, CoordinatorConfig, TransactionCoordinator, TransactionRecoveryListener,
};
pub use decorator::{TransactionalMessageStore, TransactionalTopicStore};
pub use registry::TransactionRegistry;
