//! Transactional decorators over plain message stores
//!
//! A decorator presents the same capability surface as the store it wraps,
//! so the layers above never see the difference; every add/remove call is
//! routed through the coordinator, which decides whether to buffer it,
//! drop it (recovery mode) or delegate it straight through.

use crate::error::Result;
use crate::message::{Message, MessageAck, MessageId};
use crate::store::{MessageStore, TopicMessageStore, TxContext, WriteCompletion};
use crate::transaction::coordinator::TransactionCoordinator;
use std::sync::Arc;

/// Transaction-aware decorator for a point-to-point store
pub struct TransactionalMessageStore {
    delegate: Arc<dyn MessageStore>,
    coordinator: Arc<TransactionCoordinator>,
}

impl TransactionalMessageStore {
    pub(crate) fn new(
        delegate: Arc<dyn MessageStore>,
        coordinator: Arc<TransactionCoordinator>,
    ) -> Self {
        Self {
            delegate,
            coordinator,
        }
    }

    /// The undecorated store underneath
    pub fn delegate(&self) -> &Arc<dyn MessageStore> {
        &self.delegate
    }

    /// Add variant carrying an optimization hint; routed identically, the
    /// hint only matters to non-transactional store implementations
    pub fn add_message_hint(
        &self,
        ctx: Option<&TxContext>,
        message: &Message,
        _can_optimize: bool,
    ) -> Result<()> {
        self.add_message(ctx, message)
    }

    /// Asynchronous-surface variant of [`MessageStore::add_message`]
    ///
    /// Buffering is synchronous and in-memory, so the returned token is
    /// already resolved.
    pub fn add_message_async(&self, ctx: Option<&TxContext>, message: &Message) -> WriteCompletion {
        WriteCompletion::from_result(self.add_message(ctx, message))
    }

    /// Asynchronous-surface variant of [`MessageStore::remove_message`]
    pub fn remove_message_async(&self, ctx: Option<&TxContext>, ack: &MessageAck) -> WriteCompletion {
        WriteCompletion::from_result(self.remove_message(ctx, ack))
    }
}

impl MessageStore for TransactionalMessageStore {
    fn add_message(&self, _ctx: Option<&TxContext>, message: &Message) -> Result<()> {
        self.coordinator.add_message(&self.delegate, message)
    }

    fn remove_message(&self, _ctx: Option<&TxContext>, ack: &MessageAck) -> Result<()> {
        self.coordinator.remove_message(&self.delegate, ack)
    }
}

/// Transaction-aware decorator for a publish/subscribe store
///
/// Holds the delegate under both capability views so buffered adds and
/// buffered acknowledgments each capture the store surface they replay
/// against.
pub struct TransactionalTopicStore {
    delegate: Arc<dyn TopicMessageStore>,
    delegate_plain: Arc<dyn MessageStore>,
    coordinator: Arc<TransactionCoordinator>,
}

impl TransactionalTopicStore {
    pub(crate) fn new(
        delegate: Arc<dyn TopicMessageStore>,
        delegate_plain: Arc<dyn MessageStore>,
        coordinator: Arc<TransactionCoordinator>,
    ) -> Self {
        Self {
            delegate,
            delegate_plain,
            coordinator,
        }
    }

    /// The undecorated store underneath
    pub fn delegate(&self) -> &Arc<dyn TopicMessageStore> {
        &self.delegate
    }

    /// See [`TransactionalMessageStore::add_message_hint`]
    pub fn add_message_hint(
        &self,
        ctx: Option<&TxContext>,
        message: &Message,
        _can_optimize: bool,
    ) -> Result<()> {
        self.add_message(ctx, message)
    }

    /// See [`TransactionalMessageStore::add_message_async`]
    pub fn add_message_async(&self, ctx: Option<&TxContext>, message: &Message) -> WriteCompletion {
        WriteCompletion::from_result(self.add_message(ctx, message))
    }

    /// See [`TransactionalMessageStore::remove_message_async`]
    pub fn remove_message_async(&self, ctx: Option<&TxContext>, ack: &MessageAck) -> WriteCompletion {
        WriteCompletion::from_result(self.remove_message(ctx, ack))
    }
}

impl MessageStore for TransactionalTopicStore {
    fn add_message(&self, _ctx: Option<&TxContext>, message: &Message) -> Result<()> {
        self.coordinator.add_message(&self.delegate_plain, message)
    }

    fn remove_message(&self, _ctx: Option<&TxContext>, ack: &MessageAck) -> Result<()> {
        self.coordinator.remove_message(&self.delegate_plain, ack)
    }
}

impl TopicMessageStore for TransactionalTopicStore {
    fn acknowledge(
        &self,
        _ctx: Option<&TxContext>,
        client_id: &str,
        subscription_name: &str,
        message_id: &MessageId,
        ack: &MessageAck,
    ) -> Result<()> {
        self.coordinator
            .acknowledge(&self.delegate, client_id, subscription_name, message_id, ack)
    }
}
