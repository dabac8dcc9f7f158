//! Deferred store mutations buffered under a transaction
//!
//! Commands are explicit value types carrying the payload and a handle to
//! the destination store, so a buffered operation can be replayed later
//! without re-deriving any call-site state. The coordinator runs each
//! command exactly once during a successful commit and never on rollback.

use crate::error::Result;
use crate::message::{Message, MessageAck, MessageId};
use crate::store::{MessageStore, TopicMessageStore, TxContext};
use std::sync::Arc;

/// A deferred "add message to destination" operation
pub struct AddCommand {
    store: Arc<dyn MessageStore>,
    message: Message,
}

impl AddCommand {
    pub fn new(store: Arc<dyn MessageStore>, message: Message) -> Self {
        Self { store, message }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Execute the add against the destination store inside `ctx`
    pub fn run(&self, ctx: &TxContext) -> Result<()> {
        self.store.add_message(Some(ctx), &self.message)
    }
}

impl std::fmt::Debug for AddCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddCommand")
            .field("message_id", &self.message.id)
            .field("destination", &self.message.destination)
            .finish()
    }
}

/// A deferred "remove/acknowledge message" operation
///
/// The subscription variant keeps the client id and subscription name so
/// replay can reconstruct the exact acknowledgment call.
pub enum RemoveCommand {
    Remove {
        store: Arc<dyn MessageStore>,
        ack: MessageAck,
    },
    Acknowledge {
        store: Arc<dyn TopicMessageStore>,
        client_id: String,
        subscription_name: String,
        message_id: MessageId,
        ack: MessageAck,
    },
}

impl RemoveCommand {
    pub fn remove(store: Arc<dyn MessageStore>, ack: MessageAck) -> Self {
        RemoveCommand::Remove { store, ack }
    }

    pub fn acknowledge(
        store: Arc<dyn TopicMessageStore>,
        client_id: impl Into<String>,
        subscription_name: impl Into<String>,
        message_id: MessageId,
        ack: MessageAck,
    ) -> Self {
        RemoveCommand::Acknowledge {
            store,
            client_id: client_id.into(),
            subscription_name: subscription_name.into(),
            message_id,
            ack,
        }
    }

    pub fn ack(&self) -> &MessageAck {
        match self {
            RemoveCommand::Remove { ack, .. } => ack,
            RemoveCommand::Acknowledge { ack, .. } => ack,
        }
    }

    /// Execute the remove against the destination store inside `ctx`
    pub fn run(&self, ctx: &TxContext) -> Result<()> {
        match self {
            RemoveCommand::Remove { store, ack } => store.remove_message(Some(ctx), ack),
            RemoveCommand::Acknowledge {
                store,
                client_id,
                subscription_name,
                message_id,
                ack,
            } => store.acknowledge(Some(ctx), client_id, subscription_name, message_id, ack),
        }
    }
}

impl std::fmt::Debug for RemoveCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoveCommand::Remove { ack, .. } => f
                .debug_struct("RemoveCommand::Remove")
                .field("message_id", &ack.message_id)
                .finish(),
            RemoveCommand::Acknowledge {
                client_id,
                subscription_name,
                message_id,
                ..
            } => f
                .debug_struct("RemoveCommand::Acknowledge")
                .field("client_id", client_id)
                .field("subscription_name", subscription_name)
                .field("message_id", message_id)
                .finish(),
        }
    }
}
