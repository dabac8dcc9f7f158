//! Message, acknowledgment and transaction identity types
//!
//! These are the value types that travel through the transactional store
//! layer. Destination and message identity are opaque to this crate; the
//! broker layers above own their structure.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opaque message identifier assigned by the producer-facing layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque destination identifier (queue or topic name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination(pub String);

impl Destination {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a local, single-phase transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalTransactionId {
    /// Connection that opened the transaction
    pub connection_id: String,
    /// Per-connection transaction counter
    pub value: u64,
}

impl LocalTransactionId {
    pub fn new(connection_id: impl Into<String>, value: u64) -> Self {
        Self {
            connection_id: connection_id.into(),
            value,
        }
    }
}

/// Identifier for a distributed (XA) transaction
///
/// XA ids are meaningful across resource managers and are the only kind
/// reported to the recovery listener after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct XaTransactionId {
    /// Format identifier assigned by the transaction manager
    pub format_id: u32,
    /// Global transaction identifier
    pub global_id: Vec<u8>,
    /// Branch qualifier for this resource manager
    pub branch_qualifier: Vec<u8>,
}

impl XaTransactionId {
    pub fn new(format_id: u32, global_id: Vec<u8>, branch_qualifier: Vec<u8>) -> Self {
        Self {
            format_id,
            global_id,
            branch_qualifier,
        }
    }
}

/// Transaction identifier: local (single-phase) or distributed (two-phase)
///
/// The in-flight registry treats both kinds identically; only the prepared
/// path and recovery distinguish them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionId {
    Local(LocalTransactionId),
    Xa(XaTransactionId),
}

impl TransactionId {
    /// Whether this id names a distributed (XA) transaction
    pub fn is_distributed(&self) -> bool {
        matches!(self, TransactionId::Xa(_))
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionId::Local(id) => write!(f, "TX:{}:{}", id.connection_id, id.value),
            TransactionId::Xa(id) => write!(
                f,
                "XID:{}:{}:{}",
                id.format_id,
                hex(&id.global_id),
                hex(&id.branch_qualifier)
            ),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A message handed to the persistence tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub destination: Destination,
    pub payload: Bytes,
    /// Set when the producing operation runs inside a broker transaction
    pub transaction_id: Option<TransactionId>,
}

impl Message {
    pub fn new(id: MessageId, destination: Destination, payload: Bytes) -> Self {
        Self {
            id,
            destination,
            payload,
            transaction_id: None,
        }
    }

    /// Mark this message as part of a transaction
    pub fn in_transaction(mut self, txid: TransactionId) -> Self {
        self.transaction_id = Some(txid);
        self
    }

    pub fn is_in_transaction(&self) -> bool {
        self.transaction_id.is_some()
    }
}

/// An acknowledgment asking the persistence tier to remove a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAck {
    pub message_id: MessageId,
    pub destination: Destination,
    /// Set when the acknowledging operation runs inside a broker transaction
    pub transaction_id: Option<TransactionId>,
}

impl MessageAck {
    pub fn new(message_id: MessageId, destination: Destination) -> Self {
        Self {
            message_id,
            destination,
            transaction_id: None,
        }
    }

    /// Mark this acknowledgment as part of a transaction
    pub fn in_transaction(mut self, txid: TransactionId) -> Self {
        self.transaction_id = Some(txid);
        self
    }

    pub fn is_in_transaction(&self) -> bool {
        self.transaction_id.is_some()
    }
}
