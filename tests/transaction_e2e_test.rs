//! End-to-end tests for the transactional store layer
//!
//! These drive the public API the way a broker session layer would: stores
//! wrapped by the coordinator, operations enlisted under transaction ids,
//! then prepare/commit/rollback/recover against the in-memory adapter.

use bytes::Bytes;
use persistq::{
    CoordinatorConfig, Destination, JournalEntry, LocalTransactionId, MemoryMessageStore,
    MemoryPersistenceAdapter, MemoryTopicStore, Message, MessageAck, MessageId, MessageStore,
    Result, TopicMessageStore, TransactionCoordinator, TransactionId, TransactionRecoveryListener,
    XaTransactionId,
};
use std::sync::Arc;

fn local_txid(n: u64) -> TransactionId {
    TransactionId::Local(LocalTransactionId::new("conn-1", n))
}

fn xa_txid(n: u8) -> TransactionId {
    TransactionId::Xa(XaTransactionId::new(0x51, vec![0xaa, n], vec![0x01]))
}

fn message(id: &str, destination: &str) -> Message {
    Message::new(
        MessageId::new(id),
        Destination::new(destination),
        Bytes::from_static(b"payload"),
    )
}

fn ack(id: &str, destination: &str) -> MessageAck {
    MessageAck::new(MessageId::new(id), Destination::new(destination))
}

struct Broker {
    coordinator: Arc<TransactionCoordinator>,
    adapter: Arc<MemoryPersistenceAdapter>,
}

impl Broker {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let adapter = Arc::new(MemoryPersistenceAdapter::new());
        let coordinator = Arc::new(TransactionCoordinator::new(adapter.clone()));
        Self {
            coordinator,
            adapter,
        }
    }
}

#[derive(Default)]
struct RecordingListener {
    reported: Vec<(TransactionId, Vec<MessageId>, Vec<MessageId>)>,
}

impl TransactionRecoveryListener for RecordingListener {
    fn recover(
        &mut self,
        txid: &TransactionId,
        messages: &[Message],
        acks: &[MessageAck],
    ) -> Result<()> {
        self.reported.push((
            txid.clone(),
            messages.iter().map(|m| m.id.clone()).collect(),
            acks.iter().map(|a| a.message_id.clone()).collect(),
        ));
        Ok(())
    }
}

#[test]
fn test_commit_replays_adds_then_removes_in_one_adapter_transaction() {
    let broker = Broker::new();
    let orders = Arc::new(MemoryMessageStore::new(Destination::new("orders")));
    let store = broker.coordinator.wrap(orders.clone());

    let txid = local_txid(1);
    store
        .add_message(None, &message("m-1", "orders").in_transaction(txid.clone()))
        .unwrap();
    store
        .add_message(None, &message("m-2", "orders").in_transaction(txid.clone()))
        .unwrap();
    store
        .remove_message(None, &ack("m-0", "orders").in_transaction(txid.clone()))
        .unwrap();

    // Nothing reaches the store before commit.
    assert!(orders.journal().is_empty());

    broker.coordinator.commit(&txid, false, None, None).unwrap();

    let committed = broker.adapter.committed();
    assert_eq!(committed.len(), 1);
    let ctx = committed[0];
    assert_eq!(
        orders.journal(),
        vec![
            JournalEntry::Add {
                ctx: Some(ctx),
                message_id: MessageId::new("m-1"),
            },
            JournalEntry::Add {
                ctx: Some(ctx),
                message_id: MessageId::new("m-2"),
            },
            JournalEntry::Remove {
                ctx: Some(ctx),
                message_id: MessageId::new("m-0"),
            },
        ]
    );
}

#[test]
fn test_prepared_commit_matches_one_phase_commit() {
    let run = |two_phase: bool| -> Vec<JournalEntry> {
        let broker = Broker::new();
        let orders = Arc::new(MemoryMessageStore::new(Destination::new("orders")));
        let store = broker.coordinator.wrap(orders.clone());

        let txid = xa_txid(1);
        store
            .add_message(None, &message("m-1", "orders").in_transaction(txid.clone()))
            .unwrap();
        store
            .remove_message(None, &ack("m-0", "orders").in_transaction(txid.clone()))
            .unwrap();

        if two_phase {
            broker.coordinator.prepare(&txid);
        }
        broker
            .coordinator
            .commit(&txid, two_phase, None, None)
            .unwrap();
        orders.journal()
    };

    let one_phase = run(false);
    let two_phase = run(true);
    // Same mutations in the same order; only context ids differ.
    let ids = |journal: &[JournalEntry]| -> Vec<MessageId> {
        journal
            .iter()
            .map(|entry| match entry {
                JournalEntry::Add { message_id, .. } => message_id.clone(),
                JournalEntry::Remove { message_id, .. } => message_id.clone(),
                JournalEntry::Acknowledge { message_id, .. } => message_id.clone(),
            })
            .collect()
    };
    assert_eq!(ids(&one_phase), ids(&two_phase));
}

#[test]
fn test_transaction_spanning_multiple_destinations() {
    let broker = Broker::new();
    let orders = Arc::new(MemoryMessageStore::new(Destination::new("orders")));
    let audit = Arc::new(MemoryMessageStore::new(Destination::new("audit")));
    let orders_store = broker.coordinator.wrap(orders.clone());
    let audit_store = broker.coordinator.wrap(audit.clone());

    let txid = xa_txid(2);
    orders_store
        .add_message(None, &message("m-1", "orders").in_transaction(txid.clone()))
        .unwrap();
    audit_store
        .add_message(None, &message("m-2", "audit").in_transaction(txid.clone()))
        .unwrap();

    broker.coordinator.commit(&txid, false, None, None).unwrap();

    assert!(orders.contains(&MessageId::new("m-1")));
    assert!(audit.contains(&MessageId::new("m-2")));
    // Both destinations were replayed under the same adapter transaction.
    assert_eq!(broker.adapter.committed().len(), 1);
}

#[test]
fn test_rollback_then_commit_is_a_noop() {
    let broker = Broker::new();
    let orders = Arc::new(MemoryMessageStore::new(Destination::new("orders")));
    let store = broker.coordinator.wrap(orders.clone());

    let txid = local_txid(1);
    store
        .add_message(None, &message("m-1", "orders").in_transaction(txid.clone()))
        .unwrap();

    broker.coordinator.rollback(&txid);
    broker.coordinator.commit(&txid, false, None, None).unwrap();

    assert_eq!(orders.message_count(), 0);
    assert_eq!(broker.adapter.committed().len(), 0);
}

#[test]
fn test_recovery_reports_prepared_xa_work_and_discards_in_flight() {
    let broker = Broker::new();
    let orders = Arc::new(MemoryMessageStore::new(Destination::new("orders")));
    let store = broker.coordinator.wrap(orders.clone());

    let prepared = xa_txid(1);
    let in_flight = xa_txid(2);

    store
        .add_message(None, &message("m-1", "orders").in_transaction(prepared.clone()))
        .unwrap();
    store
        .add_message(None, &message("m-2", "orders").in_transaction(prepared.clone()))
        .unwrap();
    store
        .remove_message(None, &ack("m-0", "orders").in_transaction(prepared.clone()))
        .unwrap();
    broker.coordinator.prepare(&prepared);

    store
        .add_message(None, &message("m-9", "orders").in_transaction(in_flight.clone()))
        .unwrap();

    let mut listener = RecordingListener::default();
    broker.coordinator.recover(&mut listener).unwrap();

    assert_eq!(listener.reported.len(), 1);
    let (txid, messages, acks) = &listener.reported[0];
    assert_eq!(txid, &prepared);
    assert_eq!(messages, &vec![MessageId::new("m-1"), MessageId::new("m-2")]);
    assert_eq!(acks, &vec![MessageId::new("m-0")]);

    // The in-flight transaction is gone and never reported; a second
    // recovery pass still sees the prepared one.
    let mut listener = RecordingListener::default();
    broker.coordinator.recover(&mut listener).unwrap();
    assert_eq!(listener.reported.len(), 1);

    // The broker finally commits the recovered transaction.
    broker
        .coordinator
        .commit(&prepared, true, None, None)
        .unwrap();
    assert!(orders.contains(&MessageId::new("m-1")));
    assert!(orders.contains(&MessageId::new("m-2")));
}

struct ReentrantListener {
    store: Arc<persistq::TransactionalMessageStore>,
    replayed: usize,
}

impl TransactionRecoveryListener for ReentrantListener {
    fn recover(
        &mut self,
        _txid: &TransactionId,
        messages: &[Message],
        _acks: &[MessageAck],
    ) -> Result<()> {
        // A framework-level listener may push the reported work back
        // through the decorated store; recovery mode must swallow it.
        for msg in messages {
            self.store.add_message(None, msg)?;
            self.replayed += 1;
        }
        Ok(())
    }
}

#[test]
fn test_recovery_mode_suppresses_reentrant_buffering() {
    let broker = Broker::new();
    let orders = Arc::new(MemoryMessageStore::new(Destination::new("orders")));
    let store = Arc::new(broker.coordinator.wrap(orders.clone()));

    let txid = xa_txid(3);
    store
        .add_message(None, &message("m-1", "orders").in_transaction(txid.clone()))
        .unwrap();
    broker.coordinator.prepare(&txid);

    let mut listener = ReentrantListener {
        store: store.clone(),
        replayed: 0,
    };
    broker.coordinator.recover(&mut listener).unwrap();

    assert_eq!(listener.replayed, 1);
    // The re-entrant adds were dropped: no store I/O, no new buffers.
    assert_eq!(orders.message_count(), 0);
    assert_eq!(broker.coordinator.in_flight_count(), 0);
    assert_eq!(broker.coordinator.prepared_count(), 1);
    assert!(!broker.coordinator.is_recovering());
}

#[test]
fn test_topic_subscription_ack_survives_the_buffer() {
    let broker = Broker::new();
    let prices = Arc::new(MemoryTopicStore::new(Destination::new("prices")));
    let store = broker.coordinator.wrap_topic(prices.clone());

    let txid = local_txid(5);
    store
        .add_message(None, &message("m-1", "prices").in_transaction(txid.clone()))
        .unwrap();
    let sub_ack = ack("m-1", "prices").in_transaction(txid.clone());
    store
        .acknowledge(None, "client-a", "durable-sub", &MessageId::new("m-1"), &sub_ack)
        .unwrap();

    assert_eq!(prices.message_count(), 0);
    assert!(prices.acked_for("client-a", "durable-sub").is_empty());

    broker.coordinator.commit(&txid, false, None, None).unwrap();

    // The add replayed before the acknowledge, with the exact original
    // client id and subscription name.
    assert!(prices.contains(&MessageId::new("m-1")));
    assert_eq!(
        prices.acked_for("client-a", "durable-sub"),
        vec![MessageId::new("m-1")]
    );
}

#[test]
fn test_stop_clears_all_transaction_state() {
    let adapter = Arc::new(MemoryPersistenceAdapter::new());
    let coordinator = Arc::new(TransactionCoordinator::with_config(
        adapter,
        CoordinatorConfig::default(),
    ));
    let orders = Arc::new(MemoryMessageStore::new(Destination::new("orders")));
    let store = coordinator.wrap(orders.clone());

    coordinator.start().unwrap();
    store
        .add_message(None, &message("m-1", "orders").in_transaction(local_txid(1)))
        .unwrap();
    store
        .add_message(None, &message("m-2", "orders").in_transaction(xa_txid(1)))
        .unwrap();
    coordinator.prepare(&xa_txid(1));

    coordinator.stop().unwrap();
    assert_eq!(coordinator.in_flight_count(), 0);
    assert_eq!(coordinator.prepared_count(), 0);
}

#[test]
fn test_concurrent_enlistment_into_one_transaction() {
    let broker = Broker::new();
    let orders = Arc::new(MemoryMessageStore::new(Destination::new("orders")));
    let store = Arc::new(broker.coordinator.wrap(orders.clone()));

    let txid = xa_txid(7);
    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        let txid = txid.clone();
        handles.push(std::thread::spawn(move || {
            let msg = message(&format!("m-{}", i), "orders").in_transaction(txid);
            store.add_message(None, &msg).unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(broker.coordinator.in_flight_count(), 1);
    broker.coordinator.commit(&txid, false, None, None).unwrap();
    assert_eq!(orders.message_count(), 8);
    assert_eq!(broker.adapter.committed().len(), 1);
}
