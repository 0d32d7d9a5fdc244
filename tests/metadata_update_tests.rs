//! Integration tests for metadata snapshot ingestion.
//!
//! These tests drive the full metadata path: state transitions, partition
//! table resizing, leader delegation, desired-partition adoption and the
//! async leader-query trigger.

use std::sync::Arc;

use gregor::prelude::*;

fn producer() -> Client {
    Client::new(ClientRole::Producer, ClientConfig::default()).expect("client")
}

fn consumer() -> Client {
    Client::new(ClientRole::Consumer, ClientConfig::default()).expect("client")
}

fn leaders(topic: &Arc<Topic>) -> Vec<Option<i32>> {
    (0..topic.partition_cnt() as i32)
        .map(|i| {
            topic
                .partition(PartitionId::new(i))
                .and_then(|p| p.leader())
                .map(|b| b.node_id().value())
        })
        .collect()
}

// ============================================================================
// State machine and partition table
// ============================================================================

#[test]
fn test_metadata_builds_partition_table() {
    let client = producer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    client.broker_add(BrokerId::new(2), "b2", 9092);
    let topic = client.topic_new("orders", None).unwrap();
    assert!(topic.state().is_unknown());

    let mdt = TopicMetadata::new("orders")
        .partition(0, 1)
        .partition(1, 1)
        .partition(2, 2);
    let upd = client.apply_metadata(&b1, &mdt);
    assert!(upd.unwrap() > 0);

    assert!(topic.state().is_exists());
    assert_eq!(topic.partition_cnt(), 3);
    assert_eq!(leaders(&topic), vec![Some(1), Some(1), Some(2)]);

    // Invariant: partitions[i].id == i.
    for i in 0..3 {
        let p = topic.partition(PartitionId::new(i)).unwrap();
        assert_eq!(p.id(), PartitionId::new(i));
    }
}

#[test]
fn test_same_snapshot_twice_is_idempotent() {
    let client = producer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();

    let mdt = TopicMetadata::new("orders").partition(0, 1).partition(1, 1);
    assert!(client.apply_metadata(&b1, &mdt).unwrap() > 0);
    let ts_first = topic.ts_metadata();

    // Second application observes no changes but still advances the
    // metadata timestamp.
    assert_eq!(client.apply_metadata(&b1, &mdt), Some(0));
    assert!(topic.ts_metadata() >= ts_first);
    assert!(topic.state().is_exists());
    assert_eq!(leaders(&topic), vec![Some(1), Some(1)]);
}

#[test]
fn test_unknown_local_topic_is_ignored() {
    let client = producer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let mdt = TopicMetadata::new("never-asked-for").partition(0, 1);
    assert_eq!(client.apply_metadata(&b1, &mdt), None);
    assert_eq!(client.topic_cnt(), 0);
}

#[test]
fn test_blacklisted_topic_is_ignored() {
    let config = ClientConfig {
        topic_blacklist: vec!["__*".into()],
        ..Default::default()
    };
    let client = Client::new(ClientRole::Producer, config).unwrap();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("__consumer_offsets", None).unwrap();

    let mdt = TopicMetadata::new("__consumer_offsets").partition(0, 1);
    assert_eq!(client.apply_metadata(&b1, &mdt), None);
    assert!(topic.state().is_unknown());
    assert_eq!(topic.partition_cnt(), 0);
}

#[test]
fn test_topic_vanishes() {
    // Scenario: a topic in state Exists receives UnknownTopicOrPartition.
    let client = producer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();
    let mut reports = client.take_delivery_reports().unwrap();

    let mdt = TopicMetadata::new("orders").partition(0, 1).partition(1, 1);
    client.apply_metadata(&b1, &mdt);
    assert!(topic.state().is_exists());

    // Queue messages on the live partitions.
    topic
        .enqueue(&client, Message::new("m0").partition(PartitionId::new(0)))
        .unwrap();
    topic
        .enqueue(&client, Message::new("m1").partition(PartitionId::new(1)))
        .unwrap();

    let gone = TopicMetadata::new("orders").error(KafkaCode::UnknownTopicOrPartition);
    client.apply_metadata(&b1, &gone);

    assert!(topic.state().is_not_exists());
    assert_eq!(topic.partition_cnt(), 0);

    // Producer messages are failed with UnknownTopic.
    let mut codes = Vec::new();
    while let Ok(dr) = reports.try_recv() {
        codes.push(dr.code);
    }
    assert_eq!(codes, vec![KafkaCode::UnknownTopic, KafkaCode::UnknownTopic]);
}

#[test]
fn test_vanished_topic_notifies_consumer_subscriptions() {
    let client = consumer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();

    let mdt = TopicMetadata::new("orders").partition(0, 1).partition(1, 1);
    client.apply_metadata(&b1, &mdt);
    let desired = topic.desired_add(&client, PartitionId::new(0)).unwrap();

    let gone = TopicMetadata::new("orders").error(KafkaCode::UnknownTopicOrPartition);
    client.apply_metadata(&b1, &gone);

    assert!(topic.state().is_not_exists());
    // The desired partition was parked back on the desired list and told
    // the topic no longer exists.
    assert!(desired.is_unknown());
    let errors = desired.take_errors();
    assert!(errors.contains(&KafkaCode::UnknownTopic));
}

#[test]
fn test_transient_leader_error() {
    // Scenario: LeaderNotAvailable with an empty snapshot is ignored;
    // with partitions listed it blanks the leaders but keeps the state.
    let client = producer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();

    let mdt = TopicMetadata::new("orders").partition(0, 1).partition(1, 1);
    client.apply_metadata(&b1, &mdt);
    assert_eq!(leaders(&topic), vec![Some(1), Some(1)]);

    let empty = TopicMetadata::new("orders").error(KafkaCode::LeaderNotAvailable);
    assert_eq!(client.apply_metadata(&b1, &empty), None);
    assert!(topic.state().is_exists());
    assert_eq!(leaders(&topic), vec![Some(1), Some(1)]);

    let blackout = TopicMetadata::new("orders")
        .error(KafkaCode::LeaderNotAvailable)
        .partition(0, -1)
        .partition(1, -1);
    assert_eq!(client.apply_metadata(&b1, &blackout), Some(0));
    assert!(topic.state().is_exists());
    assert_eq!(leaders(&topic), vec![None, None]);
}

#[test]
fn test_lost_leader_triggers_leader_query() {
    let client = producer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();
    let mut queries = client.take_leader_queries().unwrap();

    let mdt = TopicMetadata::new("orders").partition(0, 1);
    client.apply_metadata(&b1, &mdt);
    while queries.try_recv().is_ok() {}

    let lost = TopicMetadata::new("orders").partition(0, -1);
    client.apply_metadata(&b1, &lost);
    assert_eq!(leaders(&topic), vec![None]);
    assert_eq!(queries.try_recv().unwrap().as_ref(), "orders");
}

#[test]
fn test_leader_migration_between_brokers() {
    let client = producer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    client.broker_add(BrokerId::new(2), "b2", 9092);
    let topic = client.topic_new("orders", None).unwrap();

    client.apply_metadata(&b1, &TopicMetadata::new("orders").partition(0, 1));
    assert_eq!(leaders(&topic), vec![Some(1)]);

    let upd = client.apply_metadata(&b1, &TopicMetadata::new("orders").partition(0, 2));
    assert_eq!(upd, Some(1));
    assert_eq!(leaders(&topic), vec![Some(2)]);
}

#[test]
fn test_metadata_leader_for_unregistered_broker() {
    // A leader id the client has no broker object for leaves the
    // partition leaderless and triggers a query.
    let client = producer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();
    let mut queries = client.take_leader_queries().unwrap();
    while queries.try_recv().is_ok() {}

    client.apply_metadata(&b1, &TopicMetadata::new("orders").partition(0, 7));
    assert_eq!(leaders(&topic), vec![None]);
}

#[test]
fn test_ts_metadata_is_monotonic() {
    let client = producer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();
    assert_eq!(topic.ts_metadata(), 0);

    let mut last = 0;
    for parts in [1, 3, 2, 2, 0] {
        let mut mdt = TopicMetadata::new("orders");
        for i in 0..parts {
            mdt = mdt.partition(i, 1);
        }
        if parts == 0 {
            mdt = mdt.error(KafkaCode::UnknownTopicOrPartition);
        }
        client.apply_metadata(&b1, &mdt);
        assert!(topic.ts_metadata() >= last);
        last = topic.ts_metadata();
    }
    assert!(last > 0);
}

#[test]
fn test_partition_ids_stay_dense_across_resizes() {
    let client = producer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();

    for parts in [3, 1, 5, 2, 4] {
        let mut mdt = TopicMetadata::new("orders");
        for i in 0..parts {
            mdt = mdt.partition(i, 1);
        }
        client.apply_metadata(&b1, &mdt);
        assert_eq!(topic.partition_cnt(), parts as usize);
        for i in 0..parts {
            assert_eq!(
                topic.partition(PartitionId::new(i)).unwrap().id(),
                PartitionId::new(i)
            );
        }
    }
}

// ============================================================================
// Desired partitions
// ============================================================================

#[test]
fn test_desired_partition_reappears() {
    // Scenario: a consumer desires partition 4 while only 2 exist; when
    // metadata grows the table the same handle moves into the table.
    let client = consumer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();

    client.apply_metadata(&b1, &TopicMetadata::new("orders").partition(0, 1).partition(1, 1));

    let desired = topic.desired_add(&client, PartitionId::new(4)).unwrap();
    assert!(desired.is_desired());
    assert!(desired.is_unknown());
    assert_eq!(topic.desired_partitions().len(), 1);

    let grown = TopicMetadata::new("orders")
        .partition(0, 1)
        .partition(1, 1)
        .partition(2, 1)
        .partition(3, 1)
        .partition(4, 1);
    client.apply_metadata(&b1, &grown);

    assert_eq!(topic.partition_cnt(), 5);
    let in_table = topic.partition(PartitionId::new(4)).unwrap();
    // Same handle, no duplicate created.
    assert!(Arc::ptr_eq(&desired, &in_table));
    assert!(!in_table.is_unknown());
    assert!(in_table.is_desired());
    assert!(topic.desired_partitions().is_empty());
}

#[test]
fn test_desired_partition_survives_shrink() {
    let client = consumer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();

    client.apply_metadata(
        &b1,
        &TopicMetadata::new("orders")
            .partition(0, 1)
            .partition(1, 1)
            .partition(2, 1),
    );
    let desired = topic.desired_add(&client, PartitionId::new(2)).unwrap();
    assert!(!desired.is_unknown());

    client.apply_metadata(&b1, &TopicMetadata::new("orders").partition(0, 1));

    assert_eq!(topic.partition_cnt(), 1);
    // The desired handle moved back on the desired list, flagged unknown.
    assert!(desired.is_unknown());
    assert!(topic
        .desired_partitions()
        .iter()
        .any(|p| Arc::ptr_eq(p, &desired)));
    assert!(desired.take_errors().contains(&KafkaCode::UnknownPartition));
}

#[test]
fn test_desired_remove_unsubscribes() {
    let client = consumer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();

    // Remove a subscription that only lives on the desired list.
    let absent = topic.desired_add(&client, PartitionId::new(3)).unwrap();
    topic.desired_remove(PartitionId::new(3));
    assert!(!absent.is_desired());
    assert!(topic.desired_partitions().is_empty());

    // Remove one that sits in the table.
    client.apply_metadata(&b1, &TopicMetadata::new("orders").partition(0, 1));
    let present = topic.desired_add(&client, PartitionId::new(0)).unwrap();
    assert!(present.is_desired());
    topic.desired_remove(PartitionId::new(0));
    assert!(!present.is_desired());
}

// ============================================================================
// metadata_none and termination
// ============================================================================

#[test]
fn test_metadata_none_marks_topic_absent() {
    let client = producer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();

    client.apply_metadata(&b1, &TopicMetadata::new("orders").partition(0, 1));
    assert!(topic.state().is_exists());
    let ts = topic.ts_metadata();

    client.metadata_none(&topic);
    assert!(topic.state().is_not_exists());
    assert_eq!(topic.partition_cnt(), 0);
    assert!(topic.ts_metadata() >= ts);
}

#[test]
fn test_terminating_client_ignores_metadata() {
    let client = producer();
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();

    client.terminate();
    assert!(client.is_terminating());

    let mdt = TopicMetadata::new("orders").partition(0, 1);
    assert_eq!(client.apply_metadata(&b1, &mdt), None);
    assert!(topic.state().is_unknown());
    assert_eq!(topic.partition_cnt(), 0);
}

#[test]
fn test_terminate_drains_pending_messages() {
    let client = producer();
    let topic = client.topic_new("orders", None).unwrap();
    let mut reports = client.take_delivery_reports().unwrap();

    topic.enqueue(&client, Message::new("pending")).unwrap();
    client.terminate();

    let dr = reports.try_recv().expect("delivery report expected");
    assert_eq!(dr.code, KafkaCode::UnknownPartition);
    assert_eq!(dr.topic.as_ref(), "orders");
}
