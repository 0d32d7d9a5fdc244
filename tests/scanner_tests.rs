//! Integration tests for the periodic topic scanner.
//!
//! These tests verify message timeout sweeps, the stale-metadata
//! transition back to Unknown, and the leader-query trigger for topics the
//! brokers do not know yet.

use gregor::prelude::*;
use gregor::types::now_micros;

const HOUR_US: i64 = 3_600_000_000;

fn producer_with_refresh(refresh_ms: i64) -> Client {
    let config = ClientConfig {
        metadata_refresh_interval_ms: refresh_ms,
        ..Default::default()
    };
    Client::new(ClientRole::Producer, config).expect("client")
}

// ============================================================================
// Stale metadata
// ============================================================================

#[test]
fn test_stale_metadata_marks_topic_unknown() {
    // Scenario: metadata older than three refresh intervals expires.
    let client = producer_with_refresh(1_000);
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();

    client.apply_metadata(
        &b1,
        &TopicMetadata::new("orders").partition(0, 1).partition(1, 1),
    );
    assert!(topic.state().is_exists());

    // Four seconds later the 3 x 1000ms window has passed.
    let timed_out = client.scan_all(topic.ts_metadata() + 4_000_000);
    assert_eq!(timed_out, 0);
    assert!(topic.state().is_unknown());
    // The partition table is untouched.
    assert_eq!(topic.partition_cnt(), 2);
    assert!(topic.partition_available(PartitionId::new(0)));
}

#[test]
fn test_fresh_metadata_is_not_stale() {
    let client = producer_with_refresh(1_000);
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();

    client.apply_metadata(&b1, &TopicMetadata::new("orders").partition(0, 1));
    client.scan_all(topic.ts_metadata() + 1_000_000);
    assert!(topic.state().is_exists());
}

#[test]
fn test_negative_refresh_interval_disables_staleness() {
    let client = producer_with_refresh(-1);
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let topic = client.topic_new("orders", None).unwrap();

    client.apply_metadata(&b1, &TopicMetadata::new("orders").partition(0, 1));
    client.scan_all(topic.ts_metadata() + HOUR_US);
    assert!(topic.state().is_exists());
}

// ============================================================================
// Message timeouts
// ============================================================================

#[test]
fn test_timed_out_ua_messages_are_reported() {
    let client = producer_with_refresh(-1);
    let conf = TopicConfig {
        message_timeout_ms: 1,
        ..Default::default()
    };
    let topic = client.topic_new("orders", Some(conf)).unwrap();
    let mut reports = client.take_delivery_reports().unwrap();

    // No metadata yet: the message parks on the UA partition.
    topic.enqueue(&client, Message::new("late")).unwrap();
    assert_eq!(topic.ua().unwrap().msg_cnt(), 1);

    let timed_out = client.scan_all(now_micros() + HOUR_US);
    assert_eq!(timed_out, 1);
    assert_eq!(topic.ua().unwrap().msg_cnt(), 0);

    let dr = reports.try_recv().expect("delivery report expected");
    assert_eq!(dr.code, KafkaCode::MsgTimedOut);
    assert_eq!(dr.message.payload(), "late");
}

#[test]
fn test_timed_out_partition_queues_are_swept() {
    let client = producer_with_refresh(-1);
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let conf = TopicConfig {
        message_timeout_ms: 1,
        ..Default::default()
    };
    let topic = client.topic_new("orders", Some(conf)).unwrap();
    let mut reports = client.take_delivery_reports().unwrap();

    client.apply_metadata(
        &b1,
        &TopicMetadata::new("orders").partition(0, 1).partition(1, 1),
    );
    topic
        .enqueue(&client, Message::new("app-q").partition(PartitionId::new(0)))
        .unwrap();
    topic
        .enqueue(&client, Message::new("xmit-q").partition(PartitionId::new(1)))
        .unwrap();
    // The broker subsystem picked one up for transmission.
    topic.partition(PartitionId::new(1)).unwrap().move_to_xmit();

    let timed_out = client.scan_all(now_micros() + HOUR_US);
    assert_eq!(timed_out, 2);

    let mut payloads = Vec::new();
    while let Ok(dr) = reports.try_recv() {
        assert_eq!(dr.code, KafkaCode::MsgTimedOut);
        payloads.push(dr.message.payload().clone());
    }
    payloads.sort();
    assert_eq!(payloads, vec!["app-q", "xmit-q"]);
}

#[test]
fn test_unexpired_messages_survive_the_scan() {
    let client = producer_with_refresh(-1);
    let topic = client.topic_new("orders", None).unwrap();

    topic.enqueue(&client, Message::new("fresh")).unwrap();
    let timed_out = client.scan_all(now_micros());
    assert_eq!(timed_out, 0);
    assert_eq!(topic.ua().unwrap().msg_cnt(), 1);
}

#[test]
fn test_scan_sums_across_topics() {
    let client = producer_with_refresh(-1);
    let conf = TopicConfig {
        message_timeout_ms: 1,
        ..Default::default()
    };
    for name in ["alpha", "beta"] {
        let topic = client.topic_new(name, Some(conf.clone())).unwrap();
        topic.enqueue(&client, Message::new("m1")).unwrap();
        topic.enqueue(&client, Message::new("m2")).unwrap();
    }

    let timed_out = client.scan_all(now_micros() + HOUR_US);
    assert_eq!(timed_out, 4);
}

// ============================================================================
// Leader queries for empty topics
// ============================================================================

#[test]
fn test_scan_queries_leader_for_empty_topics() {
    let client = producer_with_refresh(-1);
    let b1 = client.broker_add(BrokerId::new(1), "b1", 9092);
    let mut queries = client.take_leader_queries().unwrap();

    let empty = client.topic_new("empty", None).unwrap();
    let full = client.topic_new("full", None).unwrap();
    client.apply_metadata(&b1, &TopicMetadata::new("full").partition(0, 1));
    while queries.try_recv().is_ok() {}

    client.scan_all(now_micros());

    let queried: Vec<String> = std::iter::from_fn(|| queries.try_recv().ok())
        .map(|n| n.to_string())
        .collect();
    assert_eq!(queried, vec!["empty".to_string()]);
    assert_eq!(empty.partition_cnt(), 0);
    assert_eq!(full.partition_cnt(), 1);
}
