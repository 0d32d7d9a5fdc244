//! # Gregor
//! Topic metadata and partition routing core for Kafka-protocol clients.
//!
//! This crate provides the state kept by a client of a partitioned-log
//! broker between the connection layer below and the producer/consumer
//! paths above: the registry of topic handles, the per-topic partition
//! table, ingestion of metadata snapshots (partition count changes, leader
//! elections, topic disappearance), routing of outbound messages via a
//! pluggable partitioner, and the periodic scan that ages out messages and
//! refreshes stale metadata.
//!
//! # Goals
//! - Consistent partition assignments across asynchronous metadata updates
//!   arriving from many broker connections
//! - Messages survive reconfiguration: a shrinking partition table moves
//!   queued messages back to the unassigned partition for re-routing
//! - A strict client → topic → partition lock order, with no I/O performed
//!   under any lock
//!
//! # Getting started
//!
//! ```rust
//! use gregor::prelude::*;
//!
//! # fn main() -> gregor::error::Result<()> {
//! let client = Client::new(ClientRole::Producer, ClientConfig::default())?;
//! let broker = client.broker_add(BrokerId::new(1), "localhost", 9092);
//!
//! // The application asks for a topic; metadata later shapes it.
//! let topic = client.topic_new("orders", None)?;
//! topic.enqueue(&client, Message::new("payload"))?;
//!
//! // A broker connection reports metadata for the topic.
//! let mdt = TopicMetadata::new("orders").partition(0, 1).partition(1, 1);
//! client.apply_metadata(&broker, &mdt);
//! assert_eq!(topic.partition_cnt(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! The produce/fetch pipelines, broker connection management and the wire
//! codec live in the surrounding library; this crate only consumes their
//! queue-movement and delivery-report hooks.

#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod topic;
pub mod types;

pub mod prelude {
    //! Convenience re-exports of the main types.

    pub use crate::client::{Broker, Client, DeliveryReport};
    pub use crate::config::{ClientConfig, ClientRole, CompressionCodec, TopicConfig};
    pub use crate::error::{Error, KafkaCode};
    pub use crate::topic::{
        Message, Partition, PartitionMetadata, Topic, TopicMetadata, TopicState,
    };
    pub use crate::types::{BrokerId, PartitionId};
}
