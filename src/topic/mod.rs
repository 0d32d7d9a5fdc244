//! Topic handles, partition tables and metadata-driven routing.
//!
//! This module is the core of the crate: the registry of topic handles
//! owned by a client instance, the per-topic state machine, ingestion of
//! metadata snapshots, routing of outbound messages through the pluggable
//! partitioner, and the periodic scan that ages out messages and refreshes
//! stale metadata.

pub mod handle;
pub mod message;
pub mod metadata;
pub mod partition;
pub mod partitioner;
mod registry;

pub use handle::{Topic, TopicState};
pub use message::{Message, MessageQueue};
pub use metadata::{PartitionMetadata, TopicMetadata};
pub use partition::Partition;
pub use partitioner::{consistent_random, Partitioner, PartitionerScope};
