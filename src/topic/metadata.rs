//! Metadata snapshot ingestion.
//!
//! Broker connections feed per-topic metadata snapshots into
//! [`Client::apply_metadata`]; each application reshapes one topic's state,
//! partition table and leader bindings in a single critical section under
//! the topic write lock. Broker references are resolved under the client
//! read lock *before* the topic lock is taken, preserving the global
//! client → topic → partition lock order.

use std::sync::Arc;

use tracing::debug;

use crate::client::{Broker, Client};
use crate::error::KafkaCode;
use crate::topic::handle::{LeaderUpdate, Topic, TopicState};
use crate::types::{now_micros, BrokerId, PartitionId};

/// Leader assignment for one partition within a metadata snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionMetadata {
    pub id: PartitionId,
    /// Leader node id; [`BrokerId::INVALID`] when the partition has no
    /// leader.
    pub leader: BrokerId,
}

/// Metadata snapshot for one topic, as supplied by a broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMetadata {
    pub topic: String,
    pub err: KafkaCode,
    pub partitions: Vec<PartitionMetadata>,
}

impl TopicMetadata {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            err: KafkaCode::None,
            partitions: Vec::new(),
        }
    }

    pub fn error(mut self, err: KafkaCode) -> Self {
        self.err = err;
        self
    }

    pub fn partition(mut self, id: i32, leader: i32) -> Self {
        self.partitions.push(PartitionMetadata {
            id: PartitionId::new(id),
            leader: BrokerId::new(leader),
        });
        self
    }
}

impl Client {
    /// Apply a per-topic metadata snapshot received from `via`.
    ///
    /// Returns the number of observable changes (partition count and
    /// leader bindings), or `None` when the snapshot was ignored: the
    /// topic is blacklisted, not locally known, the error is transient, or
    /// the client is terminating.
    pub fn apply_metadata(&self, via: &Broker, mdt: &TopicMetadata) -> Option<usize> {
        // Ignore topics in the blacklist.
        if self.config().is_blacklisted(&mdt.topic) {
            debug!(broker = %via, topic = %mdt.topic,
                   "ignoring blacklisted topic in metadata");
            return None;
        }

        // Ignore metadata completely for temporary errors: an empty
        // LeaderNotAvailable snapshot just means the broker is
        // rebalancing.
        if mdt.err == KafkaCode::LeaderNotAvailable && mdt.partitions.is_empty() {
            debug!(broker = %via, topic = %mdt.topic, err = ?mdt.err,
                   "temporary error in metadata reply, ignoring");
            return None;
        }

        // Only topics the application asked about are tracked.
        let topic = self.topic_find(&mdt.topic)?;

        if mdt.err != KafkaCode::None {
            debug!(broker = %via, topic = %mdt.topic, err = ?mdt.err,
                   partition_cnt = mdt.partitions.len(),
                   "error in metadata reply");
        }

        // Look up brokers before acquiring the topic lock to preserve
        // the lock order.
        let mut partbrokers: Vec<Option<Arc<Broker>>> = Vec::with_capacity(mdt.partitions.len());
        {
            let inner = self.inner.read();
            if self.is_terminating() {
                return None;
            }
            for pm in &mdt.partitions {
                if pm.leader == BrokerId::INVALID {
                    partbrokers.push(None);
                } else {
                    partbrokers.push(inner.brokers.get(&pm.leader).cloned());
                }
            }
        }

        let mut upd = 0usize;
        let mut query_leader = false;
        {
            let mut inner = topic.write_inner();
            let old_state = inner.state;
            inner.ts_metadata = now_micros();

            // Set topic state. A confirmed-absent topic keeps no
            // partitions.
            if mdt.err == KafkaCode::UnknownTopicOrPartition || mdt.err == KafkaCode::Unknown {
                // The generic Unknown covers failed topic auto-creation.
                topic.set_state(&mut inner, TopicState::NotExists);
                if topic.partition_cnt_update(self, &mut inner, 0) {
                    upd += 1;
                }
            } else if !mdt.partitions.is_empty() {
                topic.set_state(&mut inner, TopicState::Exists);
            }

            // Update the partition count, but not on (possibly
            // intermittent) errors such as LeaderNotAvailable.
            if mdt.err == KafkaCode::None
                && topic.partition_cnt_update(self, &mut inner, mdt.partitions.len())
            {
                upd += 1;
            }

            // Update the leader for each partition.
            for (pm, broker) in mdt.partitions.iter().zip(partbrokers.drain(..)) {
                debug!(broker = %via, topic = %mdt.topic,
                       partition = %pm.id, leader = %pm.leader,
                       "metadata partition leader");
                match topic.leader_update(&inner, pm.id, broker) {
                    LeaderUpdate::Changed => upd += 1,
                    LeaderUpdate::Unknown => query_leader = true,
                    LeaderUpdate::NoChange => {}
                }
            }

            // A topic-wide (possibly intermittent) error removes all
            // leaders.
            if mdt.err != KafkaCode::None && !inner.partitions.is_empty() {
                for p in &inner.partitions {
                    let mut pinner = p.lock();
                    p.broker_delegate(&mut pinner, None);
                }
            }

            // Try to assign unassigned messages to new partitions, or
            // fail them.
            if upd > 0 || inner.state == TopicState::NotExists {
                topic.assign_uas(self, &mut inner);
            }

            if old_state != inner.state && inner.state == TopicState::NotExists {
                topic.propagate_notexists(self, &inner);
            }
        }

        // Query for the topic leader (async), outside the topic lock.
        if query_leader {
            self.leader_query(&topic.name_arc());
        }

        Some(upd)
    }

    /// The broker answered a metadata request without mentioning `topic`:
    /// the topic is not available in the cluster.
    pub fn metadata_none(&self, topic: &Arc<Topic>) {
        // Don't update metadata while terminating; checked after taking
        // the lock for proper synchronisation.
        let mut inner = topic.write_inner();
        if self.is_terminating() {
            return;
        }

        inner.ts_metadata = now_micros();

        topic.set_state(&mut inner, TopicState::NotExists);

        topic.partition_cnt_update(self, &mut inner, 0);

        // Purge messages with a forced partition.
        topic.assign_uas(self, &mut inner);

        topic.propagate_notexists(self, &inner);
    }
}
