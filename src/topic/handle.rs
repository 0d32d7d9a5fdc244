//! Topic handles and the per-topic state machine.
//!
//! A [`Topic`] owns the dense partition table, the always-present
//! unassigned (UA) partition, and the desired-partition list for consumer
//! subscriptions. All mutable state sits behind one reader-writer lock,
//! taken after the client lock and before any partition lock.
//!
//! The state machine:
//!
//! ```text
//!          create
//! Unknown ────────────────►  (persistent until metadata)
//!   │   metadata error UnknownTopicOrPartition / auto-create failure
//!   ├────────────────────────────────────────► NotExists
//!   │   metadata ok, partition_cnt > 0
//!   └────────────────────────────────────────► Exists
//! NotExists ── metadata ok, partition_cnt > 0 ──► Exists
//! Exists    ── metadata error UnknownTopicOrPartition ──► NotExists
//! Any       ── metadata stale ──► Unknown
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};
use tracing::{debug, info};

use crate::client::Client;
use crate::config::{ClientRole, CompressionCodec, TopicConfig};
use crate::error::{Error, KafkaCode, Result};
use crate::topic::message::{Message, MessageQueue};
use crate::topic::partition::Partition;
use crate::topic::partitioner::{Partitioner, PartitionerScope};
use crate::types::{now_micros, PartitionId};

/// Result of a per-partition leader update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeaderUpdate {
    /// The partition was delegated to a different broker.
    Changed,
    /// The leader is unchanged.
    NoChange,
    /// The partition id is not in the table, or a known leader was lost.
    Unknown,
}

/// Metadata-driven state of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopicState {
    /// No metadata seen yet, or the last metadata has gone stale.
    #[default]
    Unknown,
    /// Metadata confirms the topic with at least one partition.
    Exists,
    /// Metadata confirms the topic is absent from the cluster.
    NotExists,
}

impl TopicState {
    pub fn is_exists(self) -> bool {
        self == TopicState::Exists
    }

    pub fn is_not_exists(self) -> bool {
        self == TopicState::NotExists
    }

    pub fn is_unknown(self) -> bool {
        self == TopicState::Unknown
    }
}

impl fmt::Display for TopicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TopicState::Unknown => "unknown",
            TopicState::Exists => "exists",
            TopicState::NotExists => "notexists",
        })
    }
}

pub(crate) struct TopicInner {
    pub(crate) state: TopicState,
    pub(crate) partitions: Vec<Arc<Partition>>,
    pub(crate) ua: Option<Arc<Partition>>,
    pub(crate) desired: Vec<Arc<Partition>>,
    pub(crate) ts_metadata: i64,
    pub(crate) app_published: bool,
}

/// A topic handle.
///
/// Created on first application request or first referencing metadata and
/// shared via `Arc`; the registry holds one reference, the application
/// another while its handle is published, and every in-flight operation one
/// more.
pub struct Topic {
    name: Arc<str>,
    config: TopicConfig,
    partitioner: Partitioner,
    inner: RwLock<TopicInner>,
}

impl Topic {
    pub(crate) fn new(name: Arc<str>, config: TopicConfig, partitioner: Partitioner) -> Arc<Self> {
        let ua = Partition::new(name.clone(), PartitionId::UA);
        Arc::new(Self {
            name,
            config,
            partitioner,
            inner: RwLock::new(TopicInner {
                state: TopicState::Unknown,
                partitions: Vec::new(),
                ua: Some(ua),
                desired: Vec::new(),
                ts_metadata: 0,
                app_published: false,
            }),
        })
    }

    /// The topic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    /// The configuration the handle was created with, compression codec
    /// and partitioner already resolved.
    pub fn config(&self) -> &TopicConfig {
        &self.config
    }

    /// The opaque application attachment from the topic configuration.
    pub fn opaque(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.config.opaque.clone()
    }

    /// Current metadata-driven state.
    pub fn state(&self) -> TopicState {
        self.inner.read().state
    }

    /// Number of partitions in the table.
    pub fn partition_cnt(&self) -> usize {
        self.inner.read().partitions.len()
    }

    /// Monotonic timestamp (µs) of the last applied metadata, or zero.
    pub fn ts_metadata(&self) -> i64 {
        self.inner.read().ts_metadata
    }

    /// Look up a partition by id. [`PartitionId::UA`] yields the
    /// unassigned partition.
    pub fn partition(&self, id: PartitionId) -> Option<Arc<Partition>> {
        Self::partition_get(&self.inner.read(), id, false)
    }

    /// The unassigned partition, present for the lifetime of the handle.
    pub fn ua(&self) -> Option<Arc<Partition>> {
        self.inner.read().ua.clone()
    }

    /// Snapshot of the desired-but-absent partition list.
    pub fn desired_partitions(&self) -> Vec<Arc<Partition>> {
        self.inner.read().desired.clone()
    }

    /// True iff the partition exists in the table and has a leader.
    pub fn partition_available(&self, id: PartitionId) -> bool {
        let inner = self.inner.read();
        match Self::partition_get(&inner, id, false) {
            Some(p) => p.leader().is_some(),
            None => false,
        }
    }

    pub(crate) fn write_inner(&self) -> RwLockWriteGuard<'_, TopicInner> {
        self.inner.write()
    }

    /// Mark the application handle published; true if it was not already.
    pub(crate) fn publish_app_handle(&self) -> bool {
        let mut inner = self.inner.write();
        let newly = !inner.app_published;
        inner.app_published = true;
        newly
    }

    pub(crate) fn release_app_handle(&self) -> bool {
        let mut inner = self.inner.write();
        let was = inner.app_published;
        inner.app_published = false;
        was
    }

    fn partition_get(
        inner: &TopicInner,
        id: PartitionId,
        ua_on_miss: bool,
    ) -> Option<Arc<Partition>> {
        if id == PartitionId::UA {
            return inner.ua.clone();
        }
        if id.is_assigned() && id.index() < inner.partitions.len() {
            return Some(inner.partitions[id.index()].clone());
        }
        if ua_on_miss {
            inner.ua.clone()
        } else {
            None
        }
    }

    /// Set the topic state, logging the transition.
    pub(crate) fn set_state(&self, inner: &mut TopicInner, state: TopicState) {
        if inner.state == state {
            return;
        }
        debug!(topic = %self.name, from = %inner.state, to = %state,
               "topic changed state");
        inner.state = state;
    }

    /// Availability snapshot for the partitioner, taken under the topic
    /// lock.
    pub(crate) fn scope(&self, inner: &TopicInner) -> PartitionerScope {
        PartitionerScope::new(
            inner
                .partitions
                .iter()
                .map(|p| p.leader().is_some())
                .collect(),
        )
    }

    /// Resize the partition table to `partition_cnt`.
    ///
    /// Returns true if the count changed. Grown slots adopt matching
    /// desired partitions (clearing their unknown flag) before fresh
    /// handles are created; shrunk partitions delegate their leader away,
    /// migrate their queued messages to the UA partition in FIFO order and
    /// either park on the desired list (if desired) or drop.
    ///
    /// The topic write lock must be held.
    pub(crate) fn partition_cnt_update(
        &self,
        client: &Client,
        inner: &mut TopicInner,
        partition_cnt: usize,
    ) -> bool {
        let old_cnt = inner.partitions.len();
        if old_cnt == partition_cnt {
            return false;
        }

        if old_cnt != 0 && !client.is_terminating() {
            info!(topic = %self.name, from = old_cnt, to = partition_cnt,
                  "topic partition count changed");
        } else {
            debug!(topic = %self.name, from = old_cnt, to = partition_cnt,
                   "topic partition count changed");
        }

        let old_parts = std::mem::take(&mut inner.partitions);

        let mut new_parts = Vec::with_capacity(partition_cnt);
        for i in 0..partition_cnt {
            if i < old_cnt {
                new_parts.push(old_parts[i].clone());
                continue;
            }
            // New partition; adopt a matching desired one first.
            let desired_pos = inner
                .desired
                .iter()
                .position(|p| p.id() == PartitionId::new(i as i32));
            if let Some(pos) = desired_pos {
                let p = inner.desired.remove(pos);
                {
                    let mut pinner = p.lock();
                    pinner.unknown = false;
                }
                debug!(topic = %self.name, partition = i,
                       "desired partition is now known");
                new_parts.push(p);
            } else {
                new_parts.push(Partition::new(self.name.clone(), PartitionId::new(i as i32)));
            }
        }

        let ua = inner.ua.clone();

        // Propagate notexist errors for partitions still on the desired
        // list.
        for p in &inner.desired {
            p.enqueue_error(KafkaCode::UnknownPartition);
        }

        // Remove excess partitions if the count decreased.
        for p in old_parts.into_iter().skip(partition_cnt) {
            let mut pinner = p.lock();

            p.broker_delegate(&mut pinner, None);

            // The partition has gone away; move messages to UA or
            // error them out.
            if let Some(ua) = &ua {
                let mut ua_inner = ua.lock();
                pinner.xmit_msgq.move_all_to(&mut ua_inner.msgq);
                pinner.msgq.move_all_to(&mut ua_inner.msgq);
            } else {
                let mut failed = MessageQueue::new();
                pinner.xmit_msgq.move_all_to(&mut failed);
                pinner.msgq.move_all_to(&mut failed);
                client.dr_msgq(&self.name, &mut failed, KafkaCode::UnknownPartition);
            }

            pinner.xmit_msgq.purge();
            pinner.msgq.purge();

            if pinner.desired {
                debug!(topic = %self.name, partition = %p.id(),
                       "partition is desired but no longer known, \
                        moving back on desired list");
                pinner.unknown = true;
                drop(pinner);
                inner.desired.push(p.clone());
                if !client.is_terminating() {
                    p.enqueue_error(KafkaCode::UnknownPartition);
                }
            }
        }

        inner.partitions = new_parts;
        true
    }

    /// Update the leader binding for one partition.
    ///
    /// The topic write lock must be held.
    pub(crate) fn leader_update(
        &self,
        inner: &TopicInner,
        partition: PartitionId,
        broker: Option<Arc<crate::client::Broker>>,
    ) -> LeaderUpdate {
        let Some(p) = Self::partition_get(inner, partition, false) else {
            tracing::warn!(topic = %self.name, partition = %partition,
                           partition_cnt = inner.partitions.len(),
                           "partition is unknown");
            return LeaderUpdate::Unknown;
        };

        let mut pinner = p.lock();
        match broker {
            None => {
                let had_leader = pinner.leader.is_some();
                p.broker_delegate(&mut pinner, None);
                if had_leader {
                    LeaderUpdate::Unknown
                } else {
                    LeaderUpdate::NoChange
                }
            }
            Some(broker) => {
                if let Some(current) = &pinner.leader {
                    if Arc::ptr_eq(current, &broker) {
                        return LeaderUpdate::NoChange;
                    }
                }
                p.broker_delegate(&mut pinner, Some(broker));
                LeaderUpdate::Changed
            }
        }
    }

    /// Route the messages parked on the UA partition, or fail them.
    ///
    /// Producer role only; a no-op for consumers. The topic write lock
    /// must be held.
    pub(crate) fn assign_uas(&self, client: &Client, inner: &mut TopicInner) {
        if client.role() != ClientRole::Producer {
            return;
        }

        let Some(ua) = inner.ua.clone() else {
            debug!(topic = %self.name, "no unassigned partition available");
            return;
        };

        let mut uas = MessageQueue::new();
        {
            let mut ua_inner = ua.lock();
            ua_inner.msgq.move_all_to(&mut uas);
        }
        let cnt = uas.len();
        if cnt == 0 {
            return;
        }

        debug!(topic = %self.name, cnt, partitions = inner.partitions.len(),
               "partitioning unassigned messages");

        let scope = self.scope(inner);
        let partition_cnt = inner.partitions.len();
        let mut failed = MessageQueue::new();
        let mut routed = 0;

        while let Some(msg) = uas.pop() {
            let forced = msg.forced_partition();
            if forced != PartitionId::UA {
                if forced.is_assigned() && forced.index() < partition_cnt {
                    inner.partitions[forced.index()].lock().msgq.push(msg);
                    routed += 1;
                } else if inner.state != TopicState::Unknown {
                    // Fast path for failing messages with a forced
                    // partition that is out of range.
                    failed.push(msg);
                } else {
                    ua.lock().msgq.push(msg);
                }
                continue;
            }

            match (self.partitioner)(&msg, &scope) {
                Some(pid) if pid.is_assigned() && pid.index() < partition_cnt => {
                    inner.partitions[pid.index()].lock().msgq.push(msg);
                    routed += 1;
                }
                _ => {
                    if inner.state == TopicState::Unknown {
                        ua.lock().msgq.push(msg);
                    } else {
                        failed.push(msg);
                    }
                }
            }
        }

        debug!(topic = %self.name, routed, cnt, "messages were partitioned");

        if !failed.is_empty() {
            debug!(topic = %self.name, failed = failed.len(), cnt,
                   "messages failed partitioning");
            let code = if inner.state == TopicState::NotExists {
                KafkaCode::UnknownTopic
            } else {
                KafkaCode::UnknownPartition
            };
            client.dr_msgq(&self.name, &mut failed, code);
        }
    }

    /// Notify consumer subscriptions that the topic does not exist.
    ///
    /// Consumer role only. The topic lock must be held and the state must
    /// already be [`TopicState::NotExists`].
    pub(crate) fn propagate_notexists(&self, client: &Client, inner: &TopicInner) {
        if client.role() != ClientRole::Consumer {
            return;
        }
        for p in &inner.desired {
            p.enqueue_error(KafkaCode::UnknownTopic);
        }
    }

    /// Tear down all partitions, including the UA partition.
    ///
    /// Returns the drained messages so the caller can deliver reports or
    /// purge them outside the topic lock.
    pub(crate) fn partitions_remove(&self, client: &Client) -> MessageQueue {
        let mut tmpq = MessageQueue::new();
        {
            let mut inner = self.inner.write();

            // Setting the partition count to 0 parks desired partitions
            // on the desired list.
            self.partition_cnt_update(client, &mut inner, 0);

            while let Some(p) = inner.desired.pop() {
                let mut pinner = p.lock();
                pinner.xmit_msgq.move_all_to(&mut tmpq);
                pinner.msgq.move_all_to(&mut tmpq);
                pinner.desired = false;
                pinner.unknown = false;
            }

            debug_assert!(inner.partitions.is_empty());

            if let Some(ua) = inner.ua.take() {
                let mut ua_inner = ua.lock();
                ua_inner.xmit_msgq.move_all_to(&mut tmpq);
                ua_inner.msgq.move_all_to(&mut tmpq);
            }
        }

        debug!(topic = %self.name, purging = tmpq.len(), "removing partitions");
        tmpq
    }

    /// Enqueue a message for production.
    ///
    /// Routes directly when a destination can be determined, otherwise
    /// parks the message on the UA partition until metadata arrives. The
    /// message deadline is stamped from the topic's message timeout.
    pub fn enqueue(&self, client: &Client, mut msg: Message) -> Result<()> {
        if client.role() != ClientRole::Producer {
            return Err(Error::InvalidArg("client is not a producer".into()));
        }
        let forced = msg.forced_partition();
        if forced != PartitionId::UA && !forced.is_assigned() {
            return Err(Error::InvalidArg(format!(
                "invalid forced partition {}",
                forced.value()
            )));
        }

        if msg.deadline() == 0 {
            let timeout_us = self.config.message_timeout_ms_or_default() as i64 * 1000;
            msg.set_deadline(now_micros() + timeout_us);
        }

        let inner = self.inner.read();
        let Some(ua) = inner.ua.clone() else {
            return Err(Error::InvalidArg("topic handle is being destroyed".into()));
        };
        let partition_cnt = inner.partitions.len();

        if forced != PartitionId::UA {
            // A forced id outside the table falls back to the UA
            // partition; the next reassignment settles or fails it.
            let dest = Self::partition_get(&inner, forced, true).unwrap_or(ua);
            dest.lock().msgq.push(msg);
            return Ok(());
        }

        let scope = self.scope(&inner);
        match (self.partitioner)(&msg, &scope) {
            Some(pid) if pid.is_assigned() && pid.index() < partition_cnt => {
                inner.partitions[pid.index()].lock().msgq.push(msg);
            }
            _ => ua.lock().msgq.push(msg),
        }
        Ok(())
    }

    /// Subscribe to a partition by id (consumer side).
    ///
    /// If the partition is present in the table it is flagged desired in
    /// place; otherwise a handle is created on the desired list, flagged
    /// unknown until metadata brings it into the table.
    pub fn desired_add(&self, client: &Client, id: PartitionId) -> Result<Arc<Partition>> {
        if client.role() != ClientRole::Consumer {
            return Err(Error::InvalidArg("client is not a consumer".into()));
        }
        if !id.is_assigned() {
            return Err(Error::InvalidArg(format!(
                "invalid desired partition {}",
                id.value()
            )));
        }

        let mut inner = self.inner.write();
        if id.index() < inner.partitions.len() {
            let p = inner.partitions[id.index()].clone();
            p.lock().desired = true;
            return Ok(p);
        }
        if let Some(p) = inner.desired.iter().find(|p| p.id() == id) {
            return Ok(p.clone());
        }

        let p = Partition::new(self.name.clone(), id);
        {
            let mut pinner = p.lock();
            pinner.desired = true;
            pinner.unknown = true;
        }
        debug!(topic = %self.name, partition = %id,
               "partition added to desired list");
        inner.desired.push(p.clone());
        Ok(p)
    }

    /// Drop a partition subscription.
    pub fn desired_remove(&self, id: PartitionId) {
        let mut inner = self.inner.write();
        if id.is_assigned() && id.index() < inner.partitions.len() {
            inner.partitions[id.index()].lock().desired = false;
            return;
        }
        if let Some(pos) = inner.desired.iter().position(|p| p.id() == id) {
            let p = inner.desired.remove(pos);
            let mut pinner = p.lock();
            pinner.desired = false;
            pinner.unknown = false;
        }
    }

    /// Resolve the effective compression codec for this topic against the
    /// client-wide default.
    pub fn compression_codec(&self) -> CompressionCodec {
        self.config.compression_codec
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("partition_cnt", &inner.partitions.len())
            .field("desired", &inner.desired.len())
            .field("ts_metadata", &inner.ts_metadata)
            .finish()
    }
}
