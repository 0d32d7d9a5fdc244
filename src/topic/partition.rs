//! Partition handles.
//!
//! A [`Partition`] is co-managed by the topic core and the broker
//! subsystem: the core (re)binds its leader and moves messages across its
//! queues during reconfiguration, the broker subsystem drains the transmit
//! queue. Each handle carries its own lock, the innermost in the global
//! client → topic → partition order.
//!
//! A partition is reachable from exactly one of the topic's partition
//! table, its UA slot, or its desired list. The `desired` flag marks
//! partitions the application subscribed to by id; `unknown` marks desired
//! partitions currently absent from the table.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::client::Broker;
use crate::error::KafkaCode;
use crate::topic::message::MessageQueue;
use crate::types::PartitionId;

pub(crate) struct PartitionInner {
    pub(crate) leader: Option<Arc<Broker>>,
    pub(crate) desired: bool,
    pub(crate) unknown: bool,
    pub(crate) msgq: MessageQueue,
    pub(crate) xmit_msgq: MessageQueue,
    pub(crate) errq: Vec<KafkaCode>,
}

/// One partition of a topic.
pub struct Partition {
    topic: Arc<str>,
    id: PartitionId,
    inner: Mutex<PartitionInner>,
}

impl Partition {
    pub(crate) fn new(topic: Arc<str>, id: PartitionId) -> Arc<Self> {
        Arc::new(Self {
            topic,
            id,
            inner: Mutex::new(PartitionInner {
                leader: None,
                desired: false,
                unknown: false,
                msgq: MessageQueue::new(),
                xmit_msgq: MessageQueue::new(),
                errq: Vec::new(),
            }),
        })
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    /// Name of the owning topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PartitionInner> {
        self.inner.lock()
    }

    /// The broker currently leading this partition, if any.
    pub fn leader(&self) -> Option<Arc<Broker>> {
        self.inner.lock().leader.clone()
    }

    /// True when the application has subscribed to this partition by id.
    pub fn is_desired(&self) -> bool {
        self.inner.lock().desired
    }

    /// True when the partition is desired but absent from the table.
    pub fn is_unknown(&self) -> bool {
        self.inner.lock().unknown
    }

    /// Number of messages across the application and transmit queues.
    pub fn msg_cnt(&self) -> usize {
        let inner = self.inner.lock();
        inner.msgq.len() + inner.xmit_msgq.len()
    }

    /// Snapshot of queued payloads, transmit queue first, head to tail.
    pub fn queued_payloads(&self) -> Vec<bytes::Bytes> {
        let inner = self.inner.lock();
        inner
            .xmit_msgq
            .iter()
            .chain(inner.msgq.iter())
            .map(|m| m.payload().clone())
            .collect()
    }

    /// Move the application queue onto the transmit queue. Called by the
    /// broker subsystem when it picks up a partition for transmission.
    pub fn move_to_xmit(&self) -> usize {
        let mut inner = self.inner.lock();
        let PartitionInner {
            msgq, xmit_msgq, ..
        } = &mut *inner;
        msgq.move_all_to(xmit_msgq)
    }

    /// Reassign which broker transmits this partition's messages.
    ///
    /// Must be called with the partition lock held, hence the guard
    /// parameter.
    pub(crate) fn broker_delegate(
        &self,
        inner: &mut PartitionInner,
        broker: Option<Arc<Broker>>,
    ) {
        match (&inner.leader, &broker) {
            (Some(old), Some(new)) if !Arc::ptr_eq(old, new) => {
                debug!(topic = %self.topic, partition = %self.id,
                       from = %old.node_id(), to = %new.node_id(),
                       "partition migrated between brokers");
            }
            (Some(old), None) => {
                debug!(topic = %self.topic, partition = %self.id,
                       from = %old.node_id(), "partition leader removed");
            }
            (None, Some(new)) => {
                debug!(topic = %self.topic, partition = %self.id,
                       to = %new.node_id(), "partition delegated to broker");
            }
            _ => {}
        }
        inner.leader = broker;
    }

    /// Enqueue a consumer-visible per-partition error.
    pub(crate) fn enqueue_error(&self, code: KafkaCode) {
        debug!(topic = %self.topic, partition = %self.id, ?code,
               "enqueuing partition error");
        self.inner.lock().errq.push(code);
    }

    /// Drain the per-partition error queue.
    pub fn take_errors(&self) -> Vec<KafkaCode> {
        std::mem::take(&mut self.inner.lock().errq)
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Partition")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("leader", &inner.leader.as_ref().map(|b| b.node_id()))
            .field("desired", &inner.desired)
            .field("unknown", &inner.unknown)
            .field("msgq", &inner.msgq.len())
            .field("xmit_msgq", &inner.xmit_msgq.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BrokerId;
    use bytes::Bytes;

    #[test]
    fn test_delegate_and_errors() {
        let p = Partition::new(Arc::from("t"), PartitionId::new(0));
        assert!(p.leader().is_none());

        let b = Arc::new(Broker::new(BrokerId::new(1), "localhost", 9092));
        {
            let mut inner = p.lock();
            p.broker_delegate(&mut inner, Some(b.clone()));
        }
        assert_eq!(p.leader().unwrap().node_id(), BrokerId::new(1));

        p.enqueue_error(KafkaCode::UnknownPartition);
        assert_eq!(p.take_errors(), vec![KafkaCode::UnknownPartition]);
        assert!(p.take_errors().is_empty());
    }

    #[test]
    fn test_move_to_xmit_keeps_order() {
        let p = Partition::new(Arc::from("t"), PartitionId::new(0));
        {
            let mut inner = p.lock();
            inner.msgq.push(crate::topic::message::Message::new(Bytes::from_static(b"a")));
            inner.msgq.push(crate::topic::message::Message::new(Bytes::from_static(b"b")));
        }
        assert_eq!(p.move_to_xmit(), 2);
        assert_eq!(p.queued_payloads(), vec!["a", "b"]);
        assert_eq!(p.msg_cnt(), 2);
    }
}
