//! Messages and intrusive-order message queues.
//!
//! A [`Message`] is a produced record waiting to be routed and transmitted.
//! [`MessageQueue`] is the FIFO container used for the per-partition
//! transmit and application queues, the unassigned-partition holding queue,
//! and the transient staging queues built during re-routing. Queue-to-queue
//! moves always preserve enqueue order.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::types::PartitionId;

/// A produced message.
///
/// Carries an optional key (consulted by the partitioner), a payload, an
/// optional forced destination partition, and an absolute deadline on the
/// monotonic microsecond clock after which the message is failed with
/// `MsgTimedOut`.
#[derive(Debug, Clone)]
pub struct Message {
    key: Option<Bytes>,
    payload: Bytes,
    partition: PartitionId,
    deadline: i64,
}

impl Message {
    /// Create a message bound for no particular partition.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            key: None,
            payload: payload.into(),
            partition: PartitionId::UA,
            deadline: 0,
        }
    }

    /// Attach a partitioning key.
    pub fn key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Force a destination partition, bypassing the partitioner. The id is
    /// still validated against the topic's partition count at routing time.
    pub fn partition(mut self, partition: PartitionId) -> Self {
        self.partition = partition;
        self
    }

    /// The partitioning key, if any.
    pub fn key_bytes(&self) -> Option<&Bytes> {
        self.key.as_ref()
    }

    /// The message payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The forced destination partition, or [`PartitionId::UA`].
    pub fn forced_partition(&self) -> PartitionId {
        self.partition
    }

    /// Absolute deadline in microseconds; zero until enqueued.
    pub fn deadline(&self) -> i64 {
        self.deadline
    }

    pub(crate) fn set_deadline(&mut self, deadline: i64) {
        self.deadline = deadline;
    }

    pub(crate) fn is_timed_out(&self, now: i64) -> bool {
        self.deadline != 0 && now > self.deadline
    }
}

/// FIFO message queue.
#[derive(Debug, Default)]
pub struct MessageQueue {
    msgs: VecDeque<Message>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.msgs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }

    /// Append a message at the tail.
    pub fn push(&mut self, msg: Message) {
        self.msgs.push_back(msg);
    }

    /// Remove and return the head message.
    pub fn pop(&mut self) -> Option<Message> {
        self.msgs.pop_front()
    }

    /// Move all messages onto the tail of `dst`, preserving order.
    pub fn move_all_to(&mut self, dst: &mut MessageQueue) -> usize {
        let moved = self.msgs.len();
        dst.msgs.append(&mut self.msgs);
        moved
    }

    /// Move messages whose deadline has passed onto `timedout`, preserving
    /// the relative order of both the survivors and the expired.
    pub fn age_scan(&mut self, timedout: &mut MessageQueue, now: i64) -> usize {
        let before = timedout.len();
        let mut keep = VecDeque::with_capacity(self.msgs.len());
        for msg in self.msgs.drain(..) {
            if msg.is_timed_out(now) {
                timedout.msgs.push_back(msg);
            } else {
                keep.push_back(msg);
            }
        }
        self.msgs = keep;
        timedout.len() - before
    }

    /// Drop all messages, returning how many were discarded.
    pub fn purge(&mut self) -> usize {
        let n = self.msgs.len();
        self.msgs.clear();
        n
    }

    /// Iterate messages head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.msgs.iter()
    }
}
