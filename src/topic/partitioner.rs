//! Pluggable message-to-partition mapping.
//!
//! A partitioner maps a message onto a partition id given a snapshot of the
//! topic's routable partitions. It is stateless from the topic core's
//! perspective; only the returned id matters. Returning `None` signals
//! that no partition is currently available for the message.
//!
//! The shipped default, [`consistent_random`], hashes the message key with
//! CRC-32C onto the partition table when a key is present, and picks
//! uniformly at random among partitions that currently have a leader
//! otherwise. Keyed messages always land on the same partition for a given
//! partition count, whether or not that partition currently has a leader.

use std::sync::Arc;

use crate::topic::message::Message;
use crate::types::PartitionId;

/// Snapshot of a topic's routable partitions, taken under the topic lock
/// and handed to the partitioner.
#[derive(Debug, Clone)]
pub struct PartitionerScope {
    partition_cnt: usize,
    available: Vec<bool>,
}

impl PartitionerScope {
    pub(crate) fn new(available: Vec<bool>) -> Self {
        Self {
            partition_cnt: available.len(),
            available,
        }
    }

    /// Number of partitions in the topic.
    pub fn partition_cnt(&self) -> usize {
        self.partition_cnt
    }

    /// True when the partition exists and currently has a leader.
    pub fn is_available(&self, partition: PartitionId) -> bool {
        partition.is_assigned()
            && self
                .available
                .get(partition.index())
                .copied()
                .unwrap_or(false)
    }

    fn available_cnt(&self) -> usize {
        self.available.iter().filter(|a| **a).count()
    }
}

/// A message-to-partition mapping.
pub type Partitioner = Arc<dyn Fn(&Message, &PartitionerScope) -> Option<PartitionId> + Send + Sync>;

/// The default partitioner: consistent hashing for keyed messages, uniform
/// random over available partitions for keyless ones.
pub fn consistent_random() -> Partitioner {
    Arc::new(|msg, scope| {
        if scope.partition_cnt() == 0 {
            return None;
        }
        if let Some(key) = msg.key_bytes() {
            let idx = crc32c(key) as usize % scope.partition_cnt();
            return Some(PartitionId::new(idx as i32));
        }
        let avail = scope.available_cnt();
        if avail == 0 {
            return None;
        }
        let mut nth = fastrand::usize(0..avail);
        for (idx, a) in scope.available.iter().enumerate() {
            if *a {
                if nth == 0 {
                    return Some(PartitionId::new(idx as i32));
                }
                nth -= 1;
            }
        }
        None
    })
}

const CRC32C_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0x82F63B78; // CRC-32C polynomial
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Compute CRC-32C checksum (Castagnoli polynomial).
fn crc32c(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32C_TABLE[index];
    }
    !crc
}
