//! Type-safe wrappers for broker and partition identifiers.
//!
//! These newtypes prevent mixing up different integer types that share an
//! underlying representation but carry different semantic meanings, such as
//! broker node ids and partition ids.

use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

/// A broker node identifier.
///
/// Broker ids are 32-bit signed integers that uniquely identify brokers
/// within a cluster. Metadata responses use `-1` to indicate that a
/// partition currently has no leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BrokerId(pub i32);

impl BrokerId {
    /// Invalid broker id, used by metadata to indicate "no leader".
    pub const INVALID: Self = BrokerId(-1);

    /// Create a new broker id from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        BrokerId(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Check if this is a valid (non-negative) broker id.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl From<i32> for BrokerId {
    fn from(value: i32) -> Self {
        BrokerId(value)
    }
}

impl From<BrokerId> for i32 {
    fn from(id: BrokerId) -> Self {
        id.0
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A partition identifier within a topic.
///
/// Partition ids are 32-bit signed integers indexing into a topic's dense
/// partition table. The sentinel [`PartitionId::UA`] (unassigned, `-1`)
/// names the special partition that holds messages whose destination has
/// not yet been determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PartitionId(pub i32);

impl PartitionId {
    /// The unassigned-partition sentinel.
    pub const UA: Self = PartitionId(-1);

    /// Create a new partition id from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        PartitionId(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Check if this is a real (non-sentinel) partition id.
    #[inline]
    pub const fn is_assigned(self) -> bool {
        self.0 >= 0
    }

    /// The id as an index into a topic's partition table.
    ///
    /// Only meaningful when [`is_assigned`](Self::is_assigned) is true.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<i32> for PartitionId {
    fn from(value: i32) -> Self {
        PartitionId(value)
    }
}

impl From<PartitionId> for i32 {
    fn from(id: PartitionId) -> Self {
        id.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::UA {
            write!(f, "UA")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

static CLOCK_ANCHOR: OnceLock<Instant> = OnceLock::new();

/// Monotonic clock reading in microseconds.
///
/// All metadata timestamps and message deadlines are expressed on this
/// clock. It is anchored at first use and never goes backwards.
pub fn now_micros() -> i64 {
    let anchor = CLOCK_ANCHOR.get_or_init(Instant::now);
    anchor.elapsed().as_micros() as i64
}
