//! Crate-level errors and broker-reported error codes.
//!
//! This module provides the two error layers of the crate:
//!
//! - [`Error`]: synchronous errors returned from API calls (invalid
//!   arguments, configuration problems).
//! - [`KafkaCode`]: error codes attached to metadata snapshots, delivery
//!   reports, and per-partition error queues. The enum covers both codes
//!   reported by brokers over the wire (non-negative values matching the
//!   protocol) and client-internal terminal codes (values below `-100`,
//!   never sent on the wire) such as [`KafkaCode::UnknownPartition`].

use num_derive::FromPrimitive;
use std::result;
use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

/// Synchronous API errors.
///
/// These are returned directly from calls such as topic creation; failures
/// discovered asynchronously (routing, timeouts, metadata-driven state
/// changes) surface as [`KafkaCode`]s on delivery reports instead.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum Error {
    /// An invalid argument was supplied, e.g. a topic name outside the
    /// 1..=512 byte range.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// Configuration validation failed.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Error codes carried by metadata snapshots and delivery reports.
///
/// Negative values below `-100` are client-internal and never appear on the
/// wire; non-negative values (and `Unknown = -1`) match the Kafka protocol
/// error codes. See also the
/// [protocol error table](https://kafka.apache.org/protocol.html#protocol_error_codes).
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, Default)]
pub enum KafkaCode {
    /// Message exceeded its deadline before it could be transmitted.
    /// Client-internal.
    MsgTimedOut = -192,
    /// The destination partition is no longer present in the local
    /// partition table, or a forced partition id was out of range.
    /// Client-internal.
    UnknownPartition = -190,
    /// The topic is confirmed to not exist in the cluster.
    /// Client-internal.
    UnknownTopic = -188,
    /// An invalid argument was passed to the client. Client-internal.
    InvalidArg = -186,

    /// An unexpected server error. Also reported when topic auto-creation
    /// fails on the broker.
    Unknown = -1,
    #[default]
    None = 0,
    /// The requested offset is outside the range of offsets maintained by
    /// the server for the given topic/partition.
    OffsetOutOfRange = 1,
    /// A message's contents does not match its CRC.
    CorruptMessage = 2,
    /// This request is for a topic or partition that does not exist on
    /// this broker.
    UnknownTopicOrPartition = 3,
    /// The message has a negative size.
    InvalidMessageSize = 4,
    /// A leadership election is in progress and there is currently no
    /// leader for this partition, hence it is unavailable for writes.
    LeaderNotAvailable = 5,
    /// The client attempted to send messages to a replica that is not the
    /// leader for the partition. The client's metadata is out of date.
    NotLeaderForPartition = 6,
    /// The request exceeded the user-specified time limit.
    RequestTimedOut = 7,
    /// Used by tools when a broker is not alive.
    BrokerNotAvailable = 8,
    /// A replica was expected on a broker but is not there.
    ReplicaNotAvailable = 9,
    /// The client attempted to produce a message larger than the broker's
    /// configured maximum.
    MessageSizeTooLarge = 10,
    /// Internal error code for broker-to-broker communication.
    StaleControllerEpoch = 11,
    /// Offset metadata string exceeded the configured maximum.
    OffsetMetadataTooLarge = 12,
    /// The server disconnected before a response was received.
    NetworkException = 13,
}

impl KafkaCode {
    /// True for codes generated inside the client rather than reported by
    /// a broker.
    pub fn is_internal(self) -> bool {
        (self as i32) < -100
    }

    /// True when the code indicates success.
    pub fn is_ok(self) -> bool {
        self == KafkaCode::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn test_kafka_code_from_wire_value() {
        assert_eq!(
            KafkaCode::from_i32(3),
            Some(KafkaCode::UnknownTopicOrPartition)
        );
        assert_eq!(KafkaCode::from_i32(5), Some(KafkaCode::LeaderNotAvailable));
        assert_eq!(KafkaCode::from_i32(-1), Some(KafkaCode::Unknown));
    }

    #[test]
    fn test_internal_codes_flagged() {
        assert!(KafkaCode::UnknownPartition.is_internal());
        assert!(KafkaCode::UnknownTopic.is_internal());
        assert!(KafkaCode::MsgTimedOut.is_internal());
        assert!(!KafkaCode::UnknownTopicOrPartition.is_internal());
        assert!(!KafkaCode::None.is_internal());
    }

    #[test]
    fn test_error_display() {
        let err = Error::InvalidArg("topic name is empty".into());
        assert_eq!(err.to_string(), "invalid argument: topic name is empty");
    }
}
