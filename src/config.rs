//! Client and topic configuration.
//!
//! Configuration is plain structs with [`Default`] implementations and a
//! `validate()` step; the surrounding library owns file or environment
//! parsing. Topic-level settings are copied into the topic handle at
//! creation and are immutable afterwards.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::topic::partitioner::Partitioner;

/// Maximum length in bytes for topic names.
pub const MAX_TOPIC_NAME_LENGTH: usize = 512;

/// Default metadata refresh interval (ms). Metadata older than three times
/// this interval is considered stale by the periodic scanner.
pub const DEFAULT_METADATA_REFRESH_INTERVAL_MS: i64 = 10_000;

/// Default message timeout (ms) applied to produced messages.
pub const DEFAULT_MESSAGE_TIMEOUT_MS: u64 = 300_000;

/// The role a client instance plays against the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRole {
    /// Enqueues messages for transmission; receives delivery reports.
    Producer,
    /// Fetches records; subscribes to partitions by id.
    Consumer,
}

/// Compression codec applied to produced message sets.
///
/// `Inherit` is a sentinel resolved against the client-wide codec when a
/// topic handle is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionCodec {
    /// Resolve to the client-wide default at topic creation.
    #[default]
    Inherit,
    /// No compression.
    None,
    Gzip,
    Snappy,
    Lz4,
}

/// Client-wide configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Topics matching any of these patterns are ignored in metadata.
    /// Patterns support `*` as a wildcard for any run of characters.
    pub topic_blacklist: Vec<String>,
    /// Metadata refresh interval in milliseconds. Negative disables the
    /// staleness check in the periodic scanner.
    pub metadata_refresh_interval_ms: i64,
    /// Whether the brokers are expected to auto-create unknown topics on
    /// a metadata request. Broker-side effect only; recorded here so the
    /// leader-query path can log the expectation.
    pub auto_create_topics: bool,
    /// Client-wide compression codec, resolved into topics whose codec is
    /// [`CompressionCodec::Inherit`].
    pub compression_codec: CompressionCodec,
    /// Default configuration for topics created without an explicit one.
    pub default_topic_config: Option<TopicConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            topic_blacklist: Vec::new(),
            metadata_refresh_interval_ms: DEFAULT_METADATA_REFRESH_INTERVAL_MS,
            auto_create_topics: true,
            compression_codec: CompressionCodec::None,
            default_topic_config: None,
        }
    }
}

impl ClientConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.compression_codec == CompressionCodec::Inherit {
            return Err(Error::Config(
                "client-wide compression codec must not be Inherit".into(),
            ));
        }
        if self.topic_blacklist.iter().any(|p| p.is_empty()) {
            return Err(Error::Config("empty topic blacklist pattern".into()));
        }
        Ok(())
    }

    /// True when `topic` matches a blacklist pattern.
    pub fn is_blacklisted(&self, topic: &str) -> bool {
        self.topic_blacklist
            .iter()
            .any(|p| wildcard_match(p, topic))
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("topic_blacklist", &self.topic_blacklist)
            .field(
                "metadata_refresh_interval_ms",
                &self.metadata_refresh_interval_ms,
            )
            .field("auto_create_topics", &self.auto_create_topics)
            .field("compression_codec", &self.compression_codec)
            .finish()
    }
}

/// Per-topic configuration, copied into the handle at creation.
#[derive(Clone, Default)]
pub struct TopicConfig {
    /// Message-to-partition mapping. `None` selects the default
    /// consistent-random partitioner at topic creation.
    pub partitioner: Option<Partitioner>,
    /// Compression codec; `Inherit` resolves to the client-wide codec.
    pub compression_codec: CompressionCodec,
    /// Message timeout in milliseconds; produced messages exceeding it are
    /// failed with `MsgTimedOut` by the periodic scanner. Zero keeps the
    /// default.
    pub message_timeout_ms: u64,
    /// Opaque application attachment, reachable from callbacks via
    /// `Topic::opaque()`.
    pub opaque: Option<Arc<dyn Any + Send + Sync>>,
}

impl TopicConfig {
    pub(crate) fn message_timeout_ms_or_default(&self) -> u64 {
        if self.message_timeout_ms == 0 {
            DEFAULT_MESSAGE_TIMEOUT_MS
        } else {
            self.message_timeout_ms
        }
    }
}

impl fmt::Debug for TopicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicConfig")
            .field("partitioner", &self.partitioner.as_ref().map(|_| "custom"))
            .field("compression_codec", &self.compression_codec)
            .field("message_timeout_ms", &self.message_timeout_ms)
            .field("opaque", &self.opaque.as_ref().map(|_| "set"))
            .finish()
    }
}

/// Validate a topic name.
///
/// Names are byte strings of 1 to [`MAX_TOPIC_NAME_LENGTH`] bytes. Content
/// restrictions (character classes, reserved names) are enforced broker
/// side; the client only guards the length bounds the protocol requires.
pub fn validate_topic_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArg("topic name is empty".into()));
    }
    if name.len() > MAX_TOPIC_NAME_LENGTH {
        return Err(Error::InvalidArg(format!(
            "topic name exceeds {} bytes",
            MAX_TOPIC_NAME_LENGTH
        )));
    }
    Ok(())
}

/// Match `name` against `pattern`, where `*` matches any run of characters.
pub(crate) fn wildcard_match(pattern: &str, name: &str) -> bool {
    fn inner(p: &[u8], n: &[u8]) -> bool {
        match p.first() {
            None => n.is_empty(),
            Some(b'*') => inner(&p[1..], n) || (!n.is_empty() && inner(p, &n[1..])),
            Some(c) => n.first() == Some(c) && inner(&p[1..], &n[1..]),
        }
    }
    inner(pattern.as_bytes(), name.as_bytes())
}
