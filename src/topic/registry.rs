//! The topic registry.
//!
//! The registry is the sole point where name-to-handle identity is
//! established; every other subsystem receives handles, never names. It
//! lives inside the client's reader-writer lock together with the broker
//! pool index.

use std::sync::Arc;

use tracing::debug;

use crate::client::Client;
use crate::config::{validate_topic_name, CompressionCodec, TopicConfig};
use crate::error::{KafkaCode, Result};
use crate::topic::handle::{Topic, TopicState};
use crate::topic::message::MessageQueue;
use crate::topic::partitioner;

impl Client {
    /// Find a topic handle by name under the client read lock.
    ///
    /// Matching is byte-exact. The returned `Arc` is the caller's
    /// reference.
    pub fn topic_find(&self, name: &str) -> Option<Arc<Topic>> {
        self.inner.read().topics.get(name).cloned()
    }

    /// As [`topic_find`](Self::topic_find), but comparing against the
    /// on-wire length-prefixed string form (16-bit big-endian length
    /// followed by the name bytes).
    pub fn topic_find_by_protocol_string(&self, wire: &[u8]) -> Option<Arc<Topic>> {
        if wire.len() < 2 {
            return None;
        }
        let len = i16::from_be_bytes([wire[0], wire[1]]);
        if len < 0 {
            return None;
        }
        let len = len as usize;
        if wire.len() < 2 + len {
            return None;
        }
        let name = std::str::from_utf8(&wire[2..2 + len]).ok()?;
        self.topic_find(name)
    }

    /// Find or create a topic handle.
    ///
    /// Returns the handle and whether it already existed. When it did,
    /// the supplied configuration is discarded in favour of the existing
    /// handle's. A missing configuration falls back to the client's
    /// default topic configuration.
    pub fn topic_create(
        &self,
        name: &str,
        config: Option<TopicConfig>,
    ) -> Result<(Arc<Topic>, bool)> {
        validate_topic_name(name)?;

        let mut inner = self.inner.write();
        if let Some(existing) = inner.topics.get(name) {
            return Ok((existing.clone(), true));
        }

        let mut config = config
            .or_else(|| self.config().default_topic_config.clone())
            .unwrap_or_default();
        if config.compression_codec == CompressionCodec::Inherit {
            config.compression_codec = self.config().compression_codec;
        }
        let partitioner = config
            .partitioner
            .clone()
            .unwrap_or_else(partitioner::consistent_random);

        let name: Arc<str> = Arc::from(name);
        debug!(topic = %name, "new local topic");
        let topic = Topic::new(name.clone(), config, partitioner);
        inner.topics.insert(name, topic.clone());

        Ok((topic, false))
    }

    /// Application entry point: find or create a topic handle, publish it
    /// to the application, and schedule a leader query for newly created
    /// topics so metadata arrives without waiting for the refresh cycle.
    pub fn topic_new(&self, name: &str, config: Option<TopicConfig>) -> Result<Arc<Topic>> {
        let (topic, existing) = self.topic_create(name, config)?;
        topic.publish_app_handle();
        if !existing {
            self.leader_query(&topic.name_arc());
        }
        Ok(topic)
    }

    /// Application release of a topic handle.
    ///
    /// Unpublishes the application alias, unlinks the handle from the
    /// registry and drains all partition queues via delivery reports.
    /// Outstanding internal references keep the memory alive but the
    /// handle is no longer reachable by name.
    pub fn topic_destroy(&self, topic: Arc<Topic>) {
        topic.release_app_handle();

        {
            let mut inner = self.inner.write();
            inner.topics.remove(topic.name());
        }

        let mut drained = topic.partitions_remove(self);
        if !drained.is_empty() {
            let code = if topic.state().is_not_exists() {
                KafkaCode::UnknownTopic
            } else {
                KafkaCode::UnknownPartition
            };
            self.dr_msgq(&topic.name_arc(), &mut drained, code);
        }
    }

    /// Number of live topic handles.
    pub fn topic_cnt(&self) -> usize {
        self.inner.read().topics.len()
    }

    /// Periodic scan over all topics.
    ///
    /// Ages out timed-out messages via `MsgTimedOut` delivery reports,
    /// marks topics with stale metadata (older than three refresh
    /// intervals) as [`TopicState::Unknown`], and schedules leader queries
    /// for topics with an empty partition table. Returns the total number
    /// of timed-out messages.
    pub fn scan_all(&self, now: i64) -> usize {
        let mut totcnt = 0;
        let mut query_topics: Vec<Arc<str>> = Vec::new();

        {
            let inner = self.inner.read();
            for topic in inner.topics.values() {
                let mut timedout = MessageQueue::new();
                let mut tpcnt = 0;

                {
                    let mut tinner = topic.write_inner();

                    // Metadata older than three refresh intervals is
                    // considered timed out.
                    let refresh_ms = self.config().metadata_refresh_interval_ms;
                    if tinner.state != TopicState::Unknown
                        && refresh_ms >= 0
                        && now > tinner.ts_metadata + refresh_ms * 1000 * 3
                    {
                        debug!(topic = %topic.name(),
                               age_ms = (now - tinner.ts_metadata) / 1000,
                               "topic metadata information timed out");
                        topic.set_state(&mut tinner, TopicState::Unknown);
                    }

                    if tinner.partitions.is_empty() {
                        // Unknown to the brokers; a topic-specific
                        // metadata request may auto-create it.
                        query_topics.push(topic.name_arc());
                    }

                    let parts = tinner
                        .ua
                        .iter()
                        .chain(tinner.partitions.iter());
                    for p in parts {
                        let mut pinner = p.lock();
                        let mut did_tmout = false;
                        did_tmout |= pinner.xmit_msgq.age_scan(&mut timedout, now) > 0;
                        did_tmout |= pinner.msgq.age_scan(&mut timedout, now) > 0;
                        tpcnt += did_tmout as usize;
                    }
                }

                let cnt = timedout.len();
                if cnt > 0 {
                    totcnt += cnt;
                    debug!(topic = %topic.name(), cnt, partitions = tpcnt,
                           "messages timed out");
                    self.dr_msgq(&topic.name_arc(), &mut timedout, KafkaCode::MsgTimedOut);
                }
            }
        }

        // Issue leader queries after the per-topic locks are released.
        for name in query_topics {
            self.leader_query(&name);
        }

        totcnt
    }
}
