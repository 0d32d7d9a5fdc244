//! Client instance context.
//!
//! A [`Client`] owns the topic registry and the broker pool index, both
//! guarded by a single reader-writer lock, plus the two outbound edges that
//! must never block while a lock is held: delivery reports to the
//! application and leader-query requests to the broker subsystem. Both are
//! unbounded channels so a send is a non-blocking enqueue.
//!
//! # Lock order
//!
//! Globally: client lock, then topic lock, then partition lock. Broker
//! lookups by node id must complete before any topic lock is taken; no
//! topic lock may be held while acquiring the client lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::config::{ClientConfig, ClientRole};
use crate::error::{KafkaCode, Result};
use crate::topic::handle::Topic;
use crate::topic::message::{Message, MessageQueue};
use crate::types::BrokerId;

/// A broker known to the client.
///
/// Connection management lives in the broker subsystem; the topic core only
/// needs the identity to delegate partition leadership.
#[derive(Debug)]
pub struct Broker {
    node_id: BrokerId,
    host: String,
    port: u16,
}

impl Broker {
    pub fn new(node_id: BrokerId, host: impl Into<String>, port: u16) -> Self {
        Self {
            node_id,
            host: host.into(),
            port,
        }
    }

    pub fn node_id(&self) -> BrokerId {
        self.node_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.node_id)
    }
}

/// Terminal status of a produced message, delivered asynchronously.
#[derive(Debug)]
pub struct DeliveryReport {
    /// Topic the message was produced to.
    pub topic: Arc<str>,
    /// The message itself, handed back to the application.
    pub message: Message,
    /// Terminal status; [`KafkaCode::None`] for success.
    pub code: KafkaCode,
}

pub(crate) struct ClientInner {
    pub(crate) topics: HashMap<Arc<str>, Arc<Topic>>,
    pub(crate) brokers: HashMap<BrokerId, Arc<Broker>>,
}

/// A client instance.
///
/// Passed explicitly to every core operation; the crate has no global
/// state.
pub struct Client {
    role: ClientRole,
    config: ClientConfig,
    pub(crate) inner: RwLock<ClientInner>,
    terminating: AtomicBool,
    dr_tx: UnboundedSender<DeliveryReport>,
    dr_rx: Mutex<Option<UnboundedReceiver<DeliveryReport>>>,
    lq_tx: UnboundedSender<Arc<str>>,
    lq_rx: Mutex<Option<UnboundedReceiver<Arc<str>>>>,
}

impl Client {
    /// Create a client with the given role and configuration.
    pub fn new(role: ClientRole, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let (dr_tx, dr_rx) = mpsc::unbounded_channel();
        let (lq_tx, lq_rx) = mpsc::unbounded_channel();
        Ok(Self {
            role,
            config,
            inner: RwLock::new(ClientInner {
                topics: HashMap::new(),
                brokers: HashMap::new(),
            }),
            terminating: AtomicBool::new(false),
            dr_tx,
            dr_rx: Mutex::new(Some(dr_rx)),
            lq_tx,
            lq_rx: Mutex::new(Some(lq_rx)),
        })
    }

    pub fn role(&self) -> ClientRole {
        self.role
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// True once [`terminate`](Self::terminate) has been called.
    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::Acquire)
    }

    /// Begin termination: metadata applications and leader queries
    /// short-circuit from here on, and all queued messages are drained via
    /// delivery reports (`UnknownTopic` for topics confirmed absent,
    /// `UnknownPartition` otherwise).
    pub fn terminate(&self) {
        self.terminating.store(true, Ordering::Release);

        let topics: Vec<Arc<Topic>> = self.inner.read().topics.values().cloned().collect();
        for topic in topics {
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
    }

    /// Register a broker in the pool index, replacing any previous entry
    /// for the same node id.
    pub fn broker_add(&self, node_id: BrokerId, host: impl Into<String>, port: u16) -> Arc<Broker> {
        let broker = Arc::new(Broker::new(node_id, host, port));
        self.inner.write().brokers.insert(node_id, broker.clone());
        broker
    }

    /// Look up a broker by node id under the client read lock.
    pub fn broker_find_by_nodeid(&self, node_id: BrokerId) -> Option<Arc<Broker>> {
        self.inner.read().brokers.get(&node_id).cloned()
    }

    /// Take the delivery-report receiver. Yields `None` after the first
    /// call; there is a single consumer.
    pub fn take_delivery_reports(&self) -> Option<UnboundedReceiver<DeliveryReport>> {
        self.dr_rx.lock().take()
    }

    /// Take the leader-query receiver consumed by the broker subsystem.
    pub fn take_leader_queries(&self) -> Option<UnboundedReceiver<Arc<str>>> {
        self.lq_rx.lock().take()
    }

    /// Schedule an asynchronous topic-leader metadata query.
    pub(crate) fn leader_query(&self, topic: &Arc<str>) {
        if self.is_terminating() {
            return;
        }
        debug!(topic = %topic, auto_create = self.config.auto_create_topics,
               "scheduling leader query");
        let _ = self.lq_tx.send(topic.clone());
    }

    /// Drain `queue` into per-message delivery reports with `code`.
    pub(crate) fn dr_msgq(&self, topic: &Arc<str>, queue: &mut MessageQueue, code: KafkaCode) {
        let cnt = queue.len();
        if cnt == 0 {
            return;
        }
        debug!(topic = %topic, cnt, ?code, "delivering message status");
        while let Some(message) = queue.pop() {
            let _ = self.dr_tx.send(DeliveryReport {
                topic: topic.clone(),
                message,
                code,
            });
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("role", &self.role)
            .field("terminating", &self.is_terminating())
            .field("topic_cnt", &self.inner.read().topics.len())
            .finish()
    }
}
