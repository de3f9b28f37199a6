//! # Loopback Broker
//!
//! An in-process broker client that keeps every topic as a single in-memory
//! partition. Sends complete on spawned tasks after a configurable
//! acknowledgment latency, the way a real client completes them on its I/O
//! threads, and consumers replay what was written from offset 0.
//!
//! Deterministic fault injection makes the failure paths reproducible:
//!
//! - every `fail_every`-th send fails with `BrokerError::Transient`
//! - every `not_persisted_every`-th send is acknowledged as `NotPersisted`
//!
//! Neither kind of failed send is appended to the log. Commits are recorded
//! so callers can inspect how many were issued and at which position.

use super::{
    BrokerClient, BrokerError, ConsumedRecord, ConsumerClient, DeliveryAck, DeliveryObserver,
    PersistenceStatus, PollOutcome, SubscribeOptions,
};
use crate::codec::ValueDecoder;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

const PARTITION: i32 = 0;

#[derive(Debug, Clone)]
pub struct LoopbackOptions {
    /// Delay between a send and its acknowledgment
    pub ack_latency: Duration,
    /// Fail every Nth send (1-based) with a transient error
    pub fail_every: Option<u64>,
    /// Acknowledge every Nth send as not persisted
    pub not_persisted_every: Option<u64>,
    /// Create topics on first use; otherwise subscribing to an unknown
    /// topic fails
    pub auto_create_topics: bool,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            ack_latency: Duration::ZERO,
            fail_every: None,
            not_persisted_every: None,
            auto_create_topics: true,
        }
    }
}

/// A commit as recorded by the broker. `offset` is the next offset the group
/// would read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    pub topic: String,
    pub group_id: String,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Clone)]
struct StoredRecord {
    key: Arc<[u8]>,
    value: Arc<[u8]>,
}

struct Inner {
    options: LoopbackOptions,
    topics: Mutex<HashMap<String, Vec<StoredRecord>>>,
    commits: Mutex<Vec<CommitEntry>>,
    send_seq: AtomicU64,
    in_flight: AtomicU64,
    idle: Notify,
    appended: Notify,
    closed: AtomicBool,
}

impl Inner {
    /// Decide the fate of send number `seq`, wait out the ack latency and
    /// append on success.
    async fn complete(
        &self,
        seq: u64,
        topic: &str,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<DeliveryAck, BrokerError> {
        if !self.options.ack_latency.is_zero() {
            tokio::time::sleep(self.options.ack_latency).await;
        }

        if is_nth(seq, self.options.fail_every) {
            return Err(BrokerError::Transient {
                code: "REQUEST_TIMED_OUT".to_string(),
                reason: format!("injected failure on send {}", seq),
            });
        }
        if is_nth(seq, self.options.not_persisted_every) {
            return Ok(DeliveryAck {
                status: PersistenceStatus::NotPersisted,
                partition: PARTITION,
                offset: -1,
            });
        }

        let offset = self.append(topic, key, value);
        Ok(DeliveryAck {
            status: PersistenceStatus::Persisted,
            partition: PARTITION,
            offset,
        })
    }

    fn append(&self, topic: &str, key: Vec<u8>, value: Vec<u8>) -> i64 {
        let offset = {
            let mut topics = self.topics.lock();
            let log = topics.entry(topic.to_string()).or_default();
            log.push(StoredRecord {
                key: Arc::from(key),
                value: Arc::from(value),
            });
            (log.len() - 1) as i64
        };
        self.appended.notify_waiters();
        offset
    }

    fn begin_send(self: &Arc<Self>) -> Result<(u64, InFlightGuard), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        let seq = self.send_seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Ok((
            seq,
            InFlightGuard {
                inner: Arc::clone(self),
            },
        ))
    }
}

fn is_nth(seq: u64, every: Option<u64>) -> bool {
    matches!(every, Some(n) if n > 0 && seq % n == 0)
}

/// Decrements the in-flight count when a send finishes or is abandoned.
struct InFlightGuard {
    inner: Arc<Inner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// In-memory broker client. Cloning shares the same topics.
#[derive(Clone)]
pub struct LoopbackBroker {
    inner: Arc<Inner>,
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new(LoopbackOptions::default())
    }
}

impl LoopbackBroker {
    pub fn new(options: LoopbackOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                topics: Mutex::new(HashMap::new()),
                commits: Mutex::new(Vec::new()),
                send_seq: AtomicU64::new(0),
                in_flight: AtomicU64::new(0),
                idle: Notify::new(),
                appended: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn create_topic(&self, topic: &str) {
        self.inner.topics.lock().entry(topic.to_string()).or_default();
    }

    /// Append bytes as-is, bypassing acknowledgment and fault injection.
    pub fn inject_raw(&self, topic: &str, key: &[u8], value: &[u8]) -> i64 {
        self.inner.append(topic, key.to_vec(), value.to_vec())
    }

    pub fn topic_len(&self, topic: &str) -> usize {
        self.inner.topics.lock().get(topic).map_or(0, Vec::len)
    }

    pub fn in_flight(&self) -> u64 {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub fn commits_for_topic(&self, topic: &str) -> Vec<CommitEntry> {
        self.inner
            .commits
            .lock()
            .iter()
            .filter(|c| c.topic == topic)
            .cloned()
            .collect()
    }

    /// Stop accepting sends. Outstanding sends still complete.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

#[async_trait]
impl BrokerClient for LoopbackBroker {
    fn produce(
        &self,
        topic: &str,
        key: Vec<u8>,
        value: Vec<u8>,
        observer: DeliveryObserver,
    ) -> Result<(), BrokerError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| BrokerError::Transient {
            code: "NO_RUNTIME".to_string(),
            reason: e.to_string(),
        })?;
        let (seq, guard) = self.inner.begin_send()?;
        let inner = Arc::clone(&self.inner);
        let topic = topic.to_string();

        handle.spawn(async move {
            let result = inner.complete(seq, &topic, key, value).await;
            observer(result);
            // The observer has run before the send stops counting as in flight.
            drop(guard);
        });
        Ok(())
    }

    async fn produce_and_await(
        &self,
        topic: &str,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<DeliveryAck, BrokerError> {
        let (seq, _guard) = self.inner.begin_send()?;
        self.inner.complete(seq, topic, key, value).await
    }

    async fn drain(&self, timeout: Duration) -> Result<(), BrokerError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.in_flight.load(Ordering::Acquire) == 0 {
                return Ok(());
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let pending = self.inner.in_flight.load(Ordering::Acquire);
                if pending == 0 {
                    return Ok(());
                }
                return Err(BrokerError::FlushTimeout { pending });
            }
        }
    }

    async fn subscribe(
        &self,
        options: SubscribeOptions,
        decoder: Arc<dyn ValueDecoder>,
    ) -> Result<Box<dyn ConsumerClient>, BrokerError> {
        {
            let mut topics = self.inner.topics.lock();
            if !topics.contains_key(&options.topic) {
                if !self.inner.options.auto_create_topics {
                    return Err(BrokerError::UnknownTopic(options.topic));
                }
                topics.insert(options.topic.clone(), Vec::new());
            }
        }

        let start = if options.start_at_earliest {
            0
        } else {
            self.topic_len(&options.topic) as i64
        };
        debug!(
            "loopback: group {} subscribed to {} at offset {}",
            options.group_id, options.topic, start
        );

        Ok(Box::new(LoopbackConsumer {
            inner: Arc::clone(&self.inner),
            options,
            decoder,
            position: start,
            eof_reported: false,
            closed: false,
        }))
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}

struct LoopbackConsumer {
    inner: Arc<Inner>,
    options: SubscribeOptions,
    decoder: Arc<dyn ValueDecoder>,
    /// Next offset to read
    position: i64,
    eof_reported: bool,
    closed: bool,
}

impl LoopbackConsumer {
    fn next_stored(&self) -> Option<StoredRecord> {
        self.inner
            .topics
            .lock()
            .get(&self.options.topic)
            .and_then(|log| log.get(self.position as usize).cloned())
    }

    fn record_commit(&self, offset: i64) {
        trace!(
            "loopback: commit {}/{} -> {}",
            self.options.topic,
            self.options.group_id,
            offset
        );
        self.inner.commits.lock().push(CommitEntry {
            topic: self.options.topic.clone(),
            group_id: self.options.group_id.clone(),
            partition: PARTITION,
            offset,
        });
    }
}

#[async_trait]
impl ConsumerClient for LoopbackConsumer {
    async fn poll(&mut self, timeout: Duration) -> Result<PollOutcome, BrokerError> {
        if self.closed {
            return Err(BrokerError::Closed);
        }
        let deadline = Instant::now() + timeout;

        loop {
            let appended = self.inner.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(stored) = self.next_stored() {
                let offset = self.position;
                self.position += 1;
                self.eof_reported = false;

                return Ok(match self.decoder.decode(&stored.value) {
                    Ok(value) => PollOutcome::Record(ConsumedRecord {
                        topic: self.options.topic.clone(),
                        partition: PARTITION,
                        offset,
                        key: stored.key.to_vec(),
                        value,
                        raw_len: stored.value.len(),
                    }),
                    Err(e) => PollOutcome::DecodeFailed {
                        offset,
                        reason: e.to_string(),
                    },
                });
            }

            if self.options.partition_eof && !self.eof_reported {
                self.eof_reported = true;
                return Ok(PollOutcome::PartitionEof {
                    partition: PARTITION,
                    offset: self.position,
                });
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(PollOutcome::Empty);
            }
        }
    }

    async fn commit(&mut self, record: Option<&ConsumedRecord>) -> Result<(), BrokerError> {
        if self.closed {
            return Err(BrokerError::Closed);
        }
        let offset = match record {
            Some(r) => r.offset + 1,
            None => self.position,
        };
        self.record_commit(offset);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.closed = true;
        Ok(())
    }
}
