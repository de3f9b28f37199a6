use crate::codec::ValueDecoder;
use crate::payload::BenchRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod loopback;

pub use loopback::{LoopbackBroker, LoopbackOptions};

/// Errors surfaced by a broker client
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// Delivery failed after the client's own retries
    #[error("transient delivery failure ({code}): {reason}")]
    Transient { code: String, reason: String },

    /// Outstanding sends did not complete before the drain deadline
    #[error("flush timed out with {pending} sends outstanding")]
    FlushTimeout { pending: u64 },

    #[error("unknown topic `{0}`")]
    UnknownTopic(String),

    #[error("client is closed")]
    Closed,
}

impl BrokerError {
    /// Short machine-readable code for delivery logs
    pub fn code(&self) -> String {
        match self {
            BrokerError::Transient { code, .. } => code.clone(),
            BrokerError::FlushTimeout { .. } => "FLUSH_TIMEOUT".to_string(),
            BrokerError::UnknownTopic(_) => "UNKNOWN_TOPIC".to_string(),
            BrokerError::Closed => "CLOSED".to_string(),
        }
    }
}

/// Persistence status reported with an acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistenceStatus {
    Persisted,
    PossiblyPersisted,
    NotPersisted,
}

impl fmt::Display for PersistenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceStatus::Persisted => f.write_str("Persisted"),
            PersistenceStatus::PossiblyPersisted => f.write_str("PossiblyPersisted"),
            PersistenceStatus::NotPersisted => f.write_str("NotPersisted"),
        }
    }
}

/// Acknowledgment of one send with its log coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryAck {
    pub status: PersistenceStatus,
    pub partition: i32,
    pub offset: i64,
}

impl DeliveryAck {
    pub fn is_persisted(&self) -> bool {
        self.status != PersistenceStatus::NotPersisted
    }
}

/// Completion observer for fire-and-forget sends.
///
/// Called exactly once, on a thread owned by the client.
pub type DeliveryObserver = Box<dyn FnOnce(Result<DeliveryAck, BrokerError>) + Send + 'static>;

#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub topic: String,
    pub group_id: String,
    pub start_at_earliest: bool,
    pub auto_commit: bool,
    /// Report partition-end events from poll
    pub partition_eof: bool,
}

impl SubscribeOptions {
    /// Options every benchmark consumer uses: earliest offset, manual commits,
    /// partition-end events on.
    pub fn benchmark(topic: &str, group_id: &str) -> Self {
        Self {
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            start_at_earliest: true,
            auto_commit: false,
            partition_eof: true,
        }
    }
}

/// A decoded record with its coordinates
#[derive(Debug, Clone)]
pub struct ConsumedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Vec<u8>,
    pub value: BenchRecord,
    pub raw_len: usize,
}

/// Result of a single poll
#[derive(Debug)]
pub enum PollOutcome {
    Record(ConsumedRecord),
    /// Caught up with the end of a partition
    PartitionEof { partition: i32, offset: i64 },
    /// Nothing arrived within the poll timeout
    Empty,
    /// A record arrived but could not be decoded; the position moves past it
    DecodeFailed { offset: i64, reason: String },
}

/// Producer side of the client capability surface, plus the entry point for
/// creating subscriptions.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Enqueue a send without waiting. The observer fires on completion.
    fn produce(
        &self,
        topic: &str,
        key: Vec<u8>,
        value: Vec<u8>,
        observer: DeliveryObserver,
    ) -> Result<(), BrokerError>;

    /// Send and wait for the acknowledgment.
    async fn produce_and_await(
        &self,
        topic: &str,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> Result<DeliveryAck, BrokerError>;

    /// Wait until all outstanding sends have completed, up to `timeout`.
    async fn drain(&self, timeout: Duration) -> Result<(), BrokerError>;

    async fn subscribe(
        &self,
        options: SubscribeOptions,
        decoder: Arc<dyn ValueDecoder>,
    ) -> Result<Box<dyn ConsumerClient>, BrokerError>;

    fn name(&self) -> &'static str;
}

/// One subscription
#[async_trait]
pub trait ConsumerClient: Send {
    async fn poll(&mut self, timeout: Duration) -> Result<PollOutcome, BrokerError>;

    /// Synchronously commit one record's offset, or all current positions
    /// when `record` is `None`.
    async fn commit(&mut self, record: Option<&ConsumedRecord>) -> Result<(), BrokerError>;

    async fn close(&mut self) -> Result<(), BrokerError>;
}
