//! Delivery events and the queue that collects them.
//!
//! Completion observers run on broker-client threads, so events are pushed
//! onto an unbounded lock-free channel and never block the sender. The
//! orchestrator drains the channel once, at report time.

use crate::broker::{BrokerError, DeliveryAck, PersistenceStatus};
use crate::utils::iso_now;
use crossbeam::channel::{self, Receiver, Sender};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryLevel {
    Success,
    Error,
}

/// Outcome of one send, as written to the delivery log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEvent {
    pub level: DeliveryLevel,
    pub scenario_id: String,
    pub trial_index: u32,
    pub message_key: String,
    pub partition: i32,
    pub offset: i64,
    pub iso_timestamp: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl DeliveryEvent {
    /// Classify a send outcome. `NotPersisted` acknowledgments and client
    /// errors are both error events.
    pub fn from_outcome(
        scenario_id: &str,
        trial_index: u32,
        key: &[u8],
        outcome: &Result<DeliveryAck, BrokerError>,
    ) -> Self {
        let (level, partition, offset, status, error_code, error_reason) = match outcome {
            Ok(ack) if ack.status == PersistenceStatus::NotPersisted => (
                DeliveryLevel::Error,
                ack.partition,
                ack.offset,
                ack.status.to_string(),
                Some("NOT_PERSISTED".to_string()),
                Some("broker did not persist the message".to_string()),
            ),
            Ok(ack) => (
                DeliveryLevel::Success,
                ack.partition,
                ack.offset,
                ack.status.to_string(),
                None,
                None,
            ),
            Err(e) => (
                DeliveryLevel::Error,
                -1,
                -1,
                "Failed".to_string(),
                Some(e.code()),
                Some(e.to_string()),
            ),
        };

        Self {
            level,
            scenario_id: scenario_id.to_string(),
            trial_index,
            message_key: String::from_utf8_lossy(key).into_owned(),
            partition,
            offset,
            iso_timestamp: iso_now(),
            status,
            error_code,
            error_reason,
        }
    }

    /// Error event for a message that failed to encode and never reached
    /// the client.
    pub fn encode_failure(scenario_id: &str, trial_index: u32, key: &[u8], reason: String) -> Self {
        Self {
            level: DeliveryLevel::Error,
            scenario_id: scenario_id.to_string(),
            trial_index,
            message_key: String::from_utf8_lossy(key).into_owned(),
            partition: -1,
            offset: -1,
            iso_timestamp: iso_now(),
            status: "Failed".to_string(),
            error_code: Some("ENCODE_FAILED".to_string()),
            error_reason: Some(reason),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == DeliveryLevel::Error
    }
}

/// Cheap handle for pushing events from any thread
#[derive(Debug, Clone)]
pub struct DeliverySink {
    tx: Sender<DeliveryEvent>,
}

impl DeliverySink {
    pub fn record(&self, event: DeliveryEvent) {
        // The receiver lives as long as the log; a send can only fail during
        // teardown, when the event is no longer wanted.
        let _ = self.tx.send(event);
    }
}

/// Append-only event queue shared by every trial of a suite run
#[derive(Debug)]
pub struct DeliveryLog {
    tx: Sender<DeliveryEvent>,
    rx: Receiver<DeliveryEvent>,
}

impl Default for DeliveryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryLog {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    pub fn sink(&self) -> DeliverySink {
        DeliverySink {
            tx: self.tx.clone(),
        }
    }

    /// Events queued and not yet drained
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Take every queued event, in completion order.
    pub fn drain(&self) -> Vec<DeliveryEvent> {
        self.rx.try_iter().collect()
    }
}
