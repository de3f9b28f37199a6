//! # Trial Runners
//!
//! A runner executes one trial of one scenario against a broker client and
//! always returns a `RunRecord`. Broker failures are counted, never thrown;
//! a trial that cannot even start yields a record with a single failure and
//! no messages.
//!
//! - [`ProducerRunner`] implements the callback, await-each and windowed
//!   send modes.
//! - [`ConsumerRunner`] implements the poll loop with per-message and
//!   batched commits.
//!
//! Both share the termination cap and the progress cadence defined here.

pub mod consumer;
pub mod producer;

pub use consumer::ConsumerRunner;
pub use producer::ProducerRunner;

use crate::defaults;
use crate::scenario::Scenario;
use std::time::Duration;

/// Progress callback: `(cumulative messages, elapsed)`, invoked at most once
/// per progress interval.
pub type ProgressFn<'a> = &'a mut (dyn FnMut(u64, Duration) + Send);

/// When a trial stops: on the message count, or on the duration if one is
/// set and it elapses first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationCap {
    pub message_count: u64,
    pub duration: Option<Duration>,
}

impl TerminationCap {
    pub fn for_scenario(scenario: &Scenario) -> Self {
        Self {
            message_count: scenario.message_count,
            duration: scenario.duration,
        }
    }

    pub fn reached(&self, processed: u64, elapsed: Duration) -> bool {
        processed >= self.message_count || self.duration.map_or(false, |d| elapsed >= d)
    }

    pub fn remaining(&self, processed: u64) -> u64 {
        self.message_count.saturating_sub(processed)
    }

    /// Time left before the duration cap, if there is one.
    pub fn time_left(&self, elapsed: Duration) -> Option<Duration> {
        self.duration.map(|d| d.saturating_sub(elapsed))
    }
}

/// Tunables shared by both runners.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Upper bound on the post-loop drain of outstanding sends
    pub drain_timeout: Duration,
    pub poll_timeout: Duration,
    pub progress_interval: Duration,
    pub sample_interval: Duration,
    /// A consumer trial aborts once decode failures exceed this
    pub max_decode_failures: u64,
    /// Per-message framing overhead added to producer byte estimates
    pub framing_overhead: u64,
    pub group_prefix: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            drain_timeout: defaults::DRAIN_TIMEOUT,
            poll_timeout: defaults::POLL_TIMEOUT,
            progress_interval: defaults::PROGRESS_INTERVAL,
            sample_interval: defaults::SAMPLE_INTERVAL,
            max_decode_failures: defaults::MAX_DECODE_FAILURES,
            framing_overhead: defaults::FRAMING_OVERHEAD,
            group_prefix: defaults::GROUP_PREFIX.to_string(),
        }
    }
}
