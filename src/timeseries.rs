//! Per-trial cumulative message counts sampled at roughly one hertz.

use crate::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One point of the time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub elapsed_seconds: f64,
    pub cumulative_messages: u64,
}

/// Collects samples while a trial runs.
///
/// `tick` appends at most once per interval, so it can be called from every
/// iteration of a send or poll loop. Elapsed time is strictly increasing and
/// cumulative counts never decrease across the recorded samples.
#[derive(Debug, Clone)]
pub struct TimeSeriesRecorder {
    interval: Duration,
    samples: Vec<Sample>,
    last_elapsed: Option<Duration>,
}

impl Default for TimeSeriesRecorder {
    fn default() -> Self {
        Self::new(defaults::PROGRESS_INTERVAL)
    }
}

impl TimeSeriesRecorder {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            samples: Vec::new(),
            last_elapsed: None,
        }
    }

    /// Record `cumulative` at `elapsed` if the interval has passed since the
    /// last sample. Returns whether a sample was appended; callers use that
    /// to drive their own progress output at the same cadence.
    pub fn tick(&mut self, cumulative: u64, elapsed: Duration) -> bool {
        let due = match self.last_elapsed {
            None => true,
            Some(last) => elapsed >= last + self.interval,
        };
        if due {
            self.push(cumulative, elapsed);
        }
        due
    }

    /// Append a closing sample unless one already exists at this instant.
    pub fn finish(mut self, cumulative: u64, elapsed: Duration) -> Vec<Sample> {
        let newer = self.last_elapsed.map_or(true, |last| elapsed > last);
        if newer {
            self.push(cumulative, elapsed);
        }
        self.samples
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    fn push(&mut self, cumulative: u64, elapsed: Duration) {
        let floor = self.samples.last().map_or(0, |s| s.cumulative_messages);
        self.samples.push(Sample {
            elapsed_seconds: elapsed.as_secs_f64(),
            cumulative_messages: cumulative.max(floor),
        });
        self.last_elapsed = Some(elapsed);
    }
}
