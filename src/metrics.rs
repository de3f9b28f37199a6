use hdrhistogram::{CreationError, Histogram};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Highest trackable acknowledgment latency, one hour in nanoseconds
const MAX_TRACKABLE_NS: u64 = 3_600_000_000_000;

/// Acknowledgment latency distribution of one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyMetrics {
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub total_samples: u64,
}

impl LatencyMetrics {
    pub fn mean_ms(&self) -> f64 {
        self.mean_ns / 1_000_000.0
    }
}

/// Latency collector using HDR histogram for accurate measurement
pub struct LatencyCollector {
    histogram: Histogram<u64>,
}

impl LatencyCollector {
    /// Create a collector with 3 significant figures
    pub fn new() -> Result<Self, CreationError> {
        let histogram = Histogram::<u64>::new_with_bounds(1, MAX_TRACKABLE_NS, 3)?;
        Ok(Self { histogram })
    }

    /// Record one acknowledgment latency. Values past the trackable range are
    /// clamped to it.
    pub fn record(&mut self, latency: Duration) {
        let ns = (latency.as_nanos() as u64).clamp(1, MAX_TRACKABLE_NS);
        self.histogram.saturating_record(ns);
    }

    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Summarize, or `None` when nothing was recorded
    pub fn metrics(&self) -> Option<LatencyMetrics> {
        if self.histogram.is_empty() {
            return None;
        }
        Some(LatencyMetrics {
            min_ns: self.histogram.min(),
            max_ns: self.histogram.max(),
            mean_ns: self.histogram.mean(),
            p50_ns: self.histogram.value_at_quantile(0.50),
            p95_ns: self.histogram.value_at_quantile(0.95),
            p99_ns: self.histogram.value_at_quantile(0.99),
            total_samples: self.histogram.len(),
        })
    }

    pub fn reset(&mut self) {
        self.histogram.reset();
    }
}

/// Sizes of the batches a windowed producer assembled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub count: u64,
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    /// Batches smaller than the window
    pub partial: u64,
}

#[derive(Debug, Clone)]
pub struct BatchStats {
    window_size: usize,
    sizes: Vec<usize>,
}

impl BatchStats {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            sizes: Vec::new(),
        }
    }

    pub fn record(&mut self, size: usize) {
        self.sizes.push(size);
    }

    pub fn summary(&self) -> Option<BatchSummary> {
        let min = *self.sizes.iter().min()?;
        let max = *self.sizes.iter().max()?;
        let total: usize = self.sizes.iter().sum();
        Some(BatchSummary {
            count: self.sizes.len() as u64,
            min,
            max,
            mean: total as f64 / self.sizes.len() as f64,
            partial: self.sizes.iter().filter(|&&s| s < self.window_size).count() as u64,
        })
    }
}
