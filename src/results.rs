use crate::metrics::{BatchSummary, LatencyMetrics};
use crate::scenario::{RecordType, Scenario, ScenarioId, ScenarioKind};
use crate::timeseries::Sample;
use crate::utils::MIB;
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Metrics of one completed trial.
///
/// Built by a runner when the trial ends and never changed afterwards. All
/// rates are derived from the stored fields on demand.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub scenario_id: ScenarioId,
    pub scenario_name: String,
    pub trial_index: u32,
    pub kind: ScenarioKind,
    /// Send mode or commit mode label
    pub mode: String,
    pub record_type: RecordType,
    pub window_size: usize,
    pub messages_processed: u64,
    pub total_bytes: u64,
    #[serde(rename = "elapsedMs", serialize_with = "serialize_ms")]
    pub elapsed: Duration,
    pub peak_cpu_percent: f64,
    pub peak_memory_bytes: u64,
    pub failure_count: u64,
    pub samples: Vec<Sample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_latency: Option<LatencyMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batches: Option<BatchSummary>,
}

fn serialize_ms<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// Shortest elapsed time a record reports
const MIN_ELAPSED: Duration = Duration::from_micros(1);

impl RunRecord {
    /// An empty record carrying the scenario's labels.
    pub fn for_scenario(scenario: &Scenario, trial_index: u32) -> Self {
        Self {
            scenario_id: scenario.id.clone(),
            scenario_name: scenario.name.clone(),
            trial_index,
            kind: scenario.kind(),
            mode: scenario.mode_label().to_string(),
            record_type: scenario.record_type,
            window_size: scenario.window_size,
            messages_processed: 0,
            total_bytes: 0,
            elapsed: MIN_ELAPSED,
            peak_cpu_percent: 0.0,
            peak_memory_bytes: 0,
            failure_count: 0,
            samples: Vec::new(),
            ack_latency: None,
            batches: None,
        }
    }

    /// Record for a trial that could not start.
    pub fn setup_failure(scenario: &Scenario, trial_index: u32, elapsed: Duration) -> Self {
        let mut record = Self::for_scenario(scenario, trial_index);
        record.elapsed = elapsed.max(MIN_ELAPSED);
        record.failure_count = 1;
        record
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    pub fn messages_per_second(&self) -> f64 {
        rate(self.messages_processed as f64, self.elapsed.as_secs_f64())
    }

    pub fn megabytes_per_second(&self) -> f64 {
        rate(self.total_bytes as f64 / MIB, self.elapsed.as_secs_f64())
    }

    /// Wall time per message in milliseconds
    pub fn mean_latency_ms(&self) -> f64 {
        mean_latency(self.elapsed_ms(), self.messages_processed as f64)
    }

    pub fn peak_memory_mb(&self) -> f64 {
        self.peak_memory_bytes as f64 / MIB
    }
}

fn rate(amount: f64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        amount / seconds
    } else {
        0.0
    }
}

fn mean_latency(elapsed_ms: f64, messages: f64) -> f64 {
    if messages > 0.0 {
        elapsed_ms / messages
    } else {
        0.0
    }
}

/// Per-scenario arithmetic mean over all trials
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageRecord {
    pub scenario_id: ScenarioId,
    pub scenario_name: String,
    pub kind: ScenarioKind,
    pub mode: String,
    pub record_type: RecordType,
    pub window_size: usize,
    pub trials: usize,
    pub messages_processed: f64,
    pub total_bytes: f64,
    pub elapsed_ms: f64,
    pub peak_cpu_percent: f64,
    pub peak_memory_bytes: f64,
    pub failure_count: f64,
}

impl AverageRecord {
    fn from_runs(runs: &[&RunRecord]) -> Option<Self> {
        let first = runs.first()?;
        let n = runs.len() as f64;
        let mean = |f: fn(&RunRecord) -> f64| runs.iter().map(|r| f(r)).sum::<f64>() / n;

        Some(Self {
            scenario_id: first.scenario_id.clone(),
            scenario_name: first.scenario_name.clone(),
            kind: first.kind,
            mode: first.mode.clone(),
            record_type: first.record_type,
            window_size: first.window_size,
            trials: runs.len(),
            messages_processed: mean(|r| r.messages_processed as f64),
            total_bytes: mean(|r| r.total_bytes as f64),
            elapsed_ms: mean(|r| r.elapsed_ms()),
            peak_cpu_percent: mean(|r| r.peak_cpu_percent),
            peak_memory_bytes: mean(|r| r.peak_memory_bytes as f64),
            failure_count: mean(|r| r.failure_count as f64),
        })
    }

    pub fn messages_per_second(&self) -> f64 {
        rate(self.messages_processed, self.elapsed_ms / 1000.0)
    }

    pub fn megabytes_per_second(&self) -> f64 {
        rate(self.total_bytes / MIB, self.elapsed_ms / 1000.0)
    }

    pub fn mean_latency_ms(&self) -> f64 {
        mean_latency(self.elapsed_ms, self.messages_processed)
    }

    pub fn peak_memory_mb(&self) -> f64 {
        self.peak_memory_bytes / MIB
    }
}

/// Owns every RunRecord of a suite run, in completion order
#[derive(Debug, Default)]
pub struct SuiteAggregator {
    runs: Vec<RunRecord>,
}

impl SuiteAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: RunRecord) {
        self.runs.push(record);
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn runs_for(&self, id: &ScenarioId) -> Vec<&RunRecord> {
        self.runs.iter().filter(|r| &r.scenario_id == id).collect()
    }

    pub fn average_for(&self, id: &ScenarioId) -> Option<AverageRecord> {
        AverageRecord::from_runs(&self.runs_for(id))
    }

    /// One average per scenario, ordered by id.
    pub fn averages(&self) -> Vec<AverageRecord> {
        let mut ids: Vec<&ScenarioId> = Vec::new();
        for run in &self.runs {
            if !ids.contains(&&run.scenario_id) {
                ids.push(&run.scenario_id);
            }
        }
        // Stable sort keeps first-seen order for equal ids.
        ids.sort();
        ids.into_iter().filter_map(|id| self.average_for(id)).collect()
    }

    pub fn total_failures(&self) -> u64 {
        self.runs.iter().map(|r| r.failure_count).sum()
    }
}
