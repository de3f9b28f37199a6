//! Suite configuration.
//!
//! `SuiteConfig` is built once at start-up by layering built-in defaults, an
//! optional JSON file and command-line overrides. It is never mutated after
//! the catalog has been enumerated from it.

use crate::defaults;
use crate::error::{BenchError, Result};
use crate::scenario::{Format, PayloadSize, RecordType, ScenarioGroup, ScenarioKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// The immutable configuration record the catalog is enumerated from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteConfig {
    pub message_count: u64,
    #[serde(rename = "durationMs", with = "option_duration_ms")]
    pub duration: Option<Duration>,
    pub producer_trials: u32,
    pub consumer_trials: u32,
    pub window_sizes: Vec<usize>,
    #[serde(rename = "batchTimeoutMs", with = "duration_ms")]
    pub batch_timeout: Duration,
    pub commit_batch_size: u64,
    #[serde(rename = "commitIntervalMs", with = "duration_ms")]
    pub commit_interval: Duration,
    #[serde(rename = "arrivalDelayMs", with = "duration_ms")]
    pub arrival_delay: Duration,
    pub topic_prefix: String,
    pub groups: Vec<ScenarioGroup>,
    pub formats: Vec<Format>,
    pub sizes: Vec<PayloadSize>,
    /// Record types used for the binary format.
    pub record_types: Vec<RecordType>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            message_count: defaults::MSG_COUNT,
            duration: None,
            producer_trials: defaults::PRODUCER_TRIALS,
            consumer_trials: defaults::CONSUMER_TRIALS,
            window_sizes: defaults::WINDOW_SIZES.to_vec(),
            batch_timeout: defaults::BATCH_TIMEOUT,
            commit_batch_size: defaults::COMMIT_BATCH_SIZE,
            commit_interval: defaults::COMMIT_INTERVAL,
            arrival_delay: defaults::ARRIVAL_DELAY,
            topic_prefix: defaults::TOPIC_PREFIX.to_string(),
            groups: ScenarioGroup::ALL.to_vec(),
            formats: Format::ALL.to_vec(),
            sizes: PayloadSize::ALL.to_vec(),
            record_types: RecordType::BINARY.to_vec(),
        }
    }
}

impl SuiteConfig {
    /// Check every constraint the matrix relies on.
    ///
    /// Per-group constraints only apply when the group is enabled, so a suite
    /// restricted to consumers does not need window sizes.
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return invalid("no scenario groups are enabled");
        }
        if self.message_count == 0 {
            return invalid("message count must be greater than zero");
        }
        if self.duration == Some(Duration::ZERO) {
            return invalid("duration cap must be greater than zero when set");
        }
        if self.topic_prefix.trim().is_empty() {
            return invalid("topic prefix must not be empty");
        }
        if self.record_types.contains(&RecordType::NotApplicable) {
            return invalid("record types must be `specific` or `generic`");
        }

        let has_kind = |kind: ScenarioKind| self.groups.iter().any(|g| g.pattern().kind() == kind);
        if has_kind(ScenarioKind::Producer) && self.producer_trials == 0 {
            return invalid("producer trials must be greater than zero");
        }
        if has_kind(ScenarioKind::Consumer) && self.consumer_trials == 0 {
            return invalid("consumer trials must be greater than zero");
        }

        if self.groups.iter().any(|g| g.is_windowed()) {
            if self.window_sizes.is_empty() {
                return invalid("window sizes must not be empty for windowed groups");
            }
            if self.window_sizes.contains(&0) {
                return invalid("window sizes must be greater than zero");
            }
            if self.batch_timeout.is_zero() {
                return invalid("batch timeout must be greater than zero");
            }
        }

        if self.groups.contains(&ScenarioGroup::WindowArrival) && self.arrival_delay.is_zero() {
            return invalid("arrival delay must be greater than zero for the arrival-delay group");
        }

        if self.groups.contains(&ScenarioGroup::ConsumeBatched) {
            if self.commit_batch_size == 0 {
                return invalid("commit batch size must be greater than zero");
            }
            if self.commit_interval.is_zero() {
                return invalid("commit interval must be greater than zero");
            }
        }

        Ok(())
    }

    /// Overlay the values present in a config file.
    pub fn apply_file(mut self, file: SuiteConfigFile) -> Self {
        if let Some(v) = file.message_count {
            self.message_count = v;
        }
        if let Some(ms) = file.duration_ms {
            self.duration = Some(Duration::from_millis(ms));
        }
        if let Some(v) = file.producer_trials {
            self.producer_trials = v;
        }
        if let Some(v) = file.consumer_trials {
            self.consumer_trials = v;
        }
        if let Some(v) = file.window_sizes {
            self.window_sizes = v;
        }
        if let Some(ms) = file.batch_timeout_ms {
            self.batch_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = file.commit_batch_size {
            self.commit_batch_size = v;
        }
        if let Some(ms) = file.commit_interval_ms {
            self.commit_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.arrival_delay_ms {
            self.arrival_delay = Duration::from_millis(ms);
        }
        if let Some(v) = file.topic_prefix {
            self.topic_prefix = v;
        }
        if let Some(v) = file.groups {
            self.groups = v;
        }
        if let Some(v) = file.formats {
            self.formats = v;
        }
        if let Some(v) = file.sizes {
            self.sizes = v;
        }
        if let Some(v) = file.record_types {
            self.record_types = v;
        }
        self
    }
}

fn invalid(msg: &str) -> Result<()> {
    Err(BenchError::ConfigInvalid(msg.to_string()))
}

/// Partial configuration as read from a JSON file. Every key is optional.
///
/// ```json
/// { "messageCount": 5000, "windowSizes": [10, 50], "batchTimeoutMs": 250 }
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SuiteConfigFile {
    pub message_count: Option<u64>,
    pub duration_ms: Option<u64>,
    pub producer_trials: Option<u32>,
    pub consumer_trials: Option<u32>,
    pub window_sizes: Option<Vec<usize>>,
    pub batch_timeout_ms: Option<u64>,
    pub commit_batch_size: Option<u64>,
    pub commit_interval_ms: Option<u64>,
    pub arrival_delay_ms: Option<u64>,
    pub topic_prefix: Option<String>,
    pub groups: Option<Vec<ScenarioGroup>>,
    pub formats: Option<Vec<Format>>,
    pub sizes: Option<Vec<PayloadSize>>,
    pub record_types: Option<Vec<RecordType>>,
}

impl SuiteConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            BenchError::ConfigInvalid(format!("{}: {}", path.display(), e))
        })
    }
}

impl fmt::Display for SuiteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |items: Vec<String>| items.join(", ");

        writeln!(f, "-----------------------------------------------------------------")?;
        writeln!(f, "Broker Benchmark Suite")?;
        writeln!(f, "  Message Count:      {}", self.message_count)?;
        match self.duration {
            Some(d) => writeln!(f, "  Duration Cap:       {:?}", d)?,
            None => writeln!(f, "  Duration Cap:       Not set (count only)")?,
        }
        writeln!(
            f,
            "  Trials:             {} producer / {} consumer",
            self.producer_trials, self.consumer_trials
        )?;
        writeln!(
            f,
            "  Groups:             {}",
            join(self.groups.iter().map(|g| g.prefix().to_string()).collect())
        )?;
        writeln!(
            f,
            "  Formats:            {}",
            join(self.formats.iter().map(|v| v.to_string()).collect())
        )?;
        writeln!(
            f,
            "  Sizes:              {}",
            join(self.sizes.iter().map(|v| v.to_string()).collect())
        )?;
        writeln!(
            f,
            "  Record Types:       {}",
            join(self.record_types.iter().map(|v| v.to_string()).collect())
        )?;
        writeln!(f, "  Window Sizes:       {:?}", self.window_sizes)?;
        writeln!(f, "  Batch Timeout:      {:?}", self.batch_timeout)?;
        writeln!(f, "  Arrival Delay:      {:?}", self.arrival_delay)?;
        writeln!(
            f,
            "  Commit Batch:       {} records or {:?}",
            self.commit_batch_size, self.commit_interval
        )?;
        writeln!(f, "  Topic Prefix:       {}", self.topic_prefix)?;
        write!(f, "-----------------------------------------------------------------")
    }
}

/// Serialize a `Duration` as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

pub mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
