//! # Scenario Matrix
//!
//! A scenario is one row of the benchmark matrix: a fixed combination of
//! pattern (how messages are produced or consumed), serialization format,
//! payload size and record type. The catalog enumerates every scenario the
//! configuration enables, in a deterministic order, and assigns each one a
//! short stable identifier such as `T3.2`.
//!
//! ## Canonical numbering
//!
//! | Prefix | Group                                   |
//! |--------|-----------------------------------------|
//! | `T1`   | producer, callback (fire-and-forget)    |
//! | `T2`   | producer, await each acknowledgment     |
//! | `T3`   | producer, bounded window                |
//! | `T4`   | producer, bounded window + arrival delay|
//! | `T5`   | consumer, per-message commit            |
//! | `T6`   | consumer, batched commit                |
//!
//! Within a group the order is format (binary, text) × size (small, large) ×
//! record type (binary only: specific, generic) × window size (window groups,
//! in configured order). Indices restart at 1 for every group.

use crate::config::SuiteConfig;
use crate::error::{BenchError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Serialization format of the message value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Format {
    /// Schema-framed binary records
    Binary,
    /// Schema-framed JSON records
    Text,
}

impl Format {
    pub const ALL: [Format; 2] = [Format::Binary, Format::Text];

    pub fn slug(&self) -> &'static str {
        match self {
            Format::Binary => "binary",
            Format::Text => "text",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Payload size class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayloadSize {
    Small,
    Large,
}

impl PayloadSize {
    pub const ALL: [PayloadSize; 2] = [PayloadSize::Small, PayloadSize::Large];

    pub fn slug(&self) -> &'static str {
        match self {
            PayloadSize::Small => "small",
            PayloadSize::Large => "large",
        }
    }
}

impl fmt::Display for PayloadSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// How binary records are materialized in memory before encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordType {
    /// Strongly typed structs generated from the schema
    Specific,
    /// Field-list records resolved by name at runtime
    Generic,
    /// Text format has no record-type distinction
    #[value(skip)]
    NotApplicable,
}

impl RecordType {
    pub const BINARY: [RecordType; 2] = [RecordType::Specific, RecordType::Generic];

    pub fn label(&self) -> &'static str {
        match self {
            RecordType::Specific => "specific",
            RecordType::Generic => "generic",
            RecordType::NotApplicable => "n/a",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Producer scheduling strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SendMode {
    Callback,
    AwaitEach,
    Window,
}

impl SendMode {
    pub fn label(&self) -> &'static str {
        match self {
            SendMode::Callback => "callback",
            SendMode::AwaitEach => "awaitEach",
            SendMode::Window => "window",
        }
    }
}

/// Consumer offset-commit discipline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommitMode {
    PerMessage,
    Batched,
}

impl CommitMode {
    pub fn label(&self) -> &'static str {
        match self {
            CommitMode::PerMessage => "perMessage",
            CommitMode::Batched => "batched",
        }
    }
}

/// The single mode a scenario runs with. Producers carry exactly one send
/// mode and consumers exactly one commit mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Pattern {
    Produce(SendMode),
    Consume(CommitMode),
}

impl Pattern {
    pub fn kind(&self) -> ScenarioKind {
        match self {
            Pattern::Produce(_) => ScenarioKind::Producer,
            Pattern::Consume(_) => ScenarioKind::Consumer,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Pattern::Produce(mode) => mode.label(),
            Pattern::Consume(mode) => mode.label(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScenarioKind {
    Producer,
    Consumer,
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioKind::Producer => f.write_str("producer"),
            ScenarioKind::Consumer => f.write_str("consumer"),
        }
    }
}

/// Pattern groups of the matrix, in canonical execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScenarioGroup {
    Callback,
    AwaitEach,
    Window,
    WindowArrival,
    ConsumePerMessage,
    ConsumeBatched,
}

impl ScenarioGroup {
    pub const ALL: [ScenarioGroup; 6] = [
        ScenarioGroup::Callback,
        ScenarioGroup::AwaitEach,
        ScenarioGroup::Window,
        ScenarioGroup::WindowArrival,
        ScenarioGroup::ConsumePerMessage,
        ScenarioGroup::ConsumeBatched,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            ScenarioGroup::Callback => "T1",
            ScenarioGroup::AwaitEach => "T2",
            ScenarioGroup::Window => "T3",
            ScenarioGroup::WindowArrival => "T4",
            ScenarioGroup::ConsumePerMessage => "T5",
            ScenarioGroup::ConsumeBatched => "T6",
        }
    }

    pub fn pattern(&self) -> Pattern {
        match self {
            ScenarioGroup::Callback => Pattern::Produce(SendMode::Callback),
            ScenarioGroup::AwaitEach => Pattern::Produce(SendMode::AwaitEach),
            ScenarioGroup::Window | ScenarioGroup::WindowArrival => {
                Pattern::Produce(SendMode::Window)
            }
            ScenarioGroup::ConsumePerMessage => Pattern::Consume(CommitMode::PerMessage),
            ScenarioGroup::ConsumeBatched => Pattern::Consume(CommitMode::Batched),
        }
    }

    pub fn is_windowed(&self) -> bool {
        matches!(self, ScenarioGroup::Window | ScenarioGroup::WindowArrival)
    }

    fn describe(&self, window_size: usize, arrival_delay: Duration) -> String {
        match self {
            ScenarioGroup::Callback => "Produce (callback)".to_string(),
            ScenarioGroup::AwaitEach => "Produce (await each)".to_string(),
            ScenarioGroup::Window => format!("Produce (window {})", window_size),
            ScenarioGroup::WindowArrival => format!(
                "Produce (window {}, {}ms arrival)",
                window_size,
                arrival_delay.as_millis()
            ),
            ScenarioGroup::ConsumePerMessage => "Consume (per-message commit)".to_string(),
            ScenarioGroup::ConsumeBatched => "Consume (batched commit)".to_string(),
        }
    }
}

/// Short stable identifier of a scenario, e.g. `T1.3`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(String);

impl ScenarioId {
    pub fn new(prefix: &str, index: u32) -> Self {
        Self(format!("{}.{}", prefix, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into the group prefix and the numeric index (`T1.3` → `("T1", 3)`).
    pub fn parts(&self) -> Option<(&str, u32)> {
        let (prefix, index) = self.0.rsplit_once('.')?;
        Some((prefix, index.parse().ok()?))
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScenarioId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One fully parameterized row of the matrix. Immutable once the catalog
/// has been built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: ScenarioId,
    pub name: String,
    pub group: ScenarioGroup,
    pub pattern: Pattern,
    pub format: Format,
    pub size: PayloadSize,
    pub record_type: RecordType,
    pub topic: String,
    pub message_count: u64,
    #[serde(rename = "durationMs", with = "crate::config::option_duration_ms")]
    pub duration: Option<Duration>,
    pub trials: u32,
    /// Maximum in-flight sends; non-zero only for windowed scenarios.
    pub window_size: usize,
    /// Assembly deadline for one window; zero outside windowed scenarios.
    #[serde(rename = "batchTimeoutMs", with = "crate::config::duration_ms")]
    pub batch_timeout: Duration,
    /// Commit every N records; non-zero only for batched consumers.
    pub commit_batch_size: u64,
    /// Commit when this much time passed since the last commit; batched only.
    #[serde(rename = "commitIntervalMs", with = "crate::config::duration_ms")]
    pub commit_interval: Duration,
    #[serde(rename = "interMessageDelayMs", with = "crate::config::duration_ms")]
    pub inter_message_delay: Duration,
}

impl Scenario {
    pub fn kind(&self) -> ScenarioKind {
        self.pattern.kind()
    }

    pub fn mode_label(&self) -> &'static str {
        self.pattern.label()
    }

    pub fn send_mode(&self) -> Option<SendMode> {
        match self.pattern {
            Pattern::Produce(mode) => Some(mode),
            Pattern::Consume(_) => None,
        }
    }

    pub fn commit_mode(&self) -> Option<CommitMode> {
        match self.pattern {
            Pattern::Consume(mode) => Some(mode),
            Pattern::Produce(_) => None,
        }
    }

    /// True when only the message count can end a trial.
    pub fn is_count_only(&self) -> bool {
        self.duration.is_none()
    }
}

/// Topic holding records of one (format, size, record type) combination.
pub fn topic_name(prefix: &str, format: Format, size: PayloadSize, record_type: RecordType) -> String {
    match record_type {
        RecordType::NotApplicable => format!("{}.{}.{}", prefix, format.slug(), size.slug()),
        rt => format!("{}.{}.{}.{}", prefix, format.slug(), size.slug(), rt.label()),
    }
}

/// The ordered scenario matrix for one configuration.
#[derive(Clone, Debug)]
pub struct ScenarioCatalog {
    scenarios: Vec<Scenario>,
}

impl ScenarioCatalog {
    pub fn new(config: &SuiteConfig) -> Result<Self> {
        Ok(Self {
            scenarios: Self::enumerate(config)?,
        })
    }

    /// Enumerate the full matrix enabled by `config`.
    ///
    /// Fails with `ConfigInvalid` when a cap is zero, when an enabled group
    /// has no format/size combination, or when a windowed group has no
    /// window sizes.
    pub fn enumerate(config: &SuiteConfig) -> Result<Vec<Scenario>> {
        config.validate()?;

        let combinations = format_combinations(config);
        let mut scenarios = Vec::new();

        for group in ScenarioGroup::ALL {
            if !config.groups.contains(&group) {
                continue;
            }
            if combinations.is_empty() {
                return Err(BenchError::ConfigInvalid(format!(
                    "group {} ({}) has no matching format/size combinations",
                    group.prefix(),
                    group.describe(0, Duration::ZERO)
                )));
            }

            let windows: Vec<usize> = if group.is_windowed() {
                config.window_sizes.clone()
            } else {
                vec![0]
            };

            let mut index = 0u32;
            for &(format, size, record_type) in &combinations {
                for &window_size in &windows {
                    index += 1;
                    scenarios.push(build_scenario(
                        config,
                        group,
                        index,
                        format,
                        size,
                        record_type,
                        window_size,
                    ));
                }
            }
        }

        Ok(scenarios)
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn get(&self, id: &ScenarioId) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| &s.id == id)
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

fn format_combinations(config: &SuiteConfig) -> Vec<(Format, PayloadSize, RecordType)> {
    let mut out = Vec::new();
    for format in Format::ALL {
        if !config.formats.contains(&format) {
            continue;
        }
        for size in PayloadSize::ALL {
            if !config.sizes.contains(&size) {
                continue;
            }
            match format {
                Format::Binary => {
                    for record_type in RecordType::BINARY {
                        if config.record_types.contains(&record_type) {
                            out.push((format, size, record_type));
                        }
                    }
                }
                Format::Text => out.push((format, size, RecordType::NotApplicable)),
            }
        }
    }
    out
}

fn build_scenario(
    config: &SuiteConfig,
    group: ScenarioGroup,
    index: u32,
    format: Format,
    size: PayloadSize,
    record_type: RecordType,
    window_size: usize,
) -> Scenario {
    let pattern = group.pattern();
    let arrival_delay = if group == ScenarioGroup::WindowArrival {
        config.arrival_delay
    } else {
        Duration::ZERO
    };

    let mut name = format!("{} {}/{}", group.describe(window_size, arrival_delay), format, size);
    if record_type != RecordType::NotApplicable {
        name.push('/');
        name.push_str(record_type.label());
    }

    let (trials, commit_batch_size, commit_interval) = match pattern {
        Pattern::Produce(_) => (config.producer_trials, 0, Duration::ZERO),
        Pattern::Consume(CommitMode::PerMessage) => (config.consumer_trials, 0, Duration::ZERO),
        Pattern::Consume(CommitMode::Batched) => (
            config.consumer_trials,
            config.commit_batch_size,
            config.commit_interval,
        ),
    };

    Scenario {
        id: ScenarioId::new(group.prefix(), index),
        name,
        group,
        pattern,
        format,
        size,
        record_type,
        topic: topic_name(&config.topic_prefix, format, size, record_type),
        message_count: config.message_count,
        duration: config.duration,
        trials,
        window_size,
        batch_timeout: if group.is_windowed() {
            config.batch_timeout
        } else {
            Duration::ZERO
        },
        commit_batch_size,
        commit_interval,
        inter_message_delay: arrival_delay,
    }
}
