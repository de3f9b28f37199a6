use crate::broker::loopback::LoopbackOptions;
use crate::config::{SuiteConfig, SuiteConfigFile};
use crate::error::Result;
use crate::filter::ScenarioFilter;
use crate::scenario::{Format, PayloadSize, RecordType, ScenarioGroup, ScenarioKind};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Broker Benchmark Suite - throughput and resource usage of message-broker
/// producer and consumer patterns
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Scenarios to run: an id (T1.3), a range (T3.1-T3.4 or T3.1-4) or a comma-separated list
    #[clap(long = "test", help_heading = "Selection")]
    pub test: Option<String>,

    /// Run only producer or only consumer scenarios
    #[clap(long, value_enum, help_heading = "Selection")]
    pub kind: Option<ScenarioKind>,

    /// List the selected scenarios and exit
    #[clap(long, default_value_t = false, help_heading = "Selection")]
    pub list: bool,

    /// Duration cap per trial; the message count still applies
    #[clap(short = 'd', long, value_parser = parse_duration, help_heading = "Termination")]
    pub duration: Option<Duration>,

    /// Message count cap per trial
    #[clap(short = 'n', long, help_heading = "Termination")]
    pub msg_count: Option<u64>,

    /// Trials per producer scenario
    #[clap(long, help_heading = "Termination")]
    pub producer_trials: Option<u32>,

    /// Trials per consumer scenario
    #[clap(long, help_heading = "Termination")]
    pub consumer_trials: Option<u32>,

    /// Window sizes for the windowed groups (comma-separated)
    #[clap(long, value_delimiter = ',', num_args = 1.., help_heading = "Matrix")]
    pub window_sizes: Option<Vec<usize>>,

    /// Upper bound on assembling one concurrency window
    #[clap(long, value_parser = parse_duration, help_heading = "Matrix")]
    pub batch_timeout: Option<Duration>,

    /// Records per batched consumer commit
    #[clap(long, help_heading = "Matrix")]
    pub commit_batch_size: Option<u64>,

    /// Maximum time between batched consumer commits
    #[clap(long, value_parser = parse_duration, help_heading = "Matrix")]
    pub commit_interval: Option<Duration>,

    /// Inter-message delay of the realistic-arrival group
    #[clap(long, value_parser = parse_duration, help_heading = "Matrix")]
    pub arrival_delay: Option<Duration>,

    /// Prefix of every benchmark topic
    #[clap(long, help_heading = "Matrix")]
    pub topic_prefix: Option<String>,

    /// Scenario groups to enumerate (comma-separated)
    #[clap(long, value_enum, value_delimiter = ',', num_args = 1.., help_heading = "Matrix")]
    pub groups: Option<Vec<ScenarioGroup>>,

    /// Value formats to enumerate (comma-separated)
    #[clap(long, value_enum, value_delimiter = ',', num_args = 1.., help_heading = "Matrix")]
    pub formats: Option<Vec<Format>>,

    /// Payload sizes to enumerate (comma-separated)
    #[clap(long, value_enum, value_delimiter = ',', num_args = 1.., help_heading = "Matrix")]
    pub sizes: Option<Vec<PayloadSize>>,

    /// Binary record types to enumerate (comma-separated)
    #[clap(long, value_enum, value_delimiter = ',', num_args = 1.., help_heading = "Matrix")]
    pub record_types: Option<Vec<RecordType>>,

    /// JSON configuration file, applied before the flags above
    #[clap(long, help_heading = "Configuration")]
    pub config: Option<PathBuf>,

    /// Directory for the CSV, delivery log, time series and summary
    #[clap(short = 'o', long, default_value = crate::defaults::OUTPUT_DIR, help_heading = "Output")]
    pub output_dir: PathBuf,

    /// Acknowledgment latency of the loopback broker
    #[clap(long, value_parser = parse_duration, default_value = "0ms", help_heading = "Loopback Broker")]
    pub ack_latency: Duration,

    /// Fail every Nth send with a transient error
    #[clap(long, help_heading = "Loopback Broker")]
    pub fail_every: Option<u64>,

    /// Acknowledge every Nth send as not persisted
    #[clap(long, help_heading = "Loopback Broker")]
    pub not_persisted_every: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[clap(short = 'q', long, default_value_t = false)]
    pub quiet: bool,

    /// Also write plain-text logs to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,
}

impl Args {
    /// Build the suite configuration: defaults, then the config file, then
    /// the flags that were given.
    pub fn into_config(&self) -> Result<SuiteConfig> {
        let mut config = SuiteConfig::default();
        if let Some(path) = &self.config {
            config = config.apply_file(SuiteConfigFile::load(path)?);
        }

        if let Some(v) = self.msg_count {
            config.message_count = v;
        }
        if let Some(d) = self.duration {
            config.duration = Some(d);
        }
        if let Some(v) = self.producer_trials {
            config.producer_trials = v;
        }
        if let Some(v) = self.consumer_trials {
            config.consumer_trials = v;
        }
        if let Some(v) = &self.window_sizes {
            config.window_sizes = v.clone();
        }
        if let Some(d) = self.batch_timeout {
            config.batch_timeout = d;
        }
        if let Some(v) = self.commit_batch_size {
            config.commit_batch_size = v;
        }
        if let Some(d) = self.commit_interval {
            config.commit_interval = d;
        }
        if let Some(d) = self.arrival_delay {
            config.arrival_delay = d;
        }
        if let Some(v) = &self.topic_prefix {
            config.topic_prefix = v.clone();
        }
        if let Some(v) = &self.groups {
            config.groups = v.clone();
        }
        if let Some(v) = &self.formats {
            config.formats = v.clone();
        }
        if let Some(v) = &self.sizes {
            config.sizes = v.clone();
        }
        if let Some(v) = &self.record_types {
            config.record_types = v.clone();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn filter(&self) -> Result<Option<ScenarioFilter>> {
        self.test.as_deref().map(ScenarioFilter::parse).transpose()
    }

    pub fn loopback_options(&self) -> LoopbackOptions {
        LoopbackOptions {
            ack_latency: self.ack_latency,
            fail_every: self.fail_every.filter(|n| *n > 0),
            not_persisted_every: self.not_persisted_every.filter(|n| *n > 0),
            ..Default::default()
        }
    }
}

/// Parse duration from string (e.g., "500ms", "10s", "5m", "1h").
/// A bare number is taken as seconds.
fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s")
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", s));
    }

    let millis = match unit {
        "ms" => num,
        "s" => num * 1_000.0,
        "m" => num * 60_000.0,
        "h" => num * 3_600_000.0,
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(Duration::from_millis(millis.round() as u64))
}
