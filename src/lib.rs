//! # Broker Benchmark Suite Library
//!
//! A throughput and resource benchmark harness for message-broker clients.
//! The suite runs a fixed matrix of producer and consumer scenarios, each for
//! a number of trials, and reports per-trial and averaged metrics.
//!
//! ## Scenario Matrix
//!
//! - **T1** produce with completion callbacks (fire-and-forget)
//! - **T2** produce and await each acknowledgment
//! - **T3** produce in concurrency windows bounded by a batch deadline
//! - **T4** windowed produce with a realistic inter-message arrival delay
//! - **T5** consume with a commit after every record
//! - **T6** consume with batched commits (by count or by interval)
//!
//! Each group expands over format (binary, text), payload size (small,
//! large), record type (binary only: specific, generic) and, for windowed
//! groups, window size.
//!
//! ## Architecture Overview
//!
//! - `scenario`: the catalog that enumerates the matrix from a `SuiteConfig`
//! - `payload` and `codec`: record templates and schema-framed serializers
//! - `broker`: the client capability surface plus an in-process loopback broker
//! - `runner`: producer and consumer trial runners
//! - `sampler` and `timeseries`: peak CPU/memory and 1 Hz progress samples
//! - `results`, `delivery` and `report`: aggregation and output artifacts
//! - `benchmark`: the orchestrator that drives a filtered selection
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use broker_bench::{BenchmarkSuite, LoopbackBroker, ScenarioFilter, SuiteConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SuiteConfig::default();
//!     let broker = Arc::new(LoopbackBroker::default());
//!     let mut suite = BenchmarkSuite::new(config, broker)?;
//!
//!     let filter = ScenarioFilter::parse("T1.1-T1.2")?;
//!     let selected = suite.select(Some(&filter), None)?;
//!     suite.run(&selected).await;
//!
//!     for avg in suite.aggregator().averages() {
//!         println!("{}: {:.0} msg/s", avg.scenario_id, avg.messages_per_second());
//!     }
//!     Ok(())
//! }
//! ```

pub mod benchmark;
pub mod broker;
pub mod cli;
pub mod codec;
pub mod config;
pub mod delivery;
pub mod error;
pub mod filter;
pub mod logging;
pub mod metrics;
pub mod payload;
pub mod report;
pub mod results;
pub mod runner;
pub mod sampler;
pub mod scenario;
pub mod timeseries;

/// Formatting, identifiers and table rendering helpers
pub mod utils;

pub use benchmark::BenchmarkSuite;
pub use broker::loopback::{LoopbackBroker, LoopbackOptions};
pub use broker::{BrokerClient, BrokerError, ConsumerClient};
pub use config::SuiteConfig;
pub use error::{BenchError, Result};
pub use filter::ScenarioFilter;
pub use report::ResultsManager;
pub use results::{AverageRecord, RunRecord, SuiteAggregator};
pub use runner::{ConsumerRunner, ProducerRunner, RunnerSettings};
pub use scenario::{Scenario, ScenarioCatalog, ScenarioId, ScenarioKind};

/// Current version of the benchmark suite
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
///
/// These values are chosen to give stable averages on a developer machine
/// in a few minutes while still exercising every send and commit mode.
pub mod defaults {
    use std::time::Duration;

    /// Message count cap per trial
    pub const MSG_COUNT: u64 = 10_000;

    pub const PRODUCER_TRIALS: u32 = 3;

    pub const CONSUMER_TRIALS: u32 = 3;

    /// Window sizes for the windowed groups, innermost matrix dimension
    pub const WINDOW_SIZES: [usize; 2] = [10, 100];

    /// Upper bound on assembling one concurrency window
    pub const BATCH_TIMEOUT: Duration = Duration::from_millis(500);

    pub const COMMIT_BATCH_SIZE: u64 = 100;

    pub const COMMIT_INTERVAL: Duration = Duration::from_secs(1);

    /// Inter-message delay of the realistic-arrival group
    pub const ARRIVAL_DELAY: Duration = Duration::from_millis(10);

    pub const TOPIC_PREFIX: &str = "perf";

    pub const OUTPUT_DIR: &str = "results";

    /// Bound on a single consumer poll
    pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

    /// Bound on the post-loop flush of outstanding sends
    pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

    /// Resource sampler tick
    pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

    /// Time-series and status line cadence
    pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

    /// Consumer trials abort once decode failures exceed this count
    pub const MAX_DECODE_FAILURES: u64 = 100;

    /// Per-message protocol framing added to producer byte estimates
    pub const FRAMING_OVERHEAD: u64 = 64;

    /// Consumer group id prefix
    pub const GROUP_PREFIX: &str = "broker-bench";
}
