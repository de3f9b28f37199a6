//! # Benchmark Orchestrator
//!
//! `BenchmarkSuite` drives a selection of scenarios from the catalog against
//! one broker client. Scenarios run strictly one after another, in catalog
//! order, each for the configured number of trials. Every trial yields a
//! `RunRecord` that is appended to the suite's aggregator; producer delivery
//! events accumulate in the suite's delivery log.
//!
//! ## Progress Reporting
//!
//! The runners call a progress callback at most once per progress interval.
//! The suite wires that callback to a single-line status display on stderr,
//! which can be turned off for tests and quiet runs.

use crate::broker::BrokerClient;
use crate::config::SuiteConfig;
use crate::delivery::DeliveryLog;
use crate::error::Result;
use crate::filter::{self, ScenarioFilter};
use crate::results::{RunRecord, SuiteAggregator};
use crate::runner::{ConsumerRunner, ProducerRunner, RunnerSettings};
use crate::scenario::{Scenario, ScenarioCatalog, ScenarioKind};
use crate::utils::{create_progress_indicator, format_duration, format_message_rate};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Single source of truth for the per-scenario banner.
struct ScenarioBanner<'a> {
    scenario: &'a Scenario,
    trials: u32,
}

impl std::fmt::Display for ScenarioBanner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.scenario;
        writeln!(f, "-----------------------------------------------------------------")?;
        writeln!(f, "Scenario {}: {}", s.id, s.name)?;
        writeln!(f, "  Topic:              {}", s.topic)?;
        writeln!(f, "  Mode:               {} ({})", s.mode_label(), s.kind())?;
        writeln!(f, "  Message Count:      {}", s.message_count)?;
        if let Some(d) = s.duration {
            writeln!(f, "  Duration Cap:       {}", format_duration(d))?;
        }
        if s.group.is_windowed() {
            writeln!(f, "  Window Size:        {}", s.window_size)?;
            writeln!(f, "  Batch Timeout:      {}", format_duration(s.batch_timeout))?;
            if !s.inter_message_delay.is_zero() {
                writeln!(f, "  Arrival Delay:      {}", format_duration(s.inter_message_delay))?;
            }
        }
        writeln!(f, "  Trials:             {}", self.trials)?;
        write!(f, "-----------------------------------------------------------------")
    }
}

pub struct BenchmarkSuite {
    config: SuiteConfig,
    catalog: ScenarioCatalog,
    producer: ProducerRunner,
    consumer: ConsumerRunner,
    deliveries: DeliveryLog,
    aggregator: SuiteAggregator,
    backend: &'static str,
    status_line: bool,
}

impl BenchmarkSuite {
    /// Enumerate the catalog for `config` and bind the runners to `client`.
    ///
    /// ## Returns
    /// `Err(BenchError::ConfigInvalid)` if the configuration cannot produce
    /// a valid matrix.
    pub fn new(config: SuiteConfig, client: Arc<dyn BrokerClient>) -> Result<Self> {
        Self::with_settings(config, client, RunnerSettings::default())
    }

    pub fn with_settings(
        config: SuiteConfig,
        client: Arc<dyn BrokerClient>,
        settings: RunnerSettings,
    ) -> Result<Self> {
        let catalog = ScenarioCatalog::new(&config)?;
        let deliveries = DeliveryLog::new();
        let backend = client.name();
        let producer = ProducerRunner::new(Arc::clone(&client), deliveries.sink(), settings.clone());
        let consumer = ConsumerRunner::new(client, settings);

        Ok(Self {
            config,
            catalog,
            producer,
            consumer,
            deliveries,
            aggregator: SuiteAggregator::new(),
            backend,
            status_line: false,
        })
    }

    /// Show a live status line on stderr while trials run.
    pub fn status_line(mut self, enabled: bool) -> Self {
        self.status_line = enabled;
        self
    }

    pub fn aggregator(&self) -> &SuiteAggregator {
        &self.aggregator
    }

    pub fn deliveries(&self) -> &DeliveryLog {
        &self.deliveries
    }

    /// Name of the broker client the runners are bound to
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Scenarios matching the id filter and the kind filter, in catalog order.
    pub fn select(&self, filter: Option<&ScenarioFilter>, kind: Option<ScenarioKind>) -> Result<Vec<Scenario>> {
        filter::select(self.catalog.scenarios(), filter, kind)
    }

    /// One line per scenario for `--list`.
    pub fn listing(&self, selection: &[Scenario]) -> Vec<String> {
        let name_width = selection.iter().map(|s| s.name.chars().count()).max().unwrap_or(0);
        selection
            .iter()
            .map(|s| {
                format!(
                    "{:<6} {:<width$}  {}  ({} trials)",
                    s.id.as_str(),
                    s.name,
                    s.topic,
                    s.trials,
                    width = name_width
                )
            })
            .collect()
    }

    /// Run every trial of every selected scenario.
    pub async fn run(&mut self, selection: &[Scenario]) {
        info!("{}", self.config);
        info!("Running {} scenario(s) against the {} broker", selection.len(), self.backend);

        for scenario in selection {
            let trials = scenario.trials;
            info!("{}", ScenarioBanner { scenario, trials });

            for trial_index in 1..=trials {
                let record = self.run_trial(scenario, trial_index, trials).await;
                self.aggregator.append(record);
            }

            if let Some(avg) = self.aggregator.average_for(&scenario.id) {
                info!(
                    "{} average over {} trial(s): {}, {:.2} failures",
                    scenario.id,
                    avg.trials,
                    format_message_rate(avg.messages_per_second()),
                    avg.failure_count
                );
            }
        }

        info!(
            "Suite finished: {} run(s), {} failure(s)",
            self.aggregator.len(),
            self.aggregator.total_failures()
        );
    }

    /// Run a single trial without recording it.
    pub async fn run_trial(&self, scenario: &Scenario, trial_index: u32, trials: u32) -> RunRecord {
        let show = self.status_line;
        let cap = scenario.message_count;
        let label = format!("{} trial {}/{}", scenario.id, trial_index, trials);
        let mut on_progress = move |processed: u64, elapsed: Duration| {
            if show {
                print_status(&label, processed, cap, elapsed);
            }
        };

        let record = match scenario.kind() {
            ScenarioKind::Producer => {
                self.producer
                    .run_trial(scenario, trial_index, &mut on_progress)
                    .await
            }
            ScenarioKind::Consumer => {
                self.consumer
                    .run_trial(scenario, trial_index, &mut on_progress)
                    .await
            }
        };

        if show {
            // Leave the status line before the next log line.
            eprintln!();
        }
        record
    }
}

fn print_status(label: &str, processed: u64, cap: u64, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 { processed as f64 / secs } else { 0.0 };
    let mut stderr = std::io::stderr().lock();
    // Status output is best effort.
    let _ = write!(
        stderr,
        "\r{} {} {}/{} {} [{}]   ",
        label,
        create_progress_indicator(processed, cap, 30),
        processed,
        cap,
        format_message_rate(rate),
        format_duration(elapsed)
    );
    let _ = stderr.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::loopback::LoopbackBroker;
    use crate::scenario::ScenarioGroup;

    fn small_config() -> SuiteConfig {
        SuiteConfig {
            message_count: 20,
            producer_trials: 2,
            consumer_trials: 1,
            groups: vec![ScenarioGroup::Callback, ScenarioGroup::ConsumePerMessage],
            ..SuiteConfig::default()
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SuiteConfig {
            message_count: 0,
            ..SuiteConfig::default()
        };
        assert!(BenchmarkSuite::new(config, Arc::new(LoopbackBroker::default())).is_err());
    }

    #[test]
    fn test_listing_and_trials() {
        let suite = BenchmarkSuite::new(small_config(), Arc::new(LoopbackBroker::default())).unwrap();
        let selection = suite.select(None, None).unwrap();
        let lines = suite.listing(&selection);

        assert_eq!(lines.len(), selection.len());
        assert!(lines[0].starts_with("T1.1"));
        assert!(lines[0].ends_with("(2 trials)"));
        assert!(lines.last().unwrap().ends_with("(1 trials)"));
        assert_eq!(suite.backend(), "loopback");
    }

    /// The trial count carried by each scenario decides how often it runs.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_uses_scenario_trial_count() {
        let mut suite = BenchmarkSuite::new(small_config(), Arc::new(LoopbackBroker::default())).unwrap();
        let filter = ScenarioFilter::parse("T1.1").unwrap();
        let mut selection = suite.select(Some(&filter), None).unwrap();
        assert_eq!(selection[0].trials, 2);
        selection[0].trials = 3;

        suite.run(&selection).await;

        assert_eq!(suite.aggregator().runs_for(&selection[0].id).len(), 3);
        assert!(suite.listing(&selection)[0].ends_with("(3 trials)"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_records_every_trial() {
        let mut suite = BenchmarkSuite::new(small_config(), Arc::new(LoopbackBroker::default())).unwrap();
        let filter = ScenarioFilter::parse("T1.1,T5.1").unwrap();
        let selection = suite.select(Some(&filter), None).unwrap();

        suite.run(&selection).await;

        let agg = suite.aggregator();
        assert_eq!(agg.len(), 3);
        assert_eq!(agg.total_failures(), 0);
        // Two producer trials wrote 40 records; the consumer stops at its cap.
        let consumed = &agg.runs_for(&selection[1].id)[0];
        assert_eq!(consumed.messages_processed, 20);
        assert_eq!(suite.deliveries().len(), 40);
    }
}
