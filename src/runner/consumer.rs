use super::{ProgressFn, RunnerSettings, TerminationCap};
use crate::broker::{BrokerClient, BrokerError, ConsumerClient, PollOutcome, SubscribeOptions};
use crate::codec::{ByteAccountant, Subject, ValueDecoder, ValueDeserializer};
use crate::results::RunRecord;
use crate::sampler::ResourceSampler;
use crate::scenario::{CommitMode, Scenario};
use crate::timeseries::TimeSeriesRecorder;
use crate::utils::nonce;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Runs consumer trials with per-message or batched commits.
pub struct ConsumerRunner {
    client: Arc<dyn BrokerClient>,
    settings: RunnerSettings,
}

/// Counters of one poll loop
#[derive(Debug, Default)]
struct PollTotals {
    processed: u64,
    failures: u64,
    commits: u64,
    /// Records processed since the last successful commit
    uncommitted: u64,
}

impl ConsumerRunner {
    pub fn new(client: Arc<dyn BrokerClient>, settings: RunnerSettings) -> Self {
        Self { client, settings }
    }

    /// Consumer group for one trial. The random suffix makes every trial a
    /// fresh group that starts from the earliest offset.
    pub fn group_id(&self, scenario: &Scenario, trial_index: u32) -> String {
        format!(
            "{}-{}-t{}-{}",
            self.settings.group_prefix,
            scenario.id,
            trial_index,
            nonce()
        )
    }

    /// Run one trial. Never fails: decode and commit problems are counted or
    /// logged, and a failed subscription yields a single-failure record.
    pub async fn run_trial(
        &self,
        scenario: &Scenario,
        trial_index: u32,
        on_progress: ProgressFn<'_>,
    ) -> RunRecord {
        let start = Instant::now();

        let Some(commit_mode) = scenario.commit_mode() else {
            error!("{} is not a consumer scenario", scenario.id);
            return RunRecord::setup_failure(scenario, trial_index, start.elapsed());
        };

        let accountant = Arc::new(ByteAccountant::new(ValueDeserializer::new(
            Subject::for_scenario(scenario),
        )));
        let decoder: Arc<dyn ValueDecoder> = accountant.clone();
        let group_id = self.group_id(scenario, trial_index);

        let mut consumer = match self
            .client
            .subscribe(SubscribeOptions::benchmark(&scenario.topic, &group_id), decoder)
            .await
        {
            Ok(consumer) => consumer,
            Err(e) => {
                error!(
                    "{} trial {}: cannot subscribe to {}: {}",
                    scenario.id, trial_index, scenario.topic, e
                );
                return RunRecord::setup_failure(scenario, trial_index, start.elapsed());
            }
        };
        debug!("{} trial {}: consuming {} as {}", scenario.id, trial_index, scenario.topic, group_id);

        let mut sampler = ResourceSampler::start(self.settings.sample_interval);
        let mut recorder = TimeSeriesRecorder::new(self.settings.progress_interval);

        let mut totals = self
            .poll_loop(
                consumer.as_mut(),
                scenario,
                commit_mode,
                start,
                &mut recorder,
                on_progress,
            )
            .await;

        // Exit path: commit whatever is still uncommitted, then leave the group.
        if totals.uncommitted > 0 {
            match consumer.commit(None).await {
                Ok(()) => totals.commits += 1,
                Err(e) => debug!("{}: final commit failed: {}", scenario.id, e),
            }
        }
        if let Err(e) = consumer.close().await {
            debug!("{}: close failed: {}", scenario.id, e);
        }

        let elapsed = start.elapsed();
        sampler.stop();

        let mut record = RunRecord::for_scenario(scenario, trial_index);
        record.messages_processed = totals.processed;
        record.total_bytes = accountant.total_bytes();
        record.elapsed = elapsed.max(record.elapsed);
        record.peak_cpu_percent = sampler.peak_cpu_percent();
        record.peak_memory_bytes = sampler.peak_memory_bytes();
        record.failure_count = totals.failures;
        record.samples = recorder.finish(totals.processed, elapsed);

        info!(
            "{} trial {} done: {} messages in {:.2?} ({:.0} msg/s), {} commits, {} failures",
            scenario.id,
            trial_index,
            record.messages_processed,
            record.elapsed,
            record.messages_per_second(),
            totals.commits,
            record.failure_count
        );
        record
    }

    async fn poll_loop(
        &self,
        consumer: &mut dyn ConsumerClient,
        scenario: &Scenario,
        commit_mode: CommitMode,
        start: Instant,
        recorder: &mut TimeSeriesRecorder,
        on_progress: ProgressFn<'_>,
    ) -> PollTotals {
        let cap = TerminationCap::for_scenario(scenario);
        let mut totals = PollTotals::default();
        let mut decode_failures = 0u64;
        let mut last_commit = Instant::now();

        let mut progress = |processed: u64, recorder: &mut TimeSeriesRecorder| {
            let elapsed = start.elapsed();
            if recorder.tick(processed, elapsed) {
                on_progress(processed, elapsed);
            }
        };

        while !cap.reached(totals.processed, start.elapsed()) {
            let timeout = match cap.time_left(start.elapsed()) {
                Some(left) => self.settings.poll_timeout.min(left).max(Duration::from_millis(1)),
                None => self.settings.poll_timeout,
            };

            match consumer.poll(timeout).await {
                Ok(PollOutcome::Record(record)) => {
                    totals.processed += 1;
                    totals.uncommitted += 1;

                    let commit = match commit_mode {
                        CommitMode::PerMessage => Some(consumer.commit(Some(&record)).await),
                        CommitMode::Batched => {
                            let by_count = totals.processed % scenario.commit_batch_size.max(1) == 0;
                            let by_time = last_commit.elapsed() > scenario.commit_interval;
                            if by_count || by_time {
                                last_commit = Instant::now();
                                Some(consumer.commit(None).await)
                            } else {
                                None
                            }
                        }
                    };
                    match commit {
                        Some(Ok(())) => {
                            totals.commits += 1;
                            totals.uncommitted = 0;
                        }
                        Some(Err(e)) => warn!(
                            "{}: commit at offset {} failed: {}",
                            scenario.id, record.offset, e
                        ),
                        None => {}
                    }

                    progress(totals.processed, recorder);
                }
                Ok(PollOutcome::PartitionEof { partition, offset }) => {
                    debug!(
                        "{}: reached end of partition {} at offset {}",
                        scenario.id, partition, offset
                    );
                }
                Ok(PollOutcome::Empty) => {
                    if scenario.is_count_only() {
                        warn!(
                            "{}: no messages within {:?} after {} records, topic {} looks drained",
                            scenario.id, timeout, totals.processed, scenario.topic
                        );
                        break;
                    }
                    // Keep the flat region visible in the time series.
                    progress(totals.processed, recorder);
                }
                Ok(PollOutcome::DecodeFailed { offset, reason }) => {
                    totals.failures += 1;
                    decode_failures += 1;
                    debug!("{}: cannot decode offset {}: {}", scenario.id, offset, reason);
                    if decode_failures > self.settings.max_decode_failures {
                        error!(
                            "{}: aborting trial after {} decode failures",
                            scenario.id, decode_failures
                        );
                        break;
                    }
                }
                Err(BrokerError::Closed) => {
                    warn!("{}: subscription closed by the client", scenario.id);
                    totals.failures += 1;
                    break;
                }
                Err(e) => {
                    warn!("{}: poll failed: {}", scenario.id, e);
                    totals.failures += 1;
                    if totals.failures > self.settings.max_decode_failures {
                        error!("{}: aborting trial after {} failures", scenario.id, totals.failures);
                        break;
                    }
                }
            }
        }

        totals
    }
}
