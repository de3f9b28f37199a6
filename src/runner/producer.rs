use super::{ProgressFn, RunnerSettings, TerminationCap};
use crate::broker::{BrokerClient, BrokerError, DeliveryAck, DeliveryObserver};
use crate::codec::{message_key, CodecError, Subject, ValueSerializer};
use crate::delivery::{DeliveryEvent, DeliverySink};
use crate::metrics::{BatchStats, LatencyCollector};
use crate::payload::{BenchRecord, DataFactory};
use crate::results::RunRecord;
use crate::sampler::ResourceSampler;
use crate::scenario::{Scenario, SendMode};
use crate::timeseries::TimeSeriesRecorder;
use crate::utils::iso_now;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Callback mode yields to the runtime this often so completions can run
/// while the loop keeps enqueueing.
const CALLBACK_YIELD_EVERY: u64 = 256;

/// Runs producer trials in any of the three send modes.
pub struct ProducerRunner {
    client: Arc<dyn BrokerClient>,
    deliveries: DeliverySink,
    settings: RunnerSettings,
}

/// Totals a send loop hands back to `run_trial`
#[derive(Default)]
struct SendTotals {
    sent: u64,
    failures: u64,
    latency: Option<LatencyCollector>,
    batches: Option<BatchStats>,
}

/// Per-trial state shared by the three send loops
struct SendContext<'a, 'p> {
    scenario: &'a Scenario,
    trial_index: u32,
    factory: DataFactory,
    serializer: ValueSerializer,
    template: BenchRecord,
    cap: TerminationCap,
    start: Instant,
    recorder: TimeSeriesRecorder,
    on_progress: ProgressFn<'p>,
}

impl SendContext<'_, '_> {
    /// Stamp the template for message `seq` and encode it.
    fn next_message(&mut self, seq: u64) -> Result<(Vec<u8>, Vec<u8>), CodecError> {
        let now = iso_now();
        self.factory.stamp_header(&mut self.template, seq, &now);
        let value = self.serializer.encode(&self.template)?;
        let key = message_key(self.scenario.id.as_str(), self.trial_index, seq);
        Ok((key, value))
    }

    fn reached(&self, sent: u64) -> bool {
        self.cap.reached(sent, self.start.elapsed())
    }

    fn progress(&mut self, sent: u64) {
        let elapsed = self.start.elapsed();
        if self.recorder.tick(sent, elapsed) {
            (self.on_progress)(sent, elapsed);
        }
    }

    fn event(&self, key: &[u8], outcome: &Result<DeliveryAck, BrokerError>) -> DeliveryEvent {
        DeliveryEvent::from_outcome(self.scenario.id.as_str(), self.trial_index, key, outcome)
    }

    fn encode_failure(&self, seq: u64, error: &CodecError) -> DeliveryEvent {
        warn!("{}: encode failed for message {}: {}", self.scenario.id, seq, error);
        let key = message_key(self.scenario.id.as_str(), self.trial_index, seq);
        DeliveryEvent::encode_failure(self.scenario.id.as_str(), self.trial_index, &key, error.to_string())
    }
}

impl ProducerRunner {
    pub fn new(client: Arc<dyn BrokerClient>, deliveries: DeliverySink, settings: RunnerSettings) -> Self {
        Self {
            client,
            deliveries,
            settings,
        }
    }

    /// Run one trial. Never fails: broker errors are counted into the
    /// record's `failure_count`.
    pub async fn run_trial(
        &self,
        scenario: &Scenario,
        trial_index: u32,
        on_progress: ProgressFn<'_>,
    ) -> RunRecord {
        let start = Instant::now();

        let Some(mode) = scenario.send_mode() else {
            error!("{} is not a producer scenario", scenario.id);
            return RunRecord::setup_failure(scenario, trial_index, start.elapsed());
        };

        let factory = DataFactory::for_scenario(scenario);
        let serializer = ValueSerializer::new(Subject::for_scenario(scenario));
        let template = factory.build_template();
        let template_len = match serializer.encode(&template) {
            Ok(bytes) => bytes.len() as u64,
            Err(e) => {
                error!("{}: cannot encode record template: {}", scenario.id, e);
                return RunRecord::setup_failure(scenario, trial_index, start.elapsed());
            }
        };
        debug!(
            "{} trial {}: {} mode, template {} bytes",
            scenario.id,
            trial_index,
            mode.label(),
            template_len
        );

        let mut sampler = ResourceSampler::start(self.settings.sample_interval);
        let mut ctx = SendContext {
            scenario,
            trial_index,
            factory,
            serializer,
            template,
            cap: TerminationCap::for_scenario(scenario),
            start,
            recorder: TimeSeriesRecorder::new(self.settings.progress_interval),
            on_progress,
        };

        let totals = match mode {
            SendMode::Callback => self.run_callback(&mut ctx).await,
            SendMode::AwaitEach => self.run_await_each(&mut ctx).await,
            SendMode::Window => self.run_window(&mut ctx).await,
        };

        let elapsed = start.elapsed();
        sampler.stop();

        let mut record = RunRecord::for_scenario(scenario, trial_index);
        record.messages_processed = totals.sent;
        record.total_bytes = (template_len + self.settings.framing_overhead) * totals.sent;
        record.elapsed = elapsed.max(record.elapsed);
        record.peak_cpu_percent = sampler.peak_cpu_percent();
        record.peak_memory_bytes = sampler.peak_memory_bytes();
        record.failure_count = totals.failures;
        record.ack_latency = totals.latency.as_ref().and_then(LatencyCollector::metrics);
        record.batches = totals.batches.as_ref().and_then(BatchStats::summary);
        record.samples = ctx.recorder.finish(totals.sent, elapsed);

        info!(
            "{} trial {} done: {} messages in {:.2?} ({:.0} msg/s), {} failures",
            scenario.id,
            trial_index,
            record.messages_processed,
            record.elapsed,
            record.messages_per_second(),
            record.failure_count
        );
        record
    }

    /// Fire-and-forget: enqueue with a completion observer, drain at the end.
    async fn run_callback(&self, ctx: &mut SendContext<'_, '_>) -> SendTotals {
        let failures = Arc::new(AtomicU64::new(0));
        let scenario_id: Arc<str> = Arc::from(ctx.scenario.id.as_str());
        let trial_index = ctx.trial_index;
        let mut sent = 0u64;

        while !ctx.reached(sent) {
            let (key, value) = match ctx.next_message(sent) {
                Ok(message) => message,
                Err(e) => {
                    self.deliveries.record(ctx.encode_failure(sent, &e));
                    failures.fetch_add(1, Ordering::Relaxed);
                    sent += 1;
                    continue;
                }
            };

            let observer_failures = Arc::clone(&failures);
            let observer_sink = self.deliveries.clone();
            let observer_id = Arc::clone(&scenario_id);
            let observer_key = key.clone();
            let observer: DeliveryObserver = Box::new(move |outcome| {
                let event =
                    DeliveryEvent::from_outcome(&observer_id, trial_index, &observer_key, &outcome);
                if event.is_error() {
                    observer_failures.fetch_add(1, Ordering::Relaxed);
                }
                observer_sink.record(event);
            });

            if let Err(e) = self.client.produce(&ctx.scenario.topic, key.clone(), value, observer) {
                // The observer was dropped unfired; account for the send here.
                failures.fetch_add(1, Ordering::Relaxed);
                self.deliveries.record(ctx.event(&key, &Err(e)));
            }

            sent += 1;
            ctx.progress(sent);
            if sent % CALLBACK_YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }

        if let Err(e) = self.client.drain(self.settings.drain_timeout).await {
            warn!(
                "{} trial {}: flush did not complete: {}",
                ctx.scenario.id, ctx.trial_index, e
            );
        }

        SendTotals {
            sent,
            failures: failures.load(Ordering::Relaxed),
            ..Default::default()
        }
    }

    /// One outstanding send at a time.
    async fn run_await_each(&self, ctx: &mut SendContext<'_, '_>) -> SendTotals {
        let mut latency = new_latency_collector();
        let mut failures = 0u64;
        let mut sent = 0u64;

        while !ctx.reached(sent) {
            let (key, value) = match ctx.next_message(sent) {
                Ok(message) => message,
                Err(e) => {
                    self.deliveries.record(ctx.encode_failure(sent, &e));
                    failures += 1;
                    sent += 1;
                    continue;
                }
            };

            let send_start = Instant::now();
            let outcome = self
                .client
                .produce_and_await(&ctx.scenario.topic, key.clone(), value)
                .await;
            if let Some(collector) = latency.as_mut() {
                collector.record(send_start.elapsed());
            }

            let event = ctx.event(&key, &outcome);
            if event.is_error() {
                failures += 1;
            }
            self.deliveries.record(event);

            sent += 1;
            ctx.progress(sent);
        }

        SendTotals {
            sent,
            failures,
            latency,
            batches: None,
        }
    }

    /// Assemble up to `window_size` concurrent sends per batch, bounded by
    /// the batch deadline, then wait for the whole batch.
    async fn run_window(&self, ctx: &mut SendContext<'_, '_>) -> SendTotals {
        let window = ctx.scenario.window_size.max(1);
        let batch_timeout = ctx.scenario.batch_timeout;
        let delay = ctx.scenario.inter_message_delay;

        let mut latency = new_latency_collector();
        let mut batches = BatchStats::new(window);
        let mut failures = 0u64;
        let mut sent = 0u64;

        while !ctx.reached(sent) {
            let deadline = Instant::now() + batch_timeout;
            let target = ctx.cap.remaining(sent).min(window as u64);
            let mut in_flight = JoinSet::new();
            let mut assembled = 0u64;

            loop {
                let seq = sent + assembled;
                match ctx.next_message(seq) {
                    Ok((key, value)) => {
                        let client = Arc::clone(&self.client);
                        let topic = ctx.scenario.topic.clone();
                        in_flight.spawn(async move {
                            let send_start = Instant::now();
                            let outcome = client.produce_and_await(&topic, key.clone(), value).await;
                            (key, outcome, send_start.elapsed())
                        });
                    }
                    Err(e) => {
                        self.deliveries.record(ctx.encode_failure(seq, &e));
                        failures += 1;
                    }
                }
                assembled += 1;

                if assembled >= target || batch_closed(ctx, sent + assembled, deadline) {
                    break;
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                    if batch_closed(ctx, sent + assembled, deadline) {
                        break;
                    }
                }
            }

            batches.record(assembled as usize);

            while let Some(joined) = in_flight.join_next().await {
                match joined {
                    Ok((key, outcome, took)) => {
                        if let Some(collector) = latency.as_mut() {
                            collector.record(took);
                        }
                        let event = ctx.event(&key, &outcome);
                        if event.is_error() {
                            failures += 1;
                        }
                        self.deliveries.record(event);
                    }
                    Err(e) => {
                        warn!("{}: send task failed: {}", ctx.scenario.id, e);
                        failures += 1;
                    }
                }
            }

            sent += assembled;
            ctx.progress(sent);
        }

        SendTotals {
            sent,
            failures,
            latency,
            batches: Some(batches),
        }
    }
}

/// Assembly of the current batch ends at the deadline or when the cap is hit.
fn batch_closed(ctx: &SendContext<'_, '_>, sent: u64, deadline: Instant) -> bool {
    Instant::now() >= deadline || ctx.reached(sent)
}

fn new_latency_collector() -> Option<LatencyCollector> {
    match LatencyCollector::new() {
        Ok(collector) => Some(collector),
        Err(e) => {
            debug!("ack latency histogram unavailable: {}", e);
            None
        }
    }
}
