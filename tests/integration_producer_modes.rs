//! Producer send modes against the loopback broker.

use broker_bench::broker::BrokerClient;
use broker_bench::delivery::{DeliveryLevel, DeliveryLog};
use broker_bench::scenario::{Format, PayloadSize, RecordType, ScenarioGroup};
use broker_bench::{LoopbackBroker, LoopbackOptions, ProducerRunner, RunnerSettings, Scenario, ScenarioCatalog, SuiteConfig};
use std::sync::Arc;
use std::time::Duration;

/// First scenario of `group` restricted to one format and size.
fn scenario(group: ScenarioGroup, format: Format, size: PayloadSize, tweak: impl FnOnce(&mut SuiteConfig)) -> Scenario {
    let mut config = SuiteConfig {
        groups: vec![group],
        formats: vec![format],
        sizes: vec![size],
        record_types: vec![RecordType::Specific],
        window_sizes: vec![10],
        ..SuiteConfig::default()
    };
    tweak(&mut config);
    ScenarioCatalog::new(&config).unwrap().scenarios()[0].clone()
}

fn runner(broker: &LoopbackBroker, log: &DeliveryLog) -> ProducerRunner {
    let client: Arc<dyn BrokerClient> = Arc::new(broker.clone());
    ProducerRunner::new(client, log.sink(), RunnerSettings::default())
}

fn noop() -> impl FnMut(u64, Duration) + Send {
    |_, _| {}
}

/// Callback mode: every send completes exactly once, through the observer.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_callback_mode_counts_every_send() {
    let broker = LoopbackBroker::default();
    let log = DeliveryLog::new();
    let s = scenario(ScenarioGroup::Callback, Format::Binary, PayloadSize::Small, |c| {
        c.message_count = 1000;
    });

    let mut progress = noop();
    let record = runner(&broker, &log).run_trial(&s, 1, &mut progress).await;

    assert_eq!(record.messages_processed, 1000);
    assert_eq!(record.failure_count, 0);
    assert!(!record.samples.is_empty());
    assert!(record.total_bytes > 1000 * 64);
    assert_eq!(broker.topic_len(&s.topic), 1000);
    assert_eq!(broker.in_flight(), 0);

    let events = log.drain();
    assert_eq!(events.len(), 1000);
    assert!(events.iter().all(|e| e.level == DeliveryLevel::Success));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_callback_mode_events_match_messages_under_faults() {
    let broker = LoopbackBroker::new(LoopbackOptions {
        fail_every: Some(7),
        ..Default::default()
    });
    let log = DeliveryLog::new();
    let s = scenario(ScenarioGroup::Callback, Format::Text, PayloadSize::Small, |c| {
        c.message_count = 700;
    });

    let mut progress = noop();
    let record = runner(&broker, &log).run_trial(&s, 1, &mut progress).await;

    let events = log.drain();
    let errors = events.iter().filter(|e| e.is_error()).count() as u64;
    assert_eq!(events.len() as u64, record.messages_processed);
    assert_eq!(errors, 100);
    assert_eq!(record.failure_count, 100);
    assert_eq!(broker.topic_len(&s.topic), 600);
}

/// Await-each with a 100 ms acknowledgment: five sends take about half a second.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_await_each_is_sequential() {
    let broker = LoopbackBroker::new(LoopbackOptions {
        ack_latency: Duration::from_millis(100),
        ..Default::default()
    });
    let log = DeliveryLog::new();
    let s = scenario(ScenarioGroup::AwaitEach, Format::Binary, PayloadSize::Small, |c| {
        c.message_count = 5;
    });

    let mut progress = noop();
    let record = runner(&broker, &log).run_trial(&s, 1, &mut progress).await;

    assert_eq!(record.messages_processed, 5);
    assert_eq!(record.failure_count, 0);
    assert!(record.elapsed >= Duration::from_millis(490), "{:?}", record.elapsed);
    assert!(record.elapsed < Duration::from_millis(1500), "{:?}", record.elapsed);
    assert!(record.mean_latency_ms() >= 98.0 && record.mean_latency_ms() < 300.0);

    let ack = record.ack_latency.as_ref().expect("await-each records ack latency");
    assert_eq!(ack.total_samples, 5);
    assert!(ack.mean_ms() >= 99.0, "{}", ack.mean_ms());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_await_each_counts_not_persisted_acks() {
    let broker = LoopbackBroker::new(LoopbackOptions {
        not_persisted_every: Some(3),
        ..Default::default()
    });
    let log = DeliveryLog::new();
    let s = scenario(ScenarioGroup::AwaitEach, Format::Binary, PayloadSize::Large, |c| {
        c.message_count = 9;
    });

    let mut progress = noop();
    let record = runner(&broker, &log).run_trial(&s, 1, &mut progress).await;

    let not_persisted = log
        .drain()
        .into_iter()
        .filter(|e| e.status == "NotPersisted")
        .count() as u64;
    assert_eq!(not_persisted, 3);
    assert_eq!(record.failure_count, not_persisted);
    assert_eq!(broker.topic_len(&s.topic), 6);
}

/// Without an arrival delay every window fills completely.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_window_mode_fills_every_batch() {
    let broker = LoopbackBroker::default();
    let log = DeliveryLog::new();
    let s = scenario(ScenarioGroup::Window, Format::Text, PayloadSize::Large, |c| {
        c.message_count = 100;
    });
    assert_eq!(s.window_size, 10);
    assert!(s.inter_message_delay.is_zero());

    let mut progress = noop();
    let record = runner(&broker, &log).run_trial(&s, 1, &mut progress).await;

    assert_eq!(record.messages_processed, 100);
    let batches = record.batches.as_ref().expect("windowed runs record batches");
    assert_eq!(batches.count, 10);
    assert_eq!(batches.min, 10);
    assert_eq!(batches.max, 10);
    assert_eq!(batches.partial, 0);
    assert_eq!(log.len(), 100);
}

/// A slow arrival rate closes batches on the deadline before they fill.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_window_deadline_closes_partial_batches() {
    let broker = LoopbackBroker::default();
    let log = DeliveryLog::new();
    let s = scenario(ScenarioGroup::WindowArrival, Format::Text, PayloadSize::Large, |c| {
        c.message_count = 1_000_000;
        c.duration = Some(Duration::from_secs(3));
        c.arrival_delay = Duration::from_millis(100);
        c.batch_timeout = Duration::from_millis(500);
    });

    let mut progress = noop();
    let record = runner(&broker, &log).run_trial(&s, 1, &mut progress).await;

    let batches = record.batches.as_ref().expect("windowed runs record batches");
    assert!(batches.partial >= 1);
    assert!(batches.max < 10);
    assert!(batches.mean >= 3.0 && batches.mean <= 6.0, "mean batch {}", batches.mean);

    let rate = record.messages_per_second();
    assert!(rate > 5.0 && rate < 12.0, "rate {}", rate);
    assert!(record.elapsed < Duration::from_secs(4), "{:?}", record.elapsed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_samples_never_decrease() {
    let broker = LoopbackBroker::new(LoopbackOptions {
        ack_latency: Duration::from_millis(1),
        ..Default::default()
    });
    let log = DeliveryLog::new();
    let s = scenario(ScenarioGroup::AwaitEach, Format::Text, PayloadSize::Small, |c| {
        c.message_count = 1_000_000;
        c.duration = Some(Duration::from_millis(2500));
    });

    let mut calls = Vec::new();
    let mut progress = |n: u64, _: Duration| calls.push(n);
    let record = runner(&broker, &log).run_trial(&s, 1, &mut progress).await;

    assert!(record.samples.len() >= 3);
    assert!(record
        .samples
        .windows(2)
        .all(|w| w[0].cumulative_messages <= w[1].cumulative_messages));
    assert!(record.samples.last().unwrap().cumulative_messages <= record.messages_processed);
    assert!(!calls.is_empty());
}
