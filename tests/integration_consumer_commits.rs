//! Consumer commit disciplines and failure handling against the loopback broker.

use broker_bench::broker::BrokerClient;
use broker_bench::codec::{Subject, ValueSerializer};
use broker_bench::payload::DataFactory;
use broker_bench::scenario::{Format, PayloadSize, RecordType, ScenarioGroup};
use broker_bench::{ConsumerRunner, LoopbackBroker, RunnerSettings, Scenario, ScenarioCatalog, SuiteConfig};
use std::sync::Arc;
use std::time::Duration;

fn consumer_scenario(group: ScenarioGroup, message_count: u64) -> Scenario {
    consumer_scenario_with(group, message_count, |_| {})
}

fn consumer_scenario_with(group: ScenarioGroup, message_count: u64, tweak: impl FnOnce(&mut SuiteConfig)) -> Scenario {
    let mut config = SuiteConfig {
        groups: vec![group],
        formats: vec![Format::Binary],
        sizes: vec![PayloadSize::Small],
        record_types: vec![RecordType::Specific],
        message_count,
        commit_batch_size: 50,
        ..SuiteConfig::default()
    };
    tweak(&mut config);
    ScenarioCatalog::new(&config).unwrap().scenarios()[0].clone()
}

/// Append `count` encoded records to the scenario's topic; returns the
/// total value bytes written.
fn preload(broker: &LoopbackBroker, s: &Scenario, count: u64) -> u64 {
    let subject = Subject::for_scenario(s);
    let factory = DataFactory::for_scenario(s);
    let serializer = ValueSerializer::new(subject);
    let mut record = factory.build_template();

    let mut bytes = 0u64;
    for seq in 0..count {
        factory.stamp_header(&mut record, seq, "2024-05-01T10:00:00.000Z");
        let value = serializer.encode(&record).unwrap();
        bytes += value.len() as u64;
        broker.inject_raw(&s.topic, format!("seed-{}", seq).as_bytes(), &value);
    }
    bytes
}

/// Append `count` records to the scenario's topic, one every `gap`, from a
/// background task.
fn trickle(broker: &LoopbackBroker, s: &Scenario, count: u64, gap: Duration) -> tokio::task::JoinHandle<()> {
    let broker = broker.clone();
    let s = s.clone();
    tokio::spawn(async move {
        for _ in 0..count {
            preload_from(&broker, &s, 1);
            tokio::time::sleep(gap).await;
        }
    })
}

/// Like `preload`, but numbers keys after what the topic already holds.
fn preload_from(broker: &LoopbackBroker, s: &Scenario, count: u64) {
    let subject = Subject::for_scenario(s);
    let factory = DataFactory::for_scenario(s);
    let serializer = ValueSerializer::new(subject);
    let mut record = factory.build_template();
    let base = broker.topic_len(&s.topic) as u64;

    for seq in base..base + count {
        factory.stamp_header(&mut record, seq, "2024-05-01T10:00:00.000Z");
        let value = serializer.encode(&record).unwrap();
        broker.inject_raw(&s.topic, format!("seed-{}", seq).as_bytes(), &value);
    }
}

fn runner(broker: &LoopbackBroker) -> ConsumerRunner {
    let client: Arc<dyn BrokerClient> = Arc::new(broker.clone());
    let settings = RunnerSettings {
        poll_timeout: Duration::from_millis(300),
        ..RunnerSettings::default()
    };
    ConsumerRunner::new(client, settings)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_per_message_commit_commits_every_record() {
    let broker = LoopbackBroker::default();
    let s = consumer_scenario(ScenarioGroup::ConsumePerMessage, 200);
    preload(&broker, &s, 200);

    let mut progress = |_: u64, _: Duration| {};
    let record = runner(&broker).run_trial(&s, 1, &mut progress).await;

    assert_eq!(record.messages_processed, 200);
    assert_eq!(record.failure_count, 0);

    let commits = broker.commits_for_topic(&s.topic);
    assert_eq!(commits.len(), 200);
    assert_eq!(commits.first().unwrap().offset, 1);
    assert_eq!(commits.last().unwrap().offset, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batched_commit_commits_per_batch() {
    let broker = LoopbackBroker::default();
    let s = consumer_scenario(ScenarioGroup::ConsumeBatched, 200);
    assert_eq!(s.commit_batch_size, 50);
    preload(&broker, &s, 200);

    let mut progress = |_: u64, _: Duration| {};
    let record = runner(&broker).run_trial(&s, 1, &mut progress).await;

    assert_eq!(record.messages_processed, 200);
    let commits = broker.commits_for_topic(&s.topic);
    assert!((4..=5).contains(&commits.len()), "{} commits", commits.len());
    assert_eq!(commits.last().unwrap().offset, 200);
}

/// A partial last batch is picked up by the final commit on exit.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batched_commit_final_catch_up() {
    let broker = LoopbackBroker::default();
    let s = consumer_scenario(ScenarioGroup::ConsumeBatched, 120);
    preload(&broker, &s, 120);

    let mut progress = |_: u64, _: Duration| {};
    let record = runner(&broker).run_trial(&s, 1, &mut progress).await;

    assert_eq!(record.messages_processed, 120);
    let commits = broker.commits_for_topic(&s.topic);
    assert_eq!(commits.len(), 3);
    assert_eq!(commits.last().unwrap().offset, 120);
}

/// Records arriving slower than the batch fills are committed on the interval.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batched_commit_by_interval() {
    let broker = LoopbackBroker::default();
    let s = consumer_scenario_with(ScenarioGroup::ConsumeBatched, 20, |c| {
        c.commit_batch_size = 10_000;
        c.commit_interval = Duration::from_millis(100);
        c.duration = Some(Duration::from_secs(3));
    });
    let writer = trickle(&broker, &s, 20, Duration::from_millis(40));

    let mut progress = |_: u64, _: Duration| {};
    let record = runner(&broker).run_trial(&s, 1, &mut progress).await;
    writer.await.unwrap();

    assert_eq!(record.messages_processed, 20);
    let commits = broker.commits_for_topic(&s.topic);
    assert!(commits.len() >= 3, "{} commits", commits.len());
    assert!(commits.len() < 20, "{} commits", commits.len());
    assert_eq!(commits.last().unwrap().offset, 20);
}

/// With a duration cap, empty polls keep the trial alive until the cap and
/// the time series records the flat region.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duration_capped_trial_outlives_empty_polls() {
    let broker = LoopbackBroker::default();
    let s = consumer_scenario_with(ScenarioGroup::ConsumePerMessage, 1_000_000, |c| {
        c.duration = Some(Duration::from_millis(1500));
    });
    preload(&broker, &s, 5);

    let mut progress = |_: u64, _: Duration| {};
    let record = runner(&broker).run_trial(&s, 1, &mut progress).await;

    assert_eq!(record.messages_processed, 5);
    assert_eq!(record.failure_count, 0);
    assert!(record.elapsed >= Duration::from_millis(1400), "{:?}", record.elapsed);
    // Duration cap plus at most one poll timeout, with scheduling slack.
    assert!(record.elapsed <= Duration::from_millis(1500 + 300 + 200), "{:?}", record.elapsed);

    assert!(record.samples.len() >= 2, "{:?}", record.samples);
    assert!(record
        .samples
        .windows(2)
        .all(|w| w[0].cumulative_messages <= w[1].cumulative_messages));
    assert_eq!(record.samples.last().unwrap().cumulative_messages, 5);
    assert!(record.samples.last().unwrap().elapsed_seconds >= 1.4);
}

/// Total bytes equal the sum of every value handed to the decoder.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_consumer_bytes_are_decoder_input_sizes() {
    let broker = LoopbackBroker::default();
    let s = consumer_scenario(ScenarioGroup::ConsumePerMessage, 75);
    let written = preload(&broker, &s, 75);

    let mut progress = |_: u64, _: Duration| {};
    let record = runner(&broker).run_trial(&s, 1, &mut progress).await;

    assert_eq!(record.messages_processed, 75);
    assert_eq!(record.total_bytes, written);
}

/// Count-only runs stop with a warning once the topic runs dry.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drained_topic_ends_count_only_trial() {
    let broker = LoopbackBroker::default();
    let s = consumer_scenario(ScenarioGroup::ConsumePerMessage, 100);
    preload(&broker, &s, 30);

    let mut progress = |_: u64, _: Duration| {};
    let record = runner(&broker).run_trial(&s, 1, &mut progress).await;

    assert_eq!(record.messages_processed, 30);
    assert_eq!(record.failure_count, 0);
    assert!(record.elapsed < Duration::from_secs(3), "{:?}", record.elapsed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_decode_failures_abort_the_trial() {
    let broker = LoopbackBroker::default();
    let s = consumer_scenario(ScenarioGroup::ConsumePerMessage, 500);
    for i in 0..150u32 {
        broker.inject_raw(&s.topic, b"junk", &[0xff, 0x00, i as u8]);
    }
    preload(&broker, &s, 10);

    let mut progress = |_: u64, _: Duration| {};
    let record = runner(&broker).run_trial(&s, 1, &mut progress).await;

    assert_eq!(record.messages_processed, 0);
    assert_eq!(record.failure_count, 101);
    assert!(broker.commits_for_topic(&s.topic).is_empty());
}

/// A few undecodable records are skipped and counted without stopping the run.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_decode_failures_below_limit_are_counted() {
    let broker = LoopbackBroker::default();
    let s = consumer_scenario(ScenarioGroup::ConsumeBatched, 40);
    preload(&broker, &s, 20);
    for _ in 0..3 {
        broker.inject_raw(&s.topic, b"junk", b"not a frame");
    }
    preload(&broker, &s, 20);

    let mut progress = |_: u64, _: Duration| {};
    let record = runner(&broker).run_trial(&s, 1, &mut progress).await;

    assert_eq!(record.messages_processed, 40);
    assert_eq!(record.failure_count, 3);
}

/// Every trial joins a fresh group, so each one reads the topic from the start.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_each_trial_uses_a_fresh_group() {
    let broker = LoopbackBroker::default();
    let s = consumer_scenario(ScenarioGroup::ConsumePerMessage, 25);
    preload(&broker, &s, 25);
    let runner = runner(&broker);

    let mut progress = |_: u64, _: Duration| {};
    let first = runner.run_trial(&s, 1, &mut progress).await;
    let second = runner.run_trial(&s, 2, &mut progress).await;

    assert_eq!(first.messages_processed, 25);
    assert_eq!(second.messages_processed, 25);

    let commits = broker.commits_for_topic(&s.topic);
    let first_group = &commits.first().unwrap().group_id;
    let second_group = &commits.last().unwrap().group_id;
    assert_ne!(first_group, second_group);
    assert!(first_group.contains("T5.1-t1-"));
    assert!(second_group.contains("T5.1-t2-"));
}
