//! End-to-end suite runs: selection, orchestration and report files.

use broker_bench::report::{CSV_HEADER, CSV_FILE, DELIVERY_LOG_FILE, SUMMARY_FILE, TIMESERIES_FILE};
use broker_bench::scenario::{Format, PayloadSize, RecordType, ScenarioGroup};
use broker_bench::{
    BenchError, BenchmarkSuite, LoopbackBroker, ResultsManager, RunnerSettings, ScenarioCatalog, ScenarioFilter,
    ScenarioKind, SuiteConfig,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn small_suite_config() -> SuiteConfig {
    SuiteConfig {
        message_count: 50,
        producer_trials: 2,
        consumer_trials: 2,
        formats: vec![Format::Binary],
        sizes: vec![PayloadSize::Small],
        record_types: vec![RecordType::Specific],
        groups: vec![
            ScenarioGroup::Callback,
            ScenarioGroup::AwaitEach,
            ScenarioGroup::Window,
            ScenarioGroup::ConsumePerMessage,
            ScenarioGroup::ConsumeBatched,
        ],
        window_sizes: vec![5],
        commit_batch_size: 20,
        ..SuiteConfig::default()
    }
}

fn settings() -> RunnerSettings {
    RunnerSettings {
        poll_timeout: Duration::from_millis(300),
        ..RunnerSettings::default()
    }
}

#[test]
fn test_catalog_ids_are_unique_and_stable() {
    let config = SuiteConfig::default();
    let first = ScenarioCatalog::enumerate(&config).unwrap();
    let second = ScenarioCatalog::enumerate(&config).unwrap();

    assert_eq!(first, second);
    let ids: HashSet<_> = first.iter().map(|s| s.id.clone()).collect();
    assert_eq!(ids.len(), first.len());
}

#[test]
fn test_range_filter_selects_closed_interval() {
    let suite = BenchmarkSuite::new(SuiteConfig::default(), Arc::new(LoopbackBroker::default())).unwrap();
    let filter = ScenarioFilter::parse("T3.3-T3.6").unwrap();
    let selected = suite.select(Some(&filter), None).unwrap();

    let ids: Vec<String> = selected.iter().map(|s| s.id.to_string()).collect();
    assert_eq!(ids, vec!["T3.3", "T3.4", "T3.5", "T3.6"]);
}

#[test]
fn test_empty_selection_is_reported() {
    let suite = BenchmarkSuite::new(SuiteConfig::default(), Arc::new(LoopbackBroker::default())).unwrap();

    let filter = ScenarioFilter::parse("T5.1-3").unwrap();
    let err = suite
        .select(Some(&filter), Some(ScenarioKind::Producer))
        .unwrap_err();
    assert!(matches!(err, BenchError::EmptySelection(_)));
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_suite_run_writes_reports() {
    let broker = Arc::new(LoopbackBroker::default());
    let mut suite = BenchmarkSuite::with_settings(small_suite_config(), broker.clone(), settings()).unwrap();
    let selection = suite.select(None, None).unwrap();
    assert_eq!(selection.len(), 5);

    suite.run(&selection).await;

    let agg = suite.aggregator();
    assert_eq!(agg.len(), 10);
    assert_eq!(agg.total_failures(), 0);
    for run in agg.runs() {
        assert_eq!(run.messages_processed, 50, "{} trial {}", run.scenario_id, run.trial_index);
    }

    let events = suite.deliveries().drain();
    // Three producer scenarios, two trials each.
    assert_eq!(events.len(), 300);

    let dir = tempfile::tempdir().unwrap();
    let paths = ResultsManager::new(dir.path()).write_all(agg, &events).unwrap();
    assert_eq!(paths.csv, dir.path().join(CSV_FILE));

    let csv = std::fs::read_to_string(&paths.csv).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(lines.len(), 1 + 10 + 5);
    assert_eq!(lines.iter().filter(|l| l.contains(",AVG,")).count(), 5);
    for line in &lines[1..] {
        assert_eq!(line.split(',').count(), 12, "{}", line);
    }

    let ndjson = std::fs::read_to_string(dir.path().join(DELIVERY_LOG_FILE)).unwrap();
    assert_eq!(ndjson.lines().count(), 300);
    let first: serde_json::Value = serde_json::from_str(ndjson.lines().next().unwrap()).unwrap();
    assert_eq!(first["level"], "success");
    assert!(first.get("messageKey").is_some());
    assert!(first.get("errorCode").is_none());

    let series: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(TIMESERIES_FILE)).unwrap()).unwrap();
    assert_eq!(series.as_array().unwrap().len(), 10);
    assert!(series[0]["samples"].as_array().map_or(false, |s| !s.is_empty()));

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap()).unwrap();
    assert_eq!(summary["metadata"]["totalRuns"], 10);
    assert_eq!(summary["averages"].as_array().unwrap().len(), 5);
}

/// Consumer trials read exactly what the matching producer trials wrote.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_consumers_read_producer_topics() {
    let broker = Arc::new(LoopbackBroker::default());
    let mut config = small_suite_config();
    config.message_count = 1000;
    config.producer_trials = 1;
    config.consumer_trials = 1;
    config.groups = vec![ScenarioGroup::Callback, ScenarioGroup::ConsumeBatched];

    let mut suite = BenchmarkSuite::with_settings(config, broker.clone(), settings()).unwrap();
    let selection = suite.select(None, None).unwrap();
    assert_eq!(selection[0].topic, selection[1].topic);

    suite.run(&selection).await;

    let consumed = suite.aggregator().runs_for(&selection[1].id)[0].clone();
    assert_eq!(consumed.messages_processed, 1000);
    assert!(consumed.total_bytes > 0);

    let commits = broker.commits_for_topic(&selection[1].topic);
    assert!(commits.len() >= 1000 / 20 && commits.len() <= 1000);
    assert_eq!(commits.last().unwrap().offset, 1000);
}
