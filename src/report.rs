//! # Report Writing
//!
//! `ResultsManager` turns a finished suite into files under the output
//! directory:
//!
//! | File | Content |
//! |---|---|
//! | `results.csv` | one row per trial, then one `AVG` row per scenario |
//! | `delivery-log.ndjson` | one producer delivery event per line |
//! | `timeseries.json` | 1 Hz progress samples of every trial |
//! | `summary.json` | metadata, system information, runs and averages |
//!
//! The CSV layout is fixed: column order and decimal places never change,
//! so files from different runs can be diffed and concatenated.

use crate::delivery::DeliveryEvent;
use crate::results::{AverageRecord, RunRecord, SuiteAggregator};
use crate::scenario::ScenarioId;
use crate::timeseries::Sample;
use crate::utils::{format_bytes, format_message_rate, get_cpu_cores, table_row, table_separator};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use tracing::info;

pub const CSV_FILE: &str = "results.csv";
pub const DELIVERY_LOG_FILE: &str = "delivery-log.ndjson";
pub const TIMESERIES_FILE: &str = "timeseries.json";
pub const SUMMARY_FILE: &str = "summary.json";

pub const CSV_HEADER: &str = "id,scenarioName,trial,messagesProcessed,totalBytes,elapsedMs,\
messagesPerSecond,megabytesPerSecond,meanLatencyMs,peakCpuPercent,peakMemoryMb,failureCount";

/// System information for reproducibility
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub os: String,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub hostname: Option<String>,
    pub architecture: String,
    pub cpu_cores: usize,
    pub total_memory_bytes: u64,
    pub benchmark_version: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        Self {
            os: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            os_version: System::os_version(),
            kernel_version: System::kernel_version(),
            hostname: System::host_name(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: get_cpu_cores(),
            total_memory_bytes: sys.total_memory(),
            benchmark_version: crate::VERSION.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryMetadata {
    version: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    total_runs: usize,
    total_failures: u64,
    system_info: SystemInfo,
}

#[derive(Debug, Serialize)]
struct SuiteSummary<'a> {
    metadata: SummaryMetadata,
    runs: &'a [RunRecord],
    averages: Vec<AverageRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrialSeries<'a> {
    scenario_id: &'a ScenarioId,
    trial_index: u32,
    samples: &'a [Sample],
}

/// Paths of the files written by [`ResultsManager::write_all`]
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub csv: PathBuf,
    pub delivery_log: PathBuf,
    pub timeseries: PathBuf,
    pub summary: PathBuf,
}

/// Writes the report files of one suite run.
pub struct ResultsManager {
    output_dir: PathBuf,
}

impl ResultsManager {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write every report file, creating the output directory if needed.
    pub fn write_all(&self, aggregator: &SuiteAggregator, events: &[DeliveryEvent]) -> Result<ReportPaths> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("cannot create output directory {}", self.output_dir.display()))?;

        let paths = ReportPaths {
            csv: self.output_dir.join(CSV_FILE),
            delivery_log: self.output_dir.join(DELIVERY_LOG_FILE),
            timeseries: self.output_dir.join(TIMESERIES_FILE),
            summary: self.output_dir.join(SUMMARY_FILE),
        };

        fs::write(&paths.csv, render_csv(aggregator))
            .with_context(|| format!("cannot write {}", paths.csv.display()))?;
        write_delivery_log(&paths.delivery_log, events)?;
        write_json(&paths.timeseries, &timeseries(aggregator))?;
        write_json(&paths.summary, &summary(aggregator))?;

        info!("Results written to: {}", paths.csv.display());
        info!("Delivery log ({} events) written to: {}", events.len(), paths.delivery_log.display());
        info!("Time series written to: {}", paths.timeseries.display());
        info!("Summary written to: {}", paths.summary.display());
        Ok(paths)
    }
}

/// Render the CSV: a header, every run in completion order, then one `AVG`
/// row per scenario ordered by id.
pub fn render_csv(aggregator: &SuiteAggregator) -> String {
    let mut out = String::new();
    out.push_str(CSV_HEADER);
    out.push('\n');

    for run in aggregator.runs() {
        out.push_str(&run_row(run));
        out.push('\n');
    }
    for avg in aggregator.averages() {
        out.push_str(&average_row(&avg));
        out.push('\n');
    }
    out
}

fn run_row(run: &RunRecord) -> String {
    format!(
        "{},{},{},{},{},{:.2},{:.2},{:.4},{:.6},{:.2},{:.2},{}",
        csv_field(run.scenario_id.as_str()),
        csv_field(&run.scenario_name),
        run.trial_index,
        run.messages_processed,
        run.total_bytes,
        run.elapsed_ms(),
        run.messages_per_second(),
        run.megabytes_per_second(),
        run.mean_latency_ms(),
        run.peak_cpu_percent,
        run.peak_memory_mb(),
        run.failure_count
    )
}

fn average_row(avg: &AverageRecord) -> String {
    format!(
        "{},{},AVG,{:.2},{:.2},{:.2},{:.2},{:.4},{:.6},{:.2},{:.2},{:.2}",
        csv_field(avg.scenario_id.as_str()),
        csv_field(&avg.scenario_name),
        avg.messages_processed,
        avg.total_bytes,
        avg.elapsed_ms,
        avg.messages_per_second(),
        avg.megabytes_per_second(),
        avg.mean_latency_ms(),
        avg.peak_cpu_percent,
        avg.peak_memory_mb(),
        avg.failure_count
    )
}

/// Quote a field if it contains a delimiter, a quote or a line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_delivery_log(path: &Path, events: &[DeliveryEvent]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
    }
    writer
        .flush()
        .with_context(|| format!("cannot write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))
}

fn timeseries(aggregator: &SuiteAggregator) -> Vec<TrialSeries<'_>> {
    aggregator
        .runs()
        .iter()
        .map(|run| TrialSeries {
            scenario_id: &run.scenario_id,
            trial_index: run.trial_index,
            samples: &run.samples,
        })
        .collect()
}

fn summary(aggregator: &SuiteAggregator) -> SuiteSummary<'_> {
    SuiteSummary {
        metadata: SummaryMetadata {
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            total_runs: aggregator.len(),
            total_failures: aggregator.total_failures(),
            system_info: SystemInfo::collect(),
        },
        runs: aggregator.runs(),
        averages: aggregator.averages(),
    }
}

/// Lines of the console summary: one row per scenario average.
pub fn summary_table(averages: &[AverageRecord]) -> Vec<String> {
    let headers = ["ID", "Scenario", "Throughput", "MB/s", "CPU %", "Memory", "Failures"];
    let rows: Vec<[String; 7]> = averages
        .iter()
        .map(|avg| {
            [
                avg.scenario_id.to_string(),
                avg.scenario_name.clone(),
                format_message_rate(avg.messages_per_second()),
                format!("{:.2}", avg.megabytes_per_second()),
                format!("{:.1}", avg.peak_cpu_percent),
                format_bytes(avg.peak_memory_bytes),
                format!("{:.2}", avg.failure_count),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let separator = table_separator(&widths);
    let mut lines = vec![separator.clone(), table_row(&headers, &widths), separator.clone()];
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        lines.push(table_row(&cells, &widths));
    }
    lines.push(separator);
    lines
}

pub fn print_summary_table(aggregator: &SuiteAggregator) {
    let averages = aggregator.averages();
    if averages.is_empty() {
        return;
    }
    println!();
    for line in summary_table(&averages) {
        println!("{}", line);
    }
}
