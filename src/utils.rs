//! # Utility Functions
//!
//! Small helpers shared across the harness: identifiers and timestamps for
//! trials, human-readable formatting for the console, and fixed-width table
//! rendering for the summary report.
//!
//! ## Usage Examples
//!
//! ```rust
//! use broker_bench::utils::*;
//! use std::time::Duration;
//!
//! assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
//! assert_eq!(format_rate(1048576.0), "1.00 MB/s");
//! assert_eq!(format_message_rate(15500.0), "15.50K msg/s");
//! ```

use chrono::{SecondsFormat, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Bytes per megabyte. Throughput and memory both use binary megabytes.
pub const MIB: f64 = 1024.0 * 1024.0;

/// Random suffix that makes consumer group ids unique per trial
///
/// ## Returns
/// The first 8 hex digits of a UUID v4, e.g. `"550e8400"`
pub fn nonce() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Current UTC time as an RFC 3339 timestamp with millisecond precision,
/// e.g. `2024-05-01T10:00:00.123Z`
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Number of logical CPU cores
pub fn get_cpu_cores() -> usize {
    num_cpus::get()
}

/// Format a duration in a human-readable way
///
/// ## Unit Selection
///
/// - Nanoseconds below 1μs, then μs, ms and s with 2 decimals
/// - Minutes and hours as compound values (`1m 30s`, `2h 5m 0s`)
///
/// ## Examples
///
/// ```rust
/// # use broker_bench::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_nanos(750)), "750ns");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns < 1_000 {
        format!("{}ns", total_ns)
    } else if total_ns < 1_000_000 {
        format!("{:.2}μs", total_ns as f64 / 1_000.0)
    } else if total_ns < 1_000_000_000 {
        format!("{:.2}ms", total_ns as f64 / 1_000_000.0)
    } else if total_ns < 60_000_000_000 {
        format!("{:.2}s", total_ns as f64 / 1_000_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        if minutes < 60 {
            format!("{}m {}s", minutes, seconds % 60)
        } else {
            format!("{}h {}m {}s", minutes / 60, minutes % 60, seconds % 60)
        }
    }
}

/// Format a byte count with binary (1024-based) units
///
/// ```rust
/// # use broker_bench::utils::format_bytes;
/// assert_eq!(format_bytes(512.0), "512 B");
/// assert_eq!(format_bytes(2621440.0), "2.50 MB");
/// ```
pub fn format_bytes(bytes: f64) -> String {
    if bytes < 1024.0 {
        format!("{:.0} B", bytes)
    } else if bytes < MIB {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < MIB * 1024.0 {
        format!("{:.2} MB", bytes / MIB)
    } else {
        format!("{:.2} GB", bytes / (MIB * 1024.0))
    }
}

/// Format a byte rate, e.g. `"10.25 MB/s"`
pub fn format_rate(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format a message rate with decimal scaling
///
/// - below 1,000: `"750 msg/s"`
/// - below 1,000,000: `"15.50K msg/s"`
/// - otherwise: `"2.30M msg/s"`
pub fn format_message_rate(messages_per_second: f64) -> String {
    if messages_per_second < 1000.0 {
        format!("{:.0} msg/s", messages_per_second)
    } else if messages_per_second < 1_000_000.0 {
        format!("{:.2}K msg/s", messages_per_second / 1000.0)
    } else {
        format!("{:.2}M msg/s", messages_per_second / 1_000_000.0)
    }
}

/// Render one table row, padding each column to its width
///
/// ```text
/// | T1.1   | Produce (callback) | 48.20K msg/s |
/// ```
pub fn table_row(columns: &[&str], widths: &[usize]) -> String {
    let mut row = String::from("|");
    for (i, column) in columns.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(10);
        row.push_str(&format!(" {:width$} |", column, width = width));
    }
    row
}

/// Render a separator line matching `table_row` widths
///
/// ```text
/// +--------+--------------------+--------------+
/// ```
pub fn table_separator(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for &width in widths {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
    }
    line
}

/// Progress bar of `width` cells; full when `total` is zero
pub fn create_progress_indicator(current: u64, total: u64, width: usize) -> String {
    if total == 0 {
        return "█".repeat(width);
    }

    let progress = (current as f64 / total as f64).min(1.0);
    let filled = ((progress * width as f64) as usize).min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test duration formatting with various time scales
    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_nanos(500)), "500ns");
        assert_eq!(format_duration(Duration::from_nanos(1500)), "1.50μs");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_format_bytes_and_rates() {
        assert_eq!(format_bytes(500.0), "500 B");
        assert_eq!(format_bytes(1536.0), "1.50 KB");
        assert_eq!(format_bytes(1610612736.0), "1.50 GB");
        assert_eq!(format_rate(1048576.0), "1.00 MB/s");
        assert_eq!(format_message_rate(500.0), "500 msg/s");
        assert_eq!(format_message_rate(1500000.0), "1.50M msg/s");
    }

    #[test]
    fn test_nonce_and_timestamp_shape() {
        let a = nonce();
        assert_eq!(a.len(), 8);
        assert_ne!(a, nonce());

        let ts = iso_now();
        assert!(ts.ends_with('Z'), "{}", ts);
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    /// Test table rendering keeps columns aligned
    #[test]
    fn test_table_rendering() {
        let widths = [4, 6];
        assert_eq!(table_separator(&widths), "+------+--------+");
        assert_eq!(table_row(&["T1.1", "ok"], &widths), "| T1.1 | ok     |");
    }

    #[test]
    fn test_create_progress_indicator() {
        assert_eq!(create_progress_indicator(0, 100, 10), "░░░░░░░░░░");
        assert_eq!(create_progress_indicator(50, 100, 10), "█████░░░░░");
        assert_eq!(create_progress_indicator(500, 100, 10), "██████████");
        assert_eq!(create_progress_indicator(0, 0, 3), "███");
    }
}
