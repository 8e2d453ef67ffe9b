//! Logger initialization and log-file statistics
//!
//! The file logger writes `<rfc3339> [LEVEL] message` lines; the admin
//! "logs" button parses the same file back with [`summarize_log`].

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use simplelog::*;
use std::collections::BTreeMap;
use std::path::Path;

/// Initialize logger for both console and file output
///
/// The parent directory of `log_file_path` is created if missing and the
/// file is opened in append mode so restarts keep history.
pub fn init_logger(log_file_path: &str, level: &str) -> Result<()> {
    if let Some(parent) = Path::new(log_file_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs_err::create_dir_all(parent)?;
        }
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .map_err(|e| anyhow::anyhow!("Failed to open log file: {}", e))?;

    let level = parse_level(level);
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .add_filter_ignore_str("rustls")
        .build();

    CombinedLogger::init(vec![
        TermLogger::new(level, config.clone(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(level, config, log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

fn parse_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Aggregated view of a log file for the admin panel
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LogSummary {
    /// Line count per level within the window
    pub counts: BTreeMap<String, usize>,
    /// ERROR lines within the window, oldest first
    pub errors: Vec<String>,
    /// Last lines of the file regardless of timestamp
    pub tail: Vec<String>,
}

impl LogSummary {
    /// Human-readable report: counts by level and the last `last_errors` errors
    pub fn render(&self, days: i64, last_errors: usize) -> String {
        let mut out = format!("📊 Статистика логов за последние {} дня:\n", days);
        if self.counts.is_empty() {
            out.push_str("• записей нет\n");
        }
        for (level, count) in &self.counts {
            out.push_str(&format!("• {}: {}\n", level, count));
        }
        if !self.errors.is_empty() {
            out.push_str("\n🚨 Последние ошибки:\n");
            let skip = self.errors.len().saturating_sub(last_errors);
            for line in self.errors.iter().skip(skip) {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}

/// Parses the timestamp and level out of one simplelog line.
///
/// Lines look like `2025-01-07T12:00:01.123456+03:00 [INFO] message`;
/// continuation lines and foreign formats yield `None`.
pub fn parse_log_line(line: &str) -> Option<(DateTime<FixedOffset>, String)> {
    let captures = lazy_regex::regex_captures!(r"^(\S+)\s+\[\s*([A-Z]+)\s*\]", line)?;
    let (_, ts, level) = captures;
    let ts = DateTime::parse_from_rfc3339(ts).ok()?;
    Some((ts, level.to_string()))
}

/// Summarizes the log content for the last `days` days, keeping `tail_len` trailing lines.
pub fn summarize_log(content: &str, now: DateTime<Utc>, days: i64, tail_len: usize) -> LogSummary {
    let since = now - ChronoDuration::days(days);
    let mut summary = LogSummary::default();

    for line in content.lines() {
        if let Some((ts, level)) = parse_log_line(line) {
            if ts.with_timezone(&Utc) >= since {
                *summary.counts.entry(level.clone()).or_insert(0) += 1;
                if level == "ERROR" {
                    summary.errors.push(line.to_string());
                }
            }
        }
    }

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(tail_len);
    summary.tail = lines[start..].iter().map(|l| l.to_string()).collect();
    summary
}
