//! Statistics generation from the sink database
//!
//! This module provides functionality for extracting and displaying
//! sink statistics from the storage layer.

use crate::crawler::Industry;
use crate::storage::{RunRecord, Storage};
use crate::EnrichError;
use std::collections::HashMap;
use std::fmt;

/// Sink statistics summary
#[derive(Debug, Clone)]
pub struct SinkStatistics {
    /// Total number of stored rows
    pub total_rows: u64,

    /// Number of distinct URLs across all rows
    pub distinct_urls: u64,

    /// Rows carrying a company name
    pub named_rows: u64,

    /// Count of rows by industry
    pub rows_by_industry: HashMap<Industry, u64>,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl SinkStatistics {
    /// Rows stored without a company name
    pub fn unnamed_rows(&self) -> u64 {
        self.total_rows.saturating_sub(self.named_rows)
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(SinkStatistics)` - Successfully loaded statistics
/// * `Err(EnrichError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<SinkStatistics, EnrichError> {
    Ok(SinkStatistics {
        total_rows: storage.count_rows()?,
        distinct_urls: storage.count_distinct_urls()?,
        named_rows: storage.count_named_rows()?,
        rows_by_industry: storage.count_by_industry()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Wall-clock duration of a finished run, in seconds
fn run_duration_seconds(run: &RunRecord) -> Option<i64> {
    let started = run.started_at.parse::<chrono::DateTime<chrono::Utc>>().ok()?;
    let finished = run
        .finished_at
        .as_deref()?
        .parse::<chrono::DateTime<chrono::Utc>>()
        .ok()?;
    Some((finished - started).num_seconds())
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// The plain-text report printed by `--stats`
impl fmt::Display for SinkStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Sink Statistics ===\n")?;

        writeln!(f, "Overview:")?;
        writeln!(f, "  Total rows: {}", self.total_rows)?;
        writeln!(f, "  Distinct URLs: {}", self.distinct_urls)?;
        writeln!(
            f,
            "  With company name: {} ({:.1}%)",
            self.named_rows,
            percentage(self.named_rows, self.total_rows)
        )?;
        writeln!(f, "  Without company name: {}", self.unnamed_rows())?;
        writeln!(f)?;

        writeln!(f, "Rows by Industry:")?;
        for industry in Industry::all() {
            let count = self.rows_by_industry.get(&industry).copied().unwrap_or(0);
            writeln!(
                f,
                "  {}: {} ({:.1}%)",
                industry,
                count,
                percentage(count, self.total_rows)
            )?;
        }
        writeln!(f)?;

        let Some(run) = &self.latest_run else {
            return writeln!(f, "No runs recorded");
        };

        writeln!(f, "Latest Run:")?;
        writeln!(f, "  Run ID: {}", run.id)?;
        writeln!(f, "  Status: {}", run.status.to_db_string())?;
        writeln!(f, "  Started: {}", run.started_at)?;
        if let Some(finished) = &run.finished_at {
            writeln!(f, "  Finished: {}", finished)?;
        }
        if let Some(seconds) = run_duration_seconds(run) {
            writeln!(f, "  Duration: {} seconds", seconds)?;
        }
        writeln!(
            f,
            "  Shards: {} planned, {} processed, {} skipped",
            run.shards_planned, run.shards_processed, run.shards_skipped
        )?;
        writeln!(
            f,
            "  Pages: {} filtered, {} failed, {} persisted",
            run.urls_filtered, run.fetch_failures, run.records_persisted
        )
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &SinkStatistics) {
    print!("{}", stats);
}
