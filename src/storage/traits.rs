//! Storage traits and error types
//!
//! This module defines the trait interface for sink backends and
//! associated error types.

use crate::crawler::{Industry, RunSummary};
use crate::storage::{PageMetadata, RunRecord, RunStatus};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for sink backend implementations
///
/// The pipeline only creates runs and appends metadata. The read methods
/// exist for reporting and are never called while a run is in progress.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new run in the `running` state
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Records the terminal status and summary counters of a run
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        summary: &RunSummary,
    ) -> StorageResult<()>;

    // ===== Metadata Sink =====

    /// Appends one chunk of metadata as a single atomic write
    ///
    /// Either every row of the batch is stored or none is.
    ///
    /// # Returns
    ///
    /// The number of rows written
    fn append_metadata(&mut self, run_id: i64, batch: &[PageMetadata]) -> StorageResult<usize>;

    // ===== Statistics =====

    /// Counts all stored metadata rows
    fn count_rows(&self) -> StorageResult<u64>;

    /// Counts distinct URLs across all rows
    fn count_distinct_urls(&self) -> StorageResult<u64>;

    /// Counts rows that carry a company name
    fn count_named_rows(&self) -> StorageResult<u64>;

    /// Counts rows per industry
    fn count_by_industry(&self) -> StorageResult<HashMap<Industry, u64>>;

    /// Gets every stored row for a URL, oldest first
    fn get_metadata_by_url(&self, url: &str) -> StorageResult<Vec<PageMetadata>>;
}
