//! Storage module for persisting extracted page metadata
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Chunk-at-a-time appends of page metadata
//! - Run tracking and summary bookkeeping
//! - Read-only statistics for reporting

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::OutputConfig;
use crate::crawler::Industry;
use crate::EnrichError;

/// Opens the sink described by the output configuration
///
/// The returned handle closes its connection when dropped, so callers get
/// a guaranteed close on every exit path by scoping it.
pub fn open_storage(config: &OutputConfig) -> Result<SqliteStorage, EnrichError> {
    SqliteStorage::open(config)
}

/// Metadata extracted from one fetched page
///
/// This is the only entity that outlives a run. It is built once per
/// filtered URL and written once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMetadata {
    pub url: String,
    pub company_name: Option<String>,
    pub industry: Industry,
}

impl PageMetadata {
    pub fn new(url: impl Into<String>, company_name: Option<String>, industry: Industry) -> Self {
        Self {
            url: url.into(),
            company_name,
            industry,
        }
    }
}

/// Represents a pipeline run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub shards_planned: u64,
    pub shards_processed: u64,
    pub shards_skipped: u64,
    pub urls_filtered: u64,
    pub fetch_failures: u64,
    pub records_persisted: u64,
}

/// Status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
