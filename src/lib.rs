//! cc-enrich: Common Crawl harvester for Australian business websites
//!
//! This crate walks a Common Crawl index, keeps the URLs served from the
//! `.au` commercial and sectoral domain space, fetches each page, infers a
//! company name and coarse industry, and appends the results to SQLite in
//! bounded chunks.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for cc-enrich operations
///
/// Only these errors end a run. Shard, record, and fetch failures are
/// absorbed by the pipeline and reported through logging and the run summary.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Index error: {0}")]
    Index(#[from] crawler::IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::PipelinePhase,
        to: state::PipelinePhase,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain suffix: {0}")]
    InvalidSuffix(String),
}

/// Result type alias for cc-enrich operations
pub type Result<T> = std::result::Result<T, EnrichError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Industry, Pipeline, RunSummary};
pub use state::PipelinePhase;
pub use storage::PageMetadata;
pub use url::{CandidateUrl, DomainFilter, FilteredUrl};
