//! Crawler module for index walking and page harvesting
//!
//! This module contains the core pipeline logic, including:
//! - Crawl manifest loading and shard planning
//! - Shard download and record decoding
//! - Lazy chunking of filtered URLs
//! - Page fetching and metadata extraction
//! - Overall run coordination

mod chunker;
mod fetcher;
mod index;
mod parser;
mod pipeline;
mod shard;

pub use chunker::Chunker;
pub use fetcher::{build_http_client, fetch_page, harvest_page, http_client_builder, FetchError};
pub use index::{decompress_manifest, load_shard_refs, parse_manifest, plan_shards, IndexError, ShardRef};
pub use parser::{classify_industry, extract_metadata, ExtractedFields, Industry, INDUSTRY_KEYWORDS};
pub use pipeline::{Pipeline, RunSummary};
pub use shard::{decode_record, fetch_shard, CrawlRecord, ShardError, ShardStream};

use crate::config::Config;
use crate::storage::Storage;
use crate::EnrichError;

/// Runs a complete harvest against an open sink
///
/// This is the main entry point for a run. It will:
/// 1. Build the HTTP client
/// 2. Record a new run in the sink
/// 3. Load and plan the crawl manifest
/// 4. Stream, filter, and chunk each shard
/// 5. Fetch, extract, and flush each chunk
/// 6. Record the run summary
///
/// # Arguments
///
/// * `config` - The pipeline configuration
/// * `storage` - The sink receiving extracted metadata
/// * `config_hash` - Hash of the configuration file, stored on the run
///
/// # Example
///
/// ```no_run
/// use cc_enrich::config::load_config_with_hash;
/// use cc_enrich::crawler::harvest;
/// use cc_enrich::storage::open_storage;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("cc-enrich.toml"))?;
/// let mut storage = open_storage(&config.output)?;
/// let summary = harvest(&config, &mut storage, &hash).await?;
/// println!("{}", summary);
/// # Ok(())
/// # }
/// ```
pub async fn harvest<S: Storage>(
    config: &Config,
    storage: &mut S,
    config_hash: &str,
) -> Result<RunSummary, EnrichError> {
    Pipeline::new(config)?.run(storage, config_hash).await
}
