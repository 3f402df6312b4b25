//! Crawl manifest loading
//!
//! The manifest is a gzip file listing one shard path per line, relative to
//! the crawl's storage root. Failing to load it is the one fatal error of a
//! run: without it there is nothing to process.

use crate::config::IndexConfig;
use flate2::read::MultiGzDecoder;
use reqwest::Client;
use std::io::Read;
use thiserror::Error;
use url::Url;

/// Errors that prevent the manifest from being loaded
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Invalid base URL {url}: {source}")]
    BaseUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("Failed to fetch manifest {url}: {source}")]
    Fetch { url: String, source: reqwest::Error },

    #[error("Manifest {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to decompress manifest {url}: {source}")]
    Decompress {
        url: String,
        source: std::io::Error,
    },

    #[error("Invalid manifest entry '{entry}': {source}")]
    Entry {
        entry: String,
        source: url::ParseError,
    },
}

/// Absolute location of one index shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardRef {
    url: Url,
}

impl ShardRef {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl std::fmt::Display for ShardRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Parses the storage root, making sure relative entries append to it
fn parse_base_url(base: &str) -> Result<Url, IndexError> {
    let normalized = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    };

    Url::parse(&normalized).map_err(|source| IndexError::BaseUrl {
        url: base.to_string(),
        source,
    })
}

/// Fetches, decompresses, and resolves the crawl manifest
///
/// # Returns
///
/// Shard references in manifest order
pub async fn load_shard_refs(
    client: &Client,
    config: &IndexConfig,
) -> Result<Vec<ShardRef>, IndexError> {
    let base = parse_base_url(&config.base_url)?;
    let manifest_url = config.manifest_url();

    let response = client
        .get(&manifest_url)
        .send()
        .await
        .map_err(|source| IndexError::Fetch {
            url: manifest_url.clone(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(IndexError::Status {
            url: manifest_url,
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await.map_err(|source| IndexError::Fetch {
        url: manifest_url.clone(),
        source,
    })?;

    let listing = decompress_manifest(&body).map_err(|source| IndexError::Decompress {
        url: manifest_url.clone(),
        source,
    })?;

    let shards = parse_manifest(&listing, &base)?;
    tracing::debug!("Manifest {} lists {} shards", manifest_url, shards.len());

    Ok(shards)
}

/// Inflates a gzip manifest into text
///
/// Invalid gzip and invalid UTF-8 are both reported as I/O errors.
pub fn decompress_manifest(bytes: &[u8]) -> std::io::Result<String> {
    let mut listing = String::new();
    MultiGzDecoder::new(bytes).read_to_string(&mut listing)?;
    Ok(listing)
}

/// Resolves each non-blank manifest line against the storage root
pub fn parse_manifest(listing: &str, base: &Url) -> Result<Vec<ShardRef>, IndexError> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            base.join(line)
                .map(ShardRef::new)
                .map_err(|source| IndexError::Entry {
                    entry: line.to_string(),
                    source,
                })
        })
        .collect()
}

/// Applies the configured offset and cap to the manifest listing
pub fn plan_shards(shards: Vec<ShardRef>, first: usize, max: Option<usize>) -> Vec<ShardRef> {
    shards
        .into_iter()
        .skip(first)
        .take(max.unwrap_or(usize::MAX))
        .collect()
}
