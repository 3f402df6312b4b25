use serde::Deserialize;

/// Desktop browser user agent; many sites reject unidentified clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Main configuration structure for cc-enrich
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub domain: DomainConfig,
    pub output: OutputConfig,
}

/// Location of the crawl manifest and how much of it to process
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// Storage root that manifest entries are relative to
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Crawl snapshot identifier (e.g. "CC-MAIN-2023-23")
    #[serde(rename = "crawl-id")]
    pub crawl_id: String,

    /// File name of the gzip manifest inside the crawl directory
    #[serde(rename = "manifest-name", default = "default_manifest_name")]
    pub manifest_name: String,

    /// Number of manifest entries to skip before processing
    #[serde(rename = "first-shard", default)]
    pub first_shard: usize,

    /// Maximum number of shards to process in one run
    #[serde(rename = "max-shards", default)]
    pub max_shards: Option<usize>,
}

impl IndexConfig {
    /// Full URL of the manifest resource
    pub fn manifest_url(&self) -> String {
        format!(
            "{}/crawl-data/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.crawl_id,
            self.manifest_name
        )
    }
}

/// Page fetcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Per-page request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of page fetches in flight within one chunk
    #[serde(rename = "max-concurrent-fetches", default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_concurrent_fetches: default_max_concurrent(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of filtered URLs fetched and flushed as one unit
    #[serde(rename = "chunk-size", default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

/// Target domain space
#[derive(Debug, Clone, Deserialize)]
pub struct DomainConfig {
    /// Host suffixes considered in scope (e.g. ".com.au")
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            suffixes: default_suffixes(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Table receiving extracted page metadata
    #[serde(default = "default_table")]
    pub table: String,

    /// How rows are written to the table
    #[serde(rename = "write-mode", default)]
    pub write_mode: WriteMode,
}

/// Sink write policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// Plain inserts; re-running a manifest duplicates rows
    #[default]
    Append,
    /// Unique on url; re-runs overwrite the previous row
    Upsert,
}

fn default_manifest_name() -> String {
    "cc-index.paths.gz".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_max_concurrent() -> usize {
    8
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_chunk_size() -> usize {
    100
}

fn default_suffixes() -> Vec<String> {
    [".com.au", ".net.au", ".org.au", ".edu.au", ".gov.au"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_table() -> String {
    "common_crawl_raw".to_string()
}
