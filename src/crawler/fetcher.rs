//! HTTP fetcher implementation
//!
//! This module handles the per-page HTTP requests of the pipeline:
//! - Building the shared HTTP client with a browser user agent
//! - Single GET requests with a per-request timeout
//! - Classifying failures into typed, per-URL errors
//!
//! A failed fetch never aborts the batch. The caller logs the error and
//! moves on to the next URL; there is no retry.

use crate::config::FetcherConfig;
use crate::crawler::parser::extract_metadata;
use crate::storage::PageMetadata;
use crate::url::FilteredUrl;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use thiserror::Error;

/// Connect timeout shared by page, shard, and manifest requests
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-URL fetch failure
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {source}")]
    Connect { url: String, source: reqwest::Error },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("HTTP error for {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("Failed to read body of {url}: {source}")]
    Body { url: String, source: reqwest::Error },
}

impl FetchError {
    /// The URL whose fetch failed
    pub fn url(&self) -> &str {
        match self {
            Self::Timeout { url }
            | Self::Connect { url, .. }
            | Self::Status { url, .. }
            | Self::Network { url, .. }
            | Self::Body { url, .. } => url,
        }
    }

    fn from_send(url: &str, error: reqwest::Error) -> Self {
        let url = url.to_string();
        if error.is_timeout() {
            Self::Timeout { url }
        } else if error.is_connect() {
            Self::Connect { url, source: error }
        } else {
            Self::Network { url, source: error }
        }
    }
}

/// Returns a client builder preconfigured from the fetcher settings
///
/// No overall request timeout is set here: shard downloads may take as long
/// as they need. Page fetches carry their own timeout per request.
pub fn http_client_builder(config: &FetcherConfig) -> ClientBuilder {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(CONNECT_TIMEOUT)
        .gzip(true)
        .brotli(true)
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use cc_enrich::config::FetcherConfig;
/// use cc_enrich::crawler::build_http_client;
///
/// let client = build_http_client(&FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    http_client_builder(config).build()
}

/// Fetches one page and returns its body
///
/// # Errors
///
/// | Condition | Result |
/// |-----------|--------|
/// | No response within `timeout` | `Timeout` |
/// | Connection refused, DNS, TLS | `Connect` |
/// | Non-2xx status | `Status` |
/// | Other transport failure | `Network` |
/// | Body could not be read | `Body` (or `Timeout`) |
pub async fn fetch_page(client: &Client, url: &str, timeout: Duration) -> Result<String, FetchError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| FetchError::from_send(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response.text().await.map_err(|e| {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Body {
                url: url.to_string(),
                source: e,
            }
        }
    })
}

/// Fetches a filtered URL and extracts its metadata
pub async fn harvest_page(
    client: &Client,
    url: &FilteredUrl,
    timeout: Duration,
) -> Result<PageMetadata, FetchError> {
    let body = fetch_page(client, url.as_str(), timeout).await?;
    let fields = extract_metadata(&body);

    tracing::debug!(
        "Extracted {} ({}) from {}",
        fields.name.as_deref().unwrap_or("<no name>"),
        fields.industry,
        url
    );

    Ok(PageMetadata::new(url.as_str(), fields.name, fields.industry))
}
