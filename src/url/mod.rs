//! URL handling module for cc-enrich
//!
//! This module provides host extraction and the domain-space filter that
//! decides which crawl URLs are worth fetching.

mod domain;

use crate::config::DomainConfig;

pub use domain::extract_domain;

/// A URL taken from a crawl record that has not yet been domain-checked
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateUrl(String);

impl CandidateUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A URL whose host ends with one of the allow-listed suffixes
///
/// Only [`DomainFilter::admit`] creates these.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilteredUrl(String);

impl FilteredUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for FilteredUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Host-suffix allow-list for the target country's domain space
#[derive(Debug, Clone)]
pub struct DomainFilter {
    suffixes: Vec<String>,
}

impl DomainFilter {
    /// Creates a filter from suffixes such as ".com.au"; matching is case-insensitive
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            suffixes: suffixes
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &DomainConfig) -> Self {
        Self::new(&config.suffixes)
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Returns true iff the URL's lowercase host ends with an allow-listed suffix
    ///
    /// Malformed URLs and URLs without a host return false.
    ///
    /// # Examples
    ///
    /// ```
    /// use cc_enrich::url::DomainFilter;
    ///
    /// let filter = DomainFilter::new([".com.au", ".gov.au"]);
    /// assert!(filter.belongs("https://Example.COM.AU/page"));
    /// assert!(!filter.belongs("https://example.com"));
    /// assert!(!filter.belongs("not a url"));
    /// ```
    pub fn belongs(&self, url: &str) -> bool {
        match extract_domain(url) {
            Some(host) => self.suffixes.iter().any(|s| host.ends_with(s.as_str())),
            None => false,
        }
    }

    /// Promotes a candidate to a [`FilteredUrl`] if it belongs to the domain space
    pub fn admit(&self, candidate: CandidateUrl) -> Option<FilteredUrl> {
        if self.belongs(candidate.as_str()) {
            Some(FilteredUrl(candidate.0))
        } else {
            None
        }
    }
}

impl Default for DomainFilter {
    fn default() -> Self {
        Self::from_config(&DomainConfig::default())
    }
}
