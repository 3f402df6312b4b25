use url::Url;

/// Extracts the lowercase host from a URL string
///
/// Returns `None` when the string does not parse as an absolute URL or the
/// URL carries no host (e.g. `mailto:` or `data:` URLs).
///
/// # Examples
///
/// ```
/// use cc_enrich::url::extract_domain;
///
/// assert_eq!(extract_domain("https://EXAMPLE.com.au/path"), Some("example.com.au".to_string()));
/// assert_eq!(extract_domain("example.com.au/path"), None);
/// ```
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_lowercase())
}
