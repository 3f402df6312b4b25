use crate::config::types::{
    Config, DomainConfig, FetcherConfig, IndexConfig, OutputConfig, PipelineConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_index_config(&config.index)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_pipeline_config(&config.pipeline)?;
    validate_domain_config(&config.domain)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the crawl index location
fn validate_index_config(config: &IndexConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.crawl_id.trim().is_empty() || config.crawl_id.contains('/') {
        return Err(ConfigError::Validation(format!(
            "crawl_id must be a single non-empty path segment, got '{}'",
            config.crawl_id
        )));
    }

    if config.manifest_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "manifest_name cannot be empty".to_string(),
        ));
    }

    if config.max_shards == Some(0) {
        return Err(ConfigError::Validation(
            "max_shards must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates page fetcher configuration
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 || config.timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "timeout_secs must be between 1 and 300, got {}",
            config.timeout_secs
        )));
    }

    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 100, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.chunk_size < 1 {
        return Err(ConfigError::Validation(format!(
            "chunk_size must be >= 1, got {}",
            config.chunk_size
        )));
    }
    Ok(())
}

/// Validates the domain allow-list
fn validate_domain_config(config: &DomainConfig) -> Result<(), ConfigError> {
    if config.suffixes.is_empty() {
        return Err(ConfigError::Validation(
            "domain suffixes cannot be empty".to_string(),
        ));
    }

    for suffix in &config.suffixes {
        validate_suffix(suffix)?;
    }

    Ok(())
}

/// Validates a single host suffix such as ".com.au"
fn validate_suffix(suffix: &str) -> Result<(), ConfigError> {
    let Some(body) = suffix.strip_prefix('.') else {
        return Err(ConfigError::InvalidSuffix(format!(
            "Suffix '{}' must start with '.'",
            suffix
        )));
    };

    if body.is_empty() {
        return Err(ConfigError::InvalidSuffix(
            "Domain suffix cannot be empty".to_string(),
        ));
    }

    if !body
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidSuffix(format!(
            "Suffix '{}' contains invalid characters",
            suffix
        )));
    }

    if body.starts_with('.') || body.ends_with('.') || body.contains("..") {
        return Err(ConfigError::InvalidSuffix(format!(
            "Suffix '{}' has misplaced dots",
            suffix
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    validate_table_name(&config.table)?;

    Ok(())
}

/// The table name is interpolated into SQL, so it must be a plain identifier
fn validate_table_name(table: &str) -> Result<(), ConfigError> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::Validation(format!(
            "table must match [A-Za-z_][A-Za-z0-9_]*, got '{}'",
            table
        )));
    }

    if table == "runs" {
        return Err(ConfigError::Validation(
            "table name 'runs' is reserved".to_string(),
        ));
    }

    Ok(())
}
