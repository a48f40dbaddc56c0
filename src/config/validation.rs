use crate::config::types::{
    Config, CrawlerConfig, ExtractionConfig, OutputConfig, PipelineConfig, RetryConfig,
    TargetEntry, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pipeline_config(&config.pipeline)?;
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_retry_config("fetch", &config.retry.fetch)?;
    validate_retry_config("extraction", &config.retry.extraction)?;
    validate_retry_config("rate-limit", &config.retry.rate_limit)?;
    validate_extraction_config(&config.extraction)?;
    validate_output_config(&config.output)?;
    validate_targets(&config.targets)?;
    Ok(())
}

/// Validates worker pool sizes and queue attempts
fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("crawl_workers", config.crawl_workers),
        ("clean_workers", config.clean_workers),
        ("format_workers", config.format_workers),
    ] {
        if !(1..=64).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "{} must be between 1 and 64, got {}",
                name, value
            )));
        }
    }

    if config.fetch_workers < 1 || config.fetch_workers > 100 {
        return Err(ConfigError::Validation(format!(
            "fetch_workers must be between 1 and 100, got {}",
            config.fetch_workers
        )));
    }

    if config.queue_max_attempts < 1 {
        return Err(ConfigError::Validation(
            "queue_max_attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    // max_depth >= 0 is always true for u32, so no check needed

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.fetch_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "fetch_timeout_ms must be >= 100ms, got {}ms",
            config.fetch_timeout_ms
        )));
    }

    if config.max_page_chars < 100 {
        return Err(ConfigError::Validation(format!(
            "max_page_chars must be >= 100, got {}",
            config.max_page_chars
        )));
    }

    if config.chunk_overlap_chars * 2 > config.max_page_chars {
        return Err(ConfigError::Validation(format!(
            "chunk_overlap_chars must be at most half of max_page_chars ({}), got {}",
            config.max_page_chars, config.chunk_overlap_chars
        )));
    }

    if config.max_chunks < 1 || config.max_chunks > 50 {
        return Err(ConfigError::Validation(format!(
            "max_chunks must be between 1 and 50, got {}",
            config.max_chunks
        )));
    }

    if config.minimum_time_on_page > 60_000 {
        return Err(ConfigError::Validation(format!(
            "minimum_time_on_page must be <= 60000ms, got {}ms",
            config.minimum_time_on_page
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates one backoff schedule
fn validate_retry_config(name: &str, config: &RetryConfig) -> Result<(), ConfigError> {
    if config.multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "retry.{}.multiplier must be >= 1.0, got {}",
            name, config.multiplier
        )));
    }

    if !(0.0..=1.0).contains(&config.jitter) {
        return Err(ConfigError::Validation(format!(
            "retry.{}.jitter must be between 0.0 and 1.0, got {}",
            name, config.jitter
        )));
    }

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry.{}.max-delay-ms ({}) is smaller than base-delay-ms ({})",
            name, config.max_delay_ms, config.base_delay_ms
        )));
    }

    Ok(())
}

/// Validates the extraction endpoint
fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.endpoint).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid extraction endpoint '{}': {}", config.endpoint, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "Extraction endpoint '{}' must use HTTP or HTTPS",
            config.endpoint
        )));
    }

    if let Some(var) = &config.api_key_env {
        if var.trim().is_empty() {
            return Err(ConfigError::Validation(
                "api_key_env cannot be empty when set".to_string(),
            ));
        }
    }

    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "extraction timeout_ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    if matches!(&config.database_path, Some(path) if path.is_empty()) {
        return Err(ConfigError::Validation(
            "database_path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawl targets
fn validate_targets(targets: &[TargetEntry]) -> Result<(), ConfigError> {
    for entry in targets {
        if entry.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Target name cannot be empty".to_string(),
            ));
        }

        if entry.seeds.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Target '{}' must have at least one seed URL",
                entry.name
            )));
        }

        for seed in &entry.seeds {
            let url = Url::parse(seed).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e))
            })?;

            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::Validation(format!(
                    "Seed URL '{}' must use HTTP or HTTPS",
                    seed
                )));
            }
        }

        if entry.max_pages == Some(0) {
            return Err(ConfigError::Validation(format!(
                "Target '{}' max-pages must be >= 1",
                entry.name
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
