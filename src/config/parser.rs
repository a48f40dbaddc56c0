use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use listing_relay::config::load_config;
///
/// let config = load_config(Path::new("relay.toml")).unwrap();
/// println!("Max depth: {}", config.crawler.max_depth);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is recorded with every job so a job history can be tied back to
/// the settings it ran under.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SortKey;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[pipeline]
crawl-workers = 3
fetch-workers = 8

[crawler]
max-depth = 1
max-pages = 20

[user-agent]
crawler-name = "ListingRelay"
crawler-version = "0.1"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[retry.fetch]
max-retries = 5
base-delay-ms = 100
multiplier = 1.5
max-delay-ms = 2000

[extraction]
endpoint = "http://localhost:8080/extract"
api-key-env = "EXTRACTION_API_KEY"

[output]
directory = "./output"
database-path = "./jobs.db"
sort = "price-desc"

[[target]]
name = "vallarta"
seeds = ["https://listings.example.com/venta"]
max-pages = 3
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.pipeline.crawl_workers, 3);
        assert_eq!(config.pipeline.fetch_workers, 8);
        assert_eq!(config.pipeline.clean_workers, 1);
        assert_eq!(config.crawler.max_depth, 1);
        assert_eq!(config.crawler.max_pages, 20);
        assert_eq!(config.retry.fetch.max_retries, 5);
        assert_eq!(config.retry.extraction.max_retries, 2);
        assert_eq!(config.output.sort, SortKey::PriceDesc);
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].max_pages, Some(3));
        assert_eq!(config.targets[0].max_depth, None);
    }

    #[test]
    fn test_defaults_applied_when_sections_missing() {
        let config = parse_config(
            r#"
[user-agent]
crawler-name = "ListingRelay"
crawler-version = "0.1"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[extraction]
endpoint = "http://localhost:8080/extract"

[output]
directory = "./output"
"#,
        )
        .unwrap();

        assert_eq!(config.crawler.max_depth, 2);
        assert_eq!(config.crawler.max_pages, 5);
        assert_eq!(config.retry.fetch.max_retries, 3);
        assert_eq!(config.retry.extraction.max_retries, 2);
        assert_eq!(config.output.sort, SortKey::PriceAsc);
        assert!(config.output.database_path.is_none());
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/relay.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = VALID_CONFIG.replace("crawl-workers = 3", "crawl-workers = 0");
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
