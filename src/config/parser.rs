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
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Stored on every crawl run so a resumed run can be told apart from a run
/// started with different settings.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
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
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
categories = ["handmade"]

[sessions]
directory = "./sessions"

[gateway]
base-url = "http://127.0.0.1:8765"
api-id = 123
api-hash = "abc"

[output]
database-path = "./channels.db"
"#;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let file = create_temp_config(MINIMAL);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.workers, 4);
        assert_eq!(config.crawler.batch_size, 100);
        assert_eq!(config.sessions.connect_failure_limit, 3);
        assert_eq!(config.gateway.device_model, "MacBook Air M1");
        assert_eq!(config.categories, vec!["handmade".to_string()]);
        assert!(config.proxy.is_none());
        assert!(config.graph.is_none());
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
categories = ["news", "blogs"]

[crawler]
workers = 8
batch-size = 50
dequeue-timeout-ms = 1000
backoff-unit-ms = 10
max-backoff-units = 5

[sessions]
directory = "/var/sessions"
connect-failure-limit = 2
startup-delay-min-ms = 0
startup-delay-max-ms = 10

[gateway]
base-url = "https://gateway.internal"
api-id = 1
api-hash = "h"

[proxy]
list-url = "https://proxies.example.com/list.json"
static = ["10.0.0.1:8080"]

[output]
database-path = "./out.db"

[graph]
uri = "bolt://localhost:7687"
user = "neo4j"
password = "secret"
"#;
        let config = parse_config(content).unwrap();
        assert_eq!(config.crawler.workers, 8);
        assert_eq!(config.crawler.batch_size, 50);
        assert_eq!(config.sessions.startup_delay_max_ms, 10);
        let proxy = config.proxy.unwrap();
        assert_eq!(proxy.max_timeout_ms, 500);
        assert_eq!(proxy.static_proxies.len(), 1);
        assert_eq!(config.graph.unwrap().user, "neo4j");
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = MINIMAL.replace("[sessions]", "[crawler]\nworkers = 0\n\n[sessions]");
        let result = parse_config(&content);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config(MINIMAL);
        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);

        let other = create_temp_config("categories = []");
        assert_ne!(hash1, compute_config_hash(other.path()).unwrap());
    }
}
