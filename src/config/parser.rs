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
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Stored with each job record so a resumed job can tell whether its
/// configuration changed between runs.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_config_content(&content))
}

/// Hex-encoded SHA-256 of arbitrary configuration text
pub fn hash_config_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok((config, hash_config_content(&content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ResourceKind;
    use crate::config::StructureMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[job]
seeds = ["https://example.com/"]
output-root = "./mirror"
max-depth = 3
concurrency = 8
structure = "flatten"
resource-types = ["css", "image"]
ignored-mime-types = ["video/*"]
scheduled-start = "2030-01-01T00:00:00Z"

[user-agent]
literal = "TestBot/1.0"

[proxy]
url = "http://127.0.0.1:3128"
username = "proxy-user"

[auth]
username = "alice"
password = "secret"

[[header]]
name = "Referer"
value = "https://example.com/"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.job.max_depth, 3);
        assert_eq!(config.job.concurrency, 8);
        assert_eq!(config.job.structure, StructureMode::Flatten);
        assert_eq!(
            config.job.resource_types,
            vec![ResourceKind::Css, ResourceKind::Image]
        );
        assert!(config.job.scheduled_start.is_some());
        assert_eq!(config.user_agent.resolve(), "TestBot/1.0");
        assert_eq!(config.headers.len(), 1);
        assert_eq!(config.auth.unwrap().username, "alice");
        assert_eq!(
            config.proxy.unwrap().username.as_deref(),
            Some("proxy-user")
        );
    }

    #[test]
    fn test_defaults_applied() {
        let config_content = r#"
[job]
seeds = ["https://example.com/"]
output-root = "./mirror"
"#;
        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.job.timeout, 10);
        assert_eq!(config.job.retries, 3);
        assert_eq!(config.job.max_depth, 2);
        assert_eq!(config.job.concurrency, 5);
        assert_eq!(config.job.rate_limit, 100);
        assert!(config.job.respect_robots);
        assert_eq!(config.job.structure, StructureMode::Preserve);
        assert_eq!(config.job.resource_types.len(), 7);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/mirror.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_resource_type_rejected() {
        let config_content = r#"
[job]
seeds = ["https://example.com/"]
output-root = "./mirror"
resource-types = ["holograms"]
"#;
        let file = create_temp_config(config_content);
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[job]
seeds = ["https://example.com/"]
output-root = "./mirror"
concurrency = 0
"#;
        let file = create_temp_config(config_content);
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
        assert_ne!(hash_config_content("content 1"), hash_config_content("content 2"));
    }
}
