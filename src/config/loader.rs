//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_file_from_disk() {
        let path = std::env::temp_dir().join(format!("switchyard-{}.toml", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            "context_path = \"/api\"\n[listener]\nhost = \"127.0.0.1\"\nport = 8123\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.context_path, "/api");
        assert_eq!(config.listener.host, "127.0.0.1");
        assert_eq!(config.listener.port, 8123);
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = std::env::temp_dir().join("switchyard-does-not-exist.toml");
        assert!(matches!(load_config(&path), Err(ConfigError::Io(_))));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(parse_config("listener = ["), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn invalid_values_are_validation_error() {
        let err = parse_config("context_path = \"api\"").unwrap_err();
        assert!(matches!(&err, ConfigError::Validation(errors) if errors.len() == 1));
        assert!(err.to_string().contains("context_path must start with '/'"));
    }
}
