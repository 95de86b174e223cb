//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::env::apply_env_overrides;
use crate::config::schema::GuardConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value:?}")]
    Env { key: String, value: String },

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

/// Parse a TOML file without validating it.
pub fn parse_config(path: &Path) -> Result<GuardConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: GuardConfig = toml::from_str(&content)?;
    config.breakers.normalize_service_names();
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GuardConfig, ConfigError> {
    let config = parse_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load the file (or defaults), apply `vars` on top, then validate.
pub fn load_with_env<I>(path: Option<&Path>, vars: I) -> Result<GuardConfig, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut config = match path {
        Some(path) => parse_config(path)?,
        None => GuardConfig::default(),
    };
    apply_env_overrides(&mut config, vars)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load the process configuration: file (if any), then the process environment.
pub fn load(path: Option<&Path>) -> Result<GuardConfig, ConfigError> {
    load_with_env(path, std::env::vars())
}
