//! Environment overrides.
//!
//! Recognized variables:
//! - `CIRCUIT_BREAKER_TIMEOUT`: process-wide default call timeout (ms)
//! - `CIRCUIT_BREAKER_<NAME>_TIMEOUT_MS`
//! - `CIRCUIT_BREAKER_<NAME>_ERROR_THRESHOLD`
//! - `CIRCUIT_BREAKER_<NAME>_RESET_TIMEOUT_MS`
//! - `DATABASE_URL`: storage probe target
//!
//! `<NAME>` is matched case-insensitively; services are stored lowercase.

use std::str::FromStr;

use crate::config::loader::ConfigError;
use crate::config::schema::GuardConfig;

const PREFIX: &str = "CIRCUIT_BREAKER_";
const DEFAULT_TIMEOUT: &str = "CIRCUIT_BREAKER_TIMEOUT";
const DATABASE_URL: &str = "DATABASE_URL";

/// Apply recognized variables from `vars` to `config`.
///
/// Unrelated variables are ignored; a recognized variable with an
/// unparseable value is an error.
pub fn apply_env_overrides<I>(config: &mut GuardConfig, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        if key == DEFAULT_TIMEOUT {
            config.breakers.timeout_ms = parse(&key, &value)?;
        } else if key == DATABASE_URL {
            if !value.trim().is_empty() {
                config.storage.database_url = Some(value);
            }
        } else if let Some(rest) = key.strip_prefix(PREFIX) {
            apply_service_override(config, &key, rest, &value)?;
        }
    }
    Ok(())
}

fn apply_service_override(
    config: &mut GuardConfig,
    key: &str,
    rest: &str,
    value: &str,
) -> Result<(), ConfigError> {
    // RESET_TIMEOUT_MS must be tried before TIMEOUT_MS, which it ends with.
    if let Some(name) = service_name(rest, "_RESET_TIMEOUT_MS") {
        let ms = parse(key, value)?;
        config.breakers.services.entry(name).or_default().reset_timeout_ms = Some(ms);
    } else if let Some(name) = service_name(rest, "_TIMEOUT_MS") {
        let ms = parse(key, value)?;
        config.breakers.services.entry(name).or_default().timeout_ms = Some(ms);
    } else if let Some(name) = service_name(rest, "_ERROR_THRESHOLD") {
        let threshold = parse(key, value)?;
        config.breakers.services.entry(name).or_default().error_threshold = Some(threshold);
    } else {
        tracing::debug!(key = %key, "Ignoring unrecognized breaker variable");
    }
    Ok(())
}

fn service_name(rest: &str, suffix: &str) -> Option<String> {
    rest.strip_suffix(suffix)
        .filter(|name| !name.is_empty())
        .map(str::to_lowercase)
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}
