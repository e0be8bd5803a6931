use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable holding the consumer key
pub const ENV_CONSUMER_KEY: &str = "DISCOGS_CONSUMER_KEY";

/// Environment variable holding the consumer secret
pub const ENV_CONSUMER_SECRET: &str = "DISCOGS_CONSUMER_SECRET";

/// Environment variable holding an injected access credential as JSON
pub const ENV_CREDS: &str = "DISCOGS_CREDS";

/// Loads and parses a configuration file from the given path
///
/// Environment overrides are applied before validation, so the consumer
/// key and secret may be left out of the file entirely.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use crate_digger::config::load_config;
///
/// let config = load_config(Path::new("digger.toml")).unwrap();
/// println!("Max pages: {}", config.crawler.max_pages);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate(&config)?;

    Ok(config)
}

#[derive(Deserialize)]
struct InjectedCreds {
    token: String,
    secret: String,
}

/// Applies environment overrides using the given variable lookup
///
/// `DISCOGS_CREDS` must be a JSON object `{"token": ..., "secret": ...}`.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup(ENV_CONSUMER_KEY).filter(|v| !v.is_empty()) {
        config.oauth.consumer_key = key;
    }

    if let Some(secret) = lookup(ENV_CONSUMER_SECRET).filter(|v| !v.is_empty()) {
        config.oauth.consumer_secret = secret;
    }

    if let Some(raw) = lookup(ENV_CREDS).filter(|v| !v.is_empty()) {
        let creds: InjectedCreds =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Environment {
                name: ENV_CREDS.to_string(),
                message: e.to_string(),
            })?;
        config.oauth.access_token = Some(creds.token);
        config.oauth.token_secret = Some(creds.secret);
    }

    Ok(())
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so runs can be matched to the configuration they used.
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
