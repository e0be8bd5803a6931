use crate::config::types::{
    ApiConfig, Config, CrawlerConfig, OAuthConfig, RateLimitSettings, StorageConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Upstream maximum for `per_page`
pub const MAX_PER_PAGE: u32 = 100;

/// Upper bound on in-flight page fetches
pub const MAX_FETCH_CONCURRENCY: u32 = 3;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_oauth_config(&config.oauth)?;
    validate_crawler_config(&config.crawler)?;
    validate_rate_limit(&config.rate_limit)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    validate_http_url("base_url", &config.base_url)?;

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.probe_username.trim().is_empty() {
        return Err(ConfigError::Validation(
            "probe_username cannot be empty".to_string(),
        ));
    }

    Ok(())
}

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

    if config.crawler_version.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

fn validate_oauth_config(config: &OAuthConfig) -> Result<(), ConfigError> {
    if config.consumer_key.trim().is_empty() {
        return Err(ConfigError::Validation(
            "consumer_key must be set (config or DISCOGS_CONSUMER_KEY)".to_string(),
        ));
    }

    if config.consumer_secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "consumer_secret must be set (config or DISCOGS_CONSUMER_SECRET)".to_string(),
        ));
    }

    if config.access_token.is_some() != config.token_secret.is_some() {
        return Err(ConfigError::Validation(
            "access_token and token_secret must be given together".to_string(),
        ));
    }

    validate_http_url("request_token_url", &config.request_token_url)?;
    validate_http_url("authorize_url", &config.authorize_url)?;
    validate_http_url("access_token_url", &config.access_token_url)?;

    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.per_page < 1 || config.per_page > MAX_PER_PAGE {
        return Err(ConfigError::Validation(format!(
            "per_page must be between 1 and {}, got {}",
            MAX_PER_PAGE, config.per_page
        )));
    }

    if config.fetch_concurrency < 1 || config.fetch_concurrency > MAX_FETCH_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "fetch_concurrency must be between 1 and {}, got {}",
            MAX_FETCH_CONCURRENCY, config.fetch_concurrency
        )));
    }

    if config.max_consecutive_failures < 1 {
        return Err(ConfigError::Validation(
            "max_consecutive_failures must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_rate_limit(config: &RateLimitSettings) -> Result<(), ConfigError> {
    if config.window_secs == 0 {
        return Err(ConfigError::Validation(
            "window_secs must be >= 1".to_string(),
        ));
    }

    if config.window_history == 0 {
        return Err(ConfigError::Validation(
            "window_history must be >= 1".to_string(),
        ));
    }

    if config.quota_per_minute == 0 {
        return Err(ConfigError::Validation(
            "quota_per_minute must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.credential_path.is_empty() {
        return Err(ConfigError::Validation(
            "credential_path cannot be empty".to_string(),
        ));
    }

    if config.ledger_path.is_empty() {
        return Err(ConfigError::Validation(
            "ledger_path cannot be empty".to_string(),
        ));
    }

    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.ledger_capacity == 0 {
        return Err(ConfigError::Validation(
            "ledger_capacity must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Requires an absolute http(s) URL
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}
