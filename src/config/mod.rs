//! Configuration module for Crate-Digger
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! with environment overrides for the OAuth consumer and an injected access token.
//!
//! # Example
//!
//! ```no_run
//! use crate_digger::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("digger.toml")).unwrap();
//! println!("Scraping at most {} pages", config.crawler.max_pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, Config, CrawlerConfig, LedgerBackend, OAuthConfig, RateLimitSettings,
    StorageConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash,
    ENV_CONSUMER_KEY, ENV_CONSUMER_SECRET, ENV_CREDS,
};
pub use validation::validate;
