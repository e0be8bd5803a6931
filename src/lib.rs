//! Crate-Digger: an incremental marketplace inventory scraper
//!
//! This crate pulls a seller's inventory from the Discogs marketplace API over
//! OAuth 1.0a, keeps request volume under the upstream quota, stops as soon as
//! it reaches listings seen on a previous run, and returns only the listings
//! that pass the "keeper" filter.

pub mod auth;
pub mod config;
pub mod crawler;
pub mod governor;
pub mod ledger;
pub mod output;
pub mod storage;

use std::fmt;
use thiserror::Error;

/// Main error type for Crate-Digger operations
#[derive(Debug, Error)]
pub enum DiggerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authorization failed during {stage}: {message}")]
    Auth { stage: AuthStage, message: String },

    #[error("HTTP error for {url}: {source}")]
    Transport { url: String, source: reqwest::Error },

    #[error("Upstream returned HTTP {status} for {url}")]
    Upstream { url: String, status: u16 },

    #[error("Failed to decode {context}: {source}")]
    Decode {
        context: String,
        source: serde_json::Error,
    },

    #[error("Giving up after {count} consecutive upstream failures (last HTTP {status})")]
    SustainedUpstream { count: u32, status: u16 },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scrape cancelled")]
    Cancelled,
}

impl DiggerError {
    /// Builds an authorization error for the given stage
    pub fn auth(stage: AuthStage, message: impl Into<String>) -> Self {
        Self::Auth {
            stage,
            message: message.into(),
        }
    }

    /// Whether this error means the credential itself is unusable
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

/// The step of credential acquisition that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    /// No injected, stored or interactive credential was available
    Acquire,
    /// Obtaining the temporary request token
    RequestToken,
    /// Presenting the authorization URL and reading the verifier
    Authorize,
    /// Exchanging the verifier for an access token
    AccessToken,
    /// Upstream kept rejecting the access token
    Revoked,
}

impl fmt::Display for AuthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Acquire => "credential acquisition",
            Self::RequestToken => "request token",
            Self::Authorize => "authorization",
            Self::AccessToken => "access token exchange",
            Self::Revoked => "token validation",
        };
        f.write_str(name)
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid environment override {name}: {message}")]
    Environment { name: String, message: String },
}

/// Result type alias for Crate-Digger operations
pub type Result<T> = std::result::Result<T, DiggerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use auth::{Credential, CredentialStore, FileCredentialStore};
pub use config::Config;
pub use crawler::{Coordinator, QualifyingListing, ScrapeResult, ScrapeStats};
pub use governor::RateGovernor;
pub use ledger::{InventoryLedger, InventorySnapshot, JsonFileLedger};
