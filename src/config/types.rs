use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Crate-Digger
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Upstream API location and request behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the marketplace API
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Timeout applied to every HTTP call (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Account whose first inventory page is fetched by the connection test
    #[serde(rename = "probe-username")]
    pub probe_username: String,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.discogs.com".to_string(),
            request_timeout_secs: 30,
            probe_username: "discogs".to_string(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the client
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the client
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the client
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

impl UserAgentConfig {
    /// Format: Name/Version (+ContactURL)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "CrateDigger".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://github.com/crate-digger/crate-digger".to_string(),
        }
    }
}

/// OAuth 1.0a consumer settings and optional injected access credential
#[derive(Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(rename = "consumer-key", default)]
    pub consumer_key: String,

    #[serde(rename = "consumer-secret", default)]
    pub consumer_secret: String,

    /// Access token supplied by the deployment (skips stored/interactive auth)
    #[serde(rename = "access-token", default)]
    pub access_token: Option<String>,

    #[serde(rename = "token-secret", default)]
    pub token_secret: Option<String>,

    #[serde(rename = "request-token-url", default = "default_request_token_url")]
    pub request_token_url: String,

    #[serde(rename = "authorize-url", default = "default_authorize_url")]
    pub authorize_url: String,

    #[serde(rename = "access-token-url", default = "default_access_token_url")]
    pub access_token_url: String,

    /// Whether a scrape may fall back to the interactive handshake
    #[serde(default)]
    pub interactive: bool,
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("token_secret", &self.token_secret.as_ref().map(|_| "<redacted>"))
            .field("request_token_url", &self.request_token_url)
            .field("authorize_url", &self.authorize_url)
            .field("access_token_url", &self.access_token_url)
            .field("interactive", &self.interactive)
            .finish()
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            consumer_key: String::new(),
            consumer_secret: String::new(),
            access_token: None,
            token_secret: None,
            request_token_url: default_request_token_url(),
            authorize_url: default_authorize_url(),
            access_token_url: default_access_token_url(),
            interactive: false,
        }
    }
}

fn default_request_token_url() -> String {
    "https://api.discogs.com/oauth/request_token".to_string()
}

fn default_authorize_url() -> String {
    "https://www.discogs.com/oauth/authorize".to_string()
}

fn default_access_token_url() -> String {
    "https://api.discogs.com/oauth/access_token".to_string()
}

/// Crawler behaviour configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of inventory pages visited per scrape
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Listings requested per page (upstream maximum is 100)
    #[serde(rename = "per-page")]
    pub per_page: u32,

    /// Page fetches allowed in flight at once (1 = strictly sequential)
    #[serde(rename = "fetch-concurrency")]
    pub fetch_concurrency: u32,

    /// Consecutive upstream errors tolerated before the run is aborted
    #[serde(rename = "max-consecutive-failures")]
    pub max_consecutive_failures: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 5,
            per_page: 100,
            fetch_concurrency: 1,
            max_consecutive_failures: 3,
        }
    }
}

/// Sliding-window rate limit settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Length of one counting window (seconds)
    #[serde(rename = "window-secs")]
    pub window_secs: u64,

    /// Number of closed windows kept in the history
    #[serde(rename = "window-history")]
    pub window_history: usize,

    /// Upstream request quota per minute
    #[serde(rename = "quota-per-minute")]
    pub quota_per_minute: u32,

    /// Amount the adaptive delay moves per window rollover (milliseconds)
    #[serde(rename = "step-ms")]
    pub step_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: 15,
            window_history: 4,
            quota_per_minute: 60,
            step_ms: 100,
        }
    }
}

/// Which inventory ledger adapter to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Json,
    Sqlite,
}

/// Local persisted state
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the stored OAuth access token
    #[serde(rename = "credential-path")]
    pub credential_path: String,

    /// Path to the JSON inventory ledger
    #[serde(rename = "ledger-path")]
    pub ledger_path: String,

    #[serde(rename = "ledger-backend")]
    pub ledger_backend: LedgerBackend,

    /// Known item IDs retained per seller
    #[serde(rename = "ledger-capacity")]
    pub ledger_capacity: usize,

    /// Path to the SQLite database holding listings (and the SQLite ledger)
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credential_path: "discogs_token.json".to_string(),
            ledger_path: "user_inventories.json".to_string(),
            ledger_backend: LedgerBackend::Json,
            ledger_capacity: 50,
            database_path: "listings.db".to_string(),
        }
    }
}
