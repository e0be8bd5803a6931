//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests to the marketplace inventory API:
//! - Building HTTP clients with the descriptive user agent
//! - Signing each request with the OAuth access credential
//! - Classifying failures as transport, upstream status or decode errors

use crate::auth::{Credential, OAuthConsumer};
use crate::config::UserAgentConfig;
use crate::crawler::listing::InventoryPage;
use crate::{DiggerError, Result};
use reqwest::{header, Client};
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Timeout applied to every request
///
/// # Example
///
/// ```no_run
/// use crate_digger::config::UserAgentConfig;
/// use crate_digger::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Signed access to one account's view of the inventory endpoint
#[derive(Debug, Clone)]
pub struct InventoryClient {
    client: Client,
    base_url: Url,
    consumer: OAuthConsumer,
    credential: Credential,
}

impl InventoryClient {
    pub fn new(
        client: Client,
        base_url: &str,
        consumer: OAuthConsumer,
        credential: Credential,
    ) -> Result<Self> {
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            consumer,
            credential,
        })
    }

    /// `{base}/users/{username}/inventory?page={page}&per_page={per_page}`
    pub fn inventory_url(&self, username: &str, page: u32, per_page: u32) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DiggerError::UrlParse(::url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["users", username, "inventory"]);
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &per_page.to_string());
        Ok(url)
    }

    /// Fetches and decodes one inventory page
    ///
    /// # Returns
    ///
    /// * `Err(DiggerError::Transport)` - timeout, refused connection, broken body
    /// * `Err(DiggerError::Upstream)` - any non-2xx status
    /// * `Err(DiggerError::Decode)` - the body is not an inventory page
    pub async fn fetch_page(
        &self,
        username: &str,
        page: u32,
        per_page: u32,
    ) -> Result<InventoryPage> {
        let url = self.inventory_url(username, page, per_page)?;
        let url_text = url.to_string();

        let response = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, self.consumer.sign(&self.credential))
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| DiggerError::Transport {
                url: url_text.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiggerError::Upstream {
                url: url_text,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| DiggerError::Transport {
                url: url_text.clone(),
                source,
            })?;

        InventoryPage::decode(&body).map_err(|source| DiggerError::Decode {
            context: format!("inventory page {} of {}", page, username),
            source,
        })
    }
}
