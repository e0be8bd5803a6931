//! Scrape coordination
//!
//! The coordinator is the only piece external callers talk to. It owns the
//! HTTP client and the injected credential store, inventory ledger and
//! (optionally) listing store, and turns each crawl into a [`ScrapeResult`].

use crate::auth::{
    acquire_credential, authorize, Credential, CredentialSource, CredentialStore, OAuthConsumer,
    StdinPrompt, VerifierPrompt,
};
use crate::config::Config;
use crate::crawler::engine::{CrawlEngine, CrawlOutcome, EngineSettings, Termination};
use crate::crawler::fetcher::{build_http_client, InventoryClient};
use crate::crawler::listing::QualifyingListing;
use crate::governor::{RateGovernor, RateLimitConfig};
use crate::ledger::InventoryLedger;
use crate::storage::{ListingStore, StoreCounts};
use crate::{DiggerError, Result};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of one scrape, handed to the caller
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    pub username: String,
    pub total_qualifying: usize,

    /// Qualifying listings not known to the ledger before this run
    ///
    /// The crawl stops at the first known listing, so every listing it
    /// returns is new and this always equals `total_qualifying`.
    pub new_qualifying: usize,

    pub listings: Vec<QualifyingListing>,
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl ScrapeResult {
    fn failed(username: &str, detail: impl Into<String>) -> Self {
        Self {
            username: username.to_string(),
            total_qualifying: 0,
            new_qualifying: 0,
            listings: Vec::new(),
            success: false,
            error_detail: Some(detail.into()),
        }
    }
}

/// Figures reported by [`Coordinator::stats`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeStats {
    pub total_listings: u64,
    pub total_records: u64,
    pub total_sellers: u64,

    /// Requests counted by the rate governor of the most recent run
    pub current_request_rate: u32,

    /// Delay that governor currently applies before each request
    pub current_sleep_duration: Duration,
}

/// Whether the ledger should absorb what a crawl observed
#[derive(Debug, PartialEq, Eq)]
enum LedgerAction {
    Update(Vec<u64>),
    Keep,
}

/// Converts a crawl outcome into the caller-facing result
///
/// Returns the result, what to do with the ledger, and the escalation error
/// if the crawl was aborted by one.
fn summarize(
    username: &str,
    outcome: CrawlOutcome,
) -> (ScrapeResult, LedgerAction, Option<DiggerError>) {
    let total_qualifying = outcome.listings.len();

    let mut result = ScrapeResult {
        username: username.to_string(),
        total_qualifying,
        new_qualifying: total_qualifying,
        listings: outcome.listings,
        success: true,
        error_detail: None,
    };

    let mut escalation = None;
    let action = match outcome.termination {
        Termination::StoppedEarly { .. } | Termination::Exhausted => {
            if outcome.pages_planned > 0 && outcome.pages_processed == 0 {
                result.success = false;
                result.error_detail = Some(format!(
                    "all {} inventory pages failed",
                    outcome.pages_planned
                ));
                LedgerAction::Keep
            } else {
                LedgerAction::Update(outcome.observed_ids)
            }
        }
        Termination::Cancelled => {
            result.success = false;
            result.error_detail = Some("scrape cancelled".to_string());
            LedgerAction::Keep
        }
        Termination::Failed(detail) => {
            result.success = false;
            result.error_detail = Some(detail);
            LedgerAction::Keep
        }
        Termination::Escalated(error) => {
            result.success = false;
            result.error_detail = Some(error.to_string());
            escalation = Some(error);
            LedgerAction::Keep
        }
    };

    (result, action, escalation)
}

/// Entry point for scraping seller inventories
///
/// Scrapes of the same seller must not overlap; callers serialize them.
pub struct Coordinator {
    config: Arc<Config>,
    client: Client,
    consumer: OAuthConsumer,
    credentials: Arc<dyn CredentialStore>,
    ledger: Arc<dyn InventoryLedger>,
    listing_store: Option<Arc<dyn ListingStore>>,
    prompt: Option<Arc<dyn VerifierPrompt>>,
    credential: Mutex<Option<(Credential, CredentialSource)>>,
    governor: Mutex<Arc<RateGovernor>>,
}

impl Coordinator {
    /// Creates a new coordinator
    ///
    /// Falls back to the stdin prompt for authorization only when
    /// `oauth.interactive` is set.
    pub fn new(
        config: Config,
        credentials: Arc<dyn CredentialStore>,
        ledger: Arc<dyn InventoryLedger>,
    ) -> Result<Self> {
        let client = build_http_client(&config.user_agent, config.api.request_timeout())?;
        let consumer = OAuthConsumer::from_config(&config.oauth);
        let governor = Arc::new(RateGovernor::new(RateLimitConfig::from(&config.rate_limit)));

        if config.storage.ledger_capacity < config.crawler.per_page as usize {
            tracing::warn!(
                "Ledger capacity {} is below one page of {} items; a single run may evict its own IDs",
                config.storage.ledger_capacity,
                config.crawler.per_page
            );
        }

        let prompt: Option<Arc<dyn VerifierPrompt>> = if config.oauth.interactive {
            Some(Arc::new(StdinPrompt))
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            client,
            consumer,
            credentials,
            ledger,
            listing_store: None,
            prompt,
            credential: Mutex::new(None),
            governor: Mutex::new(governor),
        })
    }

    /// Attaches the store that `trigger_scrape` persists results into
    pub fn with_listing_store(mut self, store: Arc<dyn ListingStore>) -> Self {
        self.listing_store = Some(store);
        self
    }

    /// Replaces the prompt used when no credential is available
    pub fn with_prompt(mut self, prompt: Arc<dyn VerifierPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn credential(&self) -> Result<(Credential, CredentialSource)> {
        let cached = self.credential.lock().clone();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let acquired = acquire_credential(
            Credential::from_config(&self.config.oauth),
            self.credentials.as_ref(),
            &self.consumer,
            &self.client,
            self.prompt.as_deref(),
        )
        .await?;

        *self.credential.lock() = Some(acquired.clone());
        Ok(acquired)
    }

    /// Drops a credential upstream no longer accepts
    fn forget_credential(&self) {
        let Some((_, source)) = self.credential.lock().take() else {
            return;
        };

        if source == CredentialSource::Injected {
            tracing::warn!("Injected access token was rejected; replace it in the configuration");
            return;
        }

        match self.credentials.clear() {
            Ok(()) => tracing::warn!("Stored access token was rejected and has been removed"),
            Err(e) => tracing::warn!("Failed to remove rejected access token: {}", e),
        }
    }

    fn inventory_client(&self, credential: Credential) -> Result<InventoryClient> {
        InventoryClient::new(
            self.client.clone(),
            &self.config.api.base_url,
            self.consumer.clone(),
            credential,
        )
    }

    /// Scrapes one seller to completion
    pub async fn run(&self, username: &str) -> Result<ScrapeResult> {
        self.run_with_cancellation(username, &CancellationToken::new())
            .await
    }

    /// Scrapes one seller, stopping between pages once `cancel` fires
    ///
    /// # Returns
    ///
    /// * `Ok(ScrapeResult)` - every crawl failure is reported inside the result
    /// * `Err(DiggerError::Auth)` - no usable credential could be acquired
    pub async fn run_with_cancellation(
        &self,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<ScrapeResult> {
        let (credential, _) = self.credential().await?;

        let snapshot = match self.ledger.get(username) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Ledger unreadable for {}, doing a full crawl: {}", username, e);
                Default::default()
            }
        };
        if snapshot.is_cold_start() {
            tracing::info!("No inventory history for {}", username);
        }
        let known = snapshot.id_set();

        let client = match self.inventory_client(credential) {
            Ok(client) => client,
            Err(e) => return Ok(ScrapeResult::failed(username, e.to_string())),
        };

        let governor = Arc::new(RateGovernor::new(RateLimitConfig::from(
            &self.config.rate_limit,
        )));
        *self.governor.lock() = Arc::clone(&governor);

        let engine = CrawlEngine::new(client, governor, EngineSettings::from(&self.config.crawler));
        let outcome = engine.crawl(username, &known, cancel).await;
        let (pages_processed, pages_failed) = (outcome.pages_processed, outcome.pages_failed);

        let (result, action, escalation) = summarize(username, outcome);

        if let Some(error) = escalation {
            if error.is_auth() {
                self.forget_credential();
            }
        }

        if let LedgerAction::Update(ids) = action {
            if let Err(e) = self.ledger.update(username, &ids) {
                tracing::warn!("Failed to update inventory ledger for {}: {}", username, e);
            }
        }

        tracing::info!(
            "Scrape of {} finished: success={}, {} qualifying ({} new), {} pages ok, {} failed",
            username,
            result.success,
            result.total_qualifying,
            result.new_qualifying,
            pages_processed,
            pages_failed
        );

        Ok(result)
    }

    /// Runs a scrape and persists its listings into the attached store
    pub async fn trigger_scrape(&self, username: &str) -> Result<ScrapeResult> {
        self.trigger_scrape_with_cancellation(username, &CancellationToken::new())
            .await
    }

    pub async fn trigger_scrape_with_cancellation(
        &self,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<ScrapeResult> {
        let result = self.run_with_cancellation(username, cancel).await?;

        if let Some(store) = &self.listing_store {
            if !result.listings.is_empty() {
                match store.store_result(&result) {
                    Ok(summary) => tracing::info!(
                        "Stored listings for {}: {} inserted, {} duplicates, {} failed",
                        username,
                        summary.inserted,
                        summary.duplicates,
                        summary.failed
                    ),
                    Err(e) => tracing::error!("Failed to store listings for {}: {}", username, e),
                }
            }
        }

        Ok(result)
    }

    /// Totals from the listing store plus the current governor state
    pub fn stats(&self) -> Result<ScrapeStats> {
        let counts = match &self.listing_store {
            Some(store) => store.counts()?,
            None => StoreCounts::default(),
        };
        let rate = self.governor.lock().snapshot();

        Ok(ScrapeStats {
            total_listings: counts.listings,
            total_records: counts.records,
            total_sellers: counts.sellers,
            current_request_rate: rate.current_request_total,
            current_sleep_duration: rate.sleep_duration,
        })
    }

    /// Fetches one single-item page of the probe account
    ///
    /// Validates the credential and connectivity without crawling.
    pub async fn test_connection(&self) -> Result<()> {
        let (credential, _) = self.credential().await?;
        let client = self.inventory_client(credential)?;

        let governor = self.governor.lock().clone();
        governor.record_request("test_connection");
        governor.wait().await;

        let probe = &self.config.api.probe_username;
        match client.fetch_page(probe, 1, 1).await {
            Ok(_) => {
                tracing::info!("Connection test against {} succeeded", probe);
                Ok(())
            }
            Err(e) => {
                if matches!(e, DiggerError::Upstream { status: 401 | 403, .. }) {
                    self.forget_credential();
                }
                Err(e)
            }
        }
    }

    /// First-run setup: runs the OAuth handshake and stores the token
    ///
    /// Unlike authorization during a scrape, failing to save is an error.
    pub async fn authorize_interactive(&self, prompt: &dyn VerifierPrompt) -> Result<Credential> {
        let credential = authorize(&self.consumer, &self.client, prompt).await?;
        self.credentials.save(&credential)?;
        *self.credential.lock() = Some((credential.clone(), CredentialSource::Authorized));
        tracing::info!("Access token stored");
        Ok(credential)
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("base_url", &self.config.api.base_url)
            .field("consumer", &self.consumer)
            .field("has_listing_store", &self.listing_store.is_some())
            .field("interactive", &self.prompt.is_some())
            .finish()
    }
}
