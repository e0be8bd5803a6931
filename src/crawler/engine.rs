//! Crawl engine
//!
//! One crawl walks a seller's inventory newest-first:
//!
//! ```text
//! START -> DISCOVER_TOTAL_PAGES -> PROCESS_PAGE(n) -> { PROCESS_PAGE(n+1) | STOPPED_EARLY | EXHAUSTED }
//! ```
//!
//! Discovery asks for a single-item page to read the inventory size, converts
//! it to a page count at the configured page size and clamps that to the
//! configured maximum. Pages are then processed
//! strictly in page order. The first entry whose ID is already in the ledger
//! ends the crawl after that page; entries before it on the same page are
//! still processed.
//!
//! With `fetch_concurrency > 1` several page fetches overlap, but results are
//! reassembled in page order before processing, so the stopping point is the
//! same as a sequential crawl. Fetches already in flight when the crawl stops
//! are dropped.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::InventoryClient;
use crate::crawler::keeper;
use crate::crawler::listing::{InventoryPage, QualifyingListing, RawListing};
use crate::governor::RateGovernor;
use crate::{AuthStage, DiggerError, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Crawl limits derived from configuration
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub max_pages: u32,
    pub per_page: u32,
    pub fetch_concurrency: usize,
    pub max_consecutive_failures: u32,
}

impl From<&CrawlerConfig> for EngineSettings {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            per_page: config.per_page,
            fetch_concurrency: config.fetch_concurrency.max(1) as usize,
            max_consecutive_failures: config.max_consecutive_failures.max(1),
        }
    }
}

/// How a crawl ended
#[derive(Debug)]
pub enum Termination {
    /// A known ID was found at `entry` (0-based) on `page`
    StoppedEarly { page: u32, entry: usize },

    /// Every planned page was visited without meeting a known ID
    Exhausted,

    /// Cancelled between pages
    Cancelled,

    /// Pagination could not be discovered
    Failed(String),

    /// Too many consecutive upstream errors
    Escalated(DiggerError),
}

/// Everything a crawl produced
#[derive(Debug)]
pub struct CrawlOutcome {
    /// Keepers in upstream order
    pub listings: Vec<QualifyingListing>,

    /// Every new item ID observed, keeper or not, in upstream order
    pub observed_ids: Vec<u64>,

    /// Pages upstream reports
    pub pages_total: u32,

    /// Pages this crawl set out to visit
    pub pages_planned: u32,

    pub pages_processed: u32,
    pub pages_failed: u32,
    pub termination: Termination,
}

impl CrawlOutcome {
    fn new() -> Self {
        Self {
            listings: Vec::new(),
            observed_ids: Vec::new(),
            pages_total: 0,
            pages_planned: 0,
            pages_processed: 0,
            pages_failed: 0,
            termination: Termination::Exhausted,
        }
    }

    fn finish(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }
}

/// What one page contributed
#[derive(Debug, Default)]
pub struct PageReport {
    pub listings: Vec<QualifyingListing>,
    pub observed_ids: Vec<u64>,
    /// Index of the first known entry, if any
    pub stop_at: Option<usize>,
    pub skipped_entries: usize,
}

/// Processes the entries of one page in upstream order
///
/// Stops at the first entry whose ID is in `known`. A malformed entry is
/// skipped; its ID still counts as observed when it can be read.
pub fn process_page(
    page: u32,
    entries: Vec<serde_json::Value>,
    known: &HashSet<u64>,
    scraped_at: DateTime<Utc>,
) -> PageReport {
    let mut report = PageReport::default();

    for (index, value) in entries.into_iter().enumerate() {
        let id = value.get("id").and_then(serde_json::Value::as_u64);

        if let Some(id) = id {
            if known.contains(&id) {
                tracing::debug!("Page {} entry {}: listing {} already known", page, index, id);
                report.stop_at = Some(index);
                break;
            }
        }

        let raw = match RawListing::decode(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Page {} entry {}: skipping malformed listing: {}", page, index, e);
                if let Some(id) = id {
                    report.observed_ids.push(id);
                }
                report.skipped_entries += 1;
                continue;
            }
        };

        report.observed_ids.push(raw.id);

        match keeper::evaluate(&raw) {
            Ok(()) => report
                .listings
                .push(QualifyingListing::from_raw(&raw, scraped_at)),
            Err(rejection) => {
                tracing::trace!("Listing {} rejected: {}", raw.id, rejection);
            }
        }
    }

    report
}

/// Crawls one seller's inventory through a signed client
pub struct CrawlEngine {
    client: InventoryClient,
    governor: Arc<RateGovernor>,
    settings: EngineSettings,
}

impl CrawlEngine {
    pub fn new(
        client: InventoryClient,
        governor: Arc<RateGovernor>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            client,
            governor,
            settings,
        }
    }

    /// Gated fetch: the governor's delay is paid before the request goes out
    async fn fetch(&self, username: &str, page: u32, per_page: u32) -> Result<InventoryPage> {
        let tag = format!("{}:page{}", username, page);
        self.governor.record_request(&tag);
        self.governor.wait().await;
        self.client.fetch_page(username, page, per_page).await
    }

    /// Runs the crawl state machine to completion
    ///
    /// # Arguments
    ///
    /// * `username` - Seller whose inventory is crawled
    /// * `known` - Item IDs recorded by earlier runs
    /// * `cancel` - Checked between pages
    pub async fn crawl(
        &self,
        username: &str,
        known: &HashSet<u64>,
        cancel: &CancellationToken,
    ) -> CrawlOutcome {
        let mut outcome = CrawlOutcome::new();

        if cancel.is_cancelled() {
            return outcome.finish(Termination::Cancelled);
        }

        let discovery = tokio::select! {
            biased;
            _ = cancel.cancelled() => return outcome.finish(Termination::Cancelled),
            result = self.fetch(username, 1, 1) => result,
        };

        match discovery {
            Ok(page) => outcome.pages_total = page.pagination.pages_at(self.settings.per_page),
            Err(e) => {
                tracing::error!("Could not read inventory size for {}: {}", username, e);
                return outcome.finish(Termination::Failed(format!(
                    "could not read pagination: {}",
                    e
                )));
            }
        }

        outcome.pages_planned = outcome.pages_total.min(self.settings.max_pages);
        tracing::info!(
            "{} has {} pages, crawling up to {}",
            username,
            outcome.pages_total,
            outcome.pages_planned
        );

        if outcome.pages_planned == 0 {
            return outcome.finish(Termination::Exhausted);
        }

        let per_page = self.settings.per_page;
        let pages = futures::stream::iter(1..=outcome.pages_planned)
            .map(|n| async move { (n, self.fetch(username, n, per_page).await) })
            .buffered(self.settings.fetch_concurrency);
        tokio::pin!(pages);

        let mut consecutive_failures = 0u32;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Crawl of {} cancelled", username);
                    return outcome.finish(Termination::Cancelled);
                }
                next = pages.next() => next,
            };

            let Some((page_number, result)) = next else {
                break;
            };

            match result {
                Ok(page) => {
                    consecutive_failures = 0;
                    let entries = page.listings.len();
                    let report = process_page(page_number, page.listings, known, Utc::now());

                    outcome.pages_processed += 1;
                    tracing::info!(
                        "Page {}/{} of {}: {} entries, {} new, {} keepers",
                        page_number,
                        outcome.pages_planned,
                        username,
                        entries,
                        report.observed_ids.len(),
                        report.listings.len()
                    );

                    outcome.listings.extend(report.listings);
                    outcome.observed_ids.extend(report.observed_ids);

                    if let Some(entry) = report.stop_at {
                        tracing::info!(
                            "Reached previously seen listing on page {} of {}, stopping",
                            page_number,
                            username
                        );
                        return outcome.finish(Termination::StoppedEarly {
                            page: page_number,
                            entry,
                        });
                    }
                }
                Err(e) => {
                    outcome.pages_failed += 1;
                    tracing::warn!("Skipping page {} of {}: {}", page_number, username, e);

                    if let DiggerError::Upstream { status, .. } = e {
                        consecutive_failures += 1;
                        if consecutive_failures >= self.settings.max_consecutive_failures {
                            let escalated = escalate(consecutive_failures, status);
                            tracing::error!("Aborting crawl of {}: {}", username, escalated);
                            return outcome.finish(Termination::Escalated(escalated));
                        }
                    }
                }
            }
        }

        outcome.finish(Termination::Exhausted)
    }
}

/// Error raised once upstream has failed `count` pages in a row
fn escalate(count: u32, status: u16) -> DiggerError {
    match status {
        401 | 403 => DiggerError::auth(
            AuthStage::Revoked,
            format!(
                "upstream rejected the access token {} times in a row (HTTP {})",
                count, status
            ),
        ),
        _ => DiggerError::SustainedUpstream { count, status },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::test_support::listing_json;

    fn known(ids: &[u64]) -> HashSet<u64> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_process_page_collects_keepers_and_all_ids() {
        let entries = vec![
            listing_json(1, "LP", "Very Good Plus (VG+)", 10, 2),
            listing_json(2, "CD", "Very Good Plus (VG+)", 10, 2),
            listing_json(3, "LP", "Fair (F)", 10, 2),
            listing_json(4, "2xLP", "Near Mint (NM or M-)", 5, 1),
        ];

        let report = process_page(1, entries, &known(&[]), Utc::now());

        assert_eq!(report.observed_ids, vec![1, 2, 3, 4]);
        let ids: Vec<u64> = report.listings.iter().map(|l| l.listing_id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(report.stop_at, None);
    }

    #[test]
    fn test_process_page_stops_at_first_known_id() {
        let entries = vec![
            listing_json(10, "LP", "Very Good Plus (VG+)", 10, 2),
            listing_json(11, "LP", "Very Good Plus (VG+)", 10, 2),
            listing_json(12, "LP", "Very Good Plus (VG+)", 10, 2),
            listing_json(13, "LP", "Very Good Plus (VG+)", 10, 2),
        ];

        let report = process_page(2, entries, &known(&[12, 13]), Utc::now());

        assert_eq!(report.stop_at, Some(2));
        assert_eq!(report.observed_ids, vec![10, 11]);
        assert_eq!(report.listings.len(), 2);
    }

    #[test]
    fn test_process_page_skips_malformed_entries() {
        let entries = vec![
            serde_json::json!({"id": 20, "release": "not an object"}),
            serde_json::json!({"nonsense": true}),
            listing_json(21, "LP", "Very Good (VG)", 3, 1),
        ];

        let report = process_page(1, entries, &known(&[]), Utc::now());

        assert_eq!(report.skipped_entries, 2);
        assert_eq!(report.observed_ids, vec![20, 21]);
        assert_eq!(report.listings.len(), 1);
    }

    #[test]
    fn test_known_id_stops_even_when_malformed() {
        let entries = vec![
            listing_json(30, "LP", "Very Good (VG)", 3, 1),
            serde_json::json!({"id": 31}),
            listing_json(32, "LP", "Very Good (VG)", 3, 1),
        ];

        let report = process_page(1, entries, &known(&[31]), Utc::now());

        assert_eq!(report.stop_at, Some(1));
        assert_eq!(report.observed_ids, vec![30]);
    }

    #[test]
    fn test_escalation_kinds() {
        assert!(escalate(3, 401).is_auth());
        assert!(escalate(3, 403).is_auth());
        assert!(matches!(
            escalate(3, 502),
            DiggerError::SustainedUpstream {
                count: 3,
                status: 502
            }
        ));
    }

    #[test]
    fn test_settings_from_config() {
        let settings = EngineSettings::from(&CrawlerConfig::default());
        assert_eq!(settings.max_pages, 5);
        assert_eq!(settings.per_page, 100);
        assert_eq!(settings.fetch_concurrency, 1);
        assert_eq!(settings.max_consecutive_failures, 3);
    }
}
