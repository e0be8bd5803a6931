//! Inventory crawling
//!
//! This module contains the core scraping logic, including:
//! - Signed HTTP fetching of inventory pages
//! - Per-entry decoding and the keeper filter
//! - The paging state machine with early termination
//! - Overall scrape coordination

mod coordinator;
mod engine;
mod fetcher;
mod keeper;
mod listing;

pub use coordinator::{Coordinator, ScrapeResult, ScrapeStats};
pub use engine::{
    process_page, CrawlEngine, CrawlOutcome, EngineSettings, PageReport, Termination,
};
pub use fetcher::{build_http_client, InventoryClient};
pub use keeper::{evaluate, is_keeper, Rejection, KEEPER_CONDITIONS};
pub use listing::{
    normalize_string_list, InventoryPage, Pagination, QualifyingListing, RawListing,
    SUGGESTED_PRICE_TIER,
};
