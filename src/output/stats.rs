//! Console reporting
//!
//! Human-readable views of a single scrape and of the listing store.

use crate::crawler::{QualifyingListing, ScrapeResult, ScrapeStats};

/// One line describing a qualifying listing
pub fn format_listing(listing: &QualifyingListing) -> String {
    let mut line = format!(
        "{} - {} [{}] {:.2} {} ({}) wants {} / haves {}",
        listing.artist,
        listing.title,
        listing.label,
        listing.price,
        listing.currency,
        listing.condition,
        listing.wants,
        listing.haves
    );
    if let Some(suggested) = &listing.suggested_price {
        line.push_str(&format!(", suggested {}", suggested));
    }
    line
}

/// Prints a scrape summary followed by up to `sample` listings
pub fn print_scrape_result(result: &ScrapeResult, sample: usize) {
    println!("=== {} ===", result.username);

    if !result.success {
        println!(
            "  Scrape failed: {}",
            result.error_detail.as_deref().unwrap_or("unknown error")
        );
    }

    println!(
        "  Qualifying listings: {} ({} new)",
        result.total_qualifying, result.new_qualifying
    );

    for listing in result.listings.iter().take(sample) {
        println!("  - {}", format_listing(listing));
    }

    let remaining = result.listings.len().saturating_sub(sample);
    if remaining > 0 {
        println!("  ... and {} more", remaining);
    }
    println!();
}

/// Prints store totals and the rate governor state
pub fn print_statistics(stats: &ScrapeStats) {
    println!("=== Scrape Statistics ===\n");

    println!("Listing store:");
    println!("  Listings: {}", stats.total_listings);
    println!("  Records: {}", stats.total_records);
    println!("  Sellers: {}", stats.total_sellers);
    println!();

    println!("Rate governor:");
    println!("  Requests in window history: {}", stats.current_request_rate);
    println!(
        "  Delay per request: {} ms",
        stats.current_sleep_duration.as_millis()
    );
}
