//! Markdown report generation
//!
//! This module generates a human-readable markdown report of one or more
//! scrapes: a per-seller summary table followed by the qualifying listings.

use crate::crawler::{QualifyingListing, ScrapeResult};
use crate::output::OutputResult;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown report of `results` to `output_path`
pub fn write_markdown_report(results: &[ScrapeResult], output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(results);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Escapes characters that would break a table cell
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn listing_row(listing: &QualifyingListing) -> String {
    format!(
        "| {} | {} | {} | {} | {:.2} {} | {} | {} | {} | {} |\n",
        cell(&listing.artist),
        cell(&listing.title),
        cell(&listing.label),
        listing.year.map(|year| year.to_string()).unwrap_or_default(),
        listing.price,
        listing.currency,
        cell(&listing.condition),
        listing.wants,
        listing.haves,
        listing.suggested_price.as_deref().unwrap_or("-"),
    )
}

/// Formats scrape results as markdown
pub fn format_markdown_report(results: &[ScrapeResult]) -> String {
    let mut md = String::new();

    md.push_str("# Crate-Digger Scrape Report\n\n");

    md.push_str("## Summary\n\n");
    md.push_str("| Seller | Status | Qualifying | New |\n");
    md.push_str("|--------|--------|------------|-----|\n");
    for result in results {
        let status = if result.success {
            "ok".to_string()
        } else {
            format!(
                "failed: {}",
                cell(result.error_detail.as_deref().unwrap_or("unknown error"))
            )
        };
        md.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            cell(&result.username),
            status,
            result.total_qualifying,
            result.new_qualifying
        ));
    }
    md.push('\n');

    for result in results.iter().filter(|r| !r.listings.is_empty()) {
        md.push_str(&format!("## {}\n\n", result.username));
        md.push_str(
            "| Artist | Title | Label | Year | Price | Condition | Wants | Haves | Suggested |\n",
        );
        md.push_str(
            "|--------|-------|-------|------|-------|-----------|-------|-------|-----------|\n",
        );
        for listing in &result.listings {
            md.push_str(&listing_row(listing));
        }
        md.push('\n');
    }

    md
}
