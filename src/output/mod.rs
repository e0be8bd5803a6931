//! Output module for reporting scrape results
//!
//! This module handles:
//! - Printing scrape summaries and store statistics for the CLI
//! - Exporting results as JSON or a markdown report

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_report, write_markdown_report};
pub use stats::{format_listing, print_scrape_result, print_statistics};

use crate::crawler::ScrapeResult;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to serialize results: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Writes results as a pretty-printed JSON array
pub fn write_results_json(results: &[ScrapeResult], output_path: &Path) -> OutputResult<()> {
    let mut writer = BufWriter::new(File::create(output_path)?);
    serde_json::to_writer_pretty(&mut writer, results)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Writes results in the format implied by the file extension
///
/// `.md` produces a markdown report; anything else is JSON.
pub fn write_results(results: &[ScrapeResult], output_path: &Path) -> OutputResult<()> {
    let is_markdown = output_path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"));

    if is_markdown {
        write_markdown_report(results, output_path)
    } else {
        write_results_json(results, output_path)
    }
}
