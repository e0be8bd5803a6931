//! Keeper filter
//!
//! A listing is a keeper when all of the following hold, checked in order:
//!
//! 1. one of its format strings contains `"LP"`
//! 2. its media condition is one of [`KEEPER_CONDITIONS`]
//! 3. more community members want the release than have it

use crate::crawler::listing::RawListing;
use std::fmt;

/// Media grades accepted as good or better
pub const KEEPER_CONDITIONS: [&str; 4] = [
    "Near Mint (NM or M-)",
    "Very Good Plus (VG+)",
    "Very Good (VG)",
    "Good Plus (G+)",
];

/// Why a listing was not kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotLp,
    Condition,
    Demand,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NotLp => "not an LP",
            Self::Condition => "condition below Good Plus",
            Self::Demand => "wants do not exceed haves",
        };
        f.write_str(reason)
    }
}

/// Evaluates the keeper rules, stopping at the first failure
pub fn evaluate(listing: &RawListing) -> Result<(), Rejection> {
    if !listing.release.format.iter().any(|format| format.contains("LP")) {
        return Err(Rejection::NotLp);
    }

    if !KEEPER_CONDITIONS.contains(&listing.condition.as_str()) {
        return Err(Rejection::Condition);
    }

    if listing.wants() <= listing.haves() {
        return Err(Rejection::Demand);
    }

    Ok(())
}

pub fn is_keeper(listing: &RawListing) -> bool {
    evaluate(listing).is_ok()
}
