//! Inventory page decoding
//!
//! Upstream entries are decoded one at a time so a single malformed entry
//! costs only that entry. Fields the marketplace sends as either a string or
//! a list (`format`, `label`, `genre`, `style`) are normalized here to a
//! `Vec<String>` and never seen in any other shape past this module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Suggested-price tier reported on qualifying listings
pub const SUGGESTED_PRICE_TIER: &str = "Very Good Plus (VG+)";

/// Pagination metadata of an inventory response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub page: u32,
    pub pages: u32,
    pub per_page: u32,
    pub items: u64,
}

impl Pagination {
    /// Number of pages the inventory spans at `per_page` items per page
    ///
    /// Falls back to `pages` when the item count is missing, which is the
    /// same figure for a single-item discovery request.
    pub fn pages_at(&self, per_page: u32) -> u32 {
        let items = if self.items > 0 {
            self.items
        } else {
            u64::from(self.pages)
        };
        let per_page = u64::from(per_page.max(1));
        u32::try_from(items.div_ceil(per_page)).unwrap_or(u32::MAX)
    }
}

/// One inventory response, entries left undecoded
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryPage {
    #[serde(default)]
    pub pagination: Pagination,

    #[serde(default)]
    pub listings: Vec<serde_json::Value>,
}

impl InventoryPage {
    pub fn decode(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// Price with its currency code
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Price {
    pub value: f64,

    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seller {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct CommunityStats {
    pub in_wantlist: u32,
    pub in_collection: u32,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ReleaseStats {
    pub community: CommunityStats,
}

/// Release metadata embedded in an inventory entry
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub id: u64,

    #[serde(default)]
    pub artist: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub year: Option<i32>,

    #[serde(default, deserialize_with = "string_list")]
    pub format: Vec<String>,

    #[serde(default, deserialize_with = "string_list")]
    pub label: Vec<String>,

    #[serde(default, alias = "catno")]
    pub catalog_number: String,

    #[serde(default, alias = "genres", deserialize_with = "string_list")]
    pub genre: Vec<String>,

    #[serde(default, alias = "styles", deserialize_with = "string_list")]
    pub style: Vec<String>,

    #[serde(default)]
    pub stats: ReleaseStats,

    /// Suggested prices keyed by condition grade
    #[serde(default)]
    pub price_suggestions: Option<HashMap<String, Price>>,
}

/// One inventory entry as the marketplace sends it
#[derive(Debug, Clone, Deserialize)]
pub struct RawListing {
    /// Inventory listing ID
    pub id: u64,

    #[serde(default)]
    pub condition: String,

    #[serde(default)]
    pub sleeve_condition: String,

    pub price: Price,

    #[serde(default)]
    pub seller: Seller,

    pub release: Release,
}

impl RawListing {
    pub fn decode(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn wants(&self) -> u32 {
        self.release.stats.community.in_wantlist
    }

    pub fn haves(&self) -> u32 {
        self.release.stats.community.in_collection
    }
}

/// Normalizes a string-or-list value
///
/// A bare string becomes a one-element list and a list keeps every item in
/// its position, with non-string items as empty strings. Anything else is
/// empty.
pub fn normalize_string_list(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().unwrap_or_default().to_string())
            .collect(),
        _ => Vec::new(),
    }
}

fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(normalize_string_list).unwrap_or_default())
}

/// A listing that passed the keeper filter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualifyingListing {
    pub listing_id: u64,
    pub release_id: u64,
    pub condition: String,
    pub sleeve_condition: String,
    pub price: f64,
    pub currency: String,
    pub seller: String,
    pub artist: String,
    pub title: String,
    pub formats: Vec<String>,
    pub labels: Vec<String>,
    /// Labels joined for display
    pub label: String,
    pub catalog_number: String,
    pub wants: u32,
    pub haves: u32,
    pub genres: Vec<String>,
    pub styles: Vec<String>,
    pub year: Option<i32>,
    /// VG+ suggested price, e.g. "24.99 USD"
    pub suggested_price: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl QualifyingListing {
    pub fn from_raw(raw: &RawListing, scraped_at: DateTime<Utc>) -> Self {
        let release = &raw.release;
        let suggested_price = release
            .price_suggestions
            .as_ref()
            .and_then(|tiers| tiers.get(SUGGESTED_PRICE_TIER))
            .map(|price| format!("{:.2} {}", price.value, price.currency));

        Self {
            listing_id: raw.id,
            release_id: release.id,
            condition: raw.condition.clone(),
            sleeve_condition: raw.sleeve_condition.clone(),
            price: raw.price.value,
            currency: raw.price.currency.clone(),
            seller: raw.seller.username.clone(),
            artist: release.artist.clone(),
            title: release.title.clone(),
            formats: release.format.clone(),
            labels: release.label.clone(),
            label: release.label.join(", "),
            catalog_number: release.catalog_number.clone(),
            wants: raw.wants(),
            haves: raw.haves(),
            genres: release.genre.clone(),
            styles: release.style.clone(),
            year: release.year.filter(|year| *year > 0),
            suggested_price,
            scraped_at,
        }
    }
}
