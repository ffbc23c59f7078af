//! Report envelopes produced by the orchestrator.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::geo::AirportCode;
use crate::health::FailureKind;
use crate::money::Currency;
use crate::offer::Offer;
use crate::query::Cabin;

/// Cache disposition of a search response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheState {
    /// Served from a fresh cache entry.
    Fresh,
    /// Served from a stale entry while a refresh runs in the background.
    Stale,
    /// No usable entry; a synchronous fan-out produced the response.
    Miss,
}

/// Offers-per-source counts for one response.
pub type SourceMix = BTreeMap<String, u32>;

/// Non-fatal per-source issue carried alongside a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceWarning {
    /// Source that failed.
    pub source: String,
    /// Classified failure kind.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub message: String,
}

/// Result of one search: merged offers plus crawl metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    /// Merged, deduplicated offers sorted by lowest price.
    pub offers: Vec<Offer>,
    /// Cache disposition.
    pub cache_state: CacheState,
    /// True when the response was returned under first-response-wins with
    /// background sources still running; the entry will keep improving.
    pub partial: bool,
    /// True when this response dispatched (or found in flight) a
    /// background crawl the caller can re-poll for.
    pub background_refresh: bool,
    /// Offers contributed per source.
    pub source_mix: SourceMix,
    /// Per-source failures that did not prevent a response.
    pub warnings: Vec<SourceWarning>,
}

/// One appended price-history observation, the unit served to downstream
/// prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryRow {
    /// When the observation was recorded.
    pub observed_at: DateTime<Utc>,
    /// Departure date the prices are for.
    pub departure_date: NaiveDate,
    /// Route origin.
    pub origin: AirportCode,
    /// Route destination.
    pub destination: AirportCode,
    /// Cabin searched.
    pub cabin: Cabin,
    /// Cheapest converted amount seen.
    pub min_price: Decimal,
    /// Mean converted amount.
    pub avg_price: Decimal,
    /// Most expensive converted amount seen.
    pub max_price: Decimal,
    /// Currency of the three amounts.
    pub currency: Currency,
    /// Number of offers behind the aggregates.
    pub sample_count: u32,
    /// Offers contributed per source.
    pub source_mix: SourceMix,
}
