//! Append-only price history, feeding downstream prediction.

use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use volare_types::geo::AirportCode;
use volare_types::money::Currency;
use volare_types::offer::Offer;
use volare_types::query::Query;
use volare_types::reports::{PriceHistoryRow, SourceMix};

/// Storage seam for price history. The default is in-memory; deployments
/// back this with their time-series store.
pub trait HistoryStore: Send + Sync {
    /// Append one observation.
    fn append(&self, row: PriceHistoryRow);

    /// Read observations for a route whose departure dates fall in
    /// `[from, to]`, oldest first.
    fn rows(
        &self,
        origin: AirportCode,
        destination: AirportCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<PriceHistoryRow>;
}

/// In-memory append-only store.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    rows: Mutex<Vec<PriceHistoryRow>>,
}

impl InMemoryHistoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().expect("mutex poisoned").len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn append(&self, row: PriceHistoryRow) {
        self.rows.lock().expect("mutex poisoned").push(row);
    }

    fn rows(
        &self,
        origin: AirportCode,
        destination: AirportCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<PriceHistoryRow> {
        self.rows
            .lock()
            .expect("mutex poisoned")
            .iter()
            .filter(|r| {
                r.origin == origin
                    && r.destination == destination
                    && r.departure_date >= from
                    && r.departure_date <= to
            })
            .cloned()
            .collect()
    }
}

/// Aggregate one crawl into a history row. `None` when the crawl produced
/// no offers; empty crawls are not observations.
#[must_use]
pub fn history_row(query: &Query, offers: &[Offer], source_mix: &SourceMix) -> Option<PriceHistoryRow> {
    if offers.is_empty() {
        return None;
    }
    let amounts: Vec<Decimal> = offers
        .iter()
        .map(|o| o.lowest_price().converted.amount)
        .collect();
    let min = amounts.iter().copied().min()?;
    let max = amounts.iter().copied().max()?;
    let count = Decimal::from(amounts.len());
    let sum: Decimal = amounts.iter().copied().sum();
    let currency: Currency = offers[0].lowest_price().converted.currency;
    Some(PriceHistoryRow {
        observed_at: Utc::now(),
        departure_date: query.departure_date,
        origin: query.origin,
        destination: query.destination,
        cabin: query.cabin,
        min_price: min,
        avg_price: sum / count,
        max_price: max,
        currency,
        sample_count: u32::try_from(amounts.len()).unwrap_or(u32::MAX),
        source_mix: source_mix.clone(),
    })
}
