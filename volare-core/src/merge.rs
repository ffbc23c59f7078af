//! Deduplication and price merging over canonical offers.
//!
//! Merge semantics:
//! 1. Group offers by fingerprint.
//! 2. Within a group, union prices; drop exact duplicates.
//! 3. Segment metadata comes from the highest-trust contributor (earlier
//!    fetch wins ties), so a source reporting the operating carrier beats
//!    one that only knows the marketing carrier.
//! 4. Prices sort by converted amount, then trust descending, then fetch
//!    time ascending.
//! 5. Output is stable-sorted by lowest converted price, then fingerprint,
//!    so the result is deterministic for any input order.

use std::collections::HashMap;

use volare_types::offer::{Fingerprint, Offer, Price, Segment};
use volare_types::reports::SourceMix;
use volare_types::source::TrustScore;

/// Offers-per-source counts across a result set. A source is counted once
/// per offer it contributed at least one price to.
#[must_use]
pub fn source_mix(offers: &[Offer]) -> SourceMix {
    let mut mix = SourceMix::new();
    for offer in offers {
        let mut seen: Vec<&str> = Vec::new();
        for price in offer.prices() {
            if !seen.contains(&price.source.as_str()) {
                seen.push(&price.source);
                *mix.entry(price.source.clone()).or_insert(0) += 1;
            }
        }
    }
    mix
}

/// Rank of an offer's segment metadata, used to pick the winning segments
/// when sources disagree on minor attributes. Higher trust wins, then the
/// earlier fetch, then the better-informed segment set; the final textual
/// key keeps the choice total so merge order never matters.
type MetaRank = (TrustScore, i64, usize, usize, String);

fn contributor_rank(prices: &[Price], segments: &[Segment]) -> MetaRank {
    let trust = prices.iter().map(|p| p.trust).max().unwrap_or(TrustScore(0));
    let earliest = prices
        .iter()
        .filter(|p| p.trust == trust)
        .map(|p| p.fetched_at.timestamp_micros())
        .min()
        .unwrap_or(i64::MAX);
    let explicit_operating = segments.iter().filter(|s| !s.operating_assumed).count();
    let with_aircraft = segments.iter().filter(|s| s.aircraft.is_some()).count();
    (
        trust,
        // Earlier fetch should rank higher, hence the negation.
        -earliest,
        explicit_operating,
        with_aircraft,
        format!("{segments:?}"),
    )
}

fn sort_prices(prices: &mut Vec<Price>) {
    // The key covers every field so ordering is total and independent of
    // input order; dedup then removes exact duplicates.
    prices.sort_by(|a, b| {
        a.converted
            .amount
            .cmp(&b.converted.amount)
            .then(b.trust.cmp(&a.trust))
            .then(a.fetched_at.cmp(&b.fetched_at))
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.amount.amount.cmp(&b.amount.amount))
            .then_with(|| a.amount.currency.cmp(&b.amount.currency))
            .then_with(|| a.booking_url.cmp(&b.booking_url))
            .then_with(|| a.fare_class.cmp(&b.fare_class))
            .then(a.includes_baggage.cmp(&b.includes_baggage))
            .then(a.includes_meal.cmp(&b.includes_meal))
    });
    prices.dedup();
}

/// Merge offers across sources: one output offer per fingerprint, all
/// prices preserved, deterministic order.
#[must_use]
pub fn merge_offers(offers: impl IntoIterator<Item = Offer>) -> Vec<Offer> {
    let mut groups: HashMap<Fingerprint, (Vec<Segment>, MetaRank, Vec<Price>)> = HashMap::new();
    for offer in offers {
        let fingerprint = offer.fingerprint().clone();
        let (segments, prices) = offer.into_parts();
        let rank = contributor_rank(&prices, &segments);
        match groups.get_mut(&fingerprint) {
            None => {
                groups.insert(fingerprint, (segments, rank, prices));
            }
            Some((best_segments, best_rank, all_prices)) => {
                if rank > *best_rank {
                    *best_segments = segments;
                    *best_rank = rank;
                }
                all_prices.extend(prices);
            }
        }
    }

    let mut merged: Vec<Offer> = Vec::with_capacity(groups.len());
    for (_, (segments, _, mut prices)) in groups {
        sort_prices(&mut prices);
        // Groups were formed from valid offers sharing a fingerprint, so
        // reassembly cannot fail; skip defensively rather than panic.
        if let Ok(offer) = Offer::new(segments, prices) {
            merged.push(offer);
        }
    }
    merged.sort_by(|a, b| {
        a.lowest_price()
            .converted
            .amount
            .cmp(&b.lowest_price().converted.amount)
            .then_with(|| a.fingerprint().cmp(b.fingerprint()))
    });
    merged
}
