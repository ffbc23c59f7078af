//! Canonical flight offers: segments, per-source prices, and fingerprints.

use core::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{AirportCode, CarrierCode};
use crate::money::Money;
use crate::query::Cabin;
use crate::source::TrustScore;

/// Structural violations detected when assembling an [`Offer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OfferError {
    /// An offer must carry at least one segment.
    #[error("offer has no segments")]
    NoSegments,
    /// An offer must carry at least one price.
    #[error("offer has no prices")]
    NoPrices,
    /// A segment arrives before it departs.
    #[error("segment {carrier}{flight_number} arrives before it departs")]
    NonPositiveDuration {
        /// Marketing carrier of the offending segment.
        carrier: CarrierCode,
        /// Flight number of the offending segment.
        flight_number: u16,
    },
    /// Adjacent segments are not geographically chained.
    #[error("segment {index} departs from {found} but the previous segment arrived at {expected}")]
    BrokenChain {
        /// Index of the offending segment.
        index: usize,
        /// Airport the previous segment arrived at.
        expected: AirportCode,
        /// Airport the offending segment departs from.
        found: AirportCode,
    },
    /// Adjacent segments are not chronologically ordered.
    #[error("segment {index} departs before the previous segment arrives")]
    TimeTravel {
        /// Index of the offending segment.
        index: usize,
    },
}

/// One flight leg of an itinerary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Carrier selling the leg.
    pub marketing_carrier: CarrierCode,
    /// Carrier operating the metal, when reported.
    pub operating_carrier: Option<CarrierCode>,
    /// Set when the operating carrier was missing upstream and the
    /// marketing carrier was assumed in its place.
    pub operating_assumed: bool,
    /// Flight number (without the carrier prefix).
    pub flight_number: u16,
    /// Departure airport.
    pub origin: AirportCode,
    /// Arrival airport.
    pub destination: AirportCode,
    /// Departure instant in UTC.
    pub depart_utc: DateTime<Utc>,
    /// Arrival instant in UTC.
    pub arrive_utc: DateTime<Utc>,
    /// Equipment, when reported. Absence is allowed; downstream scoring
    /// handles it.
    pub aircraft: Option<String>,
    /// Cabin flown on this leg.
    pub cabin: Cabin,
}

impl Segment {
    /// Block time in minutes.
    #[must_use]
    pub fn duration_min(&self) -> i64 {
        (self.arrive_utc - self.depart_utc).num_minutes()
    }

    /// Stable identity of the leg for deduplication.
    #[must_use]
    pub fn fingerprint(&self) -> SegmentFingerprint {
        SegmentFingerprint {
            carrier: self.marketing_carrier.clone(),
            flight_number: self.flight_number,
            departure_date: self.depart_utc.date_naive(),
            origin: self.origin,
            destination: self.destination,
            cabin: self.cabin,
        }
    }
}

/// Identity of one leg: marketing carrier, flight number, departure date,
/// endpoints, and cabin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentFingerprint {
    /// Marketing carrier.
    pub carrier: CarrierCode,
    /// Flight number.
    pub flight_number: u16,
    /// Departure date (UTC).
    pub departure_date: NaiveDate,
    /// Departure airport.
    pub origin: AirportCode,
    /// Arrival airport.
    pub destination: AirportCode,
    /// Cabin flown.
    pub cabin: Cabin,
}

impl fmt::Display for SegmentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}/{}/{}-{}/{}",
            self.carrier,
            self.flight_number,
            self.departure_date,
            self.origin,
            self.destination,
            self.cabin.as_str()
        )
    }
}

/// Dedup key of a whole itinerary: the ordered tuple of segment
/// fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub Vec<SegmentFingerprint>);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

/// One priced booking option for an offer, annotated with provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Name of the source that produced this price.
    pub source: String,
    /// Trust score of that source at fetch time.
    pub trust: TrustScore,
    /// Amount as reported upstream, original currency preserved.
    pub amount: Money,
    /// Amount converted into the query currency at the stamped daily rate.
    pub converted: Money,
    /// Whether checked baggage is included.
    pub includes_baggage: bool,
    /// Whether a meal is included.
    pub includes_meal: bool,
    /// Fare class or brand name, when reported.
    pub fare_class: Option<String>,
    /// Deep link for booking this fare.
    pub booking_url: String,
    /// When the source produced this price.
    pub fetched_at: DateTime<Utc>,
}

/// Canonical, merge-ready flight result.
///
/// Lifecycle: created by normalization, merged with offers sharing the same
/// fingerprint (prices concatenated, lowest recomputed), never mutated once
/// it enters the cache; refreshes swap whole cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    fingerprint: Fingerprint,
    segments: Vec<Segment>,
    prices: Vec<Price>,
}

impl Offer {
    /// Assemble an offer, enforcing segment chaining and non-empty prices.
    ///
    /// # Errors
    /// [`OfferError`] describing the first violated invariant.
    pub fn new(segments: Vec<Segment>, prices: Vec<Price>) -> Result<Self, OfferError> {
        if segments.is_empty() {
            return Err(OfferError::NoSegments);
        }
        if prices.is_empty() {
            return Err(OfferError::NoPrices);
        }
        for seg in &segments {
            if seg.arrive_utc <= seg.depart_utc {
                return Err(OfferError::NonPositiveDuration {
                    carrier: seg.marketing_carrier.clone(),
                    flight_number: seg.flight_number,
                });
            }
        }
        for (index, pair) in segments.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.origin != prev.destination {
                return Err(OfferError::BrokenChain {
                    index: index + 1,
                    expected: prev.destination,
                    found: next.origin,
                });
            }
            if next.depart_utc <= prev.arrive_utc {
                return Err(OfferError::TimeTravel { index: index + 1 });
            }
        }
        let fingerprint = Fingerprint(segments.iter().map(Segment::fingerprint).collect());
        Ok(Self {
            fingerprint,
            segments,
            prices,
        })
    }

    /// The dedup key.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Ordered, non-empty segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Non-empty prices, sorted ascending by converted amount with
    /// higher-trust and earlier-fetched entries first among ties.
    #[must_use]
    pub fn prices(&self) -> &[Price] {
        &self.prices
    }

    /// The cheapest price in the query currency.
    ///
    /// Non-emptiness is a construction invariant, so this always exists.
    #[must_use]
    pub fn lowest_price(&self) -> &Price {
        self.prices
            .iter()
            .min_by(|a, b| {
                a.converted
                    .amount
                    .cmp(&b.converted.amount)
                    .then(b.trust.cmp(&a.trust))
                    .then(a.fetched_at.cmp(&b.fetched_at))
            })
            .expect("offer prices are non-empty by construction")
    }

    /// Decompose into parts. Used by the merger, which re-validates via
    /// [`Offer::new`] when reassembling.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Segment>, Vec<Price>) {
        (self.segments, self.prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use rust_decimal::Decimal;

    use crate::money::Currency;

    fn code(s: &str) -> AirportCode {
        AirportCode::parse(s).unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .unwrap()
            .and_utc()
    }

    fn seg(flight: u16, from: &str, to: &str, dep: &str, arr: &str) -> Segment {
        Segment {
            marketing_carrier: CarrierCode::parse("KE").unwrap(),
            operating_carrier: None,
            operating_assumed: false,
            flight_number: flight,
            origin: code(from),
            destination: code(to),
            depart_utc: ts(dep),
            arrive_utc: ts(arr),
            aircraft: None,
            cabin: Cabin::Economy,
        }
    }

    fn won(amount: i64) -> Money {
        Money::new(Decimal::from(amount), Currency::KRW)
    }

    fn price(src: &str, amount: i64, trust: TrustScore) -> Price {
        Price {
            source: src.to_string(),
            trust,
            amount: won(amount),
            converted: won(amount),
            includes_baggage: true,
            includes_meal: false,
            fare_class: None,
            booking_url: format!("https://{src}.example/book"),
            fetched_at: ts("2026-03-01 00:00"),
        }
    }

    #[test]
    fn fingerprint_joins_segments_in_order() {
        let offer = Offer::new(
            vec![
                seg(901, "ICN", "NRT", "2026-04-15 01:00", "2026-04-15 03:20"),
                seg(12, "NRT", "JFK", "2026-04-15 08:00", "2026-04-15 20:00"),
            ],
            vec![price("metasearch", 420_000, TrustScore::METASEARCH)],
        )
        .unwrap();
        assert_eq!(offer.fingerprint().0.len(), 2);
        assert!(offer.fingerprint().to_string().starts_with("KE901/2026-04-15/ICN-NRT"));
    }

    #[test]
    fn rejects_broken_chains() {
        let err = Offer::new(
            vec![
                seg(901, "ICN", "NRT", "2026-04-15 01:00", "2026-04-15 03:20"),
                seg(12, "HND", "JFK", "2026-04-15 08:00", "2026-04-15 20:00"),
            ],
            vec![price("metasearch", 420_000, TrustScore::METASEARCH)],
        )
        .unwrap_err();
        assert!(matches!(err, OfferError::BrokenChain { index: 1, .. }));
    }

    #[test]
    fn rejects_time_travel() {
        let err = Offer::new(
            vec![
                seg(901, "ICN", "NRT", "2026-04-15 01:00", "2026-04-15 03:20"),
                seg(12, "NRT", "JFK", "2026-04-15 03:00", "2026-04-15 20:00"),
            ],
            vec![price("metasearch", 420_000, TrustScore::METASEARCH)],
        )
        .unwrap_err();
        assert!(matches!(err, OfferError::TimeTravel { index: 1 }));
    }

    #[test]
    fn lowest_price_breaks_ties_by_trust_then_age() {
        let mut cheaper_later = price("aggregator", 415_000, TrustScore::AGGREGATOR);
        cheaper_later.fetched_at = ts("2026-03-01 00:05");
        let offer = Offer::new(
            vec![seg(901, "ICN", "NRT", "2026-04-15 01:00", "2026-04-15 03:20")],
            vec![
                price("metasearch", 420_000, TrustScore::METASEARCH),
                cheaper_later,
                price("tenant", 415_000, TrustScore::DIRECT_AIRLINE),
            ],
        )
        .unwrap();
        let lowest = offer.lowest_price();
        assert_eq!(lowest.converted.amount, Decimal::from(415_000));
        assert_eq!(lowest.source, "tenant");
    }
}
