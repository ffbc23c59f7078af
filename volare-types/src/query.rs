//! Search request descriptor, validation, and cache keying.

use core::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::AirportCode;
use crate::money::Currency;

/// Validation failures for [`Query`] construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Origin equals destination.
    #[error("origin and destination are the same airport: {0}")]
    SameAirport(AirportCode),
    /// Departure date lies in the past.
    #[error("departure date {departure} is before {today}")]
    DepartureInPast {
        /// Requested departure date.
        departure: NaiveDate,
        /// Reference date used for validation.
        today: NaiveDate,
    },
    /// Return date precedes the departure date.
    #[error("return date {ret} is before departure {departure}")]
    ReturnBeforeDeparture {
        /// Requested return date.
        ret: NaiveDate,
        /// Requested departure date.
        departure: NaiveDate,
    },
    /// Round trips need a return date, one-ways must not carry one.
    #[error("trip type {0:?} is inconsistent with the return date")]
    TripTypeMismatch(TripType),
    /// Passenger counts violate the seating rules.
    #[error("invalid passenger counts: {0}")]
    Passengers(&'static str),
}

/// Cabin class requested for the whole itinerary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Cabin {
    /// Economy.
    Economy,
    /// Premium economy.
    PremiumEconomy,
    /// Business.
    Business,
    /// First.
    First,
}

impl Cabin {
    /// Stable lowercase label used in cache keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Economy => "economy",
            Self::PremiumEconomy => "premium-economy",
            Self::Business => "business",
            Self::First => "first",
        }
    }
}

/// Itinerary shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TripType {
    /// Single outbound leg.
    OneWay,
    /// Outbound plus return.
    RoundTrip,
    /// Multiple independent legs.
    MultiCity,
}

impl TripType {
    /// Stable lowercase label used in cache keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneWay => "one-way",
            Self::RoundTrip => "round-trip",
            Self::MultiCity => "multi-city",
        }
    }
}

/// Passenger counts. Capacity rules are enforced by the query builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Passengers {
    /// Adults (12+). At least one.
    pub adults: u8,
    /// Children (2-11).
    pub children: u8,
    /// Infants occupying their own seat.
    pub infants_in_seat: u8,
    /// Infants travelling on a lap. At most one per adult.
    pub infants_on_lap: u8,
}

impl Default for Passengers {
    fn default() -> Self {
        Self {
            adults: 1,
            children: 0,
            infants_in_seat: 0,
            infants_on_lap: 0,
        }
    }
}

impl Passengers {
    /// Total seated + lap passengers.
    #[must_use]
    pub const fn total(&self) -> u8 {
        self.adults + self.children + self.infants_in_seat + self.infants_on_lap
    }

    fn validate(&self) -> Result<(), QueryError> {
        if self.adults == 0 {
            return Err(QueryError::Passengers("at least one adult is required"));
        }
        if self.total() > 9 {
            return Err(QueryError::Passengers("at most nine passengers per search"));
        }
        if self.infants_on_lap > self.adults {
            return Err(QueryError::Passengers("at most one lap infant per adult"));
        }
        Ok(())
    }
}

/// Immutable search request descriptor.
///
/// Constructed through [`Query::builder`], which enforces the date and
/// passenger invariants, so a `Query` in hand is always valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Origin airport.
    pub origin: AirportCode,
    /// Destination airport.
    pub destination: AirportCode,
    /// Outbound date.
    pub departure_date: NaiveDate,
    /// Return date for round trips.
    pub return_date: Option<NaiveDate>,
    /// Requested cabin.
    pub cabin: Cabin,
    /// Passenger counts.
    pub passengers: Passengers,
    /// Currency prices are reported in.
    pub currency: Currency,
    /// Itinerary shape.
    pub trip_type: TripType,
}

impl Query {
    /// Start building a query.
    #[must_use]
    pub fn builder(origin: AirportCode, destination: AirportCode, departure: NaiveDate) -> QueryBuilder {
        QueryBuilder::new(origin, destination, departure)
    }

    /// Canonical cache key: the query minus passenger counts. Counts only
    /// affect the final price multiplier, not availability, so all party
    /// sizes share one cached result set.
    #[must_use]
    pub fn key(&self) -> QueryKey {
        let ret = self
            .return_date
            .map_or_else(|| "none".to_string(), |d| d.to_string());
        QueryKey(format!(
            "{}:{}:{}:{}:{}:{}:{}",
            self.origin,
            self.destination,
            self.departure_date,
            ret,
            self.cabin.as_str(),
            self.currency,
            self.trip_type.as_str(),
        ))
    }
}

/// Canonical serialization of a [`Query`] used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey(String);

impl QueryKey {
    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builder enforcing the [`Query`] invariants.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    origin: AirportCode,
    destination: AirportCode,
    departure_date: NaiveDate,
    return_date: Option<NaiveDate>,
    cabin: Cabin,
    passengers: Passengers,
    currency: Currency,
    trip_type: Option<TripType>,
}

impl QueryBuilder {
    fn new(origin: AirportCode, destination: AirportCode, departure: NaiveDate) -> Self {
        Self {
            origin,
            destination,
            departure_date: departure,
            return_date: None,
            cabin: Cabin::Economy,
            passengers: Passengers::default(),
            currency: Currency::USD,
            trip_type: None,
        }
    }

    /// Set the return date (implies a round trip unless overridden).
    #[must_use]
    pub const fn returning(mut self, date: NaiveDate) -> Self {
        self.return_date = Some(date);
        self
    }

    /// Set the cabin class.
    #[must_use]
    pub const fn cabin(mut self, cabin: Cabin) -> Self {
        self.cabin = cabin;
        self
    }

    /// Set passenger counts.
    #[must_use]
    pub const fn passengers(mut self, passengers: Passengers) -> Self {
        self.passengers = passengers;
        self
    }

    /// Set the result currency.
    #[must_use]
    pub const fn currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Force a trip type instead of inferring it from the return date.
    #[must_use]
    pub const fn trip_type(mut self, trip_type: TripType) -> Self {
        self.trip_type = Some(trip_type);
        self
    }

    /// Validate against the current date and build.
    ///
    /// # Errors
    /// Any [`QueryError`] on invariant violations.
    pub fn build(self) -> Result<Query, QueryError> {
        self.build_against(chrono::Utc::now().date_naive())
    }

    /// Validate against an explicit reference date. Exposed so callers with
    /// their own clock (and tests) stay deterministic.
    ///
    /// # Errors
    /// Any [`QueryError`] on invariant violations.
    pub fn build_against(self, today: NaiveDate) -> Result<Query, QueryError> {
        if self.origin == self.destination {
            return Err(QueryError::SameAirport(self.origin));
        }
        if self.departure_date < today {
            return Err(QueryError::DepartureInPast {
                departure: self.departure_date,
                today,
            });
        }
        if let Some(ret) = self.return_date
            && ret < self.departure_date
        {
            return Err(QueryError::ReturnBeforeDeparture {
                ret,
                departure: self.departure_date,
            });
        }
        let trip_type = self.trip_type.unwrap_or(if self.return_date.is_some() {
            TripType::RoundTrip
        } else {
            TripType::OneWay
        });
        match trip_type {
            TripType::RoundTrip if self.return_date.is_none() => {
                return Err(QueryError::TripTypeMismatch(trip_type));
            }
            TripType::OneWay if self.return_date.is_some() => {
                return Err(QueryError::TripTypeMismatch(trip_type));
            }
            _ => {}
        }
        self.passengers.validate()?;
        Ok(Query {
            origin: self.origin,
            destination: self.destination,
            departure_date: self.departure_date,
            return_date: self.return_date,
            cabin: self.cabin,
            passengers: self.passengers,
            currency: self.currency,
            trip_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> AirportCode {
        AirportCode::parse(s).unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn builds_a_one_way_query() {
        let q = Query::builder(code("ICN"), code("NRT"), d("2026-04-15"))
            .currency(Currency::KRW)
            .build_against(d("2026-03-01"))
            .unwrap();
        assert_eq!(q.trip_type, TripType::OneWay);
        assert_eq!(
            q.key().as_str(),
            "ICN:NRT:2026-04-15:none:economy:KRW:one-way"
        );
    }

    #[test]
    fn key_ignores_passenger_counts() {
        let base = Query::builder(code("ICN"), code("NRT"), d("2026-04-15"));
        let one = base.clone().build_against(d("2026-03-01")).unwrap();
        let four = base
            .passengers(Passengers {
                adults: 2,
                children: 2,
                ..Passengers::default()
            })
            .build_against(d("2026-03-01"))
            .unwrap();
        assert_eq!(one.key(), four.key());
    }

    #[test]
    fn rejects_past_departure() {
        let err = Query::builder(code("ICN"), code("NRT"), d("2026-01-01"))
            .build_against(d("2026-03-01"))
            .unwrap_err();
        assert!(matches!(err, QueryError::DepartureInPast { .. }));
    }

    #[test]
    fn rejects_return_before_departure() {
        let err = Query::builder(code("ICN"), code("NRT"), d("2026-04-15"))
            .returning(d("2026-04-10"))
            .build_against(d("2026-03-01"))
            .unwrap_err();
        assert!(matches!(err, QueryError::ReturnBeforeDeparture { .. }));
    }

    #[test]
    fn rejects_bad_passenger_counts() {
        let err = Query::builder(code("ICN"), code("NRT"), d("2026-04-15"))
            .passengers(Passengers {
                adults: 1,
                infants_on_lap: 2,
                ..Passengers::default()
            })
            .build_against(d("2026-03-01"))
            .unwrap_err();
        assert!(matches!(err, QueryError::Passengers(_)));

        let err = Query::builder(code("ICN"), code("NRT"), d("2026-04-15"))
            .passengers(Passengers {
                adults: 6,
                children: 4,
                ..Passengers::default()
            })
            .build_against(d("2026-03-01"))
            .unwrap_err();
        assert!(matches!(err, QueryError::Passengers(_)));
    }
}
