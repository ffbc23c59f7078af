//! volare-types
//!
//! Shared flight-domain DTOs used across the volare workspace.
//!
//! - `query`: search request descriptor and cache keying.
//! - `offer`: canonical offers, segments, and per-source prices.
//! - `money`: decimal money, ISO-4217 currencies, stamped FX tables.
//! - `geo`: IATA code newtypes and the airport/airline directory.
//! - `source`: source identity, kinds, trust scores, and tiers.
//! - `health`: failure taxonomy and per-source health snapshots.
//! - `config`: typed configuration records for the orchestrator.
//! - `coverage`: route coverage and popularity tables.
//! - `reports`: report envelopes returned by the orchestrator.
#![warn(missing_docs)]

pub mod config;
pub mod coverage;
pub mod geo;
pub mod health;
pub mod money;
pub mod offer;
pub mod query;
pub mod reports;
pub mod source;

pub use config::{
    AdapterConfig, BackoffConfig, BrowserPoolConfig, CacheTtlConfig, CircuitConfig,
    CredentialsConfig, ExecutorConfig, ProxyPoolConfig, RateLimitConfig, TierOverride,
    VolareConfig,
};
pub use coverage::{CoverageRule, CoverageTable, PopularityTable, RoutePopularity};
pub use geo::{Airline, AirlineKind, Airport, AirportCode, AirportDirectory, CarrierCode, Region};
pub use health::{CircuitState, FailureKind, SourceHealthSnapshot};
pub use money::{Currency, FxTable, Money, MoneyError};
pub use offer::{Fingerprint, Offer, OfferError, Price, Segment, SegmentFingerprint};
pub use query::{Cabin, Passengers, Query, QueryBuilder, QueryError, QueryKey, TripType};
pub use reports::{CacheState, PriceHistoryRow, SearchReport, SourceMix, SourceWarning};
pub use source::{AdapterTier, RouteTier, SourceKey, SourceKind, TrustScore};
