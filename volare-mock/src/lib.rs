//! Deterministic mock fare source for tests and examples.
//!
//! The mock emits aggregator-shaped JSON payloads so the real normalizer
//! runs end to end; behavior (latency, scripted failures, per-call
//! sequences) is configured through closures on the builder.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};

use volare_core::adapter::{FareSource, FetchContext};
use volare_core::error::VolareError;
use volare_core::evasion::EvasionPolicy;
use volare_core::raw::{RawOffer, RawPayload};
use volare_types::geo::{AirportCode, CarrierCode};
use volare_types::money::Currency;
use volare_types::query::Query;
use volare_types::source::{SourceKind, TrustScore};

type FetchFn =
    Arc<dyn Fn(&Query, u32) -> Result<Vec<serde_json::Value>, VolareError> + Send + Sync>;

/// A query used across tests: ICN to NRT, economy, KRW, departing well in
/// the future so date validation never bites.
#[must_use]
pub fn sample_query() -> Query {
    let departure = Utc::now()
        .date_naive()
        .checked_add_days(Days::new(45))
        .expect("date arithmetic");
    Query::builder(
        AirportCode::parse("ICN").expect("code"),
        AirportCode::parse("NRT").expect("code"),
        departure,
    )
    .currency(Currency::KRW)
    .build()
    .expect("sample query is valid")
}

/// Aggregator-shaped itinerary JSON for one nonstop flight, priced in KRW.
///
/// `departure_date` is used for both leg times; departure is fixed at
/// 10:00 KST, arrival 12:20 JST.
#[must_use]
pub fn itinerary_json(
    carrier: &str,
    flight_number: u16,
    origin: &str,
    destination: &str,
    departure_date: NaiveDate,
    amount: i64,
    currency: &str,
    booking_host: &str,
) -> serde_json::Value {
    serde_json::json!({
        "segments": [{
            "carrier": carrier,
            "flight_number": flight_number,
            "origin": origin,
            "destination": destination,
            "departure": format!("{departure_date}T10:00:00+09:00"),
            "arrival": format!("{departure_date}T12:20:00+09:00"),
            "cabin": "Y",
        }],
        "price": { "amount": amount.to_string(), "currency": currency },
        "deep_link": format!("https://{booking_host}/book/{carrier}{flight_number}"),
    })
}

/// Itinerary JSON matching [`sample_query`]'s route and date.
#[must_use]
pub fn sample_itinerary(carrier: &str, flight_number: u16, amount: i64, host: &str) -> serde_json::Value {
    let departure = Utc::now()
        .date_naive()
        .checked_add_days(Days::new(45))
        .expect("date arithmetic");
    itinerary_json(carrier, flight_number, "ICN", "NRT", departure, amount, "KRW", host)
}

/// Closure-configurable in-memory source used by integration tests.
pub struct MockSource {
    name: &'static str,
    kind: SourceKind,
    trust: Option<TrustScore>,
    carriers: Vec<CarrierCode>,
    delay: Duration,
    min_deadline: Duration,
    evasion: Option<EvasionPolicy>,
    fetch_fn: Option<FetchFn>,
    payloads: Vec<serde_json::Value>,
    health_ok: bool,
    calls: AtomicU32,
}

impl MockSource {
    /// Start building a mock.
    #[must_use]
    pub fn builder() -> MockSourceBuilder {
        MockSourceBuilder::new()
    }

    /// How many times `fetch` ran.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FareSource for MockSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn trust(&self) -> TrustScore {
        self.trust.unwrap_or_else(|| self.kind.default_trust())
    }

    fn serves_carrier(&self, carrier: &CarrierCode) -> bool {
        self.carriers.contains(carrier)
    }

    fn min_deadline(&self) -> Duration {
        self.min_deadline
    }

    fn evasion(&self) -> Option<&EvasionPolicy> {
        self.evasion.as_ref()
    }

    async fn fetch(&self, query: &Query, _cx: &FetchContext) -> Result<Vec<RawOffer>, VolareError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        let payloads = match &self.fetch_fn {
            Some(f) => f(query, call)?,
            None => self.payloads.clone(),
        };
        Ok(payloads
            .into_iter()
            .map(|body| RawOffer::new(self.key(), RawPayload::Aggregator(body)))
            .collect())
    }

    async fn health_check(&self) -> Result<(), VolareError> {
        if self.health_ok {
            Ok(())
        } else {
            Err(VolareError::transient(self.name, "health probe failed"))
        }
    }
}

/// Builder for [`MockSource`].
pub struct MockSourceBuilder {
    name: &'static str,
    kind: SourceKind,
    trust: Option<TrustScore>,
    carriers: Vec<CarrierCode>,
    delay: Duration,
    min_deadline: Duration,
    evasion: Option<EvasionPolicy>,
    fetch_fn: Option<FetchFn>,
    payloads: Vec<serde_json::Value>,
    health_ok: bool,
}

impl Default for MockSourceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSourceBuilder {
    /// Fresh builder: aggregator kind, no payloads, no delay.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "mock",
            kind: SourceKind::AggregatorApi,
            trust: None,
            carriers: Vec::new(),
            delay: Duration::ZERO,
            min_deadline: Duration::ZERO,
            evasion: None,
            fetch_fn: None,
            payloads: Vec::new(),
            health_ok: true,
        }
    }

    /// Set the source name.
    #[must_use]
    pub const fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Set the source kind (drives default trust and tier).
    #[must_use]
    pub const fn kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Override the trust score.
    #[must_use]
    pub const fn trust(mut self, trust: TrustScore) -> Self {
        self.trust = Some(trust);
        self
    }

    /// Declare a carrier this source serves directly.
    #[must_use]
    pub fn serves(mut self, carrier: &str) -> Self {
        self.carriers
            .push(CarrierCode::parse(carrier).expect("carrier code"));
        self
    }

    /// Latency added to every call.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Minimum remaining budget the source claims to need.
    #[must_use]
    pub const fn min_deadline(mut self, floor: Duration) -> Self {
        self.min_deadline = floor;
        self
    }

    /// Attach an anti-bot ladder.
    #[must_use]
    pub fn evasion(mut self, policy: EvasionPolicy) -> Self {
        self.evasion = Some(policy);
        self
    }

    /// Canned payloads returned by every call.
    #[must_use]
    pub fn returns(mut self, payloads: Vec<serde_json::Value>) -> Self {
        self.payloads = payloads;
        self
    }

    /// Full control: closure over `(query, call_index)`.
    #[must_use]
    pub fn with_fetch_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Query, u32) -> Result<Vec<serde_json::Value>, VolareError> + Send + Sync + 'static,
    {
        self.fetch_fn = Some(Arc::new(f));
        self
    }

    /// Every call fails with the produced error.
    #[must_use]
    pub fn fails_with<F>(self, f: F) -> Self
    where
        F: Fn() -> VolareError + Send + Sync + 'static,
    {
        self.with_fetch_fn(move |_, _| Err(f()))
    }

    /// Health probes fail.
    #[must_use]
    pub const fn unhealthy(mut self) -> Self {
        self.health_ok = false;
        self
    }

    /// Build the mock.
    #[must_use]
    pub fn build(self) -> Arc<MockSource> {
        Arc::new(MockSource {
            name: self.name,
            kind: self.kind,
            trust: self.trust,
            carriers: self.carriers,
            delay: self.delay,
            min_deadline: self.min_deadline,
            evasion: self.evasion,
            fetch_fn: self.fetch_fn,
            payloads: self.payloads,
            health_ok: self.health_ok,
            calls: AtomicU32::new(0),
        })
    }
}
