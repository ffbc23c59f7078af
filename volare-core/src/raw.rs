//! Raw offers as emitted by sources, before normalization.
//!
//! Each upstream has its own response shape; the payload is a tagged
//! variant per shape so parsing stays trivially testable in isolation and
//! the normalizer can dispatch without downcasting. Raw offers are
//! short-lived and never persisted.

use chrono::{DateTime, Utc};

use volare_types::source::SourceKey;

/// One raw offer from one source.
#[derive(Debug, Clone)]
pub struct RawOffer {
    /// Source that produced the payload.
    pub source: SourceKey,
    /// When the payload was fetched.
    pub fetched_at: DateTime<Utc>,
    /// The adapter-specific payload.
    pub payload: RawPayload,
}

impl RawOffer {
    /// Construct a raw offer stamped with the current time.
    #[must_use]
    pub fn new(source: SourceKey, payload: RawPayload) -> Self {
        Self {
            source,
            fetched_at: Utc::now(),
            payload,
        }
    }
}

/// Tagged payload, one variant per upstream wire shape.
#[derive(Debug, Clone)]
pub enum RawPayload {
    /// Decoded itinerary from the binary metasearch protocol.
    Metasearch(MetasearchItinerary),
    /// One itinerary object from an aggregator REST response.
    Aggregator(serde_json::Value),
    /// One itinerary from the shared-tenant endpoint, tagged with the
    /// brand it belongs to so normalization can dispatch per tenant.
    Tenant {
        /// Airline brand within the shared endpoint.
        tenant: String,
        /// The itinerary object.
        body: serde_json::Value,
    },
    /// One itinerary from a reverse-engineered airline endpoint.
    Airline {
        /// Manifest id of the endpoint that produced it.
        endpoint: &'static str,
        /// The itinerary object.
        body: serde_json::Value,
    },
    /// One priced record from the GDS.
    Gds(GdsRecord),
    /// One itinerary captured from an intercepted XHR response during
    /// browser automation.
    Browser {
        /// URL of the intercepted request.
        captured_from: String,
        /// The itinerary object.
        body: serde_json::Value,
    },
    /// One itinerary from an official partner API.
    Official(serde_json::Value),
}

impl RawPayload {
    /// Stable label of the payload shape, for logs and parse errors.
    #[must_use]
    pub const fn shape(&self) -> &'static str {
        match self {
            Self::Metasearch(_) => "metasearch",
            Self::Aggregator(_) => "aggregator",
            Self::Tenant { .. } => "tenant",
            Self::Airline { .. } => "airline",
            Self::Gds(_) => "gds",
            Self::Browser { .. } => "browser",
            Self::Official(_) => "official",
        }
    }
}

/// Decoded metasearch itinerary. Times are local to their airports; the
/// normalizer resolves them to UTC through the airport directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetasearchItinerary {
    /// Ordered legs.
    pub legs: Vec<MetasearchLeg>,
    /// Total price in minor units of `currency`.
    pub price_minor: i64,
    /// ISO-4217 code, empty when the upstream omitted it.
    pub currency: String,
    /// Opaque token used to build the booking deep link.
    pub booking_token: String,
}

/// One leg of a metasearch itinerary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetasearchLeg {
    /// Marketing carrier designator.
    pub carrier: String,
    /// Operating carrier designator, when reported.
    pub operating_carrier: Option<String>,
    /// Flight number.
    pub flight_number: u16,
    /// Departure airport code.
    pub origin: String,
    /// Arrival airport code.
    pub destination: String,
    /// Local departure time, `YYYY-MM-DD HH:MM`.
    pub depart_local: String,
    /// Local arrival time, `YYYY-MM-DD HH:MM`.
    pub arrive_local: String,
    /// Equipment, when reported.
    pub aircraft: Option<String>,
    /// Cabin label as the upstream spells it.
    pub cabin: String,
}

/// One GDS fare record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GdsRecord {
    /// Ordered segments.
    pub segments: Vec<GdsSegment>,
    /// Total fare as a decimal string.
    pub total: String,
    /// ISO-4217 code.
    pub currency: String,
    /// Fare basis code.
    pub fare_basis: String,
    /// Booking deep link.
    pub booking_url: String,
    /// Whether the fare includes a checked bag.
    pub baggage_included: bool,
}

/// One GDS segment. Times are UTC already.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GdsSegment {
    /// Marketing carrier designator.
    pub marketing_carrier: String,
    /// Operating carrier designator, when reported.
    pub operating_carrier: Option<String>,
    /// Flight number.
    pub flight_number: u16,
    /// Departure airport code.
    pub origin: String,
    /// Arrival airport code.
    pub destination: String,
    /// Departure instant, RFC 3339.
    pub depart_utc: String,
    /// Arrival instant, RFC 3339.
    pub arrive_utc: String,
    /// Equipment, when reported.
    pub aircraft: Option<String>,
    /// Booking class letter.
    pub booking_class: String,
}
