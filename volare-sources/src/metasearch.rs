//! Binary metasearch source.
//!
//! The upstream takes a protobuf-encoded query, base64url-wrapped into a
//! GET parameter, and answers with a protobuf-encoded itinerary list,
//! also base64-wrapped. The endpoint sits behind an EU consent wall and a
//! TLS-fingerprinting WAF, so calls go through the masked client with
//! consent cookies pre-seeded, escalating to a warm-up page load when
//! challenged.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use prost::Message;
use url::Url;

use crate::http::{SharedClients, classify_status, parse_retry_after, snippet};
use volare_core::adapter::{FareSource, FetchContext};
use volare_core::error::VolareError;
use volare_core::evasion::{DEFAULT_STICKY_REQUESTS, EvasionPolicy, EvasionStrategy};
use volare_core::raw::{MetasearchItinerary, MetasearchLeg, RawOffer, RawPayload};
use volare_types::query::{Cabin, Query, TripType};
use volare_types::source::SourceKind;

const NAME: &str = "metasearch";
const CONSENT_COOKIE: &str = "CONSENT=YES+cb.20260101-00-p0.en+FX+000; SOCS=CAESEwgDEgk2";

/// One leg of the wire query.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireLegQuery {
    /// Origin IATA code.
    #[prost(string, tag = "1")]
    pub origin: String,
    /// Destination IATA code.
    #[prost(string, tag = "2")]
    pub destination: String,
    /// Departure date, `YYYY-MM-DD`.
    #[prost(string, tag = "3")]
    pub date: String,
}

/// The wire query message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireQuery {
    /// Ordered legs (two for a round trip).
    #[prost(message, repeated, tag = "1")]
    pub legs: Vec<WireLegQuery>,
    /// Adult count.
    #[prost(int32, tag = "2")]
    pub adults: i32,
    /// Cabin code: 1 economy, 2 premium economy, 3 business, 4 first.
    #[prost(int32, tag = "3")]
    pub cabin: i32,
    /// ISO-4217 currency.
    #[prost(string, tag = "4")]
    pub currency: String,
    /// Trip type: 1 round trip, 2 one way, 3 multi city.
    #[prost(int32, tag = "5")]
    pub trip_type: i32,
}

/// One leg of a wire itinerary.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireLeg {
    /// Marketing carrier.
    #[prost(string, tag = "1")]
    pub carrier: String,
    /// Operating carrier, when distinct.
    #[prost(string, optional, tag = "2")]
    pub operating_carrier: Option<String>,
    /// Flight number.
    #[prost(int32, tag = "3")]
    pub flight_number: i32,
    /// Origin IATA code.
    #[prost(string, tag = "4")]
    pub origin: String,
    /// Destination IATA code.
    #[prost(string, tag = "5")]
    pub destination: String,
    /// Local departure, `YYYY-MM-DD HH:MM`.
    #[prost(string, tag = "6")]
    pub depart_local: String,
    /// Local arrival, `YYYY-MM-DD HH:MM`.
    #[prost(string, tag = "7")]
    pub arrive_local: String,
    /// Equipment code.
    #[prost(string, optional, tag = "8")]
    pub aircraft: Option<String>,
    /// Cabin label.
    #[prost(string, tag = "9")]
    pub cabin: String,
}

/// One priced wire itinerary.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireItinerary {
    /// Ordered legs.
    #[prost(message, repeated, tag = "1")]
    pub legs: Vec<WireLeg>,
    /// Price in minor units.
    #[prost(int64, tag = "2")]
    pub price_minor: i64,
    /// ISO-4217 currency.
    #[prost(string, tag = "3")]
    pub currency: String,
    /// Opaque booking token.
    #[prost(string, tag = "4")]
    pub booking_token: String,
}

/// The wire response message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireResponse {
    /// Priced itineraries in upstream rank order.
    #[prost(message, repeated, tag = "1")]
    pub itineraries: Vec<WireItinerary>,
}

const fn cabin_code(cabin: Cabin) -> i32 {
    match cabin {
        Cabin::Economy => 1,
        Cabin::PremiumEconomy => 2,
        Cabin::Business => 3,
        Cabin::First => 4,
    }
}

const fn trip_code(trip: TripType) -> i32 {
    match trip {
        TripType::RoundTrip => 1,
        TripType::OneWay => 2,
        TripType::MultiCity => 3,
    }
}

/// Encode a search query into the base64url wire form.
#[must_use]
pub fn encode_query(query: &Query) -> String {
    let mut legs = vec![WireLegQuery {
        origin: query.origin.as_str().to_string(),
        destination: query.destination.as_str().to_string(),
        date: query.departure_date.to_string(),
    }];
    if let Some(ret) = query.return_date {
        legs.push(WireLegQuery {
            origin: query.destination.as_str().to_string(),
            destination: query.origin.as_str().to_string(),
            date: ret.to_string(),
        });
    }
    let wire = WireQuery {
        legs,
        adults: i32::from(query.passengers.adults),
        cabin: cabin_code(query.cabin),
        currency: query.currency.to_string(),
        trip_type: trip_code(query.trip_type),
    };
    URL_SAFE_NO_PAD.encode(wire.encode_to_vec())
}

/// Decode a base64url wire response into raw itineraries.
///
/// # Errors
/// `Parse` (unusable) when the envelope or message does not decode.
pub fn decode_response(body: &str) -> Result<Vec<MetasearchItinerary>, VolareError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(body.trim())
        .map_err(|e| VolareError::parse_unusable(NAME, format!("base64 envelope: {e}")))?;
    let resp = WireResponse::decode(bytes.as_slice())
        .map_err(|e| VolareError::parse_unusable(NAME, format!("wire message: {e}")))?;
    Ok(resp
        .itineraries
        .into_iter()
        .map(|it| MetasearchItinerary {
            legs: it
                .legs
                .into_iter()
                .map(|leg| MetasearchLeg {
                    carrier: leg.carrier,
                    operating_carrier: leg.operating_carrier,
                    flight_number: u16::try_from(leg.flight_number).unwrap_or(0),
                    origin: leg.origin,
                    destination: leg.destination,
                    depart_local: leg.depart_local,
                    arrive_local: leg.arrive_local,
                    aircraft: leg.aircraft,
                    cabin: leg.cabin,
                })
                .collect(),
            price_minor: it.price_minor,
            currency: it.currency,
            booking_token: it.booking_token,
        })
        .collect())
}

/// The binary metasearch source.
pub struct MetasearchSource {
    base: Url,
    http: wreq::Client,
    evasion: EvasionPolicy,
}

impl MetasearchSource {
    /// Source against the production endpoint.
    #[must_use]
    pub fn new(clients: &SharedClients) -> Self {
        Self::with_base_url(clients, "https://meta.example")
    }

    /// Source against an explicit base URL (tests point this at a mock).
    ///
    /// # Panics
    /// Panics when `base` is not a valid URL.
    #[must_use]
    pub fn with_base_url(clients: &SharedClients, base: &str) -> Self {
        Self {
            base: Url::parse(base).expect("metasearch base url"),
            http: clients.masked.clone(),
            evasion: EvasionPolicy::new(
                vec![
                    EvasionStrategy::MaskedTls,
                    EvasionStrategy::ConsentCookies,
                    EvasionStrategy::WarmupRequest,
                ],
                DEFAULT_STICKY_REQUESTS,
            ),
        }
    }

    /// Override how many requests an escalated anti-bot strategy stays
    /// pinned for before decaying.
    #[must_use]
    pub fn evasion_sticky(mut self, requests: u32) -> Self {
        self.evasion = self.evasion.with_sticky_window(requests);
        self
    }

    async fn warm_up(&self, cx: &FetchContext) -> Result<(), VolareError> {
        let send = self
            .http
            .get(self.base.clone())
            .header("cookie", CONSENT_COOKIE)
            .send();
        // Warm-up primes WAF cookies; its own failures are not fatal.
        let _ = cx.io(send, VolareError::source_timeout(NAME)).await?;
        Ok(())
    }
}

#[async_trait]
impl FareSource for MetasearchSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Metasearch
    }

    fn min_deadline(&self) -> Duration {
        Duration::from_millis(400)
    }

    fn evasion(&self) -> Option<&EvasionPolicy> {
        Some(&self.evasion)
    }

    async fn fetch(&self, query: &Query, cx: &FetchContext) -> Result<Vec<RawOffer>, VolareError> {
        let strategy = self.evasion.strategy_for_request();
        if strategy == EvasionStrategy::WarmupRequest {
            self.warm_up(cx).await?;
        }

        let mut url = self
            .base
            .join("/search")
            .map_err(|e| VolareError::source(NAME, format!("bad url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("tfs", &encode_query(query));

        let mut req = self.http.get(url);
        if strategy != EvasionStrategy::MaskedTls {
            req = req.header("cookie", CONSENT_COOKIE);
        }
        let resp = cx
            .io(req.send(), VolareError::source_timeout(NAME))
            .await?
            .map_err(|e| VolareError::transient(NAME, format!("request: {e}")))?;

        let status = resp.status().as_u16();
        let retry_after = parse_retry_after(
            resp.headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok()),
        );
        let body = cx
            .io(resp.text(), VolareError::source_timeout(NAME))
            .await?
            .map_err(|e| VolareError::transient(NAME, format!("body read: {e}")))?;
        if let Some(err) = classify_status(NAME, status, retry_after, snippet(&body))
        {
            return Err(err);
        }

        Ok(decode_response(&body)?
            .into_iter()
            .map(|it| RawOffer::new(self.key(), RawPayload::Metasearch(it)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use httpmock::prelude::*;
    use volare_core::adapter::{CancelFlag, Deadline};
    use volare_types::geo::AirportCode;
    use volare_types::money::Currency;

    fn query() -> Query {
        Query::builder(
            AirportCode::parse("ICN").unwrap(),
            AirportCode::parse("NRT").unwrap(),
            NaiveDate::from_ymd_opt(2026, 4, 15).unwrap(),
        )
        .currency(Currency::KRW)
        .build_against(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
        .unwrap()
    }

    fn wire_itinerary() -> WireItinerary {
        WireItinerary {
            legs: vec![WireLeg {
                carrier: "KE".into(),
                operating_carrier: None,
                flight_number: 901,
                origin: "ICN".into(),
                destination: "NRT".into(),
                depart_local: "2026-04-15 10:00".into(),
                arrive_local: "2026-04-15 12:20".into(),
                aircraft: Some("B789".into()),
                cabin: "ECONOMY".into(),
            }],
            price_minor: 420_000,
            currency: "KRW".into(),
            booking_token: "tok123".into(),
        }
    }

    #[test]
    fn query_encoding_is_deterministic_and_decodable() {
        let q = query();
        let a = encode_query(&q);
        let b = encode_query(&q);
        assert_eq!(a, b);
        let bytes = URL_SAFE_NO_PAD.decode(a).unwrap();
        let wire = WireQuery::decode(bytes.as_slice()).unwrap();
        assert_eq!(wire.legs.len(), 1);
        assert_eq!(wire.legs[0].origin, "ICN");
        assert_eq!(wire.currency, "KRW");
        assert_eq!(wire.trip_type, 2);
    }

    #[test]
    fn round_trip_queries_carry_a_return_leg() {
        let q = Query::builder(
            AirportCode::parse("ICN").unwrap(),
            AirportCode::parse("NRT").unwrap(),
            NaiveDate::from_ymd_opt(2026, 4, 15).unwrap(),
        )
        .returning(NaiveDate::from_ymd_opt(2026, 4, 20).unwrap())
        .build_against(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
        .unwrap();
        let bytes = URL_SAFE_NO_PAD.decode(encode_query(&q)).unwrap();
        let wire = WireQuery::decode(bytes.as_slice()).unwrap();
        assert_eq!(wire.legs.len(), 2);
        assert_eq!(wire.legs[1].origin, "NRT");
        assert_eq!(wire.trip_type, 1);
    }

    #[test]
    fn response_decoding_round_trips() {
        let resp = WireResponse {
            itineraries: vec![wire_itinerary()],
        };
        let body = URL_SAFE_NO_PAD.encode(resp.encode_to_vec());
        let decoded = decode_response(&body).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].legs[0].flight_number, 901);
        assert_eq!(decoded[0].price_minor, 420_000);
    }

    #[test]
    fn garbage_body_is_an_unusable_parse() {
        let err = decode_response("not-base64!!!").unwrap_err();
        assert!(matches!(err, VolareError::Parse { unusable: true, .. }));
    }

    #[tokio::test]
    async fn fetch_decodes_a_mocked_wire_response() {
        let server = MockServer::start_async().await;
        let body = URL_SAFE_NO_PAD.encode(
            WireResponse {
                itineraries: vec![wire_itinerary()],
            }
            .encode_to_vec(),
        );
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/search");
                then.status(200).body(body.clone());
            })
            .await;

        let clients = SharedClients::new().unwrap();
        let source = MetasearchSource::with_base_url(&clients, &server.base_url());
        let cx = FetchContext::new(Deadline::after(Duration::from_secs(5)), CancelFlag::new());
        let raws = source.fetch(&query(), &cx).await.unwrap();
        mock.assert_async().await;
        assert_eq!(raws.len(), 1);
        assert!(matches!(raws[0].payload, RawPayload::Metasearch(_)));
    }
}
