//! GDS shopping source over OAuth2.
//!
//! The vendor grants 5 req/s and 1000 req/h; both buckets are configured
//! where the source is registered. Tokens refresh 60 seconds before
//! expiry, and a surprise 401 triggers exactly one forced refresh and
//! retry before surfacing as an auth failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::auth::TokenCache;
use crate::http::SharedClients;
use volare_core::adapter::{FareSource, FetchContext};
use volare_core::error::VolareError;
use volare_core::raw::{GdsRecord, GdsSegment, RawOffer, RawPayload};
use volare_types::query::Query;
use volare_types::source::SourceKind;

const NAME: &str = "gds";

#[derive(Debug, Deserialize)]
struct ShopEnvelope {
    records: Vec<ShopRecord>,
}

#[derive(Debug, Deserialize)]
struct ShopRecord {
    segments: Vec<ShopSegment>,
    total: String,
    currency: String,
    fare_basis: String,
    booking_url: String,
    #[serde(default)]
    baggage_included: bool,
}

#[derive(Debug, Deserialize)]
struct ShopSegment {
    marketing_carrier: String,
    #[serde(default)]
    operating_carrier: Option<String>,
    flight_number: u16,
    origin: String,
    destination: String,
    depart_utc: String,
    arrive_utc: String,
    #[serde(default)]
    aircraft: Option<String>,
    booking_class: String,
}

/// GDS source.
pub struct GdsSource {
    base: Url,
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
}

impl GdsSource {
    /// Source against the production shopping endpoint.
    #[must_use]
    pub fn new(
        clients: &SharedClients,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        Self::with_base_url(
            clients,
            token_url,
            client_id,
            client_secret,
            "https://shopping.gds.example",
        )
    }

    /// Source against an explicit base URL.
    ///
    /// # Panics
    /// Panics when `base` is not a valid URL.
    #[must_use]
    pub fn with_base_url(
        clients: &SharedClients,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        base: &str,
    ) -> Self {
        Self {
            base: Url::parse(base).expect("gds base url"),
            http: clients.plain.clone(),
            tokens: Arc::new(TokenCache::new(
                NAME,
                clients.plain.clone(),
                token_url,
                client_id,
                client_secret,
                Duration::from_secs(30 * 60),
            )),
        }
    }

    async fn shop(
        &self,
        query: &Query,
        cx: &FetchContext,
        bearer: &str,
    ) -> Result<(u16, String), VolareError> {
        let url = self
            .base
            .join("/v1/shop")
            .map_err(|e| VolareError::source(NAME, format!("bad url: {e}")))?;
        let payload = serde_json::json!({
            "origin": query.origin.as_str(),
            "destination": query.destination.as_str(),
            "departure": query.departure_date.to_string(),
            "return": query.return_date.map(|d| d.to_string()),
            "cabin": query.cabin.as_str(),
            "currency": query.currency.as_str(),
            "travelers": { "adults": query.passengers.adults, "children": query.passengers.children },
        });
        let resp = cx
            .io(
                self.http
                    .post(url)
                    .bearer_auth(bearer)
                    .json(&payload)
                    .send(),
                VolareError::source_timeout(NAME),
            )
            .await?
            .map_err(|e| VolareError::transient(NAME, format!("request: {e}")))?;
        let status = resp.status().as_u16();
        let body = cx
            .io(resp.text(), VolareError::source_timeout(NAME))
            .await?
            .map_err(|e| VolareError::transient(NAME, format!("body read: {e}")))?;
        Ok((status, body))
    }

    fn parse(body: &str) -> Result<Vec<GdsRecord>, VolareError> {
        let envelope: ShopEnvelope = serde_json::from_str(body)
            .map_err(|e| VolareError::parse_unusable(NAME, format!("envelope: {e}")))?;
        Ok(envelope
            .records
            .into_iter()
            .map(|r| GdsRecord {
                segments: r
                    .segments
                    .into_iter()
                    .map(|s| GdsSegment {
                        marketing_carrier: s.marketing_carrier,
                        operating_carrier: s.operating_carrier,
                        flight_number: s.flight_number,
                        origin: s.origin,
                        destination: s.destination,
                        depart_utc: s.depart_utc,
                        arrive_utc: s.arrive_utc,
                        aircraft: s.aircraft,
                        booking_class: s.booking_class,
                    })
                    .collect(),
                total: r.total,
                currency: r.currency,
                fare_basis: r.fare_basis,
                booking_url: r.booking_url,
                baggage_included: r.baggage_included,
            })
            .collect())
    }
}

#[async_trait]
impl FareSource for GdsSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Gds
    }

    fn min_deadline(&self) -> Duration {
        Duration::from_millis(800)
    }

    async fn fetch(&self, query: &Query, cx: &FetchContext) -> Result<Vec<RawOffer>, VolareError> {
        let bearer = self.tokens.bearer(cx).await?;
        let (status, body) = self.shop(query, cx, &bearer).await?;
        let (status, body) = if status == 401 {
            // Token died under us; refresh once and retry once.
            let bearer = self.tokens.force_refresh(cx).await?;
            self.shop(query, cx, &bearer).await?
        } else {
            (status, body)
        };
        match status {
            200..=299 => {}
            401 => {
                return Err(VolareError::AuthExpired {
                    source_name: NAME.to_string(),
                });
            }
            429 => {
                return Err(VolareError::RateLimited {
                    source_name: NAME.to_string(),
                    retry_in: Duration::from_secs(1),
                });
            }
            s if (500..600).contains(&s) => {
                return Err(VolareError::transient(NAME, format!("upstream {s}")));
            }
            s => return Err(VolareError::source(NAME, format!("unexpected status {s}"))),
        }
        Ok(Self::parse(&body)?
            .into_iter()
            .map(|rec| RawOffer::new(self.key(), RawPayload::Gds(rec)))
            .collect())
    }
}
