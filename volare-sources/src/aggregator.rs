//! Third-party aggregator REST source: API key auth, JSON itineraries.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::http::{SharedClients, classify_status, parse_retry_after, snippet};
use volare_core::adapter::{FareSource, FetchContext};
use volare_core::error::VolareError;
use volare_core::raw::{RawOffer, RawPayload};
use volare_types::query::Query;
use volare_types::source::SourceKind;

const NAME: &str = "aggregator";

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    itineraries: Vec<serde_json::Value>,
}

/// Aggregator API source.
pub struct AggregatorSource {
    base: Url,
    api_key: String,
    http: reqwest::Client,
}

impl AggregatorSource {
    /// Source against the production endpoint.
    #[must_use]
    pub fn new(clients: &SharedClients, api_key: impl Into<String>) -> Self {
        Self::with_base_url(clients, api_key, "https://api.aggregator.example")
    }

    /// Source against an explicit base URL (tests point this at a mock).
    ///
    /// # Panics
    /// Panics when `base` is not a valid URL.
    #[must_use]
    pub fn with_base_url(
        clients: &SharedClients,
        api_key: impl Into<String>,
        base: &str,
    ) -> Self {
        Self {
            base: Url::parse(base).expect("aggregator base url"),
            api_key: api_key.into(),
            http: clients.plain.clone(),
        }
    }
}

#[async_trait]
impl FareSource for AggregatorSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::AggregatorApi
    }

    fn min_deadline(&self) -> Duration {
        Duration::from_millis(300)
    }

    async fn fetch(&self, query: &Query, cx: &FetchContext) -> Result<Vec<RawOffer>, VolareError> {
        let url = self
            .base
            .join("/v2/itineraries")
            .map_err(|e| VolareError::source(NAME, format!("bad url: {e}")))?;
        let departure = query.departure_date.to_string();
        let mut req = self
            .http
            .get(url)
            .header("x-api-key", &self.api_key)
            .query(&[
                ("origin", query.origin.as_str()),
                ("destination", query.destination.as_str()),
                ("departure", departure.as_str()),
                ("cabin", query.cabin.as_str()),
                ("currency", query.currency.as_str()),
            ]);
        if let Some(ret) = query.return_date {
            let ret = ret.to_string();
            req = req.query(&[("return", ret.as_str())]);
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

        let envelope: SearchEnvelope = serde_json::from_str(&body)
            .map_err(|e| VolareError::parse_unusable(NAME, format!("envelope: {e}")))?;
        Ok(envelope
            .itineraries
            .into_iter()
            .map(|it| RawOffer::new(self.key(), RawPayload::Aggregator(it)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use httpmock::prelude::*;
    use serde_json::json;
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

    fn cx() -> FetchContext {
        FetchContext::new(Deadline::after(Duration::from_secs(5)), CancelFlag::new())
    }

    #[tokio::test]
    async fn fetch_sends_the_key_and_splits_itineraries() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v2/itineraries")
                    .header("x-api-key", "k123")
                    .query_param("origin", "ICN")
                    .query_param("destination", "NRT")
                    .query_param("cabin", "economy");
                then.status(200).json_body(json!({
                    "itineraries": [ {"a": 1}, {"a": 2} ]
                }));
            })
            .await;

        let clients = SharedClients::new().unwrap();
        let source = AggregatorSource::with_base_url(&clients, "k123", &server.base_url());
        let raws = source.fetch(&query(), &cx()).await.unwrap();
        mock.assert_async().await;
        assert_eq!(raws.len(), 2);
    }

    #[tokio::test]
    async fn rate_limit_status_maps_to_rate_limited() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/itineraries");
                then.status(429).header("retry-after", "3").body("slow down");
            })
            .await;

        let clients = SharedClients::new().unwrap();
        let source = AggregatorSource::with_base_url(&clients, "k123", &server.base_url());
        let err = source.fetch(&query(), &cx()).await.unwrap_err();
        assert!(matches!(
            err,
            VolareError::RateLimited { retry_in, .. } if retry_in == Duration::from_secs(3)
        ));
    }

    #[tokio::test]
    async fn broken_envelope_is_unusable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/itineraries");
                then.status(200).body("[]");
            })
            .await;

        let clients = SharedClients::new().unwrap();
        let source = AggregatorSource::with_base_url(&clients, "k123", &server.base_url());
        let err = source.fetch(&query(), &cx()).await.unwrap_err();
        assert!(matches!(err, VolareError::Parse { unusable: true, .. }));
    }
}
