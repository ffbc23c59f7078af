//! Official partner API source: OAuth2 client credentials, long-lived
//! tokens (36 h per the partner agreement), clean JSON itineraries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::auth::TokenCache;
use crate::http::{SharedClients, classify_status, parse_retry_after, snippet};
use volare_core::adapter::{FareSource, FetchContext};
use volare_core::error::VolareError;
use volare_core::raw::{RawOffer, RawPayload};
use volare_types::geo::CarrierCode;
use volare_types::query::Query;
use volare_types::source::SourceKind;

#[derive(Debug, Deserialize)]
struct OffersEnvelope {
    offers: Vec<serde_json::Value>,
}

/// Official partner API source for one carrier.
pub struct OfficialApiSource {
    name: &'static str,
    carrier: CarrierCode,
    base: Url,
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
}

impl OfficialApiSource {
    /// Source for one carrier against an explicit base URL.
    ///
    /// # Panics
    /// Panics when `base` is not a valid URL or `carrier` is malformed.
    #[must_use]
    pub fn with_base_url(
        clients: &SharedClients,
        name: &'static str,
        carrier: &str,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        base: &str,
    ) -> Self {
        Self {
            name,
            carrier: CarrierCode::parse(carrier).expect("carrier code"),
            base: Url::parse(base).expect("official base url"),
            http: clients.plain.clone(),
            tokens: Arc::new(TokenCache::new(
                name,
                clients.plain.clone(),
                token_url,
                client_id,
                client_secret,
                Duration::from_secs(36 * 3600),
            )),
        }
    }
}

#[async_trait]
impl FareSource for OfficialApiSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::OfficialApi
    }

    fn serves_carrier(&self, carrier: &CarrierCode) -> bool {
        *carrier == self.carrier
    }

    fn min_deadline(&self) -> Duration {
        Duration::from_millis(400)
    }

    async fn fetch(&self, query: &Query, cx: &FetchContext) -> Result<Vec<RawOffer>, VolareError> {
        let bearer = self.tokens.bearer(cx).await?;
        let url = self
            .base
            .join("/v1/offers")
            .map_err(|e| VolareError::source(self.name, format!("bad url: {e}")))?;
        let departure = query.departure_date.to_string();
        let req = self
            .http
            .get(url)
            .bearer_auth(bearer)
            .query(&[
                ("origin", query.origin.as_str()),
                ("destination", query.destination.as_str()),
                ("date", departure.as_str()),
                ("cabin", query.cabin.as_str()),
                ("currency", query.currency.as_str()),
            ]);
        let resp = cx
            .io(req.send(), VolareError::source_timeout(self.name))
            .await?
            .map_err(|e| VolareError::transient(self.name, format!("request: {e}")))?;
        let status = resp.status().as_u16();
        let retry_after = parse_retry_after(
            resp.headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok()),
        );
        let body = cx
            .io(resp.text(), VolareError::source_timeout(self.name))
            .await?
            .map_err(|e| VolareError::transient(self.name, format!("body read: {e}")))?;
        if let Some(err) =
            classify_status(self.name, status, retry_after, snippet(&body))
        {
            return Err(err);
        }
        let envelope: OffersEnvelope = serde_json::from_str(&body)
            .map_err(|e| VolareError::parse_unusable(self.name, format!("envelope: {e}")))?;
        Ok(envelope
            .offers
            .into_iter()
            .map(|it| RawOffer::new(self.key(), RawPayload::Official(it)))
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

    #[tokio::test]
    async fn fetch_uses_the_cached_token_across_calls() {
        let server = MockServer::start_async().await;
        let token = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200).json_body(json!({
                    "access_token": "tok-36h",
                    "expires_in": 129600,
                }));
            })
            .await;
        let offers = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/offers")
                    .header("authorization", "Bearer tok-36h");
                then.status(200).json_body(json!({ "offers": [ {"o": 1} ] }));
            })
            .await;

        let clients = SharedClients::new().unwrap();
        let source = OfficialApiSource::with_base_url(
            &clients,
            "official-ke",
            "KE",
            &format!("{}/oauth/token", server.base_url()),
            "cid",
            "secret",
            &server.base_url(),
        );
        let query = Query::builder(
            AirportCode::parse("ICN").unwrap(),
            AirportCode::parse("NRT").unwrap(),
            NaiveDate::from_ymd_opt(2026, 4, 15).unwrap(),
        )
        .currency(Currency::KRW)
        .build_against(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
        .unwrap();
        let cx = FetchContext::new(Deadline::after(Duration::from_secs(5)), CancelFlag::new());

        source.fetch(&query, &cx).await.unwrap();
        source.fetch(&query, &cx).await.unwrap();
        // Two searches, one token mint.
        assert_eq!(token.hits_async().await, 1);
        assert_eq!(offers.hits_async().await, 2);
    }
}
