//! Per-airline reverse-engineered endpoints.
//!
//! These upstreams were mapped by traffic inspection and change without
//! notice, so everything rides on the masked client and parse failures at
//! the envelope level are escalated as structural-change alerts.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use url::Url;

use crate::http::{SharedClients, classify_status, parse_retry_after, snippet};
use crate::manifest::{AirlineAuth, AirlineEndpoint};
use volare_core::adapter::{FareSource, FetchContext};
use volare_core::error::VolareError;
use volare_core::evasion::{DEFAULT_STICKY_REQUESTS, EvasionPolicy, EvasionStrategy};
use volare_core::raw::{RawOffer, RawPayload};
use volare_types::geo::CarrierCode;
use volare_types::query::Query;
use volare_types::source::SourceKind;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct JourneyEnvelope {
    journeys: Vec<serde_json::Value>,
}

/// Sign a request path+body the way the mobile app does: hex-encoded
/// HMAC-SHA256 over `"{path}\n{timestamp}\n{body}"`.
#[must_use]
pub fn mobile_signature(key: &str, path: &str, timestamp: i64, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("hmac accepts any key length");
    mac.update(path.as_bytes());
    mac.update(b"\n");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b"\n");
    mac.update(body.as_bytes());
    let digest = mac.finalize().into_bytes();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// One reverse-engineered airline source.
pub struct AirlineSource {
    endpoint: &'static AirlineEndpoint,
    carrier: CarrierCode,
    base: Url,
    signing_key: Option<String>,
    http: wreq::Client,
    evasion: EvasionPolicy,
}

impl AirlineSource {
    /// Source for one manifest endpoint against `base`.
    ///
    /// `signing_key` is required for endpoints using the mobile signature.
    ///
    /// # Panics
    /// Panics when `base` is not a valid URL or the manifest carrier code
    /// is malformed.
    #[must_use]
    pub fn new(
        clients: &SharedClients,
        endpoint: &'static AirlineEndpoint,
        base: &str,
        signing_key: Option<String>,
    ) -> Self {
        let mut ladder = vec![EvasionStrategy::MaskedTls];
        if endpoint.warmup_path.is_some() {
            ladder.push(EvasionStrategy::WarmupRequest);
        }
        if matches!(endpoint.auth, AirlineAuth::MobileSignature) {
            ladder.push(EvasionStrategy::MobileSignature);
        }
        Self {
            endpoint,
            carrier: CarrierCode::parse(endpoint.carrier).expect("manifest carrier"),
            base: Url::parse(base).expect("airline base url"),
            signing_key,
            http: clients.masked.clone(),
            evasion: EvasionPolicy::new(ladder, DEFAULT_STICKY_REQUESTS),
        }
    }

    /// Override how many requests an escalated anti-bot strategy stays
    /// pinned for before decaying.
    #[must_use]
    pub fn evasion_sticky(mut self, requests: u32) -> Self {
        self.evasion = self.evasion.with_sticky_window(requests);
        self
    }

    fn request_body(&self, query: &Query) -> serde_json::Value {
        serde_json::json!({
            "origin": query.origin.as_str(),
            "destination": query.destination.as_str(),
            "departureDate": query.departure_date.to_string(),
            "returnDate": query.return_date.map(|d| d.to_string()),
            "cabin": query.cabin.as_str(),
            "currency": query.currency.as_str(),
            "adultCount": query.passengers.adults,
            "childCount": query.passengers.children,
        })
    }

    async fn warm_up(&self, cx: &FetchContext) -> Result<(), VolareError> {
        let Some(path) = self.endpoint.warmup_path else {
            return Ok(());
        };
        let url = self
            .base
            .join(path)
            .map_err(|e| VolareError::source(self.endpoint.source_name, format!("bad url: {e}")))?;
        let _ = cx
            .io(
                self.http.get(url).send(),
                VolareError::source_timeout(self.endpoint.source_name),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl FareSource for AirlineSource {
    fn name(&self) -> &'static str {
        self.endpoint.source_name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::AirlineDirect
    }

    fn serves_carrier(&self, carrier: &CarrierCode) -> bool {
        *carrier == self.carrier
    }

    fn min_deadline(&self) -> Duration {
        Duration::from_millis(500)
    }

    fn evasion(&self) -> Option<&EvasionPolicy> {
        Some(&self.evasion)
    }

    async fn fetch(&self, query: &Query, cx: &FetchContext) -> Result<Vec<RawOffer>, VolareError> {
        let name = self.endpoint.source_name;
        if self.endpoint.warmup_path.is_some() {
            self.warm_up(cx).await?;
        }

        let url = self
            .base
            .join(self.endpoint.search_path)
            .map_err(|e| VolareError::source(name, format!("bad url: {e}")))?;
        let body_text = self.request_body(query).to_string();

        let mut req = if self.endpoint.post {
            self.http
                .post(url)
                .header("content-type", "application/json")
                .body(body_text.clone())
        } else {
            let pairs = [
                ("origin", query.origin.as_str().to_string()),
                ("destination", query.destination.as_str().to_string()),
                ("date", query.departure_date.to_string()),
                ("cabin", query.cabin.as_str().to_string()),
            ];
            self.http.get(url).query(&pairs)
        };
        match self.endpoint.auth {
            AirlineAuth::None => {}
            AirlineAuth::ChannelCode(code) => {
                req = req.header("x-channel-id", code);
            }
            AirlineAuth::MobileSignature => {
                let key = self.signing_key.as_deref().ok_or_else(|| {
                    VolareError::InvalidConfig(format!("{name}: missing signing key"))
                })?;
                let ts = Utc::now().timestamp();
                let sig = mobile_signature(key, self.endpoint.search_path, ts, &body_text);
                req = req
                    .header("x-app-ts", ts.to_string())
                    .header("x-app-sig", sig);
            }
        }

        let resp = cx
            .io(req.send(), VolareError::source_timeout(name))
            .await?
            .map_err(|e| VolareError::transient(name, format!("request: {e}")))?;
        let status = resp.status().as_u16();
        let retry_after = parse_retry_after(
            resp.headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok()),
        );
        let text = cx
            .io(resp.text(), VolareError::source_timeout(name))
            .await?
            .map_err(|e| VolareError::transient(name, format!("body read: {e}")))?;
        if let Some(err) = classify_status(name, status, retry_after, snippet(&text))
        {
            return Err(err);
        }

        let envelope: JourneyEnvelope = serde_json::from_str(&text)
            .map_err(|e| VolareError::parse_unusable(name, format!("envelope: {e}")))?;
        Ok(envelope
            .journeys
            .into_iter()
            .map(|body| {
                RawOffer::new(
                    self.key(),
                    RawPayload::Airline {
                        endpoint: self.endpoint.id,
                        body,
                    },
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest;
    use chrono::NaiveDate;
    use httpmock::prelude::*;
    use serde_json::json;
    use volare_core::adapter::{CancelFlag, Deadline};
    use volare_types::geo::AirportCode;
    use volare_types::money::Currency;

    fn query() -> Query {
        Query::builder(
            AirportCode::parse("ICN").unwrap(),
            AirportCode::parse("DAD").unwrap(),
            NaiveDate::from_ymd_opt(2026, 4, 15).unwrap(),
        )
        .currency(Currency::KRW)
        .build_against(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
        .unwrap()
    }

    #[test]
    fn signature_is_stable_for_fixed_inputs() {
        let a = mobile_signature("secret", "/api/v3/flights/search", 1_770_000_000, "{}");
        let b = mobile_signature("secret", "/api/v3/flights/search", 1_770_000_000, "{}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let c = mobile_signature("other", "/api/v3/flights/search", 1_770_000_000, "{}");
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn signed_endpoint_sends_signature_headers() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v3/flights/search")
                    .header_exists("x-app-ts")
                    .header_exists("x-app-sig");
                then.status(200)
                    .json_body(json!({ "journeys": [ {"j": 1} ] }));
            })
            .await;

        let clients = SharedClients::new().unwrap();
        let source = AirlineSource::new(
            &clients,
            manifest::endpoint("vj-mobile").unwrap(),
            &server.base_url(),
            Some("secret".into()),
        );
        let cx = FetchContext::new(Deadline::after(Duration::from_secs(5)), CancelFlag::new());
        let raws = source.fetch(&query(), &cx).await.unwrap();
        mock.assert_async().await;
        assert_eq!(raws.len(), 1);
        match &raws[0].payload {
            RawPayload::Airline { endpoint, .. } => assert_eq!(*endpoint, "vj-mobile"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn warmup_endpoint_primes_before_searching() {
        let server = MockServer::start_async().await;
        let warmup = server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(200).body("<html>landing</html>");
            })
            .await;
        let search = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/searchavailability")
                    .header("x-channel-id", "MOBILE_WEB");
                then.status(200).json_body(json!({ "journeys": [] }));
            })
            .await;

        let clients = SharedClients::new().unwrap();
        let source = AirlineSource::new(
            &clients,
            manifest::endpoint("cebu-web").unwrap(),
            &server.base_url(),
            None,
        );
        let cx = FetchContext::new(Deadline::after(Duration::from_secs(5)), CancelFlag::new());
        let raws = source.fetch(&query(), &cx).await.unwrap();
        warmup.assert_async().await;
        search.assert_async().await;
        assert!(raws.is_empty());
    }
}
