//! Shared-tenant source: one JSON endpoint serving eight airline brands
//! under a common tenant key. One `TenantSource` instance per brand; all
//! instances share the masked client and the tenant credential.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::http::{SharedClients, classify_status, parse_retry_after, snippet};
use volare_core::adapter::{FareSource, FetchContext};
use volare_core::error::VolareError;
use volare_core::raw::{RawOffer, RawPayload};
use volare_types::geo::CarrierCode;
use volare_types::query::Query;
use volare_types::source::SourceKind;

/// Brands served by the shared endpoint, with the static source names the
/// orchestrator refers to them by.
pub const TENANT_BRANDS: &[(&str, &str)] = &[
    ("7C", "tenant-7c"),
    ("LJ", "tenant-lj"),
    ("TW", "tenant-tw"),
    ("BX", "tenant-bx"),
    ("RS", "tenant-rs"),
    ("ZE", "tenant-ze"),
    ("YP", "tenant-yp"),
    ("MM", "tenant-mm"),
];

fn source_name(brand: &str) -> Option<&'static str> {
    TENANT_BRANDS
        .iter()
        .find(|(b, _)| *b == brand)
        .map(|(_, name)| *name)
}

#[derive(Debug, Deserialize)]
struct TenantEnvelope {
    flights: Vec<serde_json::Value>,
}

/// One brand of the shared-tenant endpoint.
pub struct TenantSource {
    name: &'static str,
    brand: &'static str,
    carrier: CarrierCode,
    tenant_key: String,
    base: Url,
    http: wreq::Client,
}

impl TenantSource {
    /// Source for one brand against the production endpoint.
    ///
    /// Returns `None` for brands the shared endpoint does not serve.
    #[must_use]
    pub fn for_brand(
        clients: &SharedClients,
        brand: &'static str,
        tenant_key: impl Into<String>,
    ) -> Option<Self> {
        Self::with_base_url(clients, brand, tenant_key, "https://ibe.shared-res.example")
    }

    /// Source for one brand against an explicit base URL.
    ///
    /// # Panics
    /// Panics when `base` is not a valid URL.
    #[must_use]
    pub fn with_base_url(
        clients: &SharedClients,
        brand: &'static str,
        tenant_key: impl Into<String>,
        base: &str,
    ) -> Option<Self> {
        let name = source_name(brand)?;
        let carrier = CarrierCode::parse(brand)?;
        Some(Self {
            name,
            brand,
            carrier,
            tenant_key: tenant_key.into(),
            base: Url::parse(base).expect("tenant base url"),
            http: clients.masked.clone(),
        })
    }

    /// All eight brand sources at once.
    #[must_use]
    pub fn all_brands(clients: &SharedClients, tenant_key: &str) -> Vec<Self> {
        TENANT_BRANDS
            .iter()
            .filter_map(|(brand, _)| Self::for_brand(clients, brand, tenant_key))
            .collect()
    }
}

#[async_trait]
impl FareSource for TenantSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::SharedTenant
    }

    fn serves_carrier(&self, carrier: &CarrierCode) -> bool {
        *carrier == self.carrier
    }

    fn min_deadline(&self) -> Duration {
        Duration::from_millis(300)
    }

    async fn fetch(&self, query: &Query, cx: &FetchContext) -> Result<Vec<RawOffer>, VolareError> {
        let url = self
            .base
            .join("/api/v1/availability")
            .map_err(|e| VolareError::source(self.name, format!("bad url: {e}")))?;
        let payload = serde_json::json!({
            "tenant": self.tenant_key,
            "brand": self.brand,
            "origin": query.origin.as_str(),
            "destination": query.destination.as_str(),
            "departure": query.departure_date.to_string(),
            "return": query.return_date.map(|d| d.to_string()),
            "cabin": query.cabin.as_str(),
            "currency": query.currency.as_str(),
            "adults": query.passengers.adults,
        });
        let resp = cx
            .io(
                self.http
                    .post(url)
                    .header("content-type", "application/json")
                    .body(payload.to_string())
                    .send(),
                VolareError::source_timeout(self.name),
            )
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

        let envelope: TenantEnvelope = serde_json::from_str(&body)
            .map_err(|e| VolareError::parse_unusable(self.name, format!("envelope: {e}")))?;
        Ok(envelope
            .flights
            .into_iter()
            .map(|body| {
                RawOffer::new(
                    self.key(),
                    RawPayload::Tenant {
                        tenant: self.brand.to_string(),
                        body,
                    },
                )
            })
            .collect())
    }
}
