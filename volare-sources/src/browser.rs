//! Browser-automation source for sites with no usable API.
//!
//! A fixed pool of long-lived browser instances (system binary, launched
//! with remote debugging) is leased per request; a residential proxy is
//! leased alongside and rotated per lease. The page script neutralizes
//! the cookie overlay, drives the calendar widget, submits the form, and
//! the fares are read from the intercepted XHR the site itself makes.
//! Expect 60-90 s per request; this source belongs in the fallback tier.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::cdp::CdpConnection;
use crate::http::SharedClients;
use volare_core::adapter::{FareSource, FetchContext};
use volare_core::context::AdapterContext;
use volare_core::error::VolareError;
use volare_core::evasion::{DEFAULT_STICKY_REQUESTS, EvasionPolicy, EvasionStrategy};
use volare_core::pool::LeasePool;
use volare_core::raw::{RawOffer, RawPayload};
use volare_types::config::BrowserPoolConfig;
use volare_types::geo::CarrierCode;
use volare_types::query::Query;
use volare_types::source::SourceKind;

/// DevTools port of the first pooled instance; instance `i` listens on
/// this plus `i`. The instances themselves are launched by the host
/// (system browser binary with `--remote-debugging-port`), never bundled.
pub const DEFAULT_DEVTOOLS_PORT: u16 = 9222;

/// One long-lived browser instance, identified by its DevTools port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserSlot {
    /// Remote debugging port the instance listens on.
    pub devtools_port: u16,
}

/// One scripted page session. Implementations must observe the fetch
/// context at every step so cancellation is honored mid-script.
#[async_trait]
pub trait BrowserSession: Send {
    /// Load a page and wait for its load event.
    async fn navigate(&mut self, url: &str, cx: &FetchContext) -> Result<(), VolareError>;

    /// Evaluate javascript in the page, returning the result by value.
    async fn eval(&mut self, js: &str, cx: &FetchContext) -> Result<Value, VolareError>;

    /// Wait for an XHR whose URL contains `fragment` and return its JSON
    /// body.
    async fn wait_for_xhr(
        &mut self,
        fragment: &str,
        cx: &FetchContext,
    ) -> Result<Value, VolareError>;

    /// Tear the session down. Must be safe to call after failures.
    async fn close(&mut self);
}

/// Opens sessions against a leased browser slot.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a fresh session, optionally routed through a proxy endpoint.
    async fn open(
        &self,
        slot: BrowserSlot,
        proxy: Option<String>,
        cx: &FetchContext,
    ) -> Result<Box<dyn BrowserSession>, VolareError>;
}

/// Production factory driving the DevTools protocol.
pub struct CdpSessionFactory {
    http: reqwest::Client,
}

impl CdpSessionFactory {
    /// Factory using the shared plain client for the DevTools HTTP
    /// endpoints.
    #[must_use]
    pub fn new(clients: &SharedClients) -> Self {
        Self {
            http: clients.plain.clone(),
        }
    }
}

#[async_trait]
impl SessionFactory for CdpSessionFactory {
    async fn open(
        &self,
        slot: BrowserSlot,
        _proxy: Option<String>,
        cx: &FetchContext,
    ) -> Result<Box<dyn BrowserSession>, VolareError> {
        // Proxy routing is a launch-time property of the pooled browser
        // instance; the per-lease proxy is consumed there, not here.
        let mut conn = CdpConnection::connect(&self.http, slot.devtools_port, cx).await?;
        conn.command("Network.enable", json!({}), cx).await?;
        conn.command("Page.enable", json!({}), cx).await?;
        Ok(Box::new(CdpSession { conn }))
    }
}

struct CdpSession {
    conn: CdpConnection,
}

#[async_trait]
impl BrowserSession for CdpSession {
    async fn navigate(&mut self, url: &str, cx: &FetchContext) -> Result<(), VolareError> {
        self.conn
            .command("Page.navigate", json!({ "url": url }), cx)
            .await?;
        self.conn
            .wait_event("Page.loadEventFired", |_| true, cx)
            .await?;
        Ok(())
    }

    async fn eval(&mut self, js: &str, cx: &FetchContext) -> Result<Value, VolareError> {
        let result = self
            .conn
            .command(
                "Runtime.evaluate",
                json!({ "expression": js, "returnByValue": true, "awaitPromise": true }),
                cx,
            )
            .await?;
        Ok(result["result"]["value"].clone())
    }

    async fn wait_for_xhr(
        &mut self,
        fragment: &str,
        cx: &FetchContext,
    ) -> Result<Value, VolareError> {
        let params = self
            .conn
            .wait_event(
                "Network.responseReceived",
                |p| {
                    p["response"]["url"]
                        .as_str()
                        .is_some_and(|u| u.contains(fragment))
                },
                cx,
            )
            .await?;
        let request_id = params["requestId"].clone();
        let body = self
            .conn
            .command(
                "Network.getResponseBody",
                json!({ "requestId": request_id }),
                cx,
            )
            .await?;
        let text = body["body"].as_str().unwrap_or("");
        serde_json::from_str(text)
            .map_err(|e| VolareError::parse_unusable("browser", format!("xhr body: {e}")))
    }

    async fn close(&mut self) {
        self.conn.close().await;
    }
}

/// Javascript that removes consent overlays and scroll locks.
const NEUTRALIZE_OVERLAY_JS: &str = r"
(() => {
  for (const sel of ['#onetrust-consent-sdk', '.cookie-banner', '[class*=consent]']) {
    document.querySelectorAll(sel).forEach(n => n.remove());
  }
  document.body.style.overflow = 'auto';
  return true;
})()";

/// Browser-automation source for one carrier site.
pub struct BrowserSource {
    name: &'static str,
    carrier: CarrierCode,
    search_url: String,
    xhr_fragment: String,
    pool: LeasePool<BrowserSlot>,
    factory: Arc<dyn SessionFactory>,
    ctx: AdapterContext,
    evasion: EvasionPolicy,
}

impl BrowserSource {
    /// Slot pool sized by the configured instance count, one slot per
    /// instance on consecutive DevTools ports starting at `base_port`.
    #[must_use]
    pub fn instance_pool(cfg: &BrowserPoolConfig, base_port: u16) -> LeasePool<BrowserSlot> {
        let slots = (0..cfg.size).map(|i| BrowserSlot {
            devtools_port: base_port.saturating_add(i as u16),
        });
        LeasePool::new("browser", slots)
    }

    /// Source driving one carrier's site, with its instance pool built
    /// from the configured size.
    ///
    /// `search_url` is a template with `{origin}`, `{destination}` and
    /// `{date}` placeholders; `xhr_fragment` identifies the fares XHR.
    ///
    /// # Panics
    /// Panics when `carrier` is malformed.
    #[must_use]
    pub fn new(
        name: &'static str,
        carrier: &str,
        search_url: impl Into<String>,
        xhr_fragment: impl Into<String>,
        pool_cfg: &BrowserPoolConfig,
        factory: Arc<dyn SessionFactory>,
        ctx: AdapterContext,
    ) -> Self {
        Self::with_pool(
            name,
            carrier,
            search_url,
            xhr_fragment,
            Self::instance_pool(pool_cfg, DEFAULT_DEVTOOLS_PORT),
            factory,
            ctx,
        )
    }

    /// Source over an explicitly assembled slot pool, for hosts whose
    /// instances do not sit on consecutive ports.
    ///
    /// # Panics
    /// Panics when `carrier` is malformed.
    #[must_use]
    pub fn with_pool(
        name: &'static str,
        carrier: &str,
        search_url: impl Into<String>,
        xhr_fragment: impl Into<String>,
        pool: LeasePool<BrowserSlot>,
        factory: Arc<dyn SessionFactory>,
        ctx: AdapterContext,
    ) -> Self {
        Self {
            name,
            carrier: CarrierCode::parse(carrier).expect("carrier code"),
            search_url: search_url.into(),
            xhr_fragment: xhr_fragment.into(),
            pool,
            factory,
            ctx,
            evasion: EvasionPolicy::new(
                vec![
                    EvasionStrategy::BrowserCookieHarvest,
                    EvasionStrategy::ResidentialProxy,
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

    fn page_url(&self, query: &Query) -> String {
        self.search_url
            .replace("{origin}", query.origin.as_str())
            .replace("{destination}", query.destination.as_str())
            .replace("{date}", &query.departure_date.to_string())
    }

    fn calendar_js(query: &Query) -> String {
        // The date pickers ignore programmatic value sets, so the widget
        // is driven the way a user would drive it.
        format!(
            r"(() => {{
  const pick = (sel, iso) => {{
    const input = document.querySelector(sel);
    input.focus();
    const cell = document.querySelector(`[data-date='${{iso}}']`);
    if (cell) cell.click(); else input.value = iso;
    input.dispatchEvent(new Event('change', {{ bubbles: true }}));
  }};
  pick('#departure-date', '{departure}');
  {ret}
  return true;
}})()",
            departure = query.departure_date,
            ret = query.return_date.map_or(String::new(), |d| format!(
                "pick('#return-date', '{d}');"
            )),
        )
    }

    async fn drive(
        &self,
        session: &mut Box<dyn BrowserSession>,
        query: &Query,
        cx: &FetchContext,
    ) -> Result<Vec<RawOffer>, VolareError> {
        session.navigate(&self.page_url(query), cx).await?;
        session.eval(NEUTRALIZE_OVERLAY_JS, cx).await?;
        session.eval(&Self::calendar_js(query), cx).await?;
        session
            .eval("document.querySelector('#search-submit').click(); true", cx)
            .await?;
        let body = session.wait_for_xhr(&self.xhr_fragment, cx).await?;
        let journeys = body
            .get("journeys")
            .and_then(Value::as_array)
            .ok_or_else(|| VolareError::parse_unusable(self.name, "no journeys in xhr"))?;
        Ok(journeys
            .iter()
            .cloned()
            .map(|body| {
                RawOffer::new(
                    self.key(),
                    RawPayload::Browser {
                        captured_from: self.xhr_fragment.clone(),
                        body,
                    },
                )
            })
            .collect())
    }
}

#[async_trait]
impl FareSource for BrowserSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::BrowserAutomation
    }

    fn serves_carrier(&self, carrier: &CarrierCode) -> bool {
        *carrier == self.carrier
    }

    fn min_deadline(&self) -> Duration {
        // A full page drive rarely beats this; interactive requests skip
        // the source rather than start work they will cancel.
        Duration::from_secs(20)
    }

    fn evasion(&self) -> Option<&EvasionPolicy> {
        Some(&self.evasion)
    }

    async fn fetch(&self, query: &Query, cx: &FetchContext) -> Result<Vec<RawOffer>, VolareError> {
        let slot = self.pool.acquire(cx.deadline).await?;
        let proxy = if self.evasion.current() == EvasionStrategy::ResidentialProxy {
            self.ctx.proxies.try_acquire()
        } else {
            None
        };
        let proxy_endpoint = proxy.as_ref().map(|p| p.0.clone());
        let mut session = self.factory.open(*slot, proxy_endpoint, cx).await?;
        let result = self.drive(&mut session, query, cx).await;
        // Close on every path so the slot is reusable after errors and
        // cancellation alike; the lease guards release on drop.
        session.close().await;
        result
    }
}
