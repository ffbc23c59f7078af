//! OAuth2 client-credentials token cache shared by GDS and official-API
//! sources.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use volare_core::adapter::FetchContext;
use volare_core::error::VolareError;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    bearer: String,
    expires_at: Instant,
}

/// Cached OAuth2 client-credentials token, refreshed 60 seconds before
/// expiry so in-flight requests never race the deadline.
pub struct TokenCache {
    source: &'static str,
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    /// TTL used when the token endpoint omits `expires_in`.
    fallback_ttl: Duration,
    state: Mutex<Option<CachedToken>>,
}

const REFRESH_MARGIN: Duration = Duration::from_secs(60);

impl TokenCache {
    /// A cache with no token yet.
    #[must_use]
    pub fn new(
        source: &'static str,
        http: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        fallback_ttl: Duration,
    ) -> Self {
        Self {
            source,
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            fallback_ttl,
            state: Mutex::new(None),
        }
    }

    /// A bearer token valid for at least the refresh margin.
    ///
    /// # Errors
    /// Token endpoint failures as `AuthExpired`/`Transient`.
    pub async fn bearer(&self, cx: &FetchContext) -> Result<String, VolareError> {
        let mut state = self.state.lock().await;
        if let Some(tok) = state.as_ref()
            && tok.expires_at.saturating_duration_since(Instant::now()) > REFRESH_MARGIN
        {
            return Ok(tok.bearer.clone());
        }
        let fresh = self.request_token(cx).await?;
        let bearer = fresh.bearer.clone();
        *state = Some(fresh);
        Ok(bearer)
    }

    /// Drop any cached token and fetch a new one. Used for the single
    /// retry after an unexpected 401.
    ///
    /// # Errors
    /// Token endpoint failures as `AuthExpired`/`Transient`.
    pub async fn force_refresh(&self, cx: &FetchContext) -> Result<String, VolareError> {
        let mut state = self.state.lock().await;
        let fresh = self.request_token(cx).await?;
        let bearer = fresh.bearer.clone();
        *state = Some(fresh);
        Ok(bearer)
    }

    async fn request_token(&self, cx: &FetchContext) -> Result<CachedToken, VolareError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let send = self.http.post(&self.token_url).form(&form).send();
        let resp = cx
            .io(send, VolareError::source_timeout(self.source))
            .await?
            .map_err(|e| VolareError::transient(self.source, format!("token endpoint: {e}")))?;
        let status = resp.status().as_u16();
        if status == 400 || status == 401 {
            return Err(VolareError::AuthExpired {
                source_name: self.source.to_string(),
            });
        }
        if !(200..300).contains(&status) {
            return Err(VolareError::transient(
                self.source,
                format!("token endpoint status {status}"),
            ));
        }
        let body: TokenResponse = cx
            .io(resp.json(), VolareError::source_timeout(self.source))
            .await?
            .map_err(|e| VolareError::transient(self.source, format!("token body: {e}")))?;
        let ttl = body
            .expires_in
            .map_or(self.fallback_ttl, Duration::from_secs);
        Ok(CachedToken {
            bearer: body.access_token,
            expires_at: Instant::now() + ttl,
        })
    }
}
