//! Shared HTTP clients and status classification.

use std::time::Duration;

use volare_core::error::VolareError;

/// The two HTTP stacks sources share: a plain client for well-behaved
/// APIs and a TLS-fingerprint-masked client impersonating a current
/// browser build for WAF-fronted upstreams.
///
/// Built once by the orchestrator builder and cloned into sources; the
/// underlying connection pools are shared.
#[derive(Clone)]
pub struct SharedClients {
    /// Plain client for aggregator/GDS/official APIs.
    pub plain: reqwest::Client,
    /// Browser-impersonating client for metasearch, shared-tenant, and
    /// airline-direct endpoints.
    pub masked: wreq::Client,
}

impl std::fmt::Debug for SharedClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedClients")
            .field("plain", &self.plain)
            .field("masked", &"wreq::Client")
            .finish()
    }
}

impl SharedClients {
    /// Build both clients.
    ///
    /// # Errors
    /// `InvalidConfig` when either client fails to construct.
    pub fn new() -> Result<Self, VolareError> {
        let plain = reqwest::Client::builder()
            .user_agent(concat!("volare/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| VolareError::InvalidConfig(format!("plain http client: {e}")))?;
        let masked = wreq::Client::builder()
            .emulation(wreq_util::Emulation::Chrome136)
            .cookie_store(true)
            .build()
            .map_err(|e| VolareError::InvalidConfig(format!("masked http client: {e}")))?;
        Ok(Self { plain, masked })
    }
}

/// Map an HTTP status (plus body sniffing) onto the failure taxonomy.
///
/// WAFs rarely announce themselves with a clean status: challenges come as
/// 403s or even 200s whose body carries the challenge markup, so callers
/// pass a body snippet for sniffing.
#[must_use]
pub fn classify_status(
    source: &str,
    status: u16,
    retry_after: Option<Duration>,
    body_snippet: &str,
) -> Option<VolareError> {
    let lower = body_snippet.to_ascii_lowercase();
    let looks_challenged = lower.contains("captcha")
        || lower.contains("cf-challenge")
        || lower.contains("are you a robot")
        || lower.contains("access denied");
    match status {
        200..=299 if looks_challenged => Some(VolareError::BotChallenge {
            source_name: source.to_string(),
            detail: "challenge markup in 200 response".to_string(),
        }),
        200..=299 => None,
        401 => Some(VolareError::AuthExpired {
            source_name: source.to_string(),
        }),
        403 => Some(VolareError::BotChallenge {
            source_name: source.to_string(),
            detail: format!("403 ({})", if looks_challenged { "challenge body" } else { "forbidden" }),
        }),
        429 => Some(VolareError::RateLimited {
            source_name: source.to_string(),
            retry_in: retry_after.unwrap_or(Duration::from_secs(2)),
        }),
        500..=599 => Some(VolareError::transient(source, format!("upstream {status}"))),
        other => Some(VolareError::source(source, format!("unexpected status {other}"))),
    }
}

/// Parse a `Retry-After` header value (seconds form only).
#[must_use]
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value?.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// First ~512 bytes of a body for challenge sniffing, respecting char
/// boundaries.
#[must_use]
pub fn snippet(body: &str) -> &str {
    let mut end = body.len().min(512);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_markup_beats_a_clean_status() {
        let err = classify_status("meta", 200, None, "<html>captcha required</html>").unwrap();
        assert!(matches!(err, VolareError::BotChallenge { .. }));
        assert!(classify_status("meta", 200, None, "{\"ok\":true}").is_none());
    }

    #[test]
    fn status_taxonomy() {
        assert!(matches!(
            classify_status("a", 401, None, "").unwrap(),
            VolareError::AuthExpired { .. }
        ));
        assert!(matches!(
            classify_status("a", 403, None, "").unwrap(),
            VolareError::BotChallenge { .. }
        ));
        assert!(matches!(
            classify_status("a", 429, Some(Duration::from_secs(7)), "").unwrap(),
            VolareError::RateLimited { retry_in, .. } if retry_in == Duration::from_secs(7)
        ));
        assert!(matches!(
            classify_status("a", 503, None, "").unwrap(),
            VolareError::Transient { .. }
        ));
    }

    #[test]
    fn retry_after_parses_seconds() {
        assert_eq!(parse_retry_after(Some("7")), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(Some("soon")), None);
        assert_eq!(parse_retry_after(None), None);
    }
}
