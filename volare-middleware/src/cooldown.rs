//! Cooldown gate that parks a source after rate-limit signals.
//!
//! The fan-out executor's breaker deliberately ignores rate limits (they
//! say nothing about upstream health), so without this layer a 429ing
//! upstream would be re-hit on every fan-out. The gate honors the
//! upstream's `Retry-After` window when one was given and falls back to a
//! configured default otherwise.
//!
//! Ordering: the gate must sit outside the token bucket. Inside it, a
//! gated call would already have consumed a token, and bucket-exhaustion
//! errors would never reach the gate. Both layers enforce this through
//! stack validation.

use std::any::TypeId;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::quota::RateLimitMiddleware;
use volare_core::adapter::{FareSource, FetchContext};
use volare_core::error::VolareError;
use volare_core::evasion::EvasionPolicy;
use volare_core::middleware::{Middleware, ValidationContext};
use volare_core::normalize::NormalizeContext;
use volare_core::raw::RawOffer;
use volare_types::geo::CarrierCode;
use volare_types::health::FailureKind;
use volare_types::offer::Offer;
use volare_types::query::Query;
use volare_types::source::{SourceKind, TrustScore};

/// Wrapper that rejects calls while a rate-limit cooldown is running.
pub struct CooldownSource {
    inner: Arc<dyn FareSource>,
    /// Gate-until instant; `None` means open.
    gate: Mutex<Option<Instant>>,
    default_cooldown: Duration,
}

impl CooldownSource {
    /// Wrap `inner` with an open gate.
    #[must_use]
    pub fn new(inner: Arc<dyn FareSource>, default_cooldown: Duration) -> Self {
        Self {
            inner,
            gate: Mutex::new(None),
            default_cooldown,
        }
    }

    /// The wrapped source.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn FareSource> {
        &self.inner
    }

    /// Time left on the gate, clearing it once expired.
    fn gate_remaining(&self) -> Option<Duration> {
        let mut gate = self.gate.lock().expect("mutex poisoned");
        let until = (*gate)?;
        let remaining = until.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            *gate = None;
            return None;
        }
        Some(remaining)
    }

    fn note_error(&self, err: &VolareError) {
        if let VolareError::RateLimited { retry_in, .. } = err {
            // Honor the upstream window when it gave one; otherwise use
            // the configured default.
            let window = if retry_in.is_zero() {
                self.default_cooldown
            } else {
                *retry_in
            };
            *self.gate.lock().expect("mutex poisoned") = Some(Instant::now() + window);
        }
    }
}

#[async_trait]
impl FareSource for CooldownSource {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn kind(&self) -> SourceKind {
        self.inner.kind()
    }

    fn trust(&self) -> TrustScore {
        self.inner.trust()
    }

    fn serves_carrier(&self, carrier: &CarrierCode) -> bool {
        self.inner.serves_carrier(carrier)
    }

    fn min_deadline(&self) -> Duration {
        self.inner.min_deadline()
    }

    fn evasion(&self) -> Option<&EvasionPolicy> {
        self.inner.evasion()
    }

    async fn fetch(&self, query: &Query, cx: &FetchContext) -> Result<Vec<RawOffer>, VolareError> {
        if let Some(remaining) = self.gate_remaining() {
            return Err(VolareError::RateLimited {
                source_name: self.inner.name().to_string(),
                retry_in: remaining,
            });
        }
        let result = self.inner.fetch(query, cx).await;
        if let Err(err) = &result {
            self.note_error(err);
        }
        result
    }

    fn normalize(
        &self,
        raw: &RawOffer,
        ncx: &NormalizeContext<'_>,
    ) -> Result<Offer, VolareError> {
        self.inner.normalize(raw, ncx)
    }

    async fn health_check(&self) -> Result<(), VolareError> {
        self.inner.health_check().await
    }

    fn classify_failure(&self, err: &VolareError) -> FailureKind {
        self.inner.classify_failure(err)
    }
}

/// Declarative layer applying a [`CooldownSource`] when building a
/// source stack.
pub struct CooldownMiddleware {
    default_cooldown: Duration,
}

impl CooldownMiddleware {
    /// Layer with the given fallback window.
    #[must_use]
    pub const fn new(default_cooldown: Duration) -> Self {
        Self { default_cooldown }
    }
}

impl Middleware for CooldownMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn FareSource>) -> Arc<dyn FareSource> {
        Arc::new(CooldownSource::new(inner, self.default_cooldown))
    }

    fn name(&self) -> &'static str {
        "CooldownSource"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "default_cooldown_ms": self.default_cooldown.as_millis(),
        })
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), VolareError> {
        let rate_limit = TypeId::of::<RateLimitMiddleware>();
        if ctx.has_middleware(rate_limit) && !ctx.has_middleware_inner(rate_limit) {
            return Err(VolareError::InvalidConfig(
                "cooldown gate must wrap the rate limiter, not sit inside it".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volare_core::adapter::{CancelFlag, Deadline};
    use volare_mock::MockSource;

    fn cx() -> FetchContext {
        FetchContext::new(Deadline::after(Duration::from_secs(5)), CancelFlag::new())
    }

    #[tokio::test]
    async fn upstream_rate_limit_gates_subsequent_calls() {
        // First call 429s with a retry window; later calls succeed.
        let inner = MockSource::builder()
            .name("agg")
            .with_fetch_fn(|_, call| {
                if call == 0 {
                    Err(VolareError::RateLimited {
                        source_name: "agg".to_string(),
                        retry_in: Duration::from_millis(80),
                    })
                } else {
                    Ok(vec![])
                }
            })
            .build();
        let gated = CooldownSource::new(inner.clone(), Duration::from_secs(60));
        let query = volare_mock::sample_query();

        let err = gated.fetch(&query, &cx()).await.unwrap_err();
        assert!(matches!(err, VolareError::RateLimited { .. }));
        assert_eq!(inner.calls(), 1);

        // Gated: the inner source is not touched again.
        let err = gated.fetch(&query, &cx()).await.unwrap_err();
        assert!(matches!(err, VolareError::RateLimited { .. }));
        assert_eq!(inner.calls(), 1);

        // Window elapsed: calls flow again.
        tokio::time::sleep(Duration::from_millis(120)).await;
        gated.fetch(&query, &cx()).await.unwrap();
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn other_failures_leave_the_gate_open() {
        let inner = MockSource::builder()
            .name("agg")
            .fails_with(|| VolareError::transient("agg", "reset"))
            .build();
        let gated = CooldownSource::new(inner.clone(), Duration::from_secs(60));
        let query = volare_mock::sample_query();

        let _ = gated.fetch(&query, &cx()).await.unwrap_err();
        let _ = gated.fetch(&query, &cx()).await.unwrap_err();
        assert_eq!(inner.calls(), 2);
    }
}
