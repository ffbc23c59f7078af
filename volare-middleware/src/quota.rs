//! Token-bucket rate limiting for fare sources.
//!
//! The bucket is consumed before the network call. When empty, the wrapper
//! waits up to min(deadline remaining, refill wait) and otherwise fails
//! with a rate-limit error. Permits are drop-guards: a call that ends in
//! cancellation refunds its token so cancelled tasks never hold budget.

use std::any::TypeId;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use volare_core::adapter::{FareSource, FetchContext};
use volare_core::error::VolareError;
use volare_core::evasion::EvasionPolicy;
use volare_core::middleware::{Middleware, ValidationContext};
use volare_core::normalize::NormalizeContext;
use volare_core::raw::RawOffer;
use volare_types::config::RateLimitConfig;
use volare_types::geo::CarrierCode;
use volare_types::health::FailureKind;
use volare_types::offer::Offer;
use volare_types::query::Query;
use volare_types::source::{SourceKind, TrustScore};

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket with fractional refill.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// A full bucket with the configured capacity and refill rate.
    #[must_use]
    pub fn new(cfg: &RateLimitConfig) -> Self {
        let capacity = f64::from(cfg.capacity.max(1));
        Self {
            capacity,
            refill_per_sec: cfg.refill_per_sec.max(0.001),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }

    /// Take one token, or report how long until one becomes available.
    ///
    /// # Errors
    /// The wait duration when the bucket is empty.
    pub fn try_take(self: &Arc<Self>) -> Result<TokenPermit, Duration> {
        let mut state = self.state.lock().expect("mutex poisoned");
        self.refill(&mut state, Instant::now());
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(TokenPermit {
                bucket: Arc::clone(self),
                committed: false,
            });
        }
        let deficit = 1.0 - state.tokens;
        Err(Duration::from_secs_f64(deficit / self.refill_per_sec))
    }

    /// Whole tokens currently available, for health snapshots.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        let mut state = self.state.lock().expect("mutex poisoned");
        self.refill(&mut state, Instant::now());
        state.tokens as u64
    }

    fn refund(&self) {
        let mut state = self.state.lock().expect("mutex poisoned");
        state.tokens = (state.tokens + 1.0).min(self.capacity);
    }
}

/// Guard over one consumed token. Dropping without [`TokenPermit::commit`]
/// refunds the token; completed calls commit so the budget is spent.
#[derive(Debug)]
pub struct TokenPermit {
    bucket: Arc<TokenBucket>,
    committed: bool,
}

impl TokenPermit {
    /// Mark the token as spent.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for TokenPermit {
    fn drop(&mut self) {
        if !self.committed {
            self.bucket.refund();
        }
    }
}

/// Wrapper enforcing a token bucket around a fare source.
pub struct RateLimitedSource {
    inner: Arc<dyn FareSource>,
    bucket: Arc<TokenBucket>,
}

impl RateLimitedSource {
    /// Wrap `inner` with a fresh bucket.
    #[must_use]
    pub fn new(inner: Arc<dyn FareSource>, cfg: &RateLimitConfig) -> Self {
        Self {
            inner,
            bucket: Arc::new(TokenBucket::new(cfg)),
        }
    }

    /// The wrapped source.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn FareSource> {
        &self.inner
    }

    /// Whole tokens currently available.
    #[must_use]
    pub fn tokens_remaining(&self) -> u64 {
        self.bucket.remaining()
    }

    async fn take_permit(&self, cx: &FetchContext) -> Result<TokenPermit, VolareError> {
        loop {
            match self.bucket.try_take() {
                Ok(permit) => return Ok(permit),
                Err(wait) => {
                    let rate_limited = VolareError::RateLimited {
                        source_name: self.inner.name().to_string(),
                        retry_in: wait,
                    };
                    if wait > cx.deadline.remaining() {
                        return Err(rate_limited);
                    }
                    cx.pause(wait, rate_limited).await?;
                }
            }
        }
    }
}

#[async_trait]
impl FareSource for RateLimitedSource {
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
        let permit = self.take_permit(cx).await?;
        let result = self.inner.fetch(query, cx).await;
        match &result {
            // A cancelled call never got its answer; hand the token back.
            Err(e) if matches!(e.classify(), FailureKind::Cancelled) => drop(permit),
            _ => permit.commit(),
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

/// Declarative layer applying a [`RateLimitedSource`] when building a
/// source stack.
pub struct RateLimitMiddleware {
    cfg: RateLimitConfig,
}

impl RateLimitMiddleware {
    /// Layer with the given bucket parameters.
    #[must_use]
    pub const fn new(cfg: RateLimitConfig) -> Self {
        Self { cfg }
    }
}

impl Middleware for RateLimitMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn FareSource>) -> Arc<dyn FareSource> {
        Arc::new(RateLimitedSource::new(inner, &self.cfg))
    }

    fn name(&self) -> &'static str {
        "RateLimitedSource"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "capacity": self.cfg.capacity,
            "refill_per_sec": self.cfg.refill_per_sec,
        })
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), VolareError> {
        // The bucket must be innermost relative to the cooldown gate, so
        // gated calls never burn tokens.
        let cooldown = TypeId::of::<crate::cooldown::CooldownMiddleware>();
        if ctx.has_middleware(cooldown) && !ctx.has_middleware_outer(cooldown) {
            return Err(VolareError::InvalidConfig(
                "rate limiter must sit inside the cooldown gate".to_string(),
            ));
        }
        Ok(())
    }
}
