//! The `FareSource` contract and the per-call fetch context.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::VolareError;
use crate::evasion::EvasionPolicy;
use crate::normalize::{self, NormalizeContext};
use crate::raw::RawOffer;
use volare_types::geo::CarrierCode;
use volare_types::health::FailureKind;
use volare_types::offer::Offer;
use volare_types::query::Query;
use volare_types::source::{SourceKey, SourceKind, TrustScore};

/// Monotonic deadline a request and all its downstream calls carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    /// A deadline `budget` from now.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    /// A deadline at an explicit instant.
    #[must_use]
    pub const fn at(instant: Instant) -> Self {
        Self(instant)
    }

    /// The deadline instant.
    #[must_use]
    pub const fn instant(self) -> Instant {
        self.0
    }

    /// Remaining budget, zero once expired.
    #[must_use]
    pub fn remaining(self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn expired(self) -> bool {
        self.remaining() == Duration::ZERO
    }

    /// The earlier of this deadline and `budget` from now, for sub-phases
    /// like fallback dispatch.
    #[must_use]
    pub fn capped(self, budget: Duration) -> Self {
        Self(self.0.min(Instant::now() + budget))
    }
}

/// Cooperative cancellation flag, observed by adapters at every await
/// point via [`FetchContext::io`].
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<CancelInner>);

#[derive(Debug, Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    /// A fresh, uncancelled flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the flag and wake all waiters.
    pub fn cancel(&self) {
        self.0.flag.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    /// Whether the flag has been tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.flag.load(Ordering::SeqCst)
    }

    /// Resolve once the flag trips. Registers interest before re-checking
    /// so a concurrent `cancel` is never missed.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Per-call context handed to a source: the request deadline and the
/// cancellation flag. Adapters must route every suspension point through
/// [`FetchContext::io`] (or check the flag manually) so cancellation and
/// deadline expiry are observed promptly.
#[derive(Debug, Clone)]
pub struct FetchContext {
    /// Deadline for this call.
    pub deadline: Deadline,
    /// Cancellation flag for this request.
    pub cancel: CancelFlag,
}

impl FetchContext {
    /// Build a context from a deadline and flag.
    #[must_use]
    pub const fn new(deadline: Deadline, cancel: CancelFlag) -> Self {
        Self { deadline, cancel }
    }

    /// A detached context with its own budget, for background work.
    #[must_use]
    pub fn with_budget(budget: Duration) -> Self {
        Self::new(Deadline::after(budget), CancelFlag::new())
    }

    /// Run a future as an I/O suspension point: it loses against
    /// cancellation and against the deadline.
    ///
    /// # Errors
    /// `Cancelled` when the flag trips first, the `on_timeout` error when
    /// the deadline expires first.
    pub async fn io<T, F>(&self, fut: F, on_timeout: VolareError) -> Result<T, VolareError>
    where
        F: Future<Output = T>,
    {
        if self.cancel.is_cancelled() {
            return Err(VolareError::Cancelled);
        }
        let remaining = self.deadline.remaining();
        if remaining == Duration::ZERO {
            return Err(on_timeout);
        }
        tokio::select! {
            () = self.cancel.cancelled() => Err(VolareError::Cancelled),
            out = tokio::time::timeout(remaining, fut) => {
                out.map_or(Err(on_timeout), Ok)
            }
        }
    }

    /// Sleep as a suspension point, bounded by cancellation and deadline.
    ///
    /// # Errors
    /// `Cancelled` or the request deadline error, like [`FetchContext::io`].
    pub async fn pause(&self, dur: Duration, on_timeout: VolareError) -> Result<(), VolareError> {
        self.io(tokio::time::sleep(dur), on_timeout).await
    }
}

/// Main source trait implemented by upstream adapter crates.
///
/// One instance per upstream. Encapsulates the wire protocol, request
/// shaping, anti-bot behavior, payload parsing, and failure
/// classification for that upstream; everything else (rate limits, health,
/// breakers, merging) is layered on from outside.
#[async_trait]
pub trait FareSource: Send + Sync {
    /// A stable identifier for configuration and reports
    /// (e.g. "metasearch", "aggregator").
    fn name(&self) -> &'static str;

    /// Canonical source key constructed from the static name.
    fn key(&self) -> SourceKey {
        SourceKey::new(self.name())
    }

    /// Which upstream variant this source implements.
    fn kind(&self) -> SourceKind;

    /// Trust score stamped on prices this source produces.
    fn trust(&self) -> TrustScore {
        self.kind().default_trust()
    }

    /// Whether this source serves the given carrier directly. The router
    /// forces carrier-direct sources into the primary tier when the
    /// coverage table expects that carrier on the route.
    fn serves_carrier(&self, carrier: &CarrierCode) -> bool {
        let _ = carrier;
        false
    }

    /// Minimum remaining budget this source needs to be worth invoking;
    /// below this floor the executor skips it.
    fn min_deadline(&self) -> Duration {
        Duration::from_millis(300)
    }

    /// The declared anti-bot strategy ladder, if this source has one. The
    /// executor advances it on classified bot challenges.
    fn evasion(&self) -> Option<&EvasionPolicy> {
        None
    }

    /// Crawl the upstream for this query, emitting raw offers in upstream
    /// order. An empty vec is a legitimate answer, not an error.
    async fn fetch(
        &self,
        query: &Query,
        cx: &FetchContext,
    ) -> Result<Vec<RawOffer>, VolareError>;

    /// Normalize one raw offer into the canonical shape. Pure and
    /// deterministic: same inputs, same offer.
    ///
    /// The default dispatches on the payload tag; sources with quirks the
    /// shared paths cannot express override this.
    ///
    /// # Errors
    /// A `Parse` error; `unusable: true` signals a broken payload root.
    fn normalize(&self, raw: &RawOffer, ncx: &NormalizeContext<'_>) -> Result<Offer, VolareError> {
        normalize::normalize_offer(self.name(), self.trust(), raw, ncx)
    }

    /// Cheap liveness probe used for half-open breaker checks.
    async fn health_check(&self) -> Result<(), VolareError> {
        Ok(())
    }

    /// Classify a failure from this source. The default uses the shared
    /// mapping; sources override when their upstream hides, say, bot
    /// challenges inside 200-OK bodies.
    fn classify_failure(&self, err: &VolareError) -> FailureKind {
        err.classify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn io_returns_cancelled_when_flag_trips() {
        let cx = FetchContext::with_budget(Duration::from_secs(5));
        let flag = cx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flag.cancel();
        });
        let res = cx
            .io(
                tokio::time::sleep(Duration::from_secs(10)),
                VolareError::RequestTimeout,
            )
            .await;
        assert!(matches!(res, Err(VolareError::Cancelled)));
    }

    #[tokio::test]
    async fn io_times_out_at_the_deadline() {
        let cx = FetchContext::with_budget(Duration::from_millis(20));
        let res = cx
            .io(
                tokio::time::sleep(Duration::from_secs(10)),
                VolareError::source_timeout("slow"),
            )
            .await;
        assert!(matches!(res, Err(VolareError::SourceTimeout { .. })));
    }

    #[test]
    fn capped_deadline_never_extends() {
        let d = Deadline::after(Duration::from_millis(50));
        let capped = d.capped(Duration::from_secs(10));
        assert!(capped.instant() <= d.instant());
    }
}
