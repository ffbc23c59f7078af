//! Fan-out execution: concurrent source invocation under request-wide
//! deadlines, first-response-wins collection for interactive queries,
//! straggler continuation, error isolation, and health recording.
//!
//! The executor owns a bounded event channel per fan-out; every source
//! invocation runs as its own task and reports `Offers`, `Failed`, and
//! finally `Done`. One failing source never cancels its siblings;
//! fallback-tier sources are dispatched only if the rest produced nothing
//! within the fallback sub-deadline.

pub mod health;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::mpsc;

use crate::core::VolareInner;
use crate::router::PlannedSource;
use volare_core::adapter::{CancelFlag, Deadline, FetchContext};
use volare_core::error::VolareError;
use volare_core::merge::{merge_offers, source_mix};
use volare_core::normalize::NormalizeContext;
use volare_types::health::FailureKind;
use volare_types::offer::Offer;
use volare_types::query::Query;
use volare_types::reports::{SourceMix, SourceWarning};
use volare_types::source::{AdapterTier, SourceKey};

/// Adapter-level transient retries beyond the first attempt.
const MAX_RETRIES: u32 = 2;

/// How a fan-out collects results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FanoutMode {
    /// Return after the first useful result plus the grace window;
    /// stragglers continue in the background.
    Interactive,
    /// Wait for every source up to the deadline.
    Background,
}

/// Event emitted by one source invocation.
pub(crate) enum SourceEvent {
    /// The invocation completed; the batch may be empty.
    Offers(Vec<Offer>),
    /// The invocation failed with a classified error.
    Failed(VolareError),
    /// The invocation is finished, successful or not.
    Done,
}

/// Collected result of one fan-out.
pub(crate) struct FanoutOutcome {
    pub offers: Vec<Offer>,
    pub source_mix: SourceMix,
    pub partial: bool,
    pub warnings: Vec<SourceWarning>,
}

/// State handed to the background continuation when an interactive
/// fan-out returns early.
pub(crate) struct Continuation {
    rx: mpsc::Receiver<(SourceKey, SourceEvent)>,
    offers: Vec<Offer>,
    warnings: Vec<SourceWarning>,
    pending: usize,
    deadline: Deadline,
}

fn jitter_wait(base_ms: u64, jitter_percent: u8) -> u64 {
    let jitter_range = if jitter_percent == 0 {
        1
    } else {
        std::cmp::max(1, (base_ms.saturating_mul(u64::from(jitter_percent))) / 100)
    };
    let mut rng = rand::rng();
    base_ms + rng.random_range(0..jitter_range)
}

fn warning(key: SourceKey, err: &VolareError) -> SourceWarning {
    SourceWarning {
        source: key.as_str().to_string(),
        kind: err.classify(),
        message: err.to_string(),
    }
}

impl VolareInner {
    /// Run one fan-out. Returns the collected outcome plus, for
    /// interactive crawls that returned early, the continuation the
    /// caller should drive to completion in the background.
    ///
    /// # Errors
    /// `NoRoute` when routing finds nothing, `RequestTimeout` when the
    /// deadline expires with nothing collected, `AllSourcesFailed` when
    /// every attempted source failed.
    pub(crate) async fn fan_out(
        self: &Arc<Self>,
        query: &Query,
        mode: FanoutMode,
    ) -> Result<(FanoutOutcome, Option<Continuation>), VolareError> {
        let plan = self.plan(query)?;
        let budget = match mode {
            FanoutMode::Interactive => self.cfg.executor.interactive_deadline,
            FanoutMode::Background => self.cfg.executor.background_deadline,
        };
        let deadline = Deadline::after(budget);
        let cancel = CancelFlag::new();
        let (tx, mut rx) = mpsc::channel(self.cfg.executor.event_buffer.max(8));

        let (active, mut fallback): (Vec<PlannedSource>, Vec<PlannedSource>) = plan
            .into_iter()
            .partition(|p| p.tier != AdapterTier::Fallback);

        let mut pending = 0usize;
        let mut attempted = 0usize;
        for planned in active {
            self.spawn_invocation(planned, query.clone(), deadline, cancel.clone(), tx.clone());
            pending += 1;
            attempted += 1;
        }

        let started = Instant::now();
        let grace = self.cfg.executor.first_response_grace;
        let fallback_at = started + self.cfg.executor.fallback_after;
        let mut fallback_dispatched = false;
        let mut offers: Vec<Offer> = Vec::new();
        let mut warnings: Vec<SourceWarning> = Vec::new();
        let mut errors: Vec<VolareError> = Vec::new();
        let mut succeeded = 0usize;
        let mut first_result_at: Option<Instant> = None;
        let mut returned_early = false;

        // Zero active sources (everything landed in fallback): dispatch
        // the fallback tier immediately.
        if pending == 0 && !fallback.is_empty() {
            for planned in fallback.drain(..) {
                self.spawn_invocation(planned, query.clone(), deadline, cancel.clone(), tx.clone());
                pending += 1;
                attempted += 1;
            }
            fallback_dispatched = true;
        }

        while pending > 0 {
            let mut wake = deadline.instant();
            if mode == FanoutMode::Interactive
                && let Some(first) = first_result_at
            {
                wake = wake.min(first + grace);
            }
            if !fallback_dispatched && !fallback.is_empty() {
                wake = wake.min(fallback_at);
            }

            let recv = tokio::time::timeout_at(tokio::time::Instant::from_std(wake), rx.recv());
            match recv.await {
                Ok(Some((key, event))) => match event {
                    SourceEvent::Offers(batch) => {
                        succeeded += 1;
                        if !batch.is_empty() && first_result_at.is_none() {
                            first_result_at = Some(Instant::now());
                        }
                        offers.extend(batch);
                    }
                    SourceEvent::Failed(err) => {
                        warnings.push(warning(key, &err));
                        errors.push(err);
                    }
                    SourceEvent::Done => pending -= 1,
                },
                Ok(None) => break,
                Err(_) => {
                    let now = Instant::now();
                    if deadline.expired() {
                        // The deadline owns the cancellation signal; tasks
                        // observe it at their next suspension point.
                        cancel.cancel();
                        returned_early = true;
                        break;
                    }
                    if mode == FanoutMode::Interactive
                        && first_result_at.is_some_and(|first| now >= first + grace)
                    {
                        returned_early = true;
                        break;
                    }
                    if !fallback_dispatched && now >= fallback_at {
                        if offers.is_empty() && !fallback.is_empty() {
                            for planned in fallback.drain(..) {
                                self.spawn_invocation(
                                    planned,
                                    query.clone(),
                                    deadline,
                                    cancel.clone(),
                                    tx.clone(),
                                );
                                pending += 1;
                                attempted += 1;
                            }
                        }
                        fallback_dispatched = true;
                    }
                }
            }

            // Everything finished empty-handed: give the fallback tier its
            // shot before concluding.
            if pending == 0 && !fallback_dispatched && offers.is_empty() && !fallback.is_empty() {
                for planned in fallback.drain(..) {
                    self.spawn_invocation(planned, query.clone(), deadline, cancel.clone(), tx.clone());
                    pending += 1;
                    attempted += 1;
                }
                fallback_dispatched = true;
            }
        }
        drop(tx);

        let partial = pending > 0;
        let merged = merge_offers(offers.clone());
        if merged.is_empty() {
            if partial && deadline.expired() {
                return Err(VolareError::RequestTimeout);
            }
            if !partial && attempted > 0 && succeeded == 0 && !errors.is_empty() {
                return Err(VolareError::AllSourcesFailed(errors));
            }
        }
        let mix = source_mix(&merged);
        let outcome = FanoutOutcome {
            offers: merged,
            source_mix: mix,
            partial,
            warnings,
        };
        let continuation = (partial && returned_early && !deadline.expired()).then(|| Continuation {
            rx,
            offers,
            warnings: outcome.warnings.clone(),
            pending,
            deadline,
        });
        Ok((outcome, continuation))
    }

    /// Drain the stragglers of an early-returned interactive fan-out and
    /// produce the final, complete outcome.
    pub(crate) async fn finish_crawl(&self, mut c: Continuation) -> FanoutOutcome {
        while c.pending > 0 {
            let wake = tokio::time::Instant::from_std(c.deadline.instant());
            match tokio::time::timeout_at(wake, c.rx.recv()).await {
                Ok(Some((key, event))) => match event {
                    SourceEvent::Offers(batch) => c.offers.extend(batch),
                    SourceEvent::Failed(err) => c.warnings.push(warning(key, &err)),
                    SourceEvent::Done => c.pending -= 1,
                },
                Ok(None) | Err(_) => break,
            }
        }
        let merged = merge_offers(c.offers);
        let mix = source_mix(&merged);
        FanoutOutcome {
            offers: merged,
            source_mix: mix,
            partial: c.pending > 0,
            warnings: c.warnings,
        }
    }

    fn spawn_invocation(
        self: &Arc<Self>,
        planned: PlannedSource,
        query: Query,
        deadline: Deadline,
        cancel: CancelFlag,
        tx: mpsc::Sender<(SourceKey, SourceEvent)>,
    ) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let key = planned.source.key();
            let effective = deadline.capped(planned.config.timeout);
            if effective.remaining() < planned.source.min_deadline() {
                // Not worth starting: skipped, never attempted, no health
                // impact.
                if planned.probe {
                    inner.health.abort_probe(key);
                }
                let _ = tx.send((key, SourceEvent::Done)).await;
                return;
            }
            let cx = FetchContext::new(effective, cancel);
            let started = Instant::now();
            // Adapters observe the deadline at their suspension points;
            // the outer timeout bounds the ones that cannot, so every
            // invocation releases its permits and leases on schedule.
            let result = tokio::time::timeout(
                effective.remaining(),
                inner.invoke_with_retry(&planned, &query, &cx),
            )
            .await
            .unwrap_or_else(|_| Err(VolareError::source_timeout(planned.source.name())));
            match result {
                Ok(offers) => {
                    inner.health.record_success(key, started.elapsed(), offers.len());
                    let _ = tx.send((key, SourceEvent::Offers(offers))).await;
                }
                Err(err) => {
                    let kind = planned.source.classify_failure(&err);
                    if kind == FailureKind::BotChallenge
                        && let Some(policy) = planned.source.evasion()
                    {
                        policy.advance();
                    }
                    if kind == FailureKind::Cancelled {
                        if planned.probe {
                            inner.health.abort_probe(key);
                        }
                    } else {
                        #[cfg(feature = "tracing")]
                        if kind == FailureKind::ParseUnusable {
                            tracing::warn!(
                                target = "volare::executor",
                                source = key.as_str(),
                                error = %err,
                                "structural change suspected in upstream payload"
                            );
                        }
                        inner.health.record_failure(key, kind, started.elapsed());
                        let _ = tx.send((key, SourceEvent::Failed(err))).await;
                    }
                }
            }
            let _ = tx.send((key, SourceEvent::Done)).await;
        });
    }

    async fn invoke_with_retry(
        &self,
        planned: &PlannedSource,
        query: &Query,
        cx: &FetchContext,
    ) -> Result<Vec<Offer>, VolareError> {
        let backoff = self.cfg.backoff;
        let mut backoff_ms = backoff.min_backoff_ms;
        let mut attempt = 0u32;
        loop {
            match self.invoke_once(planned, query, cx).await {
                Ok(offers) => return Ok(offers),
                Err(err) => {
                    attempt += 1;
                    let kind = planned.source.classify_failure(&err);
                    if !kind.retryable() || attempt > MAX_RETRIES {
                        return Err(err);
                    }
                    let wait = Duration::from_millis(jitter_wait(backoff_ms, backoff.jitter_percent));
                    if wait >= cx.deadline.remaining() {
                        return Err(err);
                    }
                    cx.pause(wait, VolareError::source_timeout(planned.source.name()))
                        .await?;
                    backoff_ms = backoff_ms
                        .saturating_mul(u64::from(backoff.factor.max(1)))
                        .min(backoff.max_backoff_ms);
                }
            }
        }
    }

    async fn invoke_once(
        &self,
        planned: &PlannedSource,
        query: &Query,
        cx: &FetchContext,
    ) -> Result<Vec<Offer>, VolareError> {
        let raws = planned.source.fetch(query, cx).await?;
        let ncx = NormalizeContext {
            airports: &self.ctx.airports,
            fx: &self.ctx.fx,
            query,
        };
        let mut offers = Vec::with_capacity(raws.len());
        for raw in &raws {
            match planned.source.normalize(raw, &ncx) {
                Ok(offer) => offers.push(offer),
                Err(err @ VolareError::Parse { unusable: true, .. }) => return Err(err),
                Err(_err) => {
                    // One malformed offer; keep its siblings.
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        target = "volare::executor",
                        source = planned.source.name(),
                        error = %_err,
                        "skipping malformed offer"
                    );
                }
            }
        }
        Ok(offers)
    }
}
