//! The public search operation: cache consult, synchronous fan-out on a
//! miss, stale-while-revalidate, continuation of straggler crawls, and
//! history recording.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;

use crate::cache::{CacheEntry, Freshness};
use crate::core::{Volare, VolareInner};
use crate::executor::{FanoutMode, FanoutOutcome};
use volare_core::error::VolareError;
use volare_types::query::{Query, QueryKey};
use volare_types::reports::{CacheState, PriceHistoryRow, SearchReport};
use volare_types::source::RouteTier;

impl Volare {
    /// Search for offers.
    ///
    /// Cache semantics: a fresh entry returns immediately; a stale entry
    /// returns immediately and enqueues one deduplicated background
    /// refresh; a miss runs a synchronous interactive fan-out, with
    /// concurrent misses for the same key sharing a single crawl.
    ///
    /// `partial: true` on the report means background sources were still
    /// running when the response was assembled; the cache entry is
    /// superseded once they finish, so re-polling the same query will
    /// observe the completed result set.
    ///
    /// # Errors
    /// `NoRoute` when no source covers the route, `RequestTimeout` when
    /// the interactive deadline expires empty-handed, `AllSourcesFailed`
    /// when every attempted source failed.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            target = "volare::search",
            skip(self, query),
            fields(origin = %query.origin, destination = %query.destination),
        )
    )]
    pub async fn search(&self, query: &Query) -> Result<SearchReport, VolareError> {
        let inner = &self.inner;
        let key = query.key();

        if let Some((entry, freshness)) = inner.cache.get(&key).await {
            return Ok(match freshness {
                // A fresh-but-partial entry still has its producing crawl
                // running; surface that so the caller can re-poll.
                Freshness::Fresh => report(&entry, CacheState::Fresh, entry.partial),
                Freshness::Stale => {
                    let dispatched = inner.spawn_refresh(query.clone());
                    report(&entry, CacheState::Stale, dispatched || inner.cache.is_refreshing(&key))
                }
            });
        }

        let tier = inner.popularity.route_tier(query.origin, query.destination);
        let loader_inner = Arc::clone(inner);
        let loader_query = query.clone();
        let loader_key = key.clone();
        let entry = inner
            .cache
            .get_or_load(key, || async move {
                loader_inner
                    .crawl_into_entry(loader_query, loader_key, tier, FanoutMode::Interactive)
                    .await
            })
            .await?;
        Ok(report(&entry, CacheState::Miss, entry.partial))
    }

    /// Read-only view over the price history for a route, for downstream
    /// prediction.
    #[must_use]
    pub fn prediction_data(
        &self,
        origin: volare_types::geo::AirportCode,
        destination: volare_types::geo::AirportCode,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<PriceHistoryRow> {
        self.inner.history.rows(origin, destination, from, to)
    }
}

fn report(entry: &CacheEntry, cache_state: CacheState, background_refresh: bool) -> SearchReport {
    SearchReport {
        offers: entry.offers.clone(),
        cache_state,
        partial: entry.partial,
        background_refresh,
        source_mix: entry.source_mix.clone(),
        warnings: entry.warnings.clone(),
    }
}

impl VolareInner {
    /// Run a fan-out and assemble the resulting cache entry. Partial
    /// interactive crawls hand their stragglers to a background task that
    /// swaps in the completed entry and records history once done.
    pub(crate) async fn crawl_into_entry(
        self: Arc<Self>,
        query: Query,
        key: QueryKey,
        tier: RouteTier,
        mode: FanoutMode,
    ) -> Result<CacheEntry, VolareError> {
        let (outcome, continuation) = self.fan_out(&query, mode).await?;

        if let Some(continuation) = continuation {
            let inner = Arc::clone(&self);
            let cont_query = query.clone();
            let cont_key = key;
            tokio::spawn(async move {
                let finished = inner.finish_crawl(continuation).await;
                inner
                    .store_outcome(&cont_query, cont_key, tier, &finished)
                    .await;
            });
            // The initial entry is marked partial; history is written by
            // the continuation so the route gets one complete observation.
            return Ok(entry_from(&outcome, tier));
        }

        self.record_history(&query, &outcome);
        Ok(entry_from(&outcome, tier))
    }

    /// Swap in a completed entry and record its observation.
    pub(crate) async fn store_outcome(
        &self,
        query: &Query,
        key: QueryKey,
        tier: RouteTier,
        outcome: &FanoutOutcome,
    ) {
        self.record_history(query, outcome);
        self.cache.insert(key, entry_from(outcome, tier)).await;
    }

    /// Kick off a deduplicated background refresh for a stale key.
    /// Returns true when this call claimed the refresh.
    pub(crate) fn spawn_refresh(self: &Arc<Self>, query: Query) -> bool {
        let key = query.key();
        if !self.cache.begin_refresh(&key) {
            return false;
        }
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let tier = inner.popularity.route_tier(query.origin, query.destination);
            // The global cap keeps bulk refresh from starving interactive
            // traffic.
            let permit = inner.refresh_limiter.clone().acquire_owned().await;
            if permit.is_ok() {
                match inner.fan_out(&query, FanoutMode::Background).await {
                    Ok((outcome, _)) => {
                        inner.store_outcome(&query, query.key(), tier, &outcome).await;
                    }
                    Err(_err) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            target = "volare::refresh",
                            error = %_err,
                            "background refresh failed; stale entry retained"
                        );
                    }
                }
            }
            inner.cache.end_refresh(&query.key());
        });
        true
    }

    fn record_history(&self, query: &Query, outcome: &FanoutOutcome) {
        if let Some(row) = crate::history::history_row(query, &outcome.offers, &outcome.source_mix)
        {
            self.history.append(row);
        }
    }
}

fn entry_from(outcome: &FanoutOutcome, tier: RouteTier) -> CacheEntry {
    CacheEntry {
        offers: outcome.offers.clone(),
        source_mix: outcome.source_mix.clone(),
        warnings: outcome.warnings.clone(),
        generated_at: Instant::now(),
        tier,
        partial: outcome.partial,
    }
}
