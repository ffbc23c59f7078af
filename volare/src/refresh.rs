//! Periodic background refresh of popular routes.
//!
//! The scheduler seeds refresh jobs for top-tier routes at a fixed set of
//! departure horizons. Jobs flow through the same deduplicated refresh
//! path as stale-hit revalidation, so a key already refreshing is a
//! no-op, and the global concurrency cap keeps the sweep from starving
//! interactive load.

use std::time::Duration;

use chrono::{Days, Utc};

use crate::core::Volare;
use volare_core::adapter::CancelFlag;
use volare_types::money::Currency;
use volare_types::query::Query;

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Interval between sweeps.
    pub interval: Duration,
    /// Departure horizons (days from today) to keep warm per route.
    pub horizons_days: Vec<u64>,
    /// Currency refreshed entries are priced in.
    pub currency: Currency,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            horizons_days: vec![7, 30, 90],
            currency: Currency::USD,
        }
    }
}

/// Handle to a running scheduler; dropping it does not stop the task,
/// call [`RefreshHandle::stop`].
#[derive(Debug)]
pub struct RefreshHandle {
    stop: CancelFlag,
    task: tokio::task::JoinHandle<()>,
}

impl RefreshHandle {
    /// Stop the scheduler and wait for the loop to exit. In-flight
    /// refresh fan-outs are left to finish on their own deadlines.
    pub async fn stop(self) {
        self.stop.cancel();
        let _ = self.task.await;
    }
}

impl Volare {
    /// Start the periodic refresh scheduler.
    #[must_use]
    pub fn start_refresh_scheduler(&self, cfg: RefreshConfig) -> RefreshHandle {
        let inner = std::sync::Arc::clone(&self.inner);
        let stop = CancelFlag::new();
        let stop_signal = stop.clone();
        let task = tokio::spawn(async move {
            loop {
                let today = Utc::now().date_naive();
                let routes: Vec<_> = inner.popularity.top_routes().copied().collect();
                for route in routes {
                    for days in &cfg.horizons_days {
                        let Some(departure) = today.checked_add_days(Days::new(*days)) else {
                            continue;
                        };
                        let Ok(query) =
                            Query::builder(route.origin, route.destination, departure)
                                .currency(cfg.currency)
                                .build_against(today)
                        else {
                            continue;
                        };
                        // Fresh entries do not need a sweep; stale and
                        // missing ones do. `spawn_refresh` dedups against
                        // in-flight refreshes, making reissues no-ops.
                        if let Some((_, crate::cache::Freshness::Fresh)) =
                            inner.cache.get(&query.key()).await
                        {
                            continue;
                        }
                        let _ = inner.spawn_refresh(query);
                    }
                }
                tokio::select! {
                    () = stop_signal.cancelled() => return,
                    () = tokio::time::sleep(cfg.interval) => {}
                }
            }
        });
        RefreshHandle { stop, task }
    }
}
