//! Stale-while-revalidate result cache.
//!
//! Entries are immutable `Arc`s swapped atomically on refresh; freshness
//! is derived at read time from the entry's age and its route tier's
//! TTLs. Concurrent synchronous fan-outs for one key coalesce through the
//! store's single-flight loader: the second caller subscribes to the
//! first's result instead of crawling again.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use moka::future::Cache;

use volare_core::error::VolareError;
use volare_types::config::CacheTtlConfig;
use volare_types::offer::Offer;
use volare_types::query::QueryKey;
use volare_types::reports::{SourceMix, SourceWarning};
use volare_types::source::RouteTier;

/// One cached result set for a query key.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Merged offers.
    pub offers: Vec<Offer>,
    /// Offers contributed per source.
    pub source_mix: SourceMix,
    /// Warnings from the crawl that produced this entry.
    pub warnings: Vec<SourceWarning>,
    /// When the crawl finished.
    pub generated_at: Instant,
    /// Route tier, fixing the TTLs.
    pub tier: RouteTier,
    /// True while background sources from the producing crawl are still
    /// running; the entry will be superseded when they finish.
    pub partial: bool,
}

/// Read-time freshness of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Inside the fresh TTL.
    Fresh,
    /// Past fresh but inside the stale TTL: serve and revalidate.
    Stale,
}

/// SWR cache over query keys.
pub struct SwrCache {
    store: Cache<QueryKey, Arc<CacheEntry>>,
    ttls: CacheTtlConfig,
    refreshing: Mutex<HashSet<QueryKey>>,
}

impl SwrCache {
    /// Cache bounded by the largest stale TTL.
    #[must_use]
    pub fn new(ttls: CacheTtlConfig) -> Self {
        let store = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(ttls.max_stale())
            .build();
        Self {
            store,
            ttls,
            refreshing: Mutex::new(HashSet::new()),
        }
    }

    /// Look an entry up, reporting its freshness. Entries past their
    /// stale TTL are dropped and reported as a miss.
    pub async fn get(&self, key: &QueryKey) -> Option<(Arc<CacheEntry>, Freshness)> {
        let entry = self.store.get(key).await?;
        let (fresh, stale) = self.ttls.ttls_for(entry.tier);
        let age = entry.generated_at.elapsed();
        if age < fresh {
            Some((entry, Freshness::Fresh))
        } else if age < stale {
            Some((entry, Freshness::Stale))
        } else {
            self.store.invalidate(key).await;
            None
        }
    }

    /// Load-or-insert with single-flight semantics: concurrent callers
    /// for the same key share one loader run.
    ///
    /// # Errors
    /// The loader's error, shared by every coalesced caller.
    pub async fn get_or_load<F, Fut>(
        &self,
        key: QueryKey,
        loader: F,
    ) -> Result<Arc<CacheEntry>, VolareError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheEntry, VolareError>>,
    {
        self.store
            .try_get_with(key, async move { loader().await.map(Arc::new) })
            .await
            .map_err(|shared: Arc<VolareError>| (*shared).clone())
    }

    /// Atomically swap the entry for a key.
    pub async fn insert(&self, key: QueryKey, entry: CacheEntry) {
        self.store.insert(key, Arc::new(entry)).await;
    }

    /// Claim the refresh slot for a key. Returns false when a refresh is
    /// already in flight, making re-enqueues no-ops.
    pub fn begin_refresh(&self, key: &QueryKey) -> bool {
        self.refreshing
            .lock()
            .expect("mutex poisoned")
            .insert(key.clone())
    }

    /// Release the refresh slot.
    pub fn end_refresh(&self, key: &QueryKey) {
        self.refreshing.lock().expect("mutex poisoned").remove(key);
    }

    /// Whether a refresh is currently claimed for the key.
    #[must_use]
    pub fn is_refreshing(&self, key: &QueryKey) -> bool {
        self.refreshing
            .lock()
            .expect("mutex poisoned")
            .contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use volare_types::reports::SourceMix;

    fn entry(tier: RouteTier, age: Duration) -> CacheEntry {
        CacheEntry {
            offers: Vec::new(),
            source_mix: SourceMix::new(),
            warnings: Vec::new(),
            generated_at: Instant::now() - age,
            tier,
            partial: false,
        }
    }

    fn key(days_out: u64) -> QueryKey {
        use chrono::{Days, Utc};
        use volare_types::geo::AirportCode;
        use volare_types::query::Query;

        Query::builder(
            AirportCode::parse("ICN").unwrap(),
            AirportCode::parse("NRT").unwrap(),
            Utc::now()
                .date_naive()
                .checked_add_days(Days::new(days_out))
                .unwrap(),
        )
        .build()
        .unwrap()
        .key()
    }

    #[tokio::test]
    async fn freshness_follows_tier_ttls() {
        let cache = SwrCache::new(CacheTtlConfig::default());
        let k = key(10);
        cache.insert(k.clone(), entry(RouteTier::Top, Duration::ZERO)).await;
        let (_, fresh) = cache.get(&k).await.unwrap();
        assert_eq!(fresh, Freshness::Fresh);

        let k2 = key(11);
        cache
            .insert(k2.clone(), entry(RouteTier::Top, Duration::from_secs(6 * 60)))
            .await;
        let (_, state) = cache.get(&k2).await.unwrap();
        assert_eq!(state, Freshness::Stale);

        let k3 = key(12);
        cache
            .insert(k3.clone(), entry(RouteTier::Top, Duration::from_secs(20 * 60)))
            .await;
        assert!(cache.get(&k3).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_miss_loads_coalesce() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let cache = Arc::new(SwrCache::new(CacheTtlConfig::default()));
        let loads = Arc::new(AtomicU32::new(0));
        let k = key(20);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            let k = k.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load(k, || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(entry(RouteTier::Top, Duration::ZERO))
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn refresh_claims_deduplicate() {
        let cache = SwrCache::new(CacheTtlConfig::default());
        let k = key(30);
        assert!(cache.begin_refresh(&k));
        assert!(!cache.begin_refresh(&k));
        assert!(cache.is_refreshing(&k));
        cache.end_refresh(&k);
        assert!(cache.begin_refresh(&k));
    }
}
