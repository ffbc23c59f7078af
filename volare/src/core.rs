//! The `Volare` orchestrator and its builder.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::cache::SwrCache;
use crate::executor::health::HealthTracker;
use crate::history::{HistoryStore, InMemoryHistoryStore};
use volare_core::adapter::FareSource;
use volare_core::context::AdapterContext;
use volare_core::error::VolareError;
use volare_middleware::quota::RateLimitedSource;
use volare_types::config::{AdapterConfig, VolareConfig};
use volare_types::coverage::{CoverageTable, PopularityTable};
use volare_types::geo::AirportDirectory;
use volare_types::money::FxTable;
use volare_types::source::SourceKey;

/// Default cap on concurrent background refresh fan-outs, so bulk refresh
/// never starves interactive load.
const DEFAULT_REFRESH_CONCURRENCY: usize = 2;

pub(crate) struct SourceEntry {
    pub source: Arc<dyn FareSource>,
    /// Kept alongside the erased source so health snapshots can read the
    /// bucket level.
    pub limiter: Option<Arc<RateLimitedSource>>,
    pub config: AdapterConfig,
}

pub(crate) struct VolareInner {
    pub sources: Vec<SourceEntry>,
    pub cfg: VolareConfig,
    pub coverage: CoverageTable,
    pub popularity: PopularityTable,
    pub ctx: AdapterContext,
    pub health: HealthTracker,
    pub cache: SwrCache,
    pub history: Arc<dyn HistoryStore>,
    pub refresh_limiter: Arc<Semaphore>,
}

/// Orchestrator that routes searches across registered fare sources.
#[derive(Clone)]
pub struct Volare {
    pub(crate) inner: Arc<VolareInner>,
}

impl Volare {
    /// Start building a `Volare` instance.
    #[must_use]
    pub fn builder() -> VolareBuilder {
        VolareBuilder::new()
    }

    /// Health snapshots for every registered source, including the token
    /// bucket level where one is configured.
    #[must_use]
    pub fn source_health(&self) -> Vec<(SourceKey, volare_types::SourceHealthSnapshot)> {
        self.inner
            .sources
            .iter()
            .map(|entry| {
                let key = entry.source.key();
                let mut snap = self.inner.health.snapshot(key);
                snap.tokens_remaining = entry.limiter.as_ref().map(|l| l.tokens_remaining());
                (key, snap)
            })
            .collect()
    }
}

/// Builder for a [`Volare`] orchestrator.
pub struct VolareBuilder {
    sources: Vec<Arc<dyn FareSource>>,
    cfg: VolareConfig,
    coverage: CoverageTable,
    popularity: PopularityTable,
    airports: Option<Arc<AirportDirectory>>,
    fx: Option<Arc<FxTable>>,
    history: Option<Arc<dyn HistoryStore>>,
    refresh_concurrency: usize,
}

impl Default for VolareBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VolareBuilder {
    /// Builder with no sources and default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            cfg: VolareConfig::default(),
            coverage: CoverageTable::new(),
            popularity: PopularityTable::default(),
            airports: None,
            fx: None,
            history: None,
            refresh_concurrency: DEFAULT_REFRESH_CONCURRENCY,
        }
    }

    /// Register a fare source. Registration order is the tie-break for
    /// ordering within a tier.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn FareSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Replace the full configuration record.
    #[must_use]
    pub fn config(mut self, cfg: VolareConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Per-source configuration override, keyed by source name.
    #[must_use]
    pub fn adapter_config(mut self, name: impl Into<String>, cfg: AdapterConfig) -> Self {
        self.cfg.adapters.insert(name.into(), cfg);
        self
    }

    /// Route coverage table used for carrier-specific enrichment.
    #[must_use]
    pub fn coverage_table(mut self, table: CoverageTable) -> Self {
        self.coverage = table;
        self
    }

    /// Route popularity table driving cache TTLs and refresh seeding.
    #[must_use]
    pub fn popularity_table(mut self, table: PopularityTable) -> Self {
        self.popularity = table;
        self
    }

    /// Airport/airline directory; defaults to the embedded seed.
    #[must_use]
    pub fn airports(mut self, directory: Arc<AirportDirectory>) -> Self {
        self.airports = Some(directory);
        self
    }

    /// Stamped daily FX table; defaults to an identity table over the
    /// store currency (deployments should supply a real one).
    #[must_use]
    pub fn fx_table(mut self, fx: Arc<FxTable>) -> Self {
        self.fx = Some(fx);
        self
    }

    /// Price history store; defaults to the in-memory append-only store.
    #[must_use]
    pub fn history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(store);
        self
    }

    /// Cap on concurrent background refresh fan-outs.
    #[must_use]
    pub const fn refresh_concurrency(mut self, cap: usize) -> Self {
        self.refresh_concurrency = cap;
        self
    }

    /// Build the orchestrator.
    ///
    /// # Errors
    /// `InvalidConfig` when no sources are registered or when the
    /// configuration references unknown source names.
    pub fn build(self) -> Result<Volare, VolareError> {
        if self.sources.is_empty() {
            return Err(VolareError::InvalidConfig(
                "no sources registered; add at least one via with_source(...)".to_string(),
            ));
        }
        let known: HashSet<&'static str> = self.sources.iter().map(|s| s.name()).collect();
        let unknown: Vec<&String> = self
            .cfg
            .adapters
            .keys()
            .filter(|name| !known.contains(name.as_str()))
            .collect();
        if !unknown.is_empty() {
            let names: Vec<String> = unknown.iter().map(|s| (*s).clone()).collect();
            return Err(VolareError::InvalidConfig(format!(
                "adapter config references unknown sources: {}",
                names.join(", ")
            )));
        }

        let airports = self
            .airports
            .unwrap_or_else(|| Arc::new(AirportDirectory::with_seed()));
        let fx = self.fx.unwrap_or_else(|| {
            Arc::new(FxTable::identity(
                self.cfg.store_currency,
                chrono::Utc::now().date_naive(),
            ))
        });
        let ctx = AdapterContext::new(airports, fx, &self.cfg.proxy_pool);

        let mut entries = Vec::with_capacity(self.sources.len());
        for source in self.sources {
            let config = self.cfg.adapter(source.name());
            if !config.enabled {
                continue;
            }
            let (source, limiter): (Arc<dyn FareSource>, Option<Arc<RateLimitedSource>>) =
                match &config.rate_limit {
                    Some(rl) => {
                        let limited = Arc::new(RateLimitedSource::new(source, rl));
                        (limited.clone(), Some(limited))
                    }
                    None => (source, None),
                };
            entries.push(SourceEntry {
                source,
                limiter,
                config,
            });
        }
        if entries.is_empty() {
            return Err(VolareError::InvalidConfig(
                "all registered sources are disabled".to_string(),
            ));
        }

        let mut health = HealthTracker::new(self.cfg.circuit);
        for entry in &entries {
            if let Some(circuit) = entry.config.circuit {
                health.set_override(entry.source.key(), circuit);
            }
        }
        let cache = SwrCache::new(self.cfg.cache);
        let history = self
            .history
            .unwrap_or_else(|| Arc::new(InMemoryHistoryStore::new()));
        Ok(Volare {
            inner: Arc::new(VolareInner {
                sources: entries,
                cfg: self.cfg,
                coverage: self.coverage,
                popularity: self.popularity,
                ctx,
                health,
                cache,
                history,
                refresh_limiter: Arc::new(Semaphore::new(self.refresh_concurrency.max(1))),
            }),
        })
    }
}
