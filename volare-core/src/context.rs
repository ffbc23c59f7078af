//! Shared environment injected into sources at construction time.

use std::sync::Arc;

use crate::pool::LeasePool;
use volare_types::config::ProxyPoolConfig;
use volare_types::geo::AirportDirectory;
use volare_types::money::FxTable;

/// One residential proxy endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint(pub String);

/// Environment shared by every source: reference data and leasable
/// resources. Owned by the orchestrator builder and injected into source
/// constructors; sources never reach for process-wide singletons.
#[derive(Clone)]
pub struct AdapterContext {
    /// Airport and airline directory.
    pub airports: Arc<AirportDirectory>,
    /// Stamped daily FX table.
    pub fx: Arc<FxTable>,
    /// Residential proxies, leased per request for browser automation and
    /// challenge retries; rotation happens on each lease.
    pub proxies: LeasePool<ProxyEndpoint>,
}

impl AdapterContext {
    /// Build the shared environment.
    #[must_use]
    pub fn new(airports: Arc<AirportDirectory>, fx: Arc<FxTable>, proxies: &ProxyPoolConfig) -> Self {
        // The pool size is the concurrency cap: leases beyond it queue.
        let cap = if proxies.max_concurrent == 0 {
            proxies.proxies.len()
        } else {
            proxies.max_concurrent.min(proxies.proxies.len())
        };
        let endpoints = proxies.proxies.iter().take(cap).cloned().map(ProxyEndpoint);
        Self {
            airports,
            fx,
            proxies: LeasePool::new("proxy", endpoints),
        }
    }
}

impl std::fmt::Debug for AdapterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterContext")
            .field("airports", &self.airports.airport_count())
            .field("fx_stamp", &self.fx.stamped_on)
            .field("proxies_available", &self.proxies.available())
            .finish()
    }
}
