//! Configuration records shared by the orchestrator and sources.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::money::Currency;
use crate::source::{AdapterTier, RouteTier};

/// Token-bucket parameters for one source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum tokens the bucket holds.
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            refill_per_sec: 5.0,
        }
    }
}

/// Credentials a source authenticates with.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CredentialsConfig {
    /// No credentials required.
    #[default]
    None,
    /// Static API key sent per request.
    ApiKey {
        /// The key value.
        key: String,
    },
    /// OAuth2 client credentials.
    Oauth {
        /// Client identifier.
        client_id: String,
        /// Client secret.
        client_secret: String,
        /// Token endpoint.
        token_url: String,
    },
    /// Shared tenant key for multi-brand endpoints.
    Tenant {
        /// Tenant identifier shared across brands.
        tenant_key: String,
    },
}

/// Tier pinning for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TierOverride {
    /// Let the router decide from source kind, coverage, and health.
    #[default]
    Auto,
    /// Pin to primary.
    Primary,
    /// Pin to complementary.
    Complementary,
    /// Pin to fallback.
    Fallback,
}

impl TierOverride {
    /// The pinned tier, if any.
    #[must_use]
    pub const fn pinned(self) -> Option<AdapterTier> {
        match self {
            Self::Auto => None,
            Self::Primary => Some(AdapterTier::Primary),
            Self::Complementary => Some(AdapterTier::Complementary),
            Self::Fallback => Some(AdapterTier::Fallback),
        }
    }
}

/// Per-source configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Whether the source participates in fan-outs at all.
    pub enabled: bool,
    /// Token bucket; `None` disables local rate limiting.
    pub rate_limit: Option<RateLimitConfig>,
    /// Per-call timeout for this source.
    pub timeout: Duration,
    /// Tier pinning.
    pub tier_override: TierOverride,
    /// Credentials.
    pub credentials: CredentialsConfig,
    /// Breaker tuning override; `None` inherits the global circuit
    /// configuration.
    pub circuit: Option<CircuitConfig>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_limit: Some(RateLimitConfig::default()),
            timeout: Duration::from_secs(3),
            tier_override: TierOverride::Auto,
            credentials: CredentialsConfig::None,
            circuit: None,
        }
    }
}

/// Circuit breaker tuning, per source unless overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive breaker-counted failures before opening.
    pub failure_threshold: u32,
    /// Window the consecutive failures must fall within.
    pub window: Duration,
    /// Cooldown before an open breaker allows a half-open probe.
    pub cooldown: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Fan-out executor tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Hard deadline for interactive requests.
    pub interactive_deadline: Duration,
    /// Deadline for background refresh fan-outs.
    pub background_deadline: Duration,
    /// Grace window after the first useful result before an interactive
    /// response is returned, to let near-simultaneous sources merge.
    pub first_response_grace: Duration,
    /// Sub-deadline after which fallback-tier sources are dispatched when
    /// primary + complementary have produced nothing.
    pub fallback_after: Duration,
    /// Capacity of the source-event channel.
    pub event_buffer: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interactive_deadline: Duration::from_secs(4),
            background_deadline: Duration::from_secs(60),
            first_response_grace: Duration::from_millis(200),
            fallback_after: Duration::from_millis(1500),
            event_buffer: 64,
        }
    }
}

/// Cache TTLs per route tier: fresh window, then a stale window during
/// which entries are served while a refresh runs in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTtlConfig {
    /// Fresh TTL for top routes.
    pub top_fresh: Duration,
    /// Stale TTL for top routes.
    pub top_stale: Duration,
    /// Fresh TTL for medium routes.
    pub medium_fresh: Duration,
    /// Stale TTL for medium routes.
    pub medium_stale: Duration,
    /// Fresh TTL for long-tail routes.
    pub long_tail_fresh: Duration,
    /// Stale TTL for long-tail routes.
    pub long_tail_stale: Duration,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            top_fresh: Duration::from_secs(5 * 60),
            top_stale: Duration::from_secs(15 * 60),
            medium_fresh: Duration::from_secs(30 * 60),
            medium_stale: Duration::from_secs(6 * 3600),
            long_tail_fresh: Duration::from_secs(6 * 3600),
            long_tail_stale: Duration::from_secs(24 * 3600),
        }
    }
}

impl CacheTtlConfig {
    /// `(fresh, stale)` TTLs for a route tier.
    #[must_use]
    pub const fn ttls_for(&self, tier: RouteTier) -> (Duration, Duration) {
        match tier {
            RouteTier::Top => (self.top_fresh, self.top_stale),
            RouteTier::Medium => (self.medium_fresh, self.medium_stale),
            RouteTier::LongTail => (self.long_tail_fresh, self.long_tail_stale),
        }
    }

    /// The longest stale TTL, used as the eviction bound of the store.
    #[must_use]
    pub fn max_stale(&self) -> Duration {
        self.top_stale.max(self.medium_stale).max(self.long_tail_stale)
    }
}

/// Browser pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserPoolConfig {
    /// Number of long-lived browser instances.
    pub size: usize,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self { size: 2 }
    }
}

/// Residential proxy pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyPoolConfig {
    /// Proxy endpoints to rotate through.
    pub proxies: Vec<String>,
    /// Maximum proxies leased concurrently.
    pub max_concurrent: usize,
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        Self {
            proxies: Vec::new(),
            max_concurrent: 4,
        }
    }
}

/// Exponential backoff configuration for in-request transient retries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Minimum backoff delay in milliseconds.
    pub min_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Exponential factor applied after each failure (>= 1).
    pub factor: u32,
    /// Random jitter percentage [0, 100] added to each delay.
    pub jitter_percent: u8,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff_ms: 100,
            max_backoff_ms: 2_000,
            factor: 2,
            jitter_percent: 20,
        }
    }
}

/// Global configuration for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolareConfig {
    /// Per-source overrides, keyed by source name.
    pub adapters: HashMap<String, AdapterConfig>,
    /// Cache TTLs per route tier.
    pub cache: CacheTtlConfig,
    /// Executor deadlines and grace windows.
    pub executor: ExecutorConfig,
    /// Default breaker tuning.
    pub circuit: CircuitConfig,
    /// Browser pool sizing.
    pub browser_pool: BrowserPoolConfig,
    /// Proxy pool.
    pub proxy_pool: ProxyPoolConfig,
    /// Retry backoff.
    pub backoff: BackoffConfig,
    /// Currency history rows are stored in.
    pub store_currency: Currency,
}

impl Default for VolareConfig {
    fn default() -> Self {
        Self {
            adapters: HashMap::new(),
            cache: CacheTtlConfig::default(),
            executor: ExecutorConfig::default(),
            circuit: CircuitConfig::default(),
            browser_pool: BrowserPoolConfig::default(),
            proxy_pool: ProxyPoolConfig::default(),
            backoff: BackoffConfig::default(),
            store_currency: Currency::USD,
        }
    }
}

impl VolareConfig {
    /// Per-source config, falling back to defaults for unknown names.
    #[must_use]
    pub fn adapter(&self, name: &str) -> AdapterConfig {
        self.adapters.get(name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttls_follow_route_tier() {
        let cfg = CacheTtlConfig::default();
        let (fresh, stale) = cfg.ttls_for(RouteTier::Top);
        assert_eq!(fresh, Duration::from_secs(300));
        assert_eq!(stale, Duration::from_secs(900));
        assert_eq!(cfg.max_stale(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = VolareConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: VolareConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.executor, cfg.executor);
        assert_eq!(back.circuit, cfg.circuit);
    }
}
