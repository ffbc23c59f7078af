//! Convenience constructors wiring sources with their vendor-documented
//! rate limits through the generic middleware stack.

use std::sync::Arc;
use std::time::Duration;

use volare_core::adapter::FareSource;
use volare_middleware::SourceStackBuilder;
use volare_types::config::RateLimitConfig;

use crate::aggregator::AggregatorSource;
use crate::gds::GdsSource;

/// Builder type alias specialized for upstream sources.
pub type SourceBuilder = SourceStackBuilder;

impl AggregatorSource {
    /// Builder with the aggregator's documented 5 req/s budget applied,
    /// plus a cooldown gate honoring its `Retry-After` answers.
    ///
    /// Customize further before calling `.build()`.
    #[must_use]
    pub fn rate_limited(self) -> SourceBuilder {
        let raw: Arc<dyn FareSource> = Arc::new(self);
        SourceStackBuilder::new(raw)
            .with_rate_limit(&RateLimitConfig {
                capacity: 5,
                refill_per_sec: 5.0,
            })
            .with_cooldown(Duration::from_secs(60))
    }
}

impl GdsSource {
    /// Builder with the vendor's 5 req/s budget applied and a cooldown
    /// gate for its 429 windows. The 1000 req/h ceiling maps onto the
    /// refill rate of a second, coarser bucket in deployment config; the
    /// per-second bucket is what protects the SDK.
    #[must_use]
    pub fn rate_limited(self) -> SourceBuilder {
        let raw: Arc<dyn FareSource> = Arc::new(self);
        SourceStackBuilder::new(raw)
            .with_rate_limit(&RateLimitConfig {
                capacity: 5,
                refill_per_sec: 5.0,
            })
            .with_cooldown(Duration::from_secs(60))
    }
}
