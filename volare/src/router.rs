//! Source routing: which sources a query fans out to, and in which tier.
//!
//! Selection rules, applied in order:
//! 1. Sources with an open breaker are skipped; once the cooldown has
//!    elapsed the invocation doubles as the half-open probe.
//! 2. Sources under 50% recent success are demoted to the fallback tier.
//! 3. The coverage table is authoritative for carrier enrichment: a
//!    source directly serving a carrier expected on the route is forced
//!    into the primary tier, demotion notwithstanding.

use std::sync::Arc;

use crate::core::VolareInner;
use crate::executor::health::CircuitDecision;
use volare_core::adapter::FareSource;
use volare_core::error::VolareError;
use volare_types::config::AdapterConfig;
use volare_types::query::Query;
use volare_types::source::AdapterTier;

/// Demotion threshold on the rolling success rate.
const DEMOTION_RATE: f64 = 0.5;
/// Demotion needs at least this many samples to act on.
const DEMOTION_MIN_SAMPLES: u32 = 4;

/// One planned invocation.
pub(crate) struct PlannedSource {
    pub source: Arc<dyn FareSource>,
    pub config: AdapterConfig,
    pub tier: AdapterTier,
    /// True when this invocation is a half-open breaker probe.
    pub probe: bool,
}

impl VolareInner {
    /// Compute the fan-out plan for a query, ordered primary,
    /// complementary, fallback; registration order within a tier.
    ///
    /// # Errors
    /// `NoRoute` when no source is eligible at all.
    pub(crate) fn plan(&self, query: &Query) -> Result<Vec<PlannedSource>, VolareError> {
        let expected = match (
            self.ctx.airports.region_of(query.origin),
            self.ctx.airports.region_of(query.destination),
        ) {
            (Some(o), Some(d)) => self.coverage.expected_carriers(o, d, query.cabin),
            _ => &[],
        };

        let mut planned = Vec::new();
        for entry in &self.sources {
            let key = entry.source.key();
            let probe = match self.health.allow(key) {
                CircuitDecision::Allow => false,
                CircuitDecision::Probe => true,
                CircuitDecision::Skip => continue,
            };

            let mut tier = entry
                .config
                .tier_override
                .pinned()
                .unwrap_or_else(|| entry.source.kind().default_tier());

            let snapshot_rate = self.health.success_rate(key);
            let samples = self.health.snapshot(key).window_samples;
            if snapshot_rate.is_some_and(|r| r < DEMOTION_RATE) && samples >= DEMOTION_MIN_SAMPLES
            {
                tier = AdapterTier::Fallback;
            }

            if expected
                .iter()
                .any(|carrier| entry.source.serves_carrier(carrier))
            {
                tier = AdapterTier::Primary;
            }

            planned.push(PlannedSource {
                source: Arc::clone(&entry.source),
                config: entry.config.clone(),
                tier,
                probe,
            });
        }

        if planned.is_empty() {
            return Err(VolareError::NoRoute {
                origin: query.origin,
                destination: query.destination,
            });
        }
        let tier_rank = |t: AdapterTier| match t {
            AdapterTier::Primary => 0u8,
            AdapterTier::Complementary => 1,
            AdapterTier::Fallback => 2,
        };
        planned.sort_by_key(|p| tier_rank(p.tier));
        Ok(planned)
    }
}
