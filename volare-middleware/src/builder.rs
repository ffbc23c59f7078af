//! Builder for composing a fare source with middleware layers.
//!
//! Layers are stored outermost-first and applied in reverse, so
//! `layers[0](layers[1](...(raw)))` is what calls flow through. By
//! policy the cooldown gate is outermost and the rate limiter innermost:
//! a gated call must not burn tokens, and the gate must see the bucket's
//! answers. The layers themselves enforce that ordering during
//! validation, so hand-assembled stacks cannot silently invert it.

use std::sync::Arc;
use std::time::Duration;

use volare_core::adapter::FareSource;
use volare_core::error::VolareError;
use volare_core::middleware::{Middleware, MiddlewareDescriptor, ValidationContext};
use volare_types::config::RateLimitConfig;

/// Generic builder composing a raw source with layered wrappers.
pub struct SourceStackBuilder {
    raw: Arc<dyn FareSource>,
    /// Middleware layers in outermost-first order.
    layers: Vec<MiddlewareDescriptor>,
}

impl SourceStackBuilder {
    /// Start from a raw, unwrapped source.
    #[must_use]
    pub fn new(raw: Arc<dyn FareSource>) -> Self {
        Self {
            raw,
            layers: Vec::new(),
        }
    }

    fn enforce_ordering(&mut self) {
        // Cooldown gate outermost, rate limiting innermost; anything else
        // keeps insertion order between them.
        self.layers.sort_by_key(|d| match d.name() {
            "CooldownSource" => 0,
            "RateLimitedSource" => 2,
            _ => 1,
        });
    }

    /// Add or replace the token bucket.
    #[must_use]
    pub fn with_rate_limit(mut self, cfg: &RateLimitConfig) -> Self {
        self.layers.retain(|d| d.name() != "RateLimitedSource");
        self.layers.push(MiddlewareDescriptor::new(
            crate::quota::RateLimitMiddleware::new(*cfg),
        ));
        self.enforce_ordering();
        self
    }

    /// Remove the token bucket if present.
    #[must_use]
    pub fn without_rate_limit(mut self) -> Self {
        self.layers.retain(|d| d.name() != "RateLimitedSource");
        self
    }

    /// Add or replace the rate-limit cooldown gate.
    #[must_use]
    pub fn with_cooldown(mut self, default_cooldown: Duration) -> Self {
        self.layers.retain(|d| d.name() != "CooldownSource");
        self.layers.push(MiddlewareDescriptor::new(
            crate::cooldown::CooldownMiddleware::new(default_cooldown),
        ));
        self.enforce_ordering();
        self
    }

    /// Remove the cooldown gate if present.
    #[must_use]
    pub fn without_cooldown(mut self) -> Self {
        self.layers.retain(|d| d.name() != "CooldownSource");
        self
    }

    /// Add an arbitrary layer at the outermost position.
    #[must_use]
    pub fn layer<M: Middleware + 'static>(mut self, layer: M) -> Self {
        self.layers.insert(0, MiddlewareDescriptor::new(layer));
        self
    }

    /// Validate the stack without building.
    ///
    /// # Errors
    /// The first middleware validation failure.
    pub fn validate(&self) -> Result<(), VolareError> {
        for (idx, desc) in self.layers.iter().enumerate().rev() {
            let ctx = ValidationContext::new(&self.layers, idx);
            desc.middleware().validate(&ctx)?;
        }
        Ok(())
    }

    /// Validate and build the wrapped source.
    ///
    /// # Errors
    /// The first middleware validation failure.
    pub fn build(self) -> Result<Arc<dyn FareSource>, VolareError> {
        self.validate()?;
        let mut acc: Arc<dyn FareSource> = Arc::clone(&self.raw);
        for desc in self.layers.into_iter().rev() {
            acc = desc.into_middleware().apply(acc);
        }
        Ok(acc)
    }
}
