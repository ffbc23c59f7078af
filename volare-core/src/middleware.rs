//! Middleware trait for wrapping `FareSource` implementations.

use std::any::TypeId;
use std::sync::Arc;

use crate::adapter::FareSource;
use crate::error::VolareError;

/// Validation context passed to middleware during stack validation,
/// ordered from outermost (closest to the orchestrator) to innermost
/// (closest to the raw source).
pub struct ValidationContext<'a> {
    stack: &'a [MiddlewareDescriptor],
    current_index: usize,
}

impl<'a> ValidationContext<'a> {
    /// Create a validation context for the middleware at `current_index`.
    #[must_use]
    pub const fn new(stack: &'a [MiddlewareDescriptor], current_index: usize) -> Self {
        Self {
            stack,
            current_index,
        }
    }

    /// Whether a middleware type exists anywhere in the stack.
    #[must_use]
    pub fn has_middleware(&self, type_id: TypeId) -> bool {
        self.stack.iter().any(|m| m.type_id() == type_id)
    }

    /// Whether a middleware type sits outer than (before) the current one.
    #[must_use]
    pub fn has_middleware_outer(&self, type_id: TypeId) -> bool {
        self.stack[..self.current_index]
            .iter()
            .any(|m| m.type_id() == type_id)
    }

    /// Whether a middleware type sits inner than (after) the current one.
    #[must_use]
    pub fn has_middleware_inner(&self, type_id: TypeId) -> bool {
        self.stack[self.current_index + 1..]
            .iter()
            .any(|m| m.type_id() == type_id)
    }
}

/// Internal descriptor tracking a middleware in a builder stack.
pub struct MiddlewareDescriptor {
    middleware: Box<dyn Middleware>,
    type_id: TypeId,
    name: &'static str,
}

impl MiddlewareDescriptor {
    /// Wrap a concrete middleware.
    pub fn new<M: Middleware + 'static>(middleware: M) -> Self {
        let name = middleware.name();
        Self {
            middleware: Box::new(middleware),
            type_id: TypeId::of::<M>(),
            name,
        }
    }

    /// Type id of the wrapped middleware.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Borrow the wrapped middleware.
    #[must_use]
    pub fn middleware(&self) -> &dyn Middleware {
        &*self.middleware
    }

    /// Consume the descriptor, extracting the boxed middleware.
    #[must_use]
    pub fn into_middleware(self) -> Box<dyn Middleware> {
        self.middleware
    }
}

/// Trait implemented by source middleware layers.
///
/// A middleware consumes an inner `FareSource` and returns a wrapped
/// source that augments or restricts behavior (rate limiting, recording).
pub trait Middleware: Send + Sync {
    /// Wrap the inner source.
    fn apply(self: Box<Self>, inner: Arc<dyn FareSource>) -> Arc<dyn FareSource>;

    /// Human-readable middleware name for introspection and logging.
    fn name(&self) -> &'static str;

    /// Opaque configuration snapshot for inspection.
    fn config_json(&self) -> serde_json::Value;

    /// Validate this middleware's position and dependencies in the stack.
    ///
    /// # Errors
    /// Return an error on missing dependencies or wrong ordering.
    fn validate(&self, _ctx: &ValidationContext<'_>) -> Result<(), VolareError> {
        Ok(())
    }
}
