//! volare-core
//!
//! Core types, traits, and utilities shared across the volare ecosystem.
//!
//! - `adapter`: the `FareSource` contract and fetch context.
//! - `raw`: tagged raw payloads emitted by sources before normalization.
//! - `normalize`: the pure per-payload normalizer.
//! - `merge`: deduplication and price merging over canonical offers.
//! - `evasion`: explicit anti-bot strategy lists.
//! - `pool`: scoped-lease pools for browsers and proxies.
//! - `error`: the unified error type.
#![warn(missing_docs)]

pub mod adapter;
pub mod context;
pub mod error;
pub mod evasion;
pub mod merge;
pub mod middleware;
pub mod normalize;
pub mod pool;
pub mod raw;

pub use adapter::{CancelFlag, Deadline, FareSource, FetchContext};
pub use context::AdapterContext;
pub use error::{VolareError, tag_err};
pub use evasion::{DEFAULT_STICKY_REQUESTS, EvasionPolicy, EvasionStrategy};
pub use merge::{merge_offers, source_mix};
pub use middleware::{Middleware, MiddlewareDescriptor, ValidationContext};
pub use normalize::{NormalizeContext, map_cabin};
pub use pool::{Lease, LeasePool};
pub use raw::{RawOffer, RawPayload};

// Re-export the DTO layer so downstream crates can depend on volare-core
// alone, mirroring how the rest of the workspace consumes these types.
pub use volare_types as types;
pub use volare_types::*;
