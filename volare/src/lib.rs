//! # volare
//!
//! Parallel multi-source flight fare crawling and merging.
//!
//! `Volare` fans a search out across heterogeneous upstream sources
//! (metasearch, aggregator APIs, airline endpoints, a GDS, browser
//! automation), folds the answers into one deduplicated offer set, and
//! serves interactive queries under first-response-wins semantics with a
//! stale-while-revalidate cache behind them.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use volare::Volare;
//!
//! let volare = Volare::builder()
//!     .with_source(metasearch)
//!     .with_source(aggregator)
//!     .coverage_table(coverage)
//!     .popularity_table(popularity)
//!     .build()?;
//!
//! let report = volare.search(&query).await?;
//! for offer in &report.offers {
//!     println!("{} from {}", offer.fingerprint(), offer.lowest_price().converted);
//! }
//! ```

pub mod cache;
pub mod core;
pub mod executor;
pub mod history;
pub mod refresh;
pub mod router;
mod search;

pub use crate::core::{Volare, VolareBuilder};
pub use crate::history::{HistoryStore, InMemoryHistoryStore};
pub use crate::refresh::{RefreshConfig, RefreshHandle};

pub use volare_core::error::VolareError;
pub use volare_types::{
    AdapterConfig, AdapterTier, CacheState, CacheTtlConfig, CircuitConfig, CircuitState,
    CoverageRule, CoverageTable, ExecutorConfig, FailureKind, PopularityTable, PriceHistoryRow,
    Query, QueryKey, RoutePopularity, RouteTier, SearchReport, SourceHealthSnapshot, SourceKey,
    VolareConfig,
};
