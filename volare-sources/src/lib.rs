//! volare-sources
//!
//! One adapter per upstream variant, all satisfying the
//! [`FareSource`](volare_core::FareSource) contract:
//!
//! - `metasearch`: binary query protocol over base64 GET, TLS-masked client.
//! - `aggregator`: plain REST with an API key.
//! - `tenant`: shared multi-brand JSON endpoint (one source per brand).
//! - `airline`: reverse-engineered mobile endpoints from a static manifest.
//! - `gds`: GDS shopping API over OAuth2.
//! - `official`: official partner API with client-credentials OAuth2.
//! - `browser`: real-browser automation through a DevTools session pool.
//!
//! Sources are built from an [`AdapterContext`](volare_core::AdapterContext)
//! plus shared HTTP clients; nothing in this crate owns process-wide state.

pub mod aggregator;
pub mod airline;
pub mod auth;
pub mod browser;
pub mod builder;
pub mod cdp;
pub mod gds;
pub mod http;
pub mod manifest;
pub mod metasearch;
pub mod official;
pub mod tenant;

pub use aggregator::AggregatorSource;
pub use airline::AirlineSource;
pub use builder::SourceBuilder;
pub use browser::{BrowserSession, BrowserSlot, BrowserSource, SessionFactory};
pub use gds::GdsSource;
pub use http::SharedClients;
pub use metasearch::MetasearchSource;
pub use official::OfficialApiSource;
pub use tenant::TenantSource;
