//! Source identity, kinds, trust scores, and tier assignments.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Typed key identifying a source in configuration and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey(pub &'static str);

impl SourceKey {
    /// Construct a typed source key from a static name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the inner static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl From<SourceKey> for &'static str {
    fn from(k: SourceKey) -> Self {
        k.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Upstream variant a source implements. Behavior differs per kind; the
/// adapter contract is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SourceKind {
    /// Binary-encoded metasearch endpoint behind a consent wall.
    Metasearch,
    /// Third-party aggregator REST API with an API key.
    AggregatorApi,
    /// Shared-tenant JSON endpoint serving several airline brands.
    SharedTenant,
    /// Undocumented per-airline JSON endpoint found via traffic inspection.
    AirlineDirect,
    /// GDS SDK over OAuth2.
    Gds,
    /// Headless-browser automation of a site with no usable API.
    BrowserAutomation,
    /// Official partner API with OAuth2 client credentials.
    OfficialApi,
}

impl SourceKind {
    /// Default fan-out tier for sources of this kind, before config
    /// overrides and router promotions/demotions.
    #[must_use]
    pub const fn default_tier(self) -> AdapterTier {
        match self {
            Self::Metasearch | Self::AggregatorApi => AdapterTier::Primary,
            Self::SharedTenant | Self::AirlineDirect | Self::Gds | Self::OfficialApi => {
                AdapterTier::Complementary
            }
            Self::BrowserAutomation => AdapterTier::Fallback,
        }
    }

    /// Default trust score for sources of this kind.
    #[must_use]
    pub const fn default_trust(self) -> TrustScore {
        match self {
            Self::AirlineDirect | Self::SharedTenant => TrustScore::DIRECT_AIRLINE,
            Self::OfficialApi => TrustScore::OFFICIAL_API,
            Self::Gds => TrustScore::GDS,
            Self::AggregatorApi => TrustScore::AGGREGATOR,
            Self::Metasearch => TrustScore::METASEARCH,
            Self::BrowserAutomation => TrustScore::BROWSER_SCRAPE,
        }
    }
}

/// Per-source trust used for tie-breaks when merging equally-priced offers
/// and for choosing non-price attributes across sources.
///
/// Fixed ordering: direct airline > official API > GDS > aggregator >
/// metasearch > browser scrape. The numeric gaps leave room for
/// calibration without reordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TrustScore(pub u8);

impl TrustScore {
    /// Data straight from the operating/marketing airline.
    pub const DIRECT_AIRLINE: Self = Self(100);
    /// Official partner API.
    pub const OFFICIAL_API: Self = Self(90);
    /// Global distribution system.
    pub const GDS: Self = Self(80);
    /// Third-party aggregator.
    pub const AGGREGATOR: Self = Self(70);
    /// Metasearch engine.
    pub const METASEARCH: Self = Self(60);
    /// Browser-scraped, used only when better sources failed.
    pub const BROWSER_SCRAPE: Self = Self(50);
}

/// Role a source plays in one fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdapterTier {
    /// Expected to have direct answers; always invoked.
    Primary,
    /// Covers gaps; always invoked in parallel with primary.
    Complementary,
    /// Invoked only if primary + complementary yield nothing within the
    /// fallback sub-deadline.
    Fallback,
}

/// Popularity class of a route, driving cache TTLs and refresh cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteTier {
    /// Top-100 popular routes.
    Top,
    /// Routes with steady but lower demand.
    Medium,
    /// Everything else.
    LongTail,
}
