//! Static manifest of reverse-engineered airline endpoints.
//!
//! Each entry records what traffic inspection established about one
//! airline's undocumented JSON endpoint: path, warm-up requirement,
//! channel header, and whether requests must carry the mobile HMAC
//! signature. Hosts are per-deployment configuration; everything else is
//! checked into the repo so changes are reviewable.

/// How one airline endpoint authenticates requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirlineAuth {
    /// No extra measures beyond the masked client.
    None,
    /// A `channel` header with a fixed code.
    ChannelCode(&'static str),
    /// The mobile-app HMAC-SHA256 signature scheme.
    MobileSignature,
}

/// One reverse-engineered endpoint.
#[derive(Debug, Clone, Copy)]
pub struct AirlineEndpoint {
    /// Manifest id, stable across renames of the airline.
    pub id: &'static str,
    /// Source name registered with the orchestrator.
    pub source_name: &'static str,
    /// Carrier the endpoint belongs to.
    pub carrier: &'static str,
    /// Search path relative to the host.
    pub search_path: &'static str,
    /// Landing path fetched first to prime cookies, when required.
    pub warmup_path: Option<&'static str>,
    /// Auth measures.
    pub auth: AirlineAuth,
    /// HTTP verb: true for POST with a JSON body, false for GET.
    pub post: bool,
}

/// Every endpoint currently known to work.
pub const AIRLINE_ENDPOINTS: &[AirlineEndpoint] = &[
    AirlineEndpoint {
        id: "vj-mobile",
        source_name: "airline-vj",
        carrier: "VJ",
        search_path: "/api/v3/flights/search",
        warmup_path: None,
        auth: AirlineAuth::MobileSignature,
        post: true,
    },
    AirlineEndpoint {
        id: "cebu-web",
        source_name: "airline-5j",
        carrier: "5J",
        search_path: "/searchavailability",
        warmup_path: Some("/"),
        auth: AirlineAuth::ChannelCode("MOBILE_WEB"),
        post: true,
    },
    AirlineEndpoint {
        id: "peach-web",
        source_name: "airline-mm",
        carrier: "MM",
        search_path: "/api/flight/search",
        warmup_path: Some("/booking"),
        auth: AirlineAuth::None,
        post: false,
    },
];

/// Look up an endpoint by manifest id.
#[must_use]
pub fn endpoint(id: &str) -> Option<&'static AirlineEndpoint> {
    AIRLINE_ENDPOINTS.iter().find(|e| e.id == id)
}
