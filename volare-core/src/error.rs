//! Unified error type shared by the orchestrator and sources.

use std::time::Duration;

use thiserror::Error;
use volare_types::geo::AirportCode;
use volare_types::health::FailureKind;
use volare_types::money::MoneyError;
use volare_types::offer::OfferError;
use volare_types::query::QueryError;

/// Unified error type for the volare workspace.
///
/// Wraps capability mismatches, query validation failures, source-tagged
/// upstream failures with enough structure to classify them, and an
/// aggregate for exhausted fan-outs.
#[derive(Debug, Clone, Error)]
pub enum VolareError {
    /// The requested capability is not implemented by the target source.
    #[error("unsupported capability: {capability}")]
    Unsupported {
        /// Capability label describing what was requested.
        capability: &'static str,
    },

    /// The search request failed validation.
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    /// Configuration rejected at build time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No eligible source covers the requested route.
    #[error("no source covers route {origin}-{destination}")]
    NoRoute {
        /// Requested origin.
        origin: AirportCode,
        /// Requested destination.
        destination: AirportCode,
    },

    /// An individual source failed in an unclassified way.
    #[error("{source_name} failed: {msg}")]
    Source {
        /// Source name.
        source_name: String,
        /// Human-readable message.
        msg: String,
    },

    /// Timeout, connection reset, or upstream 5xx.
    #[error("{source_name} transient failure: {msg}")]
    Transient {
        /// Source name.
        source_name: String,
        /// Human-readable message.
        msg: String,
    },

    /// Upstream 429 or exhausted local token bucket.
    #[error("{source_name} rate limited, retry in {retry_in:?}")]
    RateLimited {
        /// Source name.
        source_name: String,
        /// Suggested wait before retrying.
        retry_in: Duration,
    },

    /// WAF block, CAPTCHA, or similar challenge.
    #[error("{source_name} hit a bot challenge: {detail}")]
    BotChallenge {
        /// Source name.
        source_name: String,
        /// What tripped the classifier.
        detail: String,
    },

    /// 401 after a previously valid token.
    #[error("{source_name} credentials expired")]
    AuthExpired {
        /// Source name.
        source_name: String,
    },

    /// Payload did not parse. `unusable` marks a broken root structure
    /// (likely an upstream format change) as opposed to one bad offer.
    #[error("{source_name} parse failure (unusable={unusable}): {detail}")]
    Parse {
        /// Source name.
        source_name: String,
        /// What failed to parse.
        detail: String,
        /// True when the whole payload is unusable.
        unusable: bool,
    },

    /// An individual source call exceeded its timeout budget.
    #[error("{source_name} timed out")]
    SourceTimeout {
        /// Source name.
        source_name: String,
    },

    /// The overall request exceeded its deadline.
    #[error("request timed out")]
    RequestTimeout,

    /// The request was cancelled before completion.
    #[error("cancelled")]
    Cancelled,

    /// A lease pool had nothing available within the deadline.
    #[error("{pool} pool exhausted")]
    PoolExhausted {
        /// Pool name.
        pool: &'static str,
    },

    /// All attempted sources failed; contains the individual failures.
    #[error("all sources failed: {0:?}")]
    AllSourcesFailed(Vec<VolareError>),

    /// Canonical offer assembly failed.
    #[error("offer invariant violated: {0}")]
    Offer(#[from] OfferError),

    /// Money or FX failure.
    #[error("money error: {0}")]
    Money(#[from] MoneyError),
}

impl VolareError {
    /// Helper: build an `Unsupported` error for a capability string.
    #[must_use]
    pub const fn unsupported(capability: &'static str) -> Self {
        Self::Unsupported { capability }
    }

    /// Helper: build a `Source` error with the source name and message.
    pub fn source(source: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Source {
            source_name: source.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `Transient` error.
    pub fn transient(source: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transient {
            source_name: source.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a recoverable `Parse` error.
    pub fn parse_recoverable(source: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source.into(),
            detail: detail.into(),
            unusable: false,
        }
    }

    /// Helper: build an unusable `Parse` error.
    pub fn parse_unusable(source: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source.into(),
            detail: detail.into(),
            unusable: true,
        }
    }

    /// Helper: build a `SourceTimeout` error.
    pub fn source_timeout(source: impl Into<String>) -> Self {
        Self::SourceTimeout {
            source_name: source.into(),
        }
    }

    /// Map this error onto the failure taxonomy used by health tracking,
    /// retries, and anti-bot escalation.
    #[must_use]
    pub fn classify(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::BotChallenge { .. } => FailureKind::BotChallenge,
            Self::AuthExpired { .. } => FailureKind::AuthExpired,
            Self::Parse { unusable, .. } => {
                if *unusable {
                    FailureKind::ParseUnusable
                } else {
                    FailureKind::ParseRecoverable
                }
            }
            Self::Cancelled | Self::RequestTimeout => FailureKind::Cancelled,
            Self::Offer(_) | Self::Money(_) => FailureKind::ParseRecoverable,
            _ => FailureKind::TransientNetwork,
        }
    }
}

/// Tag an untagged error with the source it came from, leaving already
/// source-shaped errors intact.
#[must_use]
pub fn tag_err(source: &str, e: VolareError) -> VolareError {
    match e {
        e @ (VolareError::Source { .. }
        | VolareError::Transient { .. }
        | VolareError::RateLimited { .. }
        | VolareError::BotChallenge { .. }
        | VolareError::AuthExpired { .. }
        | VolareError::Parse { .. }
        | VolareError::SourceTimeout { .. }
        | VolareError::RequestTimeout
        | VolareError::Cancelled
        | VolareError::NoRoute { .. }
        | VolareError::AllSourcesFailed(_)) => e,
        other => VolareError::Source {
            source_name: source.to_string(),
            msg: other.to_string(),
        },
    }
}
