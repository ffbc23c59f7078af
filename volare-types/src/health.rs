//! Failure taxonomy and per-source health snapshots.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Classified failure kinds driving retry, escalation, and breaker policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FailureKind {
    /// Timeout, connection reset, or upstream 5xx.
    TransientNetwork,
    /// Upstream 429 or an exhausted local token bucket.
    RateLimited,
    /// WAF block, CAPTCHA, or similar bot challenge.
    BotChallenge,
    /// 401 after a previously valid token.
    AuthExpired,
    /// One offer in the payload was malformed; siblings were kept.
    ParseRecoverable,
    /// The root structure of the payload no longer parses.
    ParseUnusable,
    /// Valid response with zero offers.
    UpstreamEmpty,
    /// Deadline expiry or caller abort.
    Cancelled,
}

impl FailureKind {
    /// Whether this failure counts against the source's circuit breaker.
    ///
    /// Cancellations are our doing, not the upstream's; a single empty
    /// response is a legitimate answer and only degrades health when it
    /// repeats (the tracker applies that rule).
    #[must_use]
    pub const fn counts_against_breaker(self) -> bool {
        matches!(
            self,
            Self::TransientNetwork | Self::BotChallenge | Self::AuthExpired | Self::ParseUnusable
        )
    }

    /// Whether the executor may retry the source within the same request.
    #[must_use]
    pub const fn retryable(self) -> bool {
        matches!(self, Self::TransientNetwork)
    }

    /// Stable kebab-case label for logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient-network",
            Self::RateLimited => "rate-limited",
            Self::BotChallenge => "bot-challenge",
            Self::AuthExpired => "auth-expired",
            Self::ParseRecoverable => "parse-recoverable",
            Self::ParseUnusable => "parse-unusable",
            Self::UpstreamEmpty => "upstream-empty",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Circuit breaker state of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Cooldown elapsed; one probe call is allowed through.
    HalfOpen,
    /// Calls are short-circuited.
    Open,
}

/// Point-in-time view of a source's health, produced by the executor's
/// tracker and consumed by the router and operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHealthSnapshot {
    /// Success ratio over the rolling window, 0.0 when no samples exist.
    pub success_rate: f64,
    /// Number of samples behind `success_rate`.
    pub window_samples: u32,
    /// 95th-percentile latency over the window.
    pub p95_latency: Duration,
    /// Most recent classified failure, if any.
    pub last_failure: Option<FailureKind>,
    /// Current breaker state.
    pub circuit: CircuitState,
    /// Offers produced over the window, for coverage reconciliation.
    pub offers_produced: u64,
    /// Whole tokens left in the source's bucket, when rate limited.
    pub tokens_remaining: Option<u64>,
}

impl Default for SourceHealthSnapshot {
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            window_samples: 0,
            p95_latency: Duration::ZERO,
            last_failure: None,
            circuit: CircuitState::Closed,
            offers_produced: 0,
            tokens_remaining: None,
        }
    }
}
