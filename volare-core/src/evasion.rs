//! Explicit anti-bot strategy ladders.
//!
//! Each source declares an ordered list of strategies. On a classified bot
//! challenge the executor advances the ladder one rung; the escalated rung
//! stays pinned for a configured number of requests and then decays one
//! rung at a time. Strategies are never raced in parallel for one request.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// One anti-bot measure a source can apply to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum EvasionStrategy {
    /// Plain shared HTTP client, no special measures.
    DirectClient,
    /// TLS-fingerprint-masked client impersonating a browser build.
    MaskedTls,
    /// Masked client plus pre-seeded consent cookies.
    ConsentCookies,
    /// Warm-up GET against the landing page before the real call.
    WarmupRequest,
    /// Signed mobile-API request.
    MobileSignature,
    /// Route through a leased residential proxy.
    ResidentialProxy,
    /// Harvest cookies from a real browser session first.
    BrowserCookieHarvest,
}

/// Requests an escalated strategy stays pinned for when the source does
/// not configure its own window.
pub const DEFAULT_STICKY_REQUESTS: u32 = 25;

#[derive(Debug)]
struct EvasionState {
    level: usize,
    sticky_remaining: u32,
}

/// Ordered strategy list with an observable escalation level.
#[derive(Debug)]
pub struct EvasionPolicy {
    strategies: Vec<EvasionStrategy>,
    sticky_for: u32,
    state: Mutex<EvasionState>,
}

impl EvasionPolicy {
    /// A ladder starting at its first strategy. `sticky_for` is how many
    /// requests an escalated level persists before decaying one rung.
    #[must_use]
    pub fn new(strategies: Vec<EvasionStrategy>, sticky_for: u32) -> Self {
        assert!(!strategies.is_empty(), "evasion ladder cannot be empty");
        Self {
            strategies,
            sticky_for,
            state: Mutex::new(EvasionState {
                level: 0,
                sticky_remaining: 0,
            }),
        }
    }

    /// Same ladder with a different sticky window.
    #[must_use]
    pub fn with_sticky_window(mut self, requests: u32) -> Self {
        self.sticky_for = requests;
        self
    }

    /// The strategy requests should currently use. Counts the request
    /// toward escalation decay.
    pub fn strategy_for_request(&self) -> EvasionStrategy {
        let mut state = self.state.lock().expect("mutex poisoned");
        if state.level > 0 {
            if state.sticky_remaining > 1 {
                state.sticky_remaining -= 1;
            } else {
                state.level -= 1;
                state.sticky_remaining = if state.level > 0 { self.sticky_for } else { 0 };
            }
        }
        self.strategies[state.level.min(self.strategies.len() - 1)]
    }

    /// Peek at the current strategy without consuming a request.
    #[must_use]
    pub fn current(&self) -> EvasionStrategy {
        let state = self.state.lock().expect("mutex poisoned");
        self.strategies[state.level.min(self.strategies.len() - 1)]
    }

    /// Escalate one rung after a classified bot challenge. Saturates at
    /// the last strategy.
    pub fn advance(&self) {
        let mut state = self.state.lock().expect("mutex poisoned");
        if state.level + 1 < self.strategies.len() {
            state.level += 1;
        }
        state.sticky_remaining = self.sticky_for;
    }

    /// Current escalation level (0 = first strategy).
    #[must_use]
    pub fn level(&self) -> usize {
        self.state.lock().expect("mutex poisoned").level
    }
}
