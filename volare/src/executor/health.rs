//! Per-source health tracking and circuit breaking.
//!
//! The executor is the single writer: it records the outcome of every
//! invocation. The router and operators read consistent snapshots. The
//! breaker opens after N consecutive breaker-counted failures inside a
//! window W, allows one half-open probe after cooldown C, closes on a
//! probe success and reopens on a probe failure.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use volare_types::config::CircuitConfig;
use volare_types::health::{CircuitState, FailureKind, SourceHealthSnapshot};
use volare_types::source::SourceKey;

/// What the router should do with a source right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitDecision {
    /// Breaker closed: invoke normally.
    Allow,
    /// Breaker half-open: this invocation is the probe.
    Probe,
    /// Breaker open: skip the source.
    Skip,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    ok: bool,
    latency: Duration,
}

#[derive(Debug)]
struct SourceState {
    window: VecDeque<Sample>,
    consecutive_failures: u32,
    run_started: Option<Instant>,
    last_failure: Option<FailureKind>,
    circuit: CircuitState,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    offers_produced: u64,
    empty_streak: u32,
}

impl SourceState {
    fn new() -> Self {
        Self {
            window: VecDeque::new(),
            consecutive_failures: 0,
            run_started: None,
            last_failure: None,
            circuit: CircuitState::Closed,
            opened_at: None,
            probe_in_flight: false,
            offers_produced: 0,
            empty_streak: 0,
        }
    }
}

/// Empty responses only degrade health once they repeat this many times.
const EMPTY_STREAK_TOLERANCE: u32 = 3;

/// Rolling window for success-rate and latency statistics.
const STATS_WINDOW: Duration = Duration::from_secs(3600);

/// Health tracker for all registered sources.
pub struct HealthTracker {
    cfg: CircuitConfig,
    overrides: HashMap<&'static str, CircuitConfig>,
    sources: Mutex<HashMap<&'static str, SourceState>>,
}

impl HealthTracker {
    /// Tracker with every source healthy and closed.
    #[must_use]
    pub fn new(cfg: CircuitConfig) -> Self {
        Self {
            cfg,
            overrides: HashMap::new(),
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Pin breaker tuning for one source; others keep the default.
    pub fn set_override(&mut self, key: SourceKey, cfg: CircuitConfig) {
        self.overrides.insert(key.as_str(), cfg);
    }

    fn cfg_for(&self, key: &'static str) -> &CircuitConfig {
        self.overrides.get(key).unwrap_or(&self.cfg)
    }

    /// Decide whether the source may be invoked. Transitions an open
    /// breaker to half-open once the cooldown has elapsed; only one probe
    /// is outstanding at a time.
    pub fn allow(&self, key: SourceKey) -> CircuitDecision {
        let cooldown = self.cfg_for(key.as_str()).cooldown;
        let mut sources = self.sources.lock().expect("mutex poisoned");
        let state = sources.entry(key.as_str()).or_insert_with(SourceState::new);
        match state.circuit {
            CircuitState::Closed => CircuitDecision::Allow,
            CircuitState::Open => {
                let cooled = state
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= cooldown);
                if cooled {
                    state.circuit = CircuitState::HalfOpen;
                    state.probe_in_flight = true;
                    CircuitDecision::Probe
                } else {
                    CircuitDecision::Skip
                }
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    CircuitDecision::Skip
                } else {
                    state.probe_in_flight = true;
                    CircuitDecision::Probe
                }
            }
        }
    }

    /// Record a completed invocation that produced `offers` offers.
    pub fn record_success(&self, key: SourceKey, latency: Duration, offers: usize) {
        let mut sources = self.sources.lock().expect("mutex poisoned");
        let state = sources.entry(key.as_str()).or_insert_with(SourceState::new);
        state.probe_in_flight = false;
        state.consecutive_failures = 0;
        state.run_started = None;
        state.circuit = CircuitState::Closed;
        state.opened_at = None;
        state.offers_produced += offers as u64;

        // A single empty answer is a legitimate answer; repeated empties
        // degrade the success rate without touching the breaker.
        let effective_ok = if offers == 0 {
            state.empty_streak += 1;
            state.empty_streak < EMPTY_STREAK_TOLERANCE
        } else {
            state.empty_streak = 0;
            true
        };
        Self::push_sample(state, effective_ok, latency);
    }

    /// Record a failed invocation. Cancellations must be filtered out by
    /// the caller; they say nothing about the upstream.
    pub fn record_failure(&self, key: SourceKey, kind: FailureKind, latency: Duration) {
        let cfg = *self.cfg_for(key.as_str());
        let mut sources = self.sources.lock().expect("mutex poisoned");
        let state = sources.entry(key.as_str()).or_insert_with(SourceState::new);
        let was_probe = state.probe_in_flight;
        state.probe_in_flight = false;
        state.last_failure = Some(kind);
        Self::push_sample(state, false, latency);

        if !kind.counts_against_breaker() {
            return;
        }
        let now = Instant::now();
        match state.run_started {
            Some(started) if now.duration_since(started) <= cfg.window => {
                state.consecutive_failures += 1;
            }
            _ => {
                state.run_started = Some(now);
                state.consecutive_failures = 1;
            }
        }
        let opens = was_probe && state.circuit == CircuitState::HalfOpen
            || state.consecutive_failures >= cfg.failure_threshold;
        if opens {
            state.circuit = CircuitState::Open;
            state.opened_at = Some(now);
            state.consecutive_failures = 0;
            state.run_started = None;
        }
    }

    /// A probe invocation ended without a verdict (cancelled or skipped).
    /// Reopen the breaker so the next cooled `allow` probes again.
    pub fn abort_probe(&self, key: SourceKey) {
        let mut sources = self.sources.lock().expect("mutex poisoned");
        if let Some(state) = sources.get_mut(key.as_str())
            && state.probe_in_flight
        {
            state.probe_in_flight = false;
            if state.circuit == CircuitState::HalfOpen {
                state.circuit = CircuitState::Open;
            }
        }
    }

    fn push_sample(state: &mut SourceState, ok: bool, latency: Duration) {
        let now = Instant::now();
        state.window.push_back(Sample { at: now, ok, latency });
        while state
            .window
            .front()
            .is_some_and(|s| now.duration_since(s.at) > STATS_WINDOW)
        {
            state.window.pop_front();
        }
    }

    /// Success rate over the last hour, `None` without samples.
    #[must_use]
    pub fn success_rate(&self, key: SourceKey) -> Option<f64> {
        let sources = self.sources.lock().expect("mutex poisoned");
        let state = sources.get(key.as_str())?;
        if state.window.is_empty() {
            return None;
        }
        let ok = state.window.iter().filter(|s| s.ok).count();
        Some(ok as f64 / state.window.len() as f64)
    }

    /// Current breaker state.
    #[must_use]
    pub fn circuit(&self, key: SourceKey) -> CircuitState {
        self.sources
            .lock()
            .expect("mutex poisoned")
            .get(key.as_str())
            .map_or(CircuitState::Closed, |s| s.circuit)
    }

    /// Consistent snapshot for operators and reports.
    #[must_use]
    pub fn snapshot(&self, key: SourceKey) -> SourceHealthSnapshot {
        let sources = self.sources.lock().expect("mutex poisoned");
        let Some(state) = sources.get(key.as_str()) else {
            return SourceHealthSnapshot::default();
        };
        let samples = state.window.len();
        let success_rate = if samples == 0 {
            1.0
        } else {
            state.window.iter().filter(|s| s.ok).count() as f64 / samples as f64
        };
        let p95_latency = if samples == 0 {
            Duration::ZERO
        } else {
            let mut latencies: Vec<Duration> = state.window.iter().map(|s| s.latency).collect();
            latencies.sort_unstable();
            let idx = ((latencies.len() as f64) * 0.95).ceil() as usize;
            latencies[idx.saturating_sub(1).min(latencies.len() - 1)]
        };
        SourceHealthSnapshot {
            success_rate,
            window_samples: samples as u32,
            p95_latency,
            last_failure: state.last_failure,
            circuit: state.circuit,
            offers_produced: state.offers_produced,
            tokens_remaining: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: SourceKey = SourceKey::new("x");

    fn tracker(threshold: u32, cooldown: Duration) -> HealthTracker {
        HealthTracker::new(CircuitConfig {
            failure_threshold: threshold,
            window: Duration::from_secs(60),
            cooldown,
        })
    }

    #[test]
    fn breaker_opens_after_consecutive_counted_failures() {
        let t = tracker(3, Duration::from_secs(30));
        for _ in 0..2 {
            t.record_failure(KEY, FailureKind::BotChallenge, Duration::from_millis(50));
            assert_eq!(t.circuit(KEY), CircuitState::Closed);
        }
        t.record_failure(KEY, FailureKind::BotChallenge, Duration::from_millis(50));
        assert_eq!(t.circuit(KEY), CircuitState::Open);
        assert_eq!(t.allow(KEY), CircuitDecision::Skip);
    }

    #[test]
    fn rate_limits_do_not_trip_the_breaker() {
        let t = tracker(2, Duration::from_secs(30));
        for _ in 0..5 {
            t.record_failure(KEY, FailureKind::RateLimited, Duration::from_millis(5));
        }
        assert_eq!(t.circuit(KEY), CircuitState::Closed);
    }

    #[test]
    fn success_resets_the_failure_run() {
        let t = tracker(3, Duration::from_secs(30));
        t.record_failure(KEY, FailureKind::TransientNetwork, Duration::from_millis(5));
        t.record_failure(KEY, FailureKind::TransientNetwork, Duration::from_millis(5));
        t.record_success(KEY, Duration::from_millis(5), 3);
        t.record_failure(KEY, FailureKind::TransientNetwork, Duration::from_millis(5));
        assert_eq!(t.circuit(KEY), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_closes_on_success_and_reopens_on_failure() {
        let t = tracker(1, Duration::from_millis(0));
        t.record_failure(KEY, FailureKind::TransientNetwork, Duration::from_millis(5));
        assert_eq!(t.circuit(KEY), CircuitState::Open);

        // Cooldown of zero: the next allow is the probe.
        assert_eq!(t.allow(KEY), CircuitDecision::Probe);
        assert_eq!(t.allow(KEY), CircuitDecision::Skip);
        t.record_failure(KEY, FailureKind::TransientNetwork, Duration::from_millis(5));
        assert_eq!(t.circuit(KEY), CircuitState::Open);

        assert_eq!(t.allow(KEY), CircuitDecision::Probe);
        t.record_success(KEY, Duration::from_millis(5), 1);
        assert_eq!(t.circuit(KEY), CircuitState::Closed);
        assert_eq!(t.allow(KEY), CircuitDecision::Allow);
    }

    #[test]
    fn repeated_empties_degrade_success_rate_only() {
        let t = tracker(2, Duration::from_secs(30));
        for _ in 0..5 {
            t.record_success(KEY, Duration::from_millis(5), 0);
        }
        assert_eq!(t.circuit(KEY), CircuitState::Closed);
        assert!(t.success_rate(KEY).unwrap() < 0.5);
    }

    #[test]
    fn snapshot_reports_p95_latency() {
        let t = tracker(3, Duration::from_secs(30));
        for ms in [10u64, 20, 30, 40, 200] {
            t.record_success(KEY, Duration::from_millis(ms), 1);
        }
        let snap = t.snapshot(KEY);
        assert_eq!(snap.window_samples, 5);
        assert_eq!(snap.p95_latency, Duration::from_millis(200));
    }
}
