//! Circuit breaker guarding a downstream dependency.
//!
//! One breaker instance covers one guarded operation. It is an owned,
//! injected component: each instance has its own state and its own clock.
//!
//! # Circuit Breaker States
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    CIRCUIT BREAKER STATE MACHINE                    │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │                       trial failure                                 │
//! │            ┌─────────────────────────────────────┐                  │
//! │            │                                     │                  │
//! │            ▼                                     │                  │
//! │      ┌──────────┐          ┌──────────┐          ┌──────────┐       │
//! │      │  CLOSED  │ ───────► │   OPEN   │ ───────► │HALF-OPEN │       │
//! │      │ (normal) │ failure  │ (reject) │ cool-down│ (trials) │       │
//! │      └──────────┘  rate    └──────────┘          └──────────┘       │
//! │            ▲                                           │            │
//! │            └───────────────────────────────────────────┘            │
//! │                         trial success                               │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Configuration
//!
//! - `sliding_window_size`: Outcomes remembered in closed state (default: 10)
//! - `minimum_calls`: Outcomes required before the rate is evaluated (default: 10)
//! - `failure_rate_threshold`: Percent of failures that opens the circuit (default: 50)
//! - `open_cooldown`: Time before open moves to half-open (default: 30s)
//! - `permitted_half_open_calls`: Concurrent trial calls in half-open (default: 1)
//! - `success_threshold`: Trial successes needed to close (default: 1)

use crate::ports::Clock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Calls are rejected immediately
    Open,
    /// A limited number of trial calls are let through
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of most recent outcomes kept in closed state
    pub sliding_window_size: usize,
    /// Outcomes required before the failure rate is evaluated
    pub minimum_calls: usize,
    /// Failure percentage (0, 100] at which the circuit opens
    pub failure_rate_threshold: f64,
    /// Duration before half-open from open state
    #[serde(with = "crate::domain::humantime_serde")]
    pub open_cooldown: Duration,
    /// Trial calls allowed at once in half-open state
    pub permitted_half_open_calls: u32,
    /// Trial successes needed in half-open state before closing
    pub success_threshold: u32,
    /// Enable circuit breaker
    pub enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            sliding_window_size: 10,
            minimum_calls: 10,
            failure_rate_threshold: 50.0,
            open_cooldown: Duration::from_secs(30),
            permitted_half_open_calls: 1,
            success_threshold: 1,
            enabled: true,
        }
    }
}

struct CircuitInner {
    state: CircuitState,
    /// Closed-state outcomes, `true` = failure
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    last_transition: Instant,
    half_open_in_flight: u32,
    half_open_successes: u32,
    /// Bumped on every transition; permits from an earlier period are stale
    epoch: u64,
}

impl CircuitInner {
    fn failures(&self) -> usize {
        self.window.iter().filter(|failed| **failed).count()
    }

    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.failures() as f64 * 100.0 / self.window.len() as f64
        }
    }

    fn transition(&mut self, state: CircuitState, now: Instant) {
        self.state = state;
        self.last_transition = now;
        self.half_open_in_flight = 0;
        self.half_open_successes = 0;
        self.epoch += 1;
        match state {
            CircuitState::Open => self.opened_at = Some(now),
            CircuitState::Closed => {
                self.opened_at = None;
                self.window.clear();
            }
            CircuitState::HalfOpen => {}
        }
    }
}

/// Circuit breaker for one guarded operation.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<CircuitInner>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        Self {
            name: name.into(),
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(config.sliding_window_size),
                opened_at: None,
                last_transition: now,
                half_open_in_flight: 0,
                half_open_successes: 0,
                epoch: 0,
            }),
            config,
            clock,
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask to make a call.
    ///
    /// Returns `None` if the circuit rejects it. The returned permit must be
    /// settled with the call's outcome; dropping it unsettled gives back a
    /// half-open trial slot without recording anything.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        if !self.config.enabled {
            self.total_calls.fetch_add(1, Ordering::Relaxed);
            return Some(CallPermit::new(self, 0, false));
        }

        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.advance_if_cooled(&mut inner, now);

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                self.total_rejections.fetch_add(1, Ordering::Relaxed);
                debug!(
                    breaker = %self.name,
                    remaining_ms = self.remaining_cooldown(&inner, now).as_millis(),
                    "Circuit breaker is open, rejecting call"
                );
                return None;
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight >= self.config.permitted_half_open_calls {
                    self.total_rejections.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        breaker = %self.name,
                        "Half-open trial slots exhausted, rejecting call"
                    );
                    return None;
                }
                inner.half_open_in_flight += 1;
                true
            }
        };

        self.total_calls.fetch_add(1, Ordering::Relaxed);
        Some(CallPermit::new(self, inner.epoch, trial))
    }

    /// Current state, applying a pending open → half-open transition.
    pub fn state(&self) -> CircuitState {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.advance_if_cooled(&mut inner, now);
        inner.state
    }

    /// Snapshot for admin and diagnostics.
    pub fn stats(&self) -> CircuitStats {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.advance_if_cooled(&mut inner, now);
        CircuitStats {
            name: self.name.clone(),
            state: inner.state,
            window_calls: inner.window.len(),
            window_failures: inner.failures(),
            failure_rate: inner.failure_rate(),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
            time_in_state_ms: now
                .saturating_duration_since(inner.last_transition)
                .as_millis() as u64,
        }
    }

    /// Force the circuit closed (for admin purposes)
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        info!(breaker = %self.name, "Circuit breaker manually reset");
        inner.transition(CircuitState::Closed, now);
    }

    fn advance_if_cooled(&self, inner: &mut CircuitInner, now: Instant) {
        if inner.state != CircuitState::Open {
            return;
        }
        let cooled = inner.opened_at.map_or(true, |opened_at| {
            now.saturating_duration_since(opened_at) >= self.config.open_cooldown
        });
        if cooled {
            info!(breaker = %self.name, "Circuit breaker transitioning to half-open");
            inner.transition(CircuitState::HalfOpen, now);
        }
    }

    fn remaining_cooldown(&self, inner: &CircuitInner, now: Instant) -> Duration {
        inner
            .opened_at
            .map(|opened_at| {
                self.config
                    .open_cooldown
                    .saturating_sub(now.saturating_duration_since(opened_at))
            })
            .unwrap_or_default()
    }

    fn on_success(&self, epoch: u64, trial: bool) {
        if !self.config.enabled {
            return;
        }
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        if epoch != inner.epoch {
            // Admitted under an earlier state
            return;
        }

        match (inner.state, trial) {
            (CircuitState::HalfOpen, true) => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    info!(
                        breaker = %self.name,
                        successes = inner.half_open_successes,
                        "Circuit breaker closing after successful trial"
                    );
                    inner.transition(CircuitState::Closed, now);
                }
            }
            (CircuitState::Closed, false) => self.push_outcome(&mut inner, false, now),
            _ => {}
        }
    }

    fn on_failure(&self, epoch: u64, trial: bool) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        if !self.config.enabled {
            return;
        }
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        if epoch != inner.epoch {
            return;
        }

        match (inner.state, trial) {
            (CircuitState::HalfOpen, true) => {
                warn!(breaker = %self.name, "Circuit breaker reopening after trial failure");
                inner.transition(CircuitState::Open, now);
            }
            (CircuitState::Closed, false) => self.push_outcome(&mut inner, true, now),
            _ => {}
        }
    }

    fn on_abandon(&self, epoch: u64, trial: bool) {
        if !trial {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.epoch == epoch {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    fn push_outcome(&self, inner: &mut CircuitInner, failed: bool, now: Instant) {
        if inner.window.len() == self.config.sliding_window_size {
            inner.window.pop_front();
        }
        inner.window.push_back(failed);

        if failed
            && inner.window.len() >= self.config.minimum_calls
            && inner.failure_rate() >= self.config.failure_rate_threshold
        {
            warn!(
                breaker = %self.name,
                failures = inner.failures(),
                window = inner.window.len(),
                failure_rate = inner.failure_rate(),
                threshold = self.config.failure_rate_threshold,
                cooldown_ms = self.config.open_cooldown.as_millis(),
                "Circuit breaker opening due to failures"
            );
            inner.transition(CircuitState::Open, now);
        }
    }
}

/// Admission to make one guarded call.
///
/// Settle with [`CallPermit::success`] or [`CallPermit::failure`].
#[must_use = "a permit must be settled with the call outcome"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    /// State period the call was admitted in
    epoch: u64,
    trial: bool,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, epoch: u64, trial: bool) -> Self {
        Self {
            breaker,
            epoch,
            trial,
            settled: false,
        }
    }

    /// Whether this call is a half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.epoch, self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.epoch, self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandon(self.epoch, self.trial);
        }
    }
}

/// Statistics for a circuit breaker
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub name: String,
    pub state: CircuitState,
    pub window_calls: usize,
    pub window_failures: usize,
    pub failure_rate: f64,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub time_in_state_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ManualClock;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            sliding_window_size: 4,
            minimum_calls: 4,
            failure_rate_threshold: 50.0,
            open_cooldown: Duration::from_secs(10),
            permitted_half_open_calls: 1,
            success_threshold: 1,
            enabled: true,
        }
    }

    fn breaker(config: CircuitBreakerConfig) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (CircuitBreaker::new("test", config, clock.clone()), clock)
    }

    fn fail(breaker: &CircuitBreaker, times: usize) {
        for _ in 0..times {
            breaker.try_acquire().expect("permit").failure();
        }
    }

    #[test]
    fn test_circuit_starts_closed() {
        let (breaker, _) = breaker(test_config());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_some());
    }

    #[test]
    fn test_opens_when_rate_crosses_threshold() {
        let (breaker, _) = breaker(test_config());

        fail(&breaker, 3);
        // Below minimum calls
        assert_eq!(breaker.state(), CircuitState::Closed);

        fail(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[test]
    fn test_rate_below_threshold_stays_closed() {
        let (breaker, _) = breaker(test_config());

        breaker.try_acquire().unwrap().success();
        breaker.try_acquire().unwrap().success();
        breaker.try_acquire().unwrap().success();
        fail(&breaker, 1);

        // 25% < 50%
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_window_slides() {
        let (breaker, _) = breaker(test_config());

        fail(&breaker, 1);
        for _ in 0..4 {
            breaker.try_acquire().unwrap().success();
        }
        // The early failure has slid out of the window
        let stats = breaker.stats();
        assert_eq!(stats.window_calls, 4);
        assert_eq!(stats.window_failures, 0);

        fail(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_transitions_to_half_open_after_cooldown() {
        let (breaker, clock) = breaker(test_config());
        fail(&breaker, 4);

        clock.advance(Duration::from_secs(9));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());

        clock.advance(Duration::from_secs(1));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_single_trial_success_closes() {
        let (breaker, clock) = breaker(test_config());
        fail(&breaker, 4);
        clock.advance(Duration::from_secs(10));

        let permit = breaker.try_acquire().expect("trial");
        assert!(permit.is_trial());
        // Only one trial at a time
        assert!(breaker.try_acquire().is_none());

        permit.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().window_calls, 0);
    }

    #[test]
    fn test_trial_failure_reopens() {
        let (breaker, clock) = breaker(test_config());
        fail(&breaker, 4);
        clock.advance(Duration::from_secs(10));

        breaker.try_acquire().expect("trial").failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // Cool-down restarts from the reopen
        clock.advance(Duration::from_secs(5));
        assert!(breaker.try_acquire().is_none());
        clock.advance(Duration::from_secs(5));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_abandoned_trial_frees_slot() {
        let (breaker, clock) = breaker(test_config());
        fail(&breaker, 4);
        clock.advance(Duration::from_secs(10));

        drop(breaker.try_acquire().expect("trial"));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_some());
    }

    #[test]
    fn test_success_threshold_above_one() {
        let mut config = test_config();
        config.permitted_half_open_calls = 2;
        config.success_threshold = 2;
        let (breaker, clock) = breaker(config);
        fail(&breaker, 4);
        clock.advance(Duration::from_secs(10));

        let first = breaker.try_acquire().unwrap();
        let second = breaker.try_acquire().unwrap();
        assert!(breaker.try_acquire().is_none());

        first.success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        second.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_stale_outcome_ignored_after_open() {
        let (breaker, _) = breaker(test_config());

        let slow = breaker.try_acquire().unwrap();
        fail(&breaker, 4);
        assert_eq!(breaker.state(), CircuitState::Open);

        // Call admitted while closed finishes after the circuit opened
        slow.success();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_outcome_from_earlier_closed_period_ignored() {
        let (breaker, clock) = breaker(test_config());

        let slow = breaker.try_acquire().unwrap();
        fail(&breaker, 4);
        clock.advance(Duration::from_secs(10));
        breaker.try_acquire().expect("trial").success();
        assert_eq!(breaker.state(), CircuitState::Closed);

        // Admitted before the circuit opened, settles in the new closed period
        slow.failure();
        let stats = breaker.stats();
        assert_eq!(stats.window_calls, 0);
        assert_eq!(stats.window_failures, 0);
        assert_eq!(stats.total_failures, 5);
    }

    #[test]
    fn test_reset_circuit() {
        let (breaker, _) = breaker(test_config());
        fail(&breaker, 4);
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_some());
    }

    #[test]
    fn test_disabled_circuit_breaker() {
        let mut config = test_config();
        config.enabled = false;
        let (breaker, _) = breaker(config);

        fail(&breaker, 20);
        assert!(breaker.try_acquire().is_some());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_stats_counts() {
        let (breaker, _) = breaker(test_config());
        breaker.try_acquire().unwrap().success();
        fail(&breaker, 4);
        assert!(breaker.try_acquire().is_none());

        let stats = breaker.stats();
        assert_eq!(stats.name, "test");
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.total_calls, 5);
        assert_eq!(stats.total_failures, 4);
        assert_eq!(stats.total_rejections, 1);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["state"], "open");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
    }

    #[test]
    fn test_concurrent_failures_are_not_lost() {
        let mut config = test_config();
        config.sliding_window_size = 100;
        config.minimum_calls = 100;
        config.failure_rate_threshold = 100.0;
        let (breaker, _) = breaker(config);
        let breaker = Arc::new(breaker);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let breaker = breaker.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        if let Some(permit) = breaker.try_acquire() {
                            permit.failure();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(breaker.stats().total_failures, 100);
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
