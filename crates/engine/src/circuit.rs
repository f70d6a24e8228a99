//! Per-component circuit breaker
//!
//! # State Machine
//!
//! ```text
//! ┌─────────┐  failure threshold  ┌─────────┐    cooldown     ┌──────────┐
//! │ Closed  │ ─────────────────► │  Open   │ ──────────────► │ HalfOpen │
//! └─────────┘                     └─────────┘                 └──────────┘
//!      ▲                               ▲        any failure         │
//!      │                               └────────────────────────────┤
//!      │              success threshold                             │
//!      └────────────────────────────────────────────────────────────┘
//! ```
//!
//! In Closed, a success decays the failure counter by one instead of
//! resetting it, so isolated blips weigh less than a sustained outage.
//!
//! All transitions happen under the breaker's own mutex; two components never
//! contend on the same lock.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::duration_millis;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls allowed
    Closed,

    /// Failure threshold exceeded - all calls rejected
    Open,

    /// Testing if service recovered - limited calls allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker configuration
///
/// # Example
///
/// ```
/// use recovery_engine::CircuitBreakerConfig;
/// use std::time::Duration;
///
/// let config = CircuitBreakerConfig::default()
///     .with_failure_threshold(5)
///     .with_cooldown(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed operations required to open the circuit
    pub failure_threshold: u32,

    /// Consecutive successes in half-open required to close the circuit
    pub success_threshold: u32,

    /// Time to wait before transitioning from open to half-open
    #[serde(with = "duration_millis")]
    pub cooldown: Duration,

    /// Maximum probes in flight while half-open
    pub half_open_max_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cooldown: Duration::from_secs(30),
            half_open_max_probes: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold to open the circuit
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set the success threshold to close the circuit
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    /// Set the cooldown (time before trying again after opening)
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set how many probes may be in flight while half-open
    pub fn with_half_open_max_probes(mut self, probes: u32) -> Self {
        self.half_open_max_probes = probes.max(1);
        self
    }

    /// Reject zero thresholds, which the builders clamp but serde does not
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("circuit.failure_threshold must be at least 1".into());
        }
        if self.success_threshold == 0 {
            return Err("circuit.success_threshold must be at least 1".into());
        }
        if self.half_open_max_probes == 0 {
            return Err("circuit.half_open_max_probes must be at least 1".into());
        }
        Ok(())
    }
}

/// A state change, reported so listeners can run outside the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitTransition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitStatus {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Time left before an admission check may move Open to HalfOpen
    #[serde(with = "crate::config::option_duration_millis")]
    pub remaining_cooldown: Option<Duration>,
    pub half_open_probes_in_flight: u32,
}

#[derive(Debug)]
struct Inner {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    /// Set if and only if `state == Open`
    opened_at: Option<Instant>,
    half_open_probes_used: u32,
}

impl Inner {
    fn transition(&mut self, to: CircuitState, now: Instant) -> CircuitTransition {
        let from = self.state;
        self.state = to;
        match to {
            CircuitState::Closed => {
                self.opened_at = None;
                self.consecutive_failures = 0;
                self.consecutive_successes = 0;
                self.half_open_probes_used = 0;
            }
            CircuitState::Open => {
                self.opened_at = Some(now);
                self.consecutive_successes = 0;
                self.half_open_probes_used = 0;
            }
            CircuitState::HalfOpen => {
                self.opened_at = None;
                self.consecutive_successes = 0;
                self.half_open_probes_used = 0;
            }
        }
        CircuitTransition { from, to }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.opened_at
            .map(|at| now.saturating_duration_since(at) >= self.config.cooldown)
            .unwrap_or(true)
    }
}

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub admitted: bool,
    /// The admission occupies a half-open probe slot
    pub probe: bool,
    pub transition: Option<CircuitTransition>,
}

impl Admission {
    fn granted(probe: bool, transition: Option<CircuitTransition>) -> Self {
        Self {
            admitted: true,
            probe,
            transition,
        }
    }

    fn denied() -> Self {
        Self {
            admitted: false,
            probe: false,
            transition: None,
        }
    }
}

/// Circuit breaker for one component
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                config,
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                half_open_probes_used: 0,
            }),
        }
    }

    /// Admission check; may move Open to HalfOpen
    ///
    /// A granted half-open admission occupies a probe slot until its outcome
    /// is recorded (or the slot is released).
    pub fn try_acquire(&self) -> Admission {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Admission::granted(false, None),
            CircuitState::Open => {
                if inner.cooldown_elapsed(now) {
                    let transition = inner.transition(CircuitState::HalfOpen, now);
                    inner.half_open_probes_used = 1;
                    Admission::granted(true, Some(transition))
                } else {
                    Admission::denied()
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_probes_used < inner.config.half_open_max_probes {
                    inner.half_open_probes_used += 1;
                    Admission::granted(true, None)
                } else {
                    Admission::denied()
                }
            }
        }
    }

    /// Whether the breaker is currently refusing work
    ///
    /// Does not transition and does not take a probe slot.
    pub fn is_open(&self) -> bool {
        self.inner.lock().state == CircuitState::Open
    }

    /// Record a successful operation
    pub fn record_success(&self) -> Option<CircuitTransition> {
        self.record_success_at(Instant::now())
    }

    fn record_success_at(&self, now: Instant) -> Option<CircuitTransition> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_sub(1);
                None
            }
            CircuitState::HalfOpen => {
                inner.half_open_probes_used = inner.half_open_probes_used.saturating_sub(1);
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= inner.config.success_threshold {
                    Some(inner.transition(CircuitState::Closed, now))
                } else {
                    None
                }
            }
            // A call admitted before another caller opened the circuit
            CircuitState::Open => None,
        }
    }

    /// Record a failed operation
    pub fn record_failure(&self) -> Option<CircuitTransition> {
        self.record_failure_at(Instant::now())
    }

    fn record_failure_at(&self, now: Instant) -> Option<CircuitTransition> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= inner.config.failure_threshold {
                    Some(inner.transition(CircuitState::Open, now))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                inner.consecutive_failures += 1;
                Some(inner.transition(CircuitState::Open, now))
            }
            CircuitState::Open => {
                inner.consecutive_failures += 1;
                None
            }
        }
    }

    /// Give back a half-open probe slot without recording an outcome
    pub fn release_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_probes_used = inner.half_open_probes_used.saturating_sub(1);
        }
    }

    /// Force the breaker closed with zeroed counters
    pub fn reset(&self) -> Option<CircuitTransition> {
        let mut inner = self.inner.lock();
        let was = inner.state;
        let transition = inner.transition(CircuitState::Closed, Instant::now());
        (was != CircuitState::Closed).then_some(transition)
    }

    /// Swap thresholds while keeping accumulated counters
    pub fn reconfigure(&self, config: CircuitBreakerConfig) {
        self.inner.lock().config = config;
    }

    /// Current state without side effects
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of the breaker
    pub fn status(&self) -> CircuitStatus {
        self.status_at(Instant::now())
    }

    fn status_at(&self, now: Instant) -> CircuitStatus {
        let inner = self.inner.lock();
        let remaining_cooldown = inner.opened_at.map(|at| {
            inner
                .config
                .cooldown
                .saturating_sub(now.saturating_duration_since(at))
        });
        CircuitStatus {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            remaining_cooldown,
            half_open_probes_in_flight: inner.half_open_probes_used,
        }
    }
}
