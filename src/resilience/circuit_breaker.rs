//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: backend assumed down, calls fail fast
//! - Half-Open: exactly one trial call probes recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold within tracking window
//! Open → Half-Open: break duration elapsed, first caller wins the trial
//! Half-Open → Closed: trial succeeds (counter reset)
//! Half-Open → Open: trial fails (no threshold wait) or is abandoned
//! ```
//!
//! # Design Decisions
//! - One breaker per backend, shared by all concurrent requests
//! - All state lives in atomics; transitions are compare-and-swap
//! - Calls go through a `CallPermit`; the permit reports the outcome, and
//!   a permit dropped without an outcome (cancelled future) releases the
//!   trial slot instead of wedging the breaker in Half-Open

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use crate::config::schema::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state, stored as a u8 for atomic access.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(val: u8) -> Self {
        match val {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Permission for one call through the breaker.
///
/// Exactly one of `success` or `failure` reports the outcome. Dropping the
/// permit unreported means the call future was cancelled (deadline expiry,
/// client disconnect): a held half-open trial slot is released so the next
/// caller can run a fresh trial.
#[must_use]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    resolved: bool,
}

impl CallPermit<'_> {
    /// Report one logical successful call.
    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.on_success(self.trial);
    }

    /// Report one logical failed call.
    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.trial {
            self.breaker.abandon_trial();
        }
    }
}

/// Per-backend circuit breaker.
///
/// Time is measured in milliseconds from a per-breaker anchor so it fits
/// in an atomic u64.
pub struct CircuitBreaker {
    name: &'static str,
    threshold: u32,
    break_ms: u64,
    window_ms: u64,
    anchor: Instant,

    state: AtomicU8,
    failures: AtomicU32,
    window_start_ms: AtomicU64,
    open_until_ms: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: &CircuitBreakerConfig) -> Self {
        Self {
            name,
            threshold: config.failure_threshold.max(1),
            break_ms: Duration::from_secs(config.break_secs).as_millis() as u64,
            window_ms: Duration::from_secs(config.window_secs).as_millis() as u64,
            anchor: Instant::now(),
            state: AtomicU8::new(CircuitState::Closed as u8),
            failures: AtomicU32::new(0),
            window_start_ms: AtomicU64::new(0),
            open_until_ms: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.anchor.elapsed().as_millis() as u64
    }

    /// Acquire permission for a call.
    ///
    /// Returns `None` while the circuit is open or while another caller's
    /// half-open trial is in flight. Once the break duration has elapsed,
    /// exactly one caller receives the trial permit.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        match CircuitState::from(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => Some(CallPermit {
                breaker: self,
                trial: false,
                resolved: false,
            }),
            CircuitState::HalfOpen => None,
            CircuitState::Open => {
                if self.now_ms() < self.open_until_ms.load(Ordering::Acquire) {
                    return None;
                }
                // First caller past the break wins the single trial.
                let won = self
                    .state
                    .compare_exchange(
                        CircuitState::Open as u8,
                        CircuitState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok();
                if !won {
                    return None;
                }
                tracing::info!(backend = self.name, "Circuit half-open, allowing trial call");
                metrics::record_circuit_state(self.name, CircuitState::HalfOpen);
                Some(CallPermit {
                    breaker: self,
                    trial: true,
                    resolved: false,
                })
            }
        }
    }

    fn on_success(&self, trial: bool) {
        // Only the trial call may close the circuit. A stale success from
        // a call that started before the circuit opened says nothing about
        // recovery, so the break period runs its course.
        if !trial {
            return;
        }
        if self
            .state
            .compare_exchange(
                CircuitState::HalfOpen as u8,
                CircuitState::Closed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.failures.store(0, Ordering::Release);
            tracing::info!(backend = self.name, "Circuit closed after successful trial");
            metrics::record_circuit_state(self.name, CircuitState::Closed);
        }
    }

    fn on_failure(&self, trial: bool) {
        let now = self.now_ms();
        if trial {
            // Failed trial reopens immediately, no threshold wait.
            self.open_until_ms.store(now + self.break_ms, Ordering::Release);
            self.state.store(CircuitState::Open as u8, Ordering::Release);
            tracing::warn!(backend = self.name, "Circuit reopened after failed trial");
            metrics::record_circuit_state(self.name, CircuitState::Open);
            return;
        }
        if CircuitState::from(self.state.load(Ordering::Acquire)) != CircuitState::Closed {
            // The circuit opened while this call was in flight; the open
            // state already reflects the backend's condition.
            return;
        }

        // Roll the tracking window before counting.
        let start = self.window_start_ms.load(Ordering::Acquire);
        if now.saturating_sub(start) >= self.window_ms
            && self
                .window_start_ms
                .compare_exchange(start, now, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            self.failures.store(0, Ordering::Release);
        }

        let count = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if count >= self.threshold
            && self
                .state
                .compare_exchange(
                    CircuitState::Closed as u8,
                    CircuitState::Open as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        {
            self.open_until_ms.store(now + self.break_ms, Ordering::Release);
            tracing::warn!(
                backend = self.name,
                failures = count,
                break_ms = self.break_ms,
                "Circuit opened"
            );
            metrics::record_circuit_state(self.name, CircuitState::Open);
        }
    }

    /// Release an unreported trial slot. The trial produced no information,
    /// so the breaker reverts to Open without extending the break; the next
    /// caller past `open_until` wins a fresh trial.
    fn abandon_trial(&self) {
        if self
            .state
            .compare_exchange(
                CircuitState::HalfOpen as u8,
                CircuitState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            tracing::debug!(backend = self.name, "Trial call abandoned, slot released");
            metrics::record_circuit_state(self.name, CircuitState::Open);
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Rolling failure count snapshot.
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }
}
