//! Per-route fixed-window admission control with bounded queuing.
//!
//! # Responsibilities
//! - Count admissions per (route, window); windows are wall-clock aligned
//! - Queue over-limit requests FIFO up to a bound, then reject
//! - Evict queued requests that exceed the maximum wait
//!
//! # Design Decisions
//! - Fixed windows over sliding: O(1) bookkeeping, accepting up to 2x
//!   nominal admissions across a window boundary
//! - Counters are atomics; the queue is the only locked structure
//! - Waiters released at a window reset consume permits of the NEW window,
//!   in FIFO order
//! - Window state is created lazily per route and shared by all requests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::config::schema::{LimitClass, RateLimitConfig, WindowConfig};
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::security::access_control::CallerIdentity;

/// Immediate admission decision.
pub enum Admission {
    /// Under the limit; proceed now.
    Admitted,
    /// At the limit; the receiver fires when a permit frees up.
    Queued(oneshot::Receiver<()>),
    /// Queue full; reject with TooManyRequests.
    Rejected,
}

/// Shared state for one route's current window.
struct RouteWindow {
    window_id: AtomicU64,
    count: AtomicU32,
    queue: Mutex<VecDeque<oneshot::Sender<()>>>,
    drainer_armed: AtomicBool,
}

impl RouteWindow {
    fn new() -> Self {
        Self {
            window_id: AtomicU64::new(current_window(1)),
            count: AtomicU32::new(0),
            queue: Mutex::new(VecDeque::new()),
            drainer_armed: AtomicBool::new(false),
        }
    }
}

/// Wall-clock aligned window index for the given length.
fn current_window(window_secs: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    now / window_secs.max(1)
}

/// Time remaining until the current window rolls over.
fn until_window_end(window_secs: u64) -> Duration {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    let len = window_secs.max(1);
    let end = (now.as_secs() / len + 1) * len;
    Duration::from_secs(end).saturating_sub(now) + Duration::from_millis(10)
}

/// Roll the window forward if the wall clock has moved past it, then
/// release queued waiters into the fresh budget.
fn roll_and_drain(window: &RouteWindow, config: &WindowConfig) {
    let now_id = current_window(config.window_secs);
    let stored = window.window_id.load(Ordering::Acquire);
    if stored != now_id
        && window
            .window_id
            .compare_exchange(stored, now_id, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    {
        window.count.store(0, Ordering::Release);
        drain(window, config);
    }
}

/// Hand permits of the current window to queued waiters, FIFO.
fn drain(window: &RouteWindow, config: &WindowConfig) {
    let mut queue = window.queue.lock().expect("rate limiter queue mutex poisoned");
    while !queue.is_empty() {
        let prev = window.count.fetch_add(1, Ordering::AcqRel);
        if prev >= config.permit_limit {
            window.count.fetch_sub(1, Ordering::AcqRel);
            break;
        }
        let waiter = queue.pop_front().expect("checked non-empty");
        if waiter.send(()).is_err() {
            // Waiter gave up (max wait elapsed); return its permit.
            window.count.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// Fixed-window rate limiter over all routes.
pub struct FixedWindowLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Arc<RouteWindow>>,
}

impl FixedWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Synchronous admission decision for a route and caller.
    pub fn try_admit(&self, route: &str, class: LimitClass, caller: &CallerIdentity) -> Admission {
        if !self.config.enabled {
            return Admission::Admitted;
        }
        let config = self.config.class(class).clone();
        let window = self
            .windows
            .entry(route.to_string())
            .or_insert_with(|| Arc::new(RouteWindow::new()))
            .clone();

        loop {
            roll_and_drain(&window, &config);

            let prev = window.count.fetch_add(1, Ordering::AcqRel);
            if prev < config.permit_limit {
                return Admission::Admitted;
            }
            window.count.fetch_sub(1, Ordering::AcqRel);

            let mut queue = window.queue.lock().expect("rate limiter queue mutex poisoned");
            // The window may have rolled while we waited for the lock.
            if current_window(config.window_secs) != window.window_id.load(Ordering::Acquire) {
                drop(queue);
                continue;
            }
            // Waiters that hit max_wait drop their receivers; their slots
            // must not count against new arrivals.
            queue.retain(|tx| !tx.is_closed());
            if queue.len() >= config.queue_limit {
                tracing::debug!(
                    route,
                    subject = %caller.subject,
                    "Admission queue full, rejecting"
                );
                return Admission::Rejected;
            }
            let (tx, rx) = oneshot::channel();
            queue.push_back(tx);
            drop(queue);

            Self::arm_drainer(window.clone(), config.clone());
            return Admission::Queued(rx);
        }
    }

    /// Admit or wait in the queue up to the class's maximum wait.
    pub async fn admit(
        &self,
        route: &str,
        class: LimitClass,
        caller: &CallerIdentity,
    ) -> Result<(), GatewayError> {
        match self.try_admit(route, class, caller) {
            Admission::Admitted => Ok(()),
            Admission::Rejected => {
                metrics::record_rate_limited(route, "queue_full");
                Err(GatewayError::RateLimited { route: route.to_string() })
            }
            Admission::Queued(rx) => {
                let max_wait = Duration::from_millis(self.config.class(class).max_wait_ms);
                match tokio::time::timeout(max_wait, rx).await {
                    Ok(Ok(())) => Ok(()),
                    // Timed out waiting, or the window state was dropped.
                    _ => {
                        metrics::record_rate_limited(route, "max_wait");
                        Err(GatewayError::RateLimited { route: route.to_string() })
                    }
                }
            }
        }
    }

    /// Ensure a background task wakes at the window boundary to release
    /// queued waiters even if no further traffic arrives.
    fn arm_drainer(window: Arc<RouteWindow>, config: WindowConfig) {
        if window
            .drainer_armed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(until_window_end(config.window_secs)).await;
                roll_and_drain(&window, &config);

                let queue = window.queue.lock().expect("rate limiter queue mutex poisoned");
                if queue.is_empty() {
                    // Disarm while holding the lock so a concurrent
                    // enqueue re-arms cleanly.
                    window.drainer_armed.store(false, Ordering::Release);
                    break;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller() -> CallerIdentity {
        CallerIdentity::anonymous()
    }

    fn limiter(permit_limit: u32, queue_limit: usize, window_secs: u64) -> FixedWindowLimiter {
        FixedWindowLimiter::new(RateLimitConfig {
            enabled: true,
            standard: WindowConfig {
                permit_limit,
                window_secs,
                queue_limit,
                max_wait_ms: 3_000,
            },
            strict: WindowConfig::default(),
        })
    }

    #[tokio::test]
    async fn test_admit_up_to_limit_then_queue_then_reject() {
        let limiter = limiter(100, 10, 3600);

        for n in 0..100 {
            assert!(
                matches!(limiter.try_admit("videos", LimitClass::Standard, &caller()), Admission::Admitted),
                "request {} should be admitted immediately",
                n
            );
        }

        // 101st through 111th queue up.
        let mut queued = Vec::new();
        for _ in 0..10 {
            match limiter.try_admit("videos", LimitClass::Standard, &caller()) {
                Admission::Queued(rx) => queued.push(rx),
                _ => panic!("over-limit request should be queued"),
            }
        }

        // 112th finds the queue full.
        assert!(matches!(
            limiter.try_admit("videos", LimitClass::Standard, &caller()),
            Admission::Rejected
        ));
    }

    #[tokio::test]
    async fn test_routes_are_isolated() {
        let limiter = limiter(1, 0, 3600);
        assert!(matches!(limiter.try_admit("a", LimitClass::Standard, &caller()), Admission::Admitted));
        assert!(matches!(limiter.try_admit("b", LimitClass::Standard, &caller()), Admission::Admitted));
        assert!(matches!(limiter.try_admit("a", LimitClass::Standard, &caller()), Admission::Rejected));
    }

    #[tokio::test]
    async fn test_disabled_limiter_admits_everything() {
        let limiter = FixedWindowLimiter::new(RateLimitConfig {
            enabled: false,
            ..Default::default()
        });
        for _ in 0..1000 {
            assert!(matches!(limiter.try_admit("x", LimitClass::Strict, &caller()), Admission::Admitted));
        }
    }

    #[tokio::test]
    async fn test_queued_waiter_released_into_new_window() {
        // Pins the open-question decision: a waiter that survives a window
        // reset is admitted into the new window and consumes its permits.
        let limiter = limiter(1, 4, 1);

        // Exhaust the current window.
        while !matches!(limiter.try_admit("clips", LimitClass::Standard, &caller()), Admission::Admitted) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        // The permit may have landed near the boundary; make sure the
        // window is now exhausted before queueing.
        let queued = loop {
            match limiter.try_admit("clips", LimitClass::Standard, &caller()) {
                Admission::Queued(rx) => break rx,
                _ => continue,
            }
        };

        let released = tokio::time::timeout(Duration::from_secs(3), queued).await;
        assert!(
            matches!(released, Ok(Ok(()))),
            "queued waiter must be released when the window resets"
        );
    }

    #[tokio::test]
    async fn test_max_wait_eviction() {
        let limiter = FixedWindowLimiter::new(RateLimitConfig {
            enabled: true,
            standard: WindowConfig {
                permit_limit: 1,
                window_secs: 3600,
                queue_limit: 4,
                max_wait_ms: 100,
            },
            strict: WindowConfig::default(),
        });

        assert!(limiter.admit("slow", LimitClass::Standard, &caller()).await.is_ok());
        let start = std::time::Instant::now();
        let result = limiter.admit("slow", LimitClass::Standard, &caller()).await;
        assert!(matches!(result, Err(GatewayError::RateLimited { .. })));
        assert!(start.elapsed() < Duration::from_secs(2), "waiter must not be held forever");
    }

    #[tokio::test]
    async fn test_evicted_waiters_free_their_queue_slots() {
        let limiter = FixedWindowLimiter::new(RateLimitConfig {
            enabled: true,
            standard: WindowConfig {
                permit_limit: 1,
                window_secs: 3600,
                queue_limit: 2,
                max_wait_ms: 50,
            },
            strict: WindowConfig::default(),
        });

        assert!(limiter.admit("uploads", LimitClass::Standard, &caller()).await.is_ok());

        // Fill the queue with waiters that give up at max_wait.
        for _ in 0..2 {
            let result = limiter.admit("uploads", LimitClass::Standard, &caller()).await;
            assert!(matches!(result, Err(GatewayError::RateLimited { .. })));
        }

        // Their abandoned senders must not count against the queue bound.
        assert!(
            matches!(
                limiter.try_admit("uploads", LimitClass::Standard, &caller()),
                Admission::Queued(_)
            ),
            "a fresh request must get a queue slot after evictions"
        );
    }
}
