//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Calculate the delay before retry number `attempt` (1-based).
///
/// The delay grows as `base^attempt` seconds, capped at `max_ms`, with
/// up to 10% jitter added to break up synchronized retries.
pub fn calculate_backoff(attempt: u32, base: f64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exp = base.max(1.0).powi(attempt.min(16) as i32);
    let delay_ms = (exp * 1000.0) as u64;
    let capped = delay_ms.min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}
