//! Exponential backoff with optional jitter.

use std::time::Duration;
use rand::Rng;

/// Delay before the retry that follows the failed attempt `attempt` (zero-based).
///
/// `delay = min(base * 2^attempt, cap)`, plus up to `jitter_ratio` of the delay,
/// never exceeding `cap`.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64, jitter_ratio: f64) -> Duration {
    let exponential_base = 2u64.saturating_pow(attempt);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = (capped_delay as f64 * jitter_ratio.clamp(0.0, 1.0)) as u64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay.saturating_add(jitter).min(max_ms))
}
