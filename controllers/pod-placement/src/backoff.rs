//! # Fibonacci Backoff
//!
//! Progressive retry delays for pods whose registries were unreachable.
//! Grows more slowly than exponential backoff, so a pod gets several chances
//! inside the bounded gating window.
//!
//! Sequence with 5s/60s bounds: 5s, 5s, 10s, 15s, 25s, 40s, 60s (max).

use std::time::Duration;

/// Backoff for the `error_count`-th consecutive failure
///
/// The sequence starts at `min_seconds` for error_count 0 and 1, then
/// follows min, min, min*2, min*3, min*5, ... capped at `max_seconds`.
#[must_use]
pub fn fibonacci_delay(error_count: u32, min_seconds: u64, max_seconds: u64) -> Duration {
    if error_count <= 1 {
        return Duration::from_secs(min_seconds);
    }

    let mut prev = min_seconds;
    let mut current = min_seconds;
    for _ in 2..=error_count {
        let next = prev + current;
        prev = current;
        current = std::cmp::min(next, max_seconds);
        if current >= max_seconds {
            break;
        }
    }
    Duration::from_secs(current)
}
