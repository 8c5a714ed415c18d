//! Retry/backoff policy for C1: a pure function of
//! `(attempt, server hint) -> sleep duration`, no shared cross-worker retry
//! state — retries are scoped to one chunk's attempt loop, never a
//! persistent entity key.

use rand::Rng;
use std::time::Duration;

pub const BASE: Duration = Duration::from_secs(2);
pub const CAP: Duration = Duration::from_secs(30);
pub const MAX_JITTER_MS: u64 = 250;

/// Source of the randomized jitter added on top of the exponential backoff.
/// Abstracted behind a trait so tests can inject a fixed value instead of
/// `rand::thread_rng()`, following the teacher's own deterministic-jitter
/// precedent (`subscription_id % jitter_max`) — here the value varies per
/// attempt rather than per station key, since C1's retries are per-chunk.
pub trait JitterSource {
    fn jitter_ms(&self) -> u64;
}

/// Default jitter source: uniform `0..=MAX_JITTER_MS` via the thread-local
/// RNG.
pub struct RandJitter;

impl JitterSource for RandJitter {
    fn jitter_ms(&self) -> u64 {
        rand::thread_rng().gen_range(0..=MAX_JITTER_MS)
    }
}

/// Exponential backoff with base 2s, cap 30s: `base * 2^(attempt-1)`,
/// clamped to `cap`, plus up to `MAX_JITTER_MS` of randomized jitter to
/// avoid synchronized retries across workers.
pub fn exponential_backoff(attempt: u32) -> Duration {
    exponential_backoff_with(attempt, &RandJitter)
}

/// Same as `exponential_backoff`, but with the jitter source supplied
/// explicitly so callers (notably tests) can make the schedule
/// deterministic.
pub fn exponential_backoff_with(attempt: u32, jitter: &dyn JitterSource) -> Duration {
    let exp = attempt.saturating_sub(1).min(32);
    let scaled = BASE.as_millis().saturating_mul(1u128 << exp);
    let capped = scaled.min(CAP.as_millis());
    Duration::from_millis(capped as u64).saturating_add(Duration::from_millis(jitter.jitter_ms()))
}

/// `Retry-After` always overrides the computed backoff for that gap. Only
/// integer-second values are recognized; an HTTP-date form falls through to
/// exponential backoff.
pub fn backoff_for_attempt(attempt: u32, retry_after: Option<Duration>) -> Duration {
    retry_after.unwrap_or_else(|| exponential_backoff(attempt))
}

pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
