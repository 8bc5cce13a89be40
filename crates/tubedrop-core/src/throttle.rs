//! Randomised pre-flight delay.
//!
//! Each job waits a random interval before its first call to the media
//! collaborator so that a burst of submissions does not reach the site in
//! lockstep.

use std::time::Duration;

/// Bounds of the uniform pre-flight delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterConfig {
    pub min: Duration,
    pub max: Duration,
}

impl JitterConfig {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// No delay at all.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Pick a delay in `[min, max)`. Returns `min` if the range is empty.
    pub fn pick(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let span_ms = (self.max - self.min).as_millis() as u64;
        self.min + Duration::from_millis(rand_jitter_ms(span_ms))
    }
}

impl Default for JitterConfig {
    /// Between one and three seconds.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(3))
    }
}

// ---------------------------------------------------------------------------
// xorshift seeded from the current time, avoids pulling in the `rand` crate.
// ---------------------------------------------------------------------------

fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x |= 1;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
