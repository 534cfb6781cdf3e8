use std::time::Duration;

use rand::Rng;

/// The smallest TTL that is ever handed to a cache store.
const MIN_TTL: Duration = Duration::from_millis(1);

/// Randomizes TTLs within `base * (1 ± spread)`.
///
/// Values cached at the same instant with the same base TTL would otherwise all expire together
/// and send a synchronized wave of requests back to the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TtlJitter {
    spread: f64,
}

impl Default for TtlJitter {
    fn default() -> Self {
        Self { spread: 0.2 }
    }
}

impl TtlJitter {
    /// Creates a jitter policy with the given relative `spread`.
    ///
    /// # Panics
    ///
    /// Panics if `spread` is not within `[0, 1)`, as that would allow zero or negative TTLs.
    pub fn new(spread: f64) -> Self {
        assert!(
            (0.0..1.0).contains(&spread),
            "jitter spread must be in [0, 1), got {spread}"
        );
        Self { spread }
    }

    /// Returns the inclusive range jittered TTLs for `base` are drawn from.
    pub fn bounds(&self, base: Duration) -> (Duration, Duration) {
        (
            base.mul_f64(1.0 - self.spread),
            base.mul_f64(1.0 + self.spread),
        )
    }

    /// Draws a TTL uniformly from `[base * (1 - spread), base * (1 + spread)]`.
    ///
    /// The result is never shorter than one millisecond.
    pub fn jitter(&self, base: Duration) -> Duration {
        let (low, high) = self.bounds(base);
        let ttl = if low < high {
            rand::rng().random_range(low..=high)
        } else {
            base
        };
        ttl.max(MIN_TTL)
    }
}
