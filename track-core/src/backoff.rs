//! Retry backoff with jitter.

use std::time::Duration;

/// Exponential backoff with multiplicative jitter.
///
/// Formula: min(max_delay, base * 2^(retries - 1)) * random(min_jitter..max_jitter)
///
/// Jitter spreads retries out so that many clients failing against the
/// same collector outage do not come back in lockstep.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base: Duration,
    max_delay: Duration,
    min_jitter: f64,
    max_jitter: f64,
}

impl Backoff {
    /// Create a backoff with the default jitter range (0.5..1.0).
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self {
            base,
            max_delay,
            min_jitter: 0.5,
            max_jitter: 1.0,
        }
    }

    /// Set the jitter factor range. Values are clamped to `0.0..=1.0` and
    /// swapped if given in the wrong order.
    pub fn with_jitter(mut self, min: f64, max: f64) -> Self {
        let min = clamp_unit(min);
        let max = clamp_unit(max);
        self.min_jitter = min.min(max);
        self.max_jitter = min.max(max);
        self
    }

    /// Delay before the next attempt after `retries` failed attempts.
    ///
    /// Zero retries means no failure yet, so no delay.
    pub fn delay(&self, retries: u32) -> Duration {
        if retries == 0 {
            return Duration::ZERO;
        }
        let ceiling = self.ceiling(retries);
        let factor = self.min_jitter + (self.max_jitter - self.min_jitter) * random_unit();
        ceiling.mul_f64(factor)
    }

    /// Delay before jitter is applied.
    pub fn ceiling(&self, retries: u32) -> Duration {
        if retries == 0 {
            return Duration::ZERO;
        }
        // 2^31 already overflows any sane base, cap the exponent there.
        let exponent = (retries - 1).min(31);
        let multiplier = 1u32 << exponent;
        self.base
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(60))
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        return 1.0;
    }
    v.clamp(0.0, 1.0)
}

/// Random value in `0.0..=1.0`.
///
/// Falls back to 1.0 (full delay, no jitter) if the OS RNG is unavailable.
fn random_unit() -> f64 {
    let mut bytes = [0u8; 8];
    if getrandom::getrandom(&mut bytes).is_err() {
        return 1.0;
    }
    let random = u64::from_le_bytes(bytes);
    (random >> 11) as f64 / ((1u64 << 53) - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_retries_means_no_delay() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(0), Duration::ZERO);
    }

    #[test]
    fn ceiling_doubles_per_retry() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(60));
        assert_eq!(backoff.ceiling(1), Duration::from_millis(100));
        assert_eq!(backoff.ceiling(2), Duration::from_millis(200));
        assert_eq!(backoff.ceiling(4), Duration::from_millis(800));
    }

    #[test]
    fn ceiling_capped_at_max_delay() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(backoff.ceiling(10), Duration::from_secs(30));
        assert_eq!(backoff.ceiling(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn delay_stays_within_jitter_range() {
        let backoff = Backoff::new(Duration::from_secs(4), Duration::from_secs(60));
        for _ in 0..50 {
            let delay = backoff.delay(1);
            assert!(delay >= Duration::from_secs(2), "too short: {:?}", delay);
            assert!(delay <= Duration::from_secs(4), "too long: {:?}", delay);
        }
    }

    #[test]
    fn jitter_creates_variance() {
        let backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(60));
        let delays: Vec<Duration> = (0..20).map(|_| backoff.delay(1)).collect();

        let min = delays.iter().min().unwrap();
        let max = delays.iter().max().unwrap();

        // 20 samples over a 5s range: identical draws are vanishingly unlikely.
        assert!(
            max.as_millis() - min.as_millis() >= 10,
            "Expected jitter variance, got min={:?} max={:?}",
            min,
            max
        );
    }

    #[test]
    fn fixed_jitter_is_deterministic() {
        let backoff =
            Backoff::new(Duration::from_millis(100), Duration::from_secs(1)).with_jitter(1.0, 1.0);
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
    }

    #[test]
    fn jitter_bounds_are_normalized() {
        let backoff = Backoff::default().with_jitter(2.0, -1.0);
        assert_eq!(backoff.min_jitter, 0.0);
        assert_eq!(backoff.max_jitter, 1.0);
    }
}
