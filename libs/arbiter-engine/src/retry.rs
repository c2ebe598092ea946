use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff schedule shared by dispatch retries and status polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the given 1-based attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base.as_millis() as u64, self.max.as_millis() as u64)
    }
}

/// Calculate exponential backoff delay with jitter.
///
/// Formula: `min(base_ms * 2^(attempt-1) + jitter, max_ms)` (0-25% jitter)
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exp_factor = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exp_factor);

    let jitter = if delay_ms > 0 {
        rand::rng().random_range(0..=delay_ms / 4)
    } else {
        0
    };

    let total_delay = delay_ms.saturating_add(jitter).min(max_ms);
    Duration::from_millis(total_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_backoff_basic() {
        let d1 = calculate_backoff(1, 1000, 60000);
        assert!(d1.as_millis() >= 1000 && d1.as_millis() <= 1250);

        let d2 = calculate_backoff(2, 1000, 60000);
        assert!(d2.as_millis() >= 2000 && d2.as_millis() <= 2500);

        let d3 = calculate_backoff(3, 1000, 60000);
        assert!(d3.as_millis() >= 4000 && d3.as_millis() <= 5000);
    }

    #[test]
    fn test_calculate_backoff_respects_max() {
        let d = calculate_backoff(40, 10000, 60000);
        assert_eq!(d.as_millis(), 60000);
    }

    #[test]
    fn test_calculate_backoff_zero_attempt() {
        assert_eq!(calculate_backoff(0, 1000, 60000), Duration::ZERO);
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        let backoff = Backoff::new(Duration::from_millis(250), Duration::from_millis(2000));
        for attempt in 1..20 {
            assert!(backoff.delay(attempt) <= Duration::from_millis(2000));
        }
    }
}
