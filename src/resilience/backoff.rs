//! Exponential backoff with jitter between retry attempts.

use std::time::Duration;
use rand::Rng;

use crate::config::RetryConfig;

/// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped at
/// `max`, plus up to 10% jitter so parallel retries spread out.
pub fn retry_delay(retry: u32, config: &RetryConfig) -> Duration {
    if retry == 0 || config.base_delay_ms == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64.checked_shl(retry - 1).unwrap_or(u64::MAX);
    let capped = config
        .base_delay_ms
        .saturating_mul(factor)
        .min(config.max_delay_ms);

    let jitter = match capped / 10 {
        0 => 0,
        range => rand::thread_rng().gen_range(0..range),
    };
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: u64, max: u64) -> RetryConfig {
        RetryConfig {
            base_delay_ms: base,
            max_delay_ms: max,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let c = config(100, 1000);
        assert_eq!(retry_delay(0, &c), Duration::ZERO);

        let first = retry_delay(1, &c).as_millis();
        assert!((100..110).contains(&first));

        let second = retry_delay(2, &c).as_millis();
        assert!((200..220).contains(&second));

        let capped = retry_delay(40, &c).as_millis();
        assert!((1000..1100).contains(&capped));
    }

    #[test]
    fn test_zero_base_disables_delay() {
        assert_eq!(retry_delay(3, &config(0, 1000)), Duration::ZERO);
    }
}
