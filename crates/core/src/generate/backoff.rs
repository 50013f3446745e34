//! Exponential backoff with jitter for transient model failures.

use crate::config::RetryPolicy;
use rand::Rng;
use std::time::Duration;

/// Delay before retry attempt `attempt` (0-based: the delay taken after the
/// first failure is `delay_for(policy, 0)`). Doubles from `base_delay_ms`,
/// caps at `max_delay_ms`, then adds uniform jitter in `0..=jitter_ms`.
pub fn delay_for(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = policy
        .base_delay_ms
        .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
        .min(policy.max_delay_ms);
    let jitter = if policy.jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=policy.jitter_ms)
    };
    Duration::from_millis(exp.saturating_add(jitter))
}
