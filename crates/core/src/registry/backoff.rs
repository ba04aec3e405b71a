//! Cooldown computation for failed search attempts.
//!
//! Each failure doubles the previous cooldown, capped at the configured
//! ceiling, with random jitter applied so that a burst of simultaneous
//! failures does not produce a synchronized retry thundering herd.

use chrono::Duration;
use rand::Rng;

use crate::config::RetryPolicy;

/// Cooldown for the given attempt number (1-based: the first failure is
/// attempt 1), before jitter.
pub fn base_cooldown_secs(attempt: u32, policy: &RetryPolicy) -> u64 {
    let exponent = attempt.saturating_sub(1).min(32);
    let scaled = policy
        .cooldown_base_secs
        .saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX));
    scaled.min(policy.cooldown_cap_secs)
}

/// Cooldown with jitter applied, as a chrono duration ready to add to `now`.
///
/// Jitter is uniform in `[-jitter_fraction, +jitter_fraction]` of the base
/// value. The result never exceeds the cap and is never negative.
pub fn cooldown_duration(attempt: u32, policy: &RetryPolicy) -> Duration {
    let base = base_cooldown_secs(attempt, policy) as f64;
    let fraction = policy.jitter_fraction.clamp(0.0, 1.0);
    let jittered = if fraction > 0.0 {
        let factor = rand::rng().random_range(1.0 - fraction..=1.0 + fraction);
        base * factor
    } else {
        base
    };
    let secs = jittered.round().clamp(0.0, policy.cooldown_cap_secs as f64);
    Duration::seconds(secs as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            cooldown_base_secs: 300,
            cooldown_cap_secs: 43_200,
            jitter_fraction: 0.25,
        }
    }

    #[test]
    fn test_base_cooldown_doubles_per_attempt() {
        let p = policy();
        assert_eq!(base_cooldown_secs(1, &p), 300);
        assert_eq!(base_cooldown_secs(2, &p), 600);
        assert_eq!(base_cooldown_secs(3, &p), 1200);
        assert_eq!(base_cooldown_secs(4, &p), 2400);
    }

    #[test]
    fn test_base_cooldown_caps() {
        let p = policy();
        assert_eq!(base_cooldown_secs(10, &p), 43_200);
        assert_eq!(base_cooldown_secs(100, &p), 43_200);
    }

    #[test]
    fn test_attempt_zero_treated_as_first() {
        let p = policy();
        assert_eq!(base_cooldown_secs(0, &p), 300);
    }

    #[test]
    fn test_jittered_cooldown_stays_within_bounds() {
        let p = policy();
        for attempt in 1..=8 {
            let base = base_cooldown_secs(attempt, &p) as f64;
            for _ in 0..50 {
                let d = cooldown_duration(attempt, &p).num_seconds() as f64;
                assert!(d >= (base * 0.75).floor(), "attempt {attempt}: {d} < lower bound");
                assert!(d <= (base * 1.25).ceil().min(43_200.0), "attempt {attempt}: {d} > upper bound");
            }
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let p = RetryPolicy {
            jitter_fraction: 0.0,
            ..policy()
        };
        assert_eq!(cooldown_duration(2, &p).num_seconds(), 600);
        assert_eq!(cooldown_duration(2, &p).num_seconds(), 600);
    }
}
