//! Exponential reconnect backoff with bounded jitter.
//!
//! The nominal delay for attempt `n` (0-based) is `min(cap, base * 2^n)`.
//! The actual delay is the nominal delay scaled by a uniform factor in
//! `[1 - jitter, 1 + jitter]`, so at the cap a delay may exceed `cap` by up
//! to the jitter fraction.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ConfigError;

/// Largest exponent applied to `base`; beyond this every realistic policy
/// is already at its cap.
const MAX_EXPONENT: u32 = 30;

/// Validated reconnect timing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
    jitter: f64,
    max_retries: Option<u32>,
}

impl BackoffPolicy {
    /// Validate and build a policy.
    ///
    /// `base` must be non-zero, `cap` at least `base`, and `jitter` in
    /// `[0, 1)`. `max_retries = None` retries forever.
    pub fn new(base: Duration, cap: Duration, jitter: f64, max_retries: Option<u32>) -> Result<Self, ConfigError> {
        if base.is_zero() {
            return Err(ConfigError::Invalid {
                field: "reconnect.base_ms",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if cap < base {
            return Err(ConfigError::Invalid {
                field: "reconnect.cap_ms",
                reason: format!("cap {cap:?} is below base {base:?}"),
            });
        }
        if !(0.0..1.0).contains(&jitter) {
            return Err(ConfigError::Invalid {
                field: "reconnect.jitter",
                reason: format!("{jitter} is outside [0, 1)"),
            });
        }
        Ok(Self {
            base,
            cap,
            jitter,
            max_retries,
        })
    }

    /// First delay.
    pub const fn base(&self) -> Duration {
        self.base
    }

    /// Upper bound on the nominal delay.
    pub const fn cap(&self) -> Duration {
        self.cap
    }

    /// Relative jitter.
    pub const fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Retry ceiling, if any.
    pub const fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// Delay before jitter for the 0-based `attempt`.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt.min(MAX_EXPONENT)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Nominal delay scaled by a random factor in `[1 - jitter, 1 + jitter]`.
    pub fn jittered_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if self.jitter <= 0.0 {
            return nominal;
        }
        let factor = rng.random_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        Duration::try_from_secs_f64(nominal.as_secs_f64() * factor).unwrap_or(nominal)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            jitter: 0.2,
            max_retries: None,
        }
    }
}

/// Per-connection backoff state: attempt counter plus its RNG.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    rng: StdRng,
}

impl Backoff {
    /// Fresh state seeded from the OS.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self::with_rng(policy, StdRng::from_os_rng())
    }

    /// Fresh state with a fixed seed, for reproducible schedules.
    pub fn seeded(policy: BackoffPolicy, seed: u64) -> Self {
        Self::with_rng(policy, StdRng::seed_from_u64(seed))
    }

    const fn with_rng(policy: BackoffPolicy, rng: StdRng) -> Self {
        Self {
            policy,
            attempt: 0,
            rng,
        }
    }

    /// Delay before the next attempt, or `None` once the retry ceiling is
    /// reached. Each call counts as one failed attempt.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.policy.max_retries.is_some_and(|max| self.attempt >= max) {
            return None;
        }
        let delay = self.policy.jittered_delay(self.attempt, &mut self.rng);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }

    /// Retries scheduled since the last [`reset`](Self::reset).
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Clear the attempt counter after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt = 0;
    }

    /// The policy in force.
    pub const fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn nominal_delays_double_then_cap() {
        let policy = BackoffPolicy::default();
        let secs: Vec<u64> = (0..8).map(|n| policy.nominal_delay(n).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 30, 30, 30]);
        assert_eq!(policy.nominal_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn nominal_delays_never_decrease() {
        let policy = BackoffPolicy::new(Duration::from_millis(250), Duration::from_secs(7), 0.2, None).unwrap();
        let delays: Vec<_> = (0..40).map(|n| policy.nominal_delay(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let mut backoff = Backoff::seeded(BackoffPolicy::default(), 7);
        for attempt in 0..200 {
            let nominal = backoff.policy().nominal_delay(attempt).as_secs_f64();
            let actual = backoff.next_delay().unwrap().as_secs_f64();
            assert!(actual >= nominal * 0.8 - 1e-9, "{actual} < 0.8 * {nominal}");
            assert!(actual <= nominal * 1.2 + 1e-9, "{actual} > 1.2 * {nominal}");
        }
    }

    #[test]
    fn jittered_delays_never_decrease_before_the_cap() {
        // Doubling outruns a +/-20% spread, so only the capped tail may dip.
        for seed in 0..50 {
            let mut backoff = Backoff::seeded(BackoffPolicy::default(), seed);
            let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().unwrap()).collect();
            assert!(delays.windows(2).all(|w| w[0] <= w[1]), "seed {seed}: {delays:?}");
            assert!(delays.iter().all(|d| *d <= Duration::from_secs(36)));
        }
    }

    #[test]
    fn retry_ceiling_ends_the_schedule() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 0.0, Some(3)).unwrap();
        let mut backoff = Backoff::seeded(policy, 1);
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.attempt(), 3);
    }

    #[test]
    fn reset_restarts_from_base() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 0.0, None).unwrap();
        let mut backoff = Backoff::seeded(policy, 1);
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn invalid_policies_are_rejected() {
        assert!(BackoffPolicy::new(Duration::ZERO, Duration::from_secs(1), 0.2, None).is_err());
        assert!(BackoffPolicy::new(Duration::from_secs(2), Duration::from_secs(1), 0.2, None).is_err());
        assert!(BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(2), 1.0, None).is_err());
        assert!(BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(2), f64::NAN, None).is_err());
    }
}
