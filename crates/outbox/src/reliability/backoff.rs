//! Backoff policy implementation

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default multiplier for [`BackoffStrategy::Exponential`]
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// How the wait before the next attempt grows with the attempt number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Always wait `base`
    Fixed,

    /// Wait `base * attempt`
    #[default]
    Linear,

    /// Wait `base * multiplier^(attempt - 1)`
    Exponential,
}

impl std::fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Linear => write!(f, "linear"),
            Self::Exponential => write!(f, "exponential"),
        }
    }
}

impl std::str::FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!("unknown backoff strategy: {other}")),
        }
    }
}

/// Retry delay calculator
///
/// Pure and deterministic: no jitter, no clock. Every delay is capped at
/// `max_delay`, and for [`BackoffStrategy::Linear`] and
/// [`BackoffStrategy::Exponential`] the delay never decreases as the attempt
/// number grows.
///
/// # Example
///
/// ```
/// use courier_outbox::{BackoffPolicy, BackoffStrategy};
/// use std::time::Duration;
///
/// let policy = BackoffPolicy::new(BackoffStrategy::Exponential)
///     .with_base_delay(Duration::from_secs(1))
///     .with_max_delay(Duration::from_secs(5));
///
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
/// assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub strategy: BackoffStrategy,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::default(),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with the default base (1s), cap (5min) and multiplier
    pub fn new(strategy: BackoffStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    /// Set the base delay
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the delay cap
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the exponential multiplier (values below 1.0 are raised to 1.0)
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Calculate the delay before retry number `attempt` (1-based)
    ///
    /// An `attempt` of 0 is treated as the first retry.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let cap = self.max_delay;

        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay.min(cap),
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt).min(cap),
            BackoffStrategy::Exponential => {
                let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                let nanos = self.base_delay.as_nanos() as f64 * self.multiplier.powi(exponent);
                if !nanos.is_finite() || nanos >= cap.as_nanos() as f64 {
                    return cap;
                }
                Duration::from_nanos(nanos.round() as u64).min(cap)
            }
        }
    }
}

/// Delay before retry number `attempt` using the default multiplier
pub fn delay(attempt: u32, base: Duration, cap: Duration, strategy: BackoffStrategy) -> Duration {
    BackoffPolicy::new(strategy)
        .with_base_delay(base)
        .with_max_delay(cap)
        .delay_for_attempt(attempt)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_fixed_delay_ignores_attempt() {
        let cap = Duration::from_secs(5);
        assert_eq!(delay(1, SECOND, cap, BackoffStrategy::Fixed), SECOND);
        assert_eq!(delay(2, SECOND, cap, BackoffStrategy::Fixed), SECOND);
        assert_eq!(delay(5, SECOND, cap, BackoffStrategy::Fixed), SECOND);
    }

    #[test]
    fn test_fixed_delay_is_capped() {
        let delay = delay(1, Duration::from_secs(10), SECOND, BackoffStrategy::Fixed);
        assert_eq!(delay, SECOND);
    }

    #[test]
    fn test_exponential_delay() {
        let cap = Duration::from_secs(5);
        let strategy = BackoffStrategy::Exponential;

        assert_eq!(delay(1, SECOND, cap, strategy), Duration::from_secs(1));
        assert_eq!(delay(2, SECOND, cap, strategy), Duration::from_secs(2));
        assert_eq!(delay(3, SECOND, cap, strategy), Duration::from_secs(4));
        // 8s capped to 5s
        assert_eq!(delay(4, SECOND, cap, strategy), Duration::from_secs(5));
    }

    #[test]
    fn test_linear_delay() {
        let cap = Duration::from_secs(5);
        let strategy = BackoffStrategy::Linear;

        assert_eq!(delay(1, SECOND, cap, strategy), Duration::from_secs(1));
        assert_eq!(delay(2, SECOND, cap, strategy), Duration::from_secs(2));
        assert_eq!(delay(3, SECOND, cap, strategy), Duration::from_secs(3));
        assert_eq!(delay(9, SECOND, cap, strategy), Duration::from_secs(5));
    }

    #[test]
    fn test_custom_multiplier() {
        let policy = BackoffPolicy::new(BackoffStrategy::Exponential)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(60))
            .with_multiplier(3.0);

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(300));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(900));
    }

    #[test]
    fn test_multiplier_floor() {
        let policy = BackoffPolicy::new(BackoffStrategy::Exponential).with_multiplier(0.5);
        assert_eq!(policy.multiplier, 1.0);
    }

    #[test]
    fn test_attempt_zero_is_first_retry() {
        let cap = Duration::from_secs(5);
        assert_eq!(
            delay(0, SECOND, cap, BackoffStrategy::Linear),
            delay(1, SECOND, cap, BackoffStrategy::Linear)
        );
    }

    #[test]
    fn test_huge_attempts_saturate_at_cap() {
        let cap = Duration::from_secs(300);
        for strategy in [BackoffStrategy::Linear, BackoffStrategy::Exponential] {
            assert_eq!(delay(u32::MAX, SECOND, cap, strategy), cap);
            assert_eq!(delay(10_000, Duration::MAX, cap, strategy), cap);
        }
    }

    #[test]
    fn test_delays_are_bounded_and_non_decreasing() {
        let base = Duration::from_millis(250);
        let cap = Duration::from_secs(30);

        for strategy in [
            BackoffStrategy::Fixed,
            BackoffStrategy::Linear,
            BackoffStrategy::Exponential,
        ] {
            let mut previous = Duration::ZERO;
            for attempt in 1..=200 {
                let current = delay(attempt, base, cap, strategy);
                assert!(current <= cap, "{strategy} attempt {attempt} exceeded cap");
                assert!(
                    current >= previous,
                    "{strategy} attempt {attempt} decreased: {previous:?} -> {current:?}"
                );
                previous = current;
            }
        }
    }

    #[test]
    fn test_strategy_parse_and_display() {
        assert_eq!("FIXED".parse::<BackoffStrategy>(), Ok(BackoffStrategy::Fixed));
        assert_eq!(" linear ".parse::<BackoffStrategy>(), Ok(BackoffStrategy::Linear));
        assert_eq!(
            "exponential".parse::<BackoffStrategy>(),
            Ok(BackoffStrategy::Exponential)
        );
        assert!("random".parse::<BackoffStrategy>().is_err());
        assert_eq!(BackoffStrategy::Exponential.to_string(), "exponential");
    }

    #[test]
    fn test_strategy_serialization() {
        let json = serde_json::to_string(&BackoffStrategy::Exponential).unwrap();
        assert_eq!(json, "\"exponential\"");
        let parsed: BackoffStrategy = serde_json::from_str("\"fixed\"").unwrap();
        assert_eq!(parsed, BackoffStrategy::Fixed);
    }
}
