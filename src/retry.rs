//! Retry policy: attempt bound, per-attempt timeout and backoff between attempts.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

/// Default number of attempts per run.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default per-attempt timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default base delay between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

/// Default ceiling for growing backoff strategies.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Delay applied after a failed attempt.
#[derive(Clone)]
pub enum Backoff {
    /// Same delay after every failure.
    Constant(Duration),
    /// `base * attempt`, capped at `max`.
    Linear { base: Duration, max: Duration },
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
    /// Caller-supplied function of the 1-based attempt index.
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl Backoff {
    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            Backoff::Constant(delay) => *delay,
            Backoff::Linear { base, max } => base.saturating_mul(attempt).min(*max),
            Backoff::Exponential { base, max } => {
                // 2^31 already saturates any sane base
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(*max)
            }
            Backoff::Custom(f) => f(attempt),
        }
    }

    /// Parse a strategy name as used in config files.
    pub fn from_name(name: &str, base: Duration, max: Duration) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "constant" | "fixed" => Some(Backoff::Constant(base)),
            "linear" => Some(Backoff::Linear { base, max }),
            "exponential" | "exp" => Some(Backoff::Exponential { base, max }),
            _ => None,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Constant(DEFAULT_BACKOFF)
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backoff::Constant(d) => f.debug_tuple("Constant").field(d).finish(),
            Backoff::Linear { base, max } => f
                .debug_struct("Linear")
                .field("base", base)
                .field("max", max)
                .finish(),
            Backoff::Exponential { base, max } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("max", max)
                .finish(),
            Backoff::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// Bounds for one orchestration run. Not mutated during a run.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: NonZeroU32,
    pub per_attempt_timeout: Duration,
    pub backoff: Backoff,
    /// Randomize each delay uniformly in `[0, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroU32::new(DEFAULT_MAX_ATTEMPTS).unwrap_or(NonZeroU32::MIN),
            per_attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            backoff: Backoff::default(),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: NonZeroU32, per_attempt_timeout: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            per_attempt_timeout,
            backoff,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff.delay_for(attempt);
        if self.jitter && !delay.is_zero() {
            let millis = delay.as_millis().min(u64::MAX as u128) as u64;
            Duration::from_millis(rand::rng().random_range(0..=millis))
        } else {
            delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_backoff() {
        let b = Backoff::Constant(Duration::from_millis(250));
        assert_eq!(b.delay_for(1), Duration::from_millis(250));
        assert_eq!(b.delay_for(7), Duration::from_millis(250));
    }

    #[test]
    fn test_linear_backoff_caps() {
        let b = Backoff::Linear {
            base: Duration::from_secs(1),
            max: Duration::from_secs(3),
        };
        assert_eq!(b.delay_for(1), Duration::from_secs(1));
        assert_eq!(b.delay_for(2), Duration::from_secs(2));
        assert_eq!(b.delay_for(10), Duration::from_secs(3));
    }

    #[test]
    fn test_exponential_backoff() {
        let b = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
        };
        assert_eq!(b.delay_for(1), Duration::from_millis(100));
        assert_eq!(b.delay_for(2), Duration::from_millis(200));
        assert_eq!(b.delay_for(3), Duration::from_millis(400));
        assert_eq!(b.delay_for(5), Duration::from_secs(1));
        assert_eq!(b.delay_for(64), Duration::from_secs(1));
    }

    #[test]
    fn test_custom_backoff() {
        let b = Backoff::Custom(Arc::new(|n| Duration::from_millis(n as u64 * 10)));
        assert_eq!(b.delay_for(3), Duration::from_millis(30));
    }

    #[test]
    fn test_from_name() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(8);
        assert!(matches!(
            Backoff::from_name("Exponential", base, max),
            Some(Backoff::Exponential { .. })
        ));
        assert!(matches!(
            Backoff::from_name("constant", base, max),
            Some(Backoff::Constant(_))
        ));
        assert!(Backoff::from_name("fibonacci", base, max).is_none());
    }

    #[test]
    fn test_jitter_stays_within_delay() {
        let policy = RetryPolicy::new(
            NonZeroU32::new(3).unwrap(),
            Duration::from_secs(1),
            Backoff::Constant(Duration::from_millis(50)),
        )
        .with_jitter(true);
        for attempt in 1..20 {
            assert!(policy.delay_for(attempt) <= Duration::from_millis(50));
        }
    }
}
