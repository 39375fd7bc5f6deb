use rand::Rng;
use std::time::Duration;

/// Backoff policy for reconnecting after an unexpected drop
///
/// The session asks for a delay before every attempt, counting from 0 after
/// the last successful handshake. `None` gives up: the session reports a
/// connect failure and closes.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before attempt number `attempt` (0-indexed), or `None` to stop
    fn next_delay(&self, attempt: usize) -> Option<Duration>;

    /// Attempt limit; `None` retries forever
    fn max_attempts(&self) -> Option<usize> {
        None
    }

    /// Called once the session is active again
    fn reset(&mut self) {}

    fn should_reconnect(&self, attempt: usize) -> bool {
        self.max_attempts().map_or(true, |max| attempt < max)
    }
}

/// Uniform random delay in `[0, max]`
#[derive(Debug, Clone, Copy, Default)]
struct Jitter(Duration);

impl Jitter {
    fn apply(self, delay: Duration) -> Duration {
        let max_ms = self.0.as_millis() as u64;
        if max_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Same delay before every attempt
///
/// The default policy: 10s between attempts, no limit.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<usize>,
    jitter: Jitter,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            delay,
            max_attempts,
            jitter: Jitter::default(),
        }
    }

    /// Spread attempts by up to `jitter` so terminals do not reconnect in step
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Jitter(jitter);
        self
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        self.should_reconnect(attempt)
            .then(|| self.jitter.apply(self.delay))
    }

    fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }
}

/// Doubling delay: `initial * 2^attempt`, capped at `max_delay`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<usize>,
    jitter: Jitter,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
            jitter: Jitter::default(),
        }
    }

    /// Add up to `jitter` on top of the capped delay
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Jitter(jitter);
        self
    }

    fn base_delay(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt)
            .ok()
            .and_then(|exp| 2u32.checked_pow(exp))
            .unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        self.should_reconnect(attempt)
            .then(|| self.jitter.apply(self.base_delay(attempt)))
    }

    fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }
}

/// Close instead of reconnecting
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _attempt: usize) -> Option<Duration> {
        None
    }

    fn max_attempts(&self) -> Option<usize> {
        Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_limit() {
        let strategy = FixedDelay::new(Duration::from_secs(10), Some(2));

        assert_eq!(strategy.next_delay(0), Some(Duration::from_secs(10)));
        assert_eq!(strategy.next_delay(1), Some(Duration::from_secs(10)));
        assert_eq!(strategy.next_delay(2), None);
        assert!(FixedDelay::new(Duration::from_secs(1), None).should_reconnect(10_000));
    }

    #[test]
    fn test_fixed_delay_jitter_bounds() {
        let strategy = FixedDelay::new(Duration::from_millis(1000), None)
            .with_jitter(Duration::from_millis(200));

        for attempt in 0..50 {
            let delay = strategy.next_delay(attempt).unwrap();
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1200));
        }
    }

    #[test]
    fn test_exponential_doubles_and_caps() {
        let strategy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1), None);

        assert_eq!(strategy.next_delay(0), Some(Duration::from_millis(100)));
        assert_eq!(strategy.next_delay(2), Some(Duration::from_millis(400)));
        assert_eq!(strategy.next_delay(4), Some(Duration::from_secs(1)));
        assert_eq!(strategy.next_delay(200), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_exponential_jitter_never_below_base() {
        let strategy = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_secs(1),
            Some(3),
        )
        .with_jitter(Duration::from_millis(50));

        let delay = strategy.next_delay(2).unwrap();
        assert!(delay >= Duration::from_millis(400));
        assert!(delay <= Duration::from_millis(450));
        assert!(strategy.next_delay(3).is_none());
    }

    #[test]
    fn test_never_reconnect() {
        assert_eq!(NeverReconnect.next_delay(0), None);
        assert!(!NeverReconnect.should_reconnect(0));
    }
}
