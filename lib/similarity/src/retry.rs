use rand::Rng;
use std::time::Duration;
use tracing::{error, warn};

/// Exponential backoff with jitter for idempotent read paths.
///
/// Only operations that can be repeated without side effects go through a
/// policy; index writes and ratio calculations are never retried here.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Scale each delay by a random factor in [0.5, 1.5).
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based), never above `max_delay`.
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exp = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let mut secs = (self.base_delay.as_secs_f64() * exp).min(self.max_delay.as_secs_f64());
        if self.jitter {
            secs *= rng.random_range(0.5..1.5);
        }
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()).max(0.0))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. The last error is returned.
    pub fn run<T, E, F, P>(&self, label: &str, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut rng = rand::rng();
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < attempts && retryable(&e) => {
                    let delay = self.delay_for(attempt, &mut rng);
                    warn!(
                        "Attempt {}/{} of {} failed, retrying in {:.2}s: {}",
                        attempt + 1,
                        attempts,
                        label,
                        delay.as_secs_f64(),
                        e
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    if attempt + 1 >= attempts && attempts > 1 {
                        error!("All {} attempts of {} failed: {}", attempts, label, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
