use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt
    pub initial: Duration,
    /// Upper bound for any single delay
    pub max: Duration,
    pub multiplier: f64,
    /// Randomize each delay by ±30%
    pub jitter: bool,
    /// Consecutive failed attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
            max_attempts: Some(10),
        }
    }
}

/// Reconnect schedule. `reset` after a connection has been established.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial;
        Self {
            config,
            attempt: 0,
            current,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max_attempts) = self.config.max_attempts {
            if self.attempt >= max_attempts {
                return None;
            }
        }
        self.attempt += 1;

        let base = self.current.min(self.config.max);
        self.current = Duration::from_millis(
            ((self.current.as_millis() as f64) * self.config.multiplier).min(
                self.config.max.as_millis() as f64
            ) as u64
        );
        Some(apply_jitter(base, self.config.jitter))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current = self.config.initial;
    }
}

fn apply_jitter(base: Duration, jitter: bool) -> Duration {
    if !jitter {
        return base;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
    Duration::from_millis(((base.as_millis() as f64) * factor) as u64)
}
