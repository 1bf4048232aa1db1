//! Exponential backoff with jitter for batch retries.

use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Grows the wait between attempts until the elapsed-time budget or the
/// retry cap runs out.
pub struct ExponentialBackoff {
    config: BackoffConfig,
    current_interval: Duration,
    started_at: Instant,
    retries: u32,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current_interval: config.initial_interval,
            config,
            started_at: Instant::now(),
            retries: 0,
        }
    }

    /// Retries handed out so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Next wait, or `None` when the policy gives up.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max) = self.config.max_retries {
            if self.retries >= max {
                return None;
            }
        }

        let delay = randomize(self.current_interval, self.config.randomization_factor);
        if self.elapsed().saturating_add(delay) > self.config.max_elapsed_time {
            return None;
        }

        self.retries += 1;
        self.current_interval = self.grow(self.current_interval);
        Some(delay)
    }

    fn grow(&self, interval: Duration) -> Duration {
        let next = interval.as_secs_f64() * self.config.multiplier;
        if next >= self.config.max_interval.as_secs_f64() {
            self.config.max_interval
        } else {
            Duration::from_secs_f64(next)
        }
    }
}

/// Pick a delay uniformly in `interval * (1 ± factor)`.
fn randomize(interval: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || interval.is_zero() {
        return interval;
    }
    let base = interval.as_secs_f64();
    let delta = base * factor;
    let secs = rand::thread_rng().gen_range((base - delta)..=(base + delta));
    Duration::from_secs_f64(secs.max(0.0))
}
