// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    /// Retry on a fixed interval.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_backoff: interval,
            max_backoff: interval,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.initial_backoff.is_zero() {
            return Err("initial backoff must be positive".to_string());
        }
        if self.max_backoff < self.initial_backoff {
            return Err(format!(
                "max backoff ({:?}) must not be smaller than initial backoff ({:?})",
                self.max_backoff, self.initial_backoff
            ));
        }
        Ok(())
    }
}

/// Delay sequence for one run of retries.
///
/// Doubles from `initial_backoff` up to `max_backoff` with +/- 25% jitter.
/// When both are equal the interval is fixed and no jitter is applied.
#[derive(Debug)]
pub struct Backoff {
    config: RetryConfig,
    current_backoff: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            current_backoff: config.initial_backoff,
            config,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn next_delay(&mut self) -> Duration {
        self.attempts += 1;

        if self.config.initial_backoff == self.config.max_backoff {
            return self.current_backoff;
        }

        let backoff_ms = self.current_backoff.as_millis() as i64;

        let mut v = backoff_ms / 2;
        // avoid div by zero
        if v == 0 {
            v = 1;
        }

        let jitter = (rand::random::<u64>() % v as u64) as i64 - (v / 2);
        let mut sleep_ms = backoff_ms + jitter;
        if sleep_ms < 0 {
            sleep_ms = 1;
        }

        // Increase backoff for next retry, but cap at max_backoff
        self.current_backoff = std::cmp::min(self.current_backoff * 2, self.config.max_backoff);

        Duration::from_millis(sleep_ms as u64)
    }
}
