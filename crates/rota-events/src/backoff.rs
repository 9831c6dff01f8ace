//! Exponential backoff for reconnecting the push channel.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// No delay is shorter than this, whatever the configuration says.
pub const MIN_DELAY_MS: u64 = 50;

/// Tunable parameters for the reconnect delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt.
    pub initial_ms: u64,
    /// Upper bound on the delay between attempts.
    pub max_ms: u64,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Randomize each delay within [delay/2, delay] so clients that dropped
    /// together do not reconnect together.
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            max_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Running backoff state for one supervised connection.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = floored(config.initial_ms);
        Self { config, current }
    }

    /// The delay to wait now; advances the schedule for next time.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let next_ms = (self.current.as_millis() as f64 * self.config.multiplier) as u64;
        self.current = floored(next_ms.min(self.config.max_ms));
        if self.config.jitter && delay.as_millis() > 1 {
            let ms = delay.as_millis() as u64;
            Duration::from_millis(rand::thread_rng().gen_range(ms / 2..=ms))
        } else {
            delay
        }
    }

    /// Back to the initial delay after a successful connection.
    pub fn reset(&mut self) {
        self.current = floored(self.config.initial_ms);
    }
}

fn floored(ms: u64) -> Duration {
    Duration::from_millis(ms.max(MIN_DELAY_MS))
}
