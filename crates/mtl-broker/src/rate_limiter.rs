use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::shutdown::{StopFlag, sleep_until_or_stop};

#[derive(Clone, Copy, Debug)]
pub struct RateLimiterConfig {
    pub max_rate: f64,
    pub min_rate: f64,
    pub step: f64,
    pub period: Duration,
}

/// Starts at `current_rate = max_rate`; every `period` it decrements by
/// `step`; when it would fall below `min_rate` it resets to `max_rate`.
/// The Scheduler reads `current_rate` to compute its inter-send interval.
pub struct RateLimiter {
    config: RateLimiterConfig,
    current_rate: Mutex<f64>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self { current_rate: Mutex::new(config.max_rate), config }
    }

    pub fn current_rate(&self) -> f64 {
        *self.current_rate.lock().unwrap()
    }

    /// The inter-send period implied by the current rate.
    pub fn next_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.current_rate().max(f64::MIN_POSITIVE))
    }

    /// Runs the decay loop until `stop` is set. Period is enforced with
    /// absolute deadlines to avoid drift accumulation.
    pub fn run_decay(&self, stop: &StopFlag) {
        let mut target = Instant::now();
        loop {
            target += self.config.period;
            if !sleep_until_or_stop(target, stop) {
                break;
            }
            let mut rate = self.current_rate.lock().unwrap();
            *rate -= self.config.step;
            if *rate < self.config.min_rate {
                *rate = self.config.max_rate;
            }
        }
    }
}
