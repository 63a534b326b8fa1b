use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::rate_limiter::RateLimiterConfig;

/// `<exec> <port> [<log_file> [<min_rate> <step> <max_rate> <period_ms>]]`,
/// byte-for-byte compatible with the original CLI contract.
#[derive(Parser, Debug)]
#[command(name = "mtl-broker", about = "Message Transport Layer broker")]
pub struct Cli {
    pub port: u16,
    pub log_file: Option<PathBuf>,
    pub min_rate: Option<f64>,
    pub step: Option<f64>,
    pub max_rate: Option<f64>,
    pub period_ms: Option<u64>,
}

impl Cli {
    pub fn rate_limiter_config(&self) -> Option<RateLimiterConfig> {
        match (self.min_rate, self.step, self.max_rate, self.period_ms) {
            (Some(min_rate), Some(step), Some(max_rate), Some(period_ms)) => {
                Some(RateLimiterConfig { min_rate, step, max_rate, period: Duration::from_millis(period_ms) })
            }
            _ => None,
        }
    }
}
