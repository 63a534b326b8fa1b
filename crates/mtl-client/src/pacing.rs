use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Successes before the inter-send delay speeds up.
const INCREASE_AT: i64 = 512;
/// NACKs before the inter-send delay slows down.
const DECREASE_AT: i64 = 256;
const SPEEDUP_FACTOR: f64 = 0.9;
const SLOWDOWN_FACTOR: f64 = 1.1;
const MIN_DELAY: Duration = Duration::from_micros(1);
const MAX_DELAY: Duration = Duration::from_secs(1);
const INITIAL_DELAY: Duration = Duration::from_millis(1);

struct State {
    delay: Duration,
    flow_balance: i64,
}

/// Adaptive inter-send delay driven by a signed `flow_balance` counter, per
/// original spec §4.7: each successful send nudges the balance up, each NACK
/// clears any positive balance and nudges it down, and crossing either
/// threshold rescales the delay and resets the balance to zero.
pub struct AdaptivePacer {
    state: Mutex<State>,
    sent: AtomicU64,
    nacked: AtomicU64,
}

impl Default for AdaptivePacer {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptivePacer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State { delay: INITIAL_DELAY, flow_balance: 0 }),
            sent: AtomicU64::new(0),
            nacked: AtomicU64::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.state.lock().unwrap().delay
    }

    /// Frames handed to the broker so far, NACKed or not.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Frames this pacer has seen come back NACKed.
    pub fn nacked_count(&self) -> u64 {
        self.nacked.load(Ordering::Relaxed)
    }

    pub fn on_success(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        let mut s = self.state.lock().unwrap();
        s.flow_balance += 1;
        if s.flow_balance >= INCREASE_AT {
            s.delay = scale(s.delay, SPEEDUP_FACTOR);
            s.flow_balance = 0;
        }
    }

    pub fn on_nack(&self) {
        self.nacked.fetch_add(1, Ordering::Relaxed);
        let mut s = self.state.lock().unwrap();
        if s.flow_balance > 0 {
            s.flow_balance = 0;
        }
        s.flow_balance -= 1;
        if s.flow_balance <= -DECREASE_AT {
            s.delay = scale(s.delay, SLOWDOWN_FACTOR);
            s.flow_balance = 0;
        }
    }
}

fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::from_secs_f64(delay.as_secs_f64() * factor).clamp(MIN_DELAY, MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_success_speeds_up_after_threshold() {
        let pacer = AdaptivePacer::new();
        let before = pacer.delay();
        for _ in 0..INCREASE_AT {
            pacer.on_success();
        }
        assert!(pacer.delay() < before);
    }

    #[test]
    fn fewer_than_threshold_successes_leave_delay_unchanged() {
        let pacer = AdaptivePacer::new();
        let before = pacer.delay();
        for _ in 0..INCREASE_AT - 1 {
            pacer.on_success();
        }
        assert_eq!(pacer.delay(), before);
    }

    #[test]
    fn repeated_nack_slows_down_after_threshold() {
        let pacer = AdaptivePacer::new();
        let before = pacer.delay();
        for _ in 0..DECREASE_AT {
            pacer.on_nack();
        }
        assert!(pacer.delay() > before);
    }

    #[test]
    fn nack_clears_positive_balance_before_decrementing() {
        let pacer = AdaptivePacer::new();
        for _ in 0..10 {
            pacer.on_success();
        }
        // A single NACK should only need DECREASE_AT more NACKs to slow
        // down, not DECREASE_AT + 10 — the positive balance is cleared, not
        // subtracted from.
        let before = pacer.delay();
        for _ in 0..DECREASE_AT {
            pacer.on_nack();
        }
        assert!(pacer.delay() > before);
    }

    #[test]
    fn delay_never_exceeds_max_delay() {
        let pacer = AdaptivePacer::new();
        for _ in 0..(DECREASE_AT * 50) {
            pacer.on_nack();
        }
        assert!(pacer.delay() <= MAX_DELAY);
    }
}
