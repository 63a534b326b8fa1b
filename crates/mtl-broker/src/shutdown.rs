use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::flag as signal_flag;

/// Shared stop signal armed by `SIGINT`/`SIGTERM`/`SIGQUIT` and polled
/// cooperatively by the accept loop, the Scheduler, the rate limiter's decay
/// thread and the metrics sampler. Nothing is ever forcibly killed.
#[derive(Clone)]
pub struct StopFlag(Arc<AtomicUsize>);

impl StopFlag {
    pub fn register() -> std::io::Result<Self> {
        let flag = Arc::new(AtomicUsize::new(0));
        signal_flag::register_usize(SIGTERM, Arc::clone(&flag), SIGTERM as usize)?;
        signal_flag::register_usize(SIGINT, Arc::clone(&flag), SIGINT as usize)?;
        signal_flag::register_usize(SIGQUIT, Arc::clone(&flag), SIGQUIT as usize)?;
        Ok(Self(flag))
    }

    pub fn new_unarmed() -> Self {
        Self(Arc::new(AtomicUsize::new(0)))
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed) != 0
    }

    /// For tests that want to simulate a signal without registering a
    /// real handler.
    pub fn trigger(&self) {
        self.0.store(SIGTERM as usize, Ordering::Relaxed);
    }
}

/// Sleeps until `target`, waking early (and returning `false`) if `stop`
/// becomes set while waiting. Polls in short slices rather than one long
/// sleep so shutdown is responsive.
pub fn sleep_until_or_stop(target: Instant, stop: &StopFlag) -> bool {
    loop {
        if stop.is_set() {
            return false;
        }
        let now = Instant::now();
        if now >= target {
            return true;
        }
        thread::sleep((target - now).min(Duration::from_millis(50)));
    }
}
