use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Shared stop flag set by [`crate::Service::stop`]. Unlike the broker's
/// signal-armed `StopFlag`, this one is only ever triggered programmatically.
#[derive(Clone, Default)]
pub(crate) struct Stopped(Arc<AtomicBool>);

impl Stopped {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Sleeps for `duration`, waking early if `stop` becomes set. Polls in short
/// slices so pacing delays don't stall shutdown.
pub(crate) fn sleep_or_stop(duration: Duration, stop: &Stopped) {
    let deadline = Instant::now() + duration;
    loop {
        if stop.is_set() {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
}
