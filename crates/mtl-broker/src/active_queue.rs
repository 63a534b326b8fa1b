use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::peer::Peer;
use crate::shutdown::StopFlag;

/// FIFO of distinct Peers with pending egress. The Scheduler is the sole
/// consumer; Handlers are producers that append only on the empty-to-non-empty
/// transition of a Peer's own out_queue (see [`Peer::push_blocking`]).
pub struct ActiveQueue {
    queue: Mutex<VecDeque<Arc<Peer>>>,
    messages_exist: Condvar,
}

impl Default for ActiveQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveQueue {
    pub fn new() -> Self {
        Self { queue: Mutex::new(VecDeque::new()), messages_exist: Condvar::new() }
    }

    pub fn push(&self, peer: Arc<Peer>) {
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(peer);
        self.messages_exist.notify_one();
    }

    /// Pops the head peer, waiting on the "messages-exist" condition while
    /// the queue is empty and shutdown has not been requested. Returns
    /// `None` only once the queue is empty *and* `stop` is set — the
    /// Scheduler must drain everything pending before it may exit.
    pub fn pop_wait(&self, stop: &StopFlag) -> Option<Arc<Peer>> {
        let mut queue = self.queue.lock().unwrap();
        loop {
            if let Some(peer) = queue.pop_front() {
                return Some(peer);
            }
            if stop.is_set() {
                return None;
            }
            let (guard, _timeout) =
                self.messages_exist.wait_timeout(queue, Duration::from_millis(200)).unwrap();
            queue = guard;
        }
    }

    /// Wakes any waiter so it can observe a freshly set stop flag promptly.
    pub fn notify_shutdown(&self) {
        self.messages_exist.notify_all();
    }
}
