use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::Duration;

use mtl_utils::safe_assert;
use mtl_wire::{Flags, Frame, next_count};

use crate::error::ClientError;
use crate::stop::Stopped;

/// Grace period given to a NACK for the last frame sent to come back before
/// [`SendQueue::wait_drained`] declares the queues durably empty.
const DRAIN_RECHECK: Duration = Duration::from_millis(50);

struct Inner {
    out_queue: VecDeque<Frame>,
    nacked_queue: VecDeque<Frame>,
    next_seq: u16,
}

/// Both client-side queues under one lock, per original spec §5: a single
/// queue lock covering `out_queue` and `nacked_queue`, with "work-exists"
/// and "not-full" condvars.
pub struct SendQueue {
    inner: Mutex<Inner>,
    work_exists: Condvar,
    not_full: Condvar,
    max_out_buffer: usize,
}

impl SendQueue {
    pub fn new(max_out_buffer: usize) -> Self {
        Self {
            inner: Mutex::new(Inner { out_queue: VecDeque::new(), nacked_queue: VecDeque::new(), next_seq: 0 }),
            work_exists: Condvar::new(),
            not_full: Condvar::new(),
            max_out_buffer,
        }
    }

    /// Builds a frame for `(dest_addr, dest_port)`, assigns the next
    /// mod-65536 sequence number, and appends it to `out_queue`. Blocks on
    /// "not-full" while `out_queue.len() + nacked_queue.len()` is at
    /// `max_out_buffer`. The counter only advances under the queue lock and
    /// only once the slot is actually available, so concurrent submitters
    /// can't reorder sequence numbers relative to queue position.
    pub fn schedule(
        &self,
        dest_addr: Ipv4Addr,
        dest_port: u16,
        payload: &[u8],
        stop: &Stopped,
    ) -> Result<(), ClientError> {
        let mut frame = Frame::new(dest_addr, dest_port, payload)?;
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.out_queue.len() + inner.nacked_queue.len() < self.max_out_buffer {
                break;
            }
            if stop.is_set() {
                return Err(ClientError::Stopped);
            }
            let (guard, _) = self.not_full.wait_timeout(inner, Duration::from_millis(200)).unwrap();
            inner = guard;
        }
        frame.count = inner.next_seq;
        inner.next_seq = next_count(inner.next_seq);
        inner.out_queue.push_back(frame);
        self.work_exists.notify_one();
        Ok(())
    }

    /// Pops the next frame to transmit: `nacked_queue`'s head unconditionally
    /// if present (highest priority), else `out_queue`'s head only if its
    /// count continues `prev_count` (or this is the very first send).
    /// Blocks on "work-exists" otherwise. Returns `None` once `stop` is set
    /// and neither queue currently has an eligible frame.
    pub fn pop_for_send(&self, prev_count: Option<u16>, stop: &Stopped) -> Option<Frame> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(frame) = inner.nacked_queue.pop_front() {
                self.not_full.notify_all();
                return Some(frame);
            }
            let eligible = match (inner.out_queue.front(), prev_count) {
                (Some(_), None) => true,
                (Some(head), Some(prev)) => head.count == next_count(prev),
                (None, _) => false,
            };
            if eligible {
                let frame = inner.out_queue.pop_front();
                safe_assert!(frame.is_some(), "eligibility check just confirmed a front element");
                self.not_full.notify_all();
                return frame;
            }
            if stop.is_set() {
                return None;
            }
            let (guard, _) = self.work_exists.wait_timeout(inner, Duration::from_millis(200)).unwrap();
            inner = guard;
        }
    }

    /// Re-inserts a NACKed frame at the tail of `nacked_queue`, preserving
    /// its original count, clearing its flags so it reads as a fresh send.
    pub fn push_nacked(&self, mut frame: Frame) {
        frame.flags = Flags::empty();
        let mut inner = self.inner.lock().unwrap();
        inner.nacked_queue.push_back(frame);
        self.work_exists.notify_all();
    }

    /// Wakes any submitter or sender blocked on these condvars, so they can
    /// observe a freshly set stop flag promptly.
    pub fn wake_all(&self) {
        self.work_exists.notify_all();
        self.not_full.notify_all();
    }

    fn is_empty(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.out_queue.is_empty() && inner.nacked_queue.is_empty()
    }

    /// Blocks until both queues are empty, then waits out [`DRAIN_RECHECK`]
    /// and confirms they're still empty before returning — a NACK for the
    /// very last frame sent can arrive just after the queues first go
    /// empty, so one clean read isn't enough to call them durably drained.
    /// The Sender and Receiver must still be running while this blocks.
    pub fn wait_drained(&self) {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                while !(inner.out_queue.is_empty() && inner.nacked_queue.is_empty()) {
                    let (guard, _) = self.not_full.wait_timeout(inner, Duration::from_millis(200)).unwrap();
                    inner = guard;
                }
            }
            thread::sleep(DRAIN_RECHECK);
            if self.is_empty() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration as StdDuration;

    use super::*;

    fn dest() -> (Ipv4Addr, u16) {
        (Ipv4Addr::LOCALHOST, 48000)
    }

    #[test]
    fn schedule_assigns_sequential_counts() {
        let q = SendQueue::new(128);
        let stop = Stopped::new();
        let (addr, port) = dest();
        q.schedule(addr, port, b"a", &stop).unwrap();
        q.schedule(addr, port, b"b", &stop).unwrap();
        let first = q.pop_for_send(None, &stop).unwrap();
        let second = q.pop_for_send(Some(first.count), &stop).unwrap();
        assert_eq!(first.count, 0);
        assert_eq!(second.count, 1);
    }

    #[test]
    fn nacked_queue_has_priority_over_out_queue() {
        let q = SendQueue::new(128);
        let stop = Stopped::new();
        let (addr, port) = dest();
        q.schedule(addr, port, b"fresh", &stop).unwrap();
        let mut retried = Frame::new(addr, port, b"retry").unwrap();
        retried.count = 41;
        q.push_nacked(retried);

        let popped = q.pop_for_send(Some(40), &stop).unwrap();
        assert_eq!(popped.payload(), b"retry");
    }

    #[test]
    fn out_queue_head_blocks_until_it_continues_prev_count() {
        let q = Arc::new(SendQueue::new(128));
        let stop = Stopped::new();
        let (addr, port) = dest();
        let mut ahead = Frame::new(addr, port, b"two").unwrap();
        ahead.count = 2;
        {
            let mut inner = q.inner.lock().unwrap();
            inner.out_queue.push_back(ahead);
            inner.next_seq = 3;
        }

        let q2 = Arc::clone(&q);
        let stop2 = stop.clone();
        let handle = thread::spawn(move || q2.pop_for_send(Some(0), &stop2));
        thread::sleep(StdDuration::from_millis(50));
        assert!(!handle.is_finished(), "should not pop a frame that skips count 1");

        stop.trigger();
        q.wake_all();
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn schedule_blocks_when_full_then_unblocks_on_pop() {
        let q = Arc::new(SendQueue::new(1));
        let stop = Stopped::new();
        let (addr, port) = dest();
        q.schedule(addr, port, b"first", &stop).unwrap();

        let q2 = Arc::clone(&q);
        let stop2 = stop.clone();
        let handle = thread::spawn(move || q2.schedule(addr, port, b"second", &stop2));
        thread::sleep(StdDuration::from_millis(50));
        assert!(!handle.is_finished(), "schedule should block while at capacity");

        q.pop_for_send(None, &stop).unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn push_nacked_clears_flags() {
        let q = SendQueue::new(128);
        let stop = Stopped::new();
        let (addr, port) = dest();
        let mut f = Frame::new(addr, port, b"x").unwrap();
        f.flags = Flags::INVALID_ORDER;
        q.push_nacked(f);
        let popped = q.pop_for_send(None, &stop).unwrap();
        assert_eq!(popped.flags, Flags::empty());
    }

    #[test]
    fn wait_drained_blocks_until_queue_empty() {
        let q = Arc::new(SendQueue::new(128));
        let stop = Stopped::new();
        let (addr, port) = dest();
        q.schedule(addr, port, b"a", &stop).unwrap();

        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.wait_drained());
        thread::sleep(StdDuration::from_millis(50));
        assert!(!handle.is_finished(), "should block while out_queue is non-empty");

        q.pop_for_send(None, &stop).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn wait_drained_rechecks_after_late_nack() {
        let q = Arc::new(SendQueue::new(128));
        let stop = Stopped::new();
        let (addr, port) = dest();

        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.wait_drained());

        // The queue starts empty, so wait_drained's first pass almost
        // immediately enters its recheck window; push a "late NACK" inside
        // that window so it has to loop back instead of declaring the
        // queue durably drained.
        thread::sleep(StdDuration::from_millis(10));
        let mut late = Frame::new(addr, port, b"late").unwrap();
        late.count = 0;
        q.push_nacked(late);

        thread::sleep(StdDuration::from_millis(100));
        assert!(!handle.is_finished(), "a late NACK during the recheck window should restart the wait");

        q.pop_for_send(None, &stop).unwrap();
        handle.join().unwrap();
    }
}
