use std::collections::VecDeque;
use std::io::{self, Write};
use std::net::{Ipv4Addr, Shutdown, TcpStream};
use std::sync::{Condvar, Mutex};

use mtl_wire::{FRAME_LEN, Frame};

struct OutQueue {
    queue: VecDeque<Frame>,
}

/// One open connection. Attributes per original spec: the connected socket,
/// the advertised address/port, a bounded `out_queue`, a write-serialization
/// lock on the socket, and a "removed from queue" condition releasing
/// ingress backpressure.
///
/// Invariant: a peer is a member of the Active-Peer Queue iff `out_queue`
/// is non-empty. Enforced by the Handler on append and the Scheduler on
/// drain (see [`Peer::push_blocking`] and [`Peer::pop_front_and_check_pending`]).
pub struct Peer {
    pub addr: Ipv4Addr,
    pub port: u16,
    write_stream: Mutex<TcpStream>,
    out: Mutex<OutQueue>,
    removed: Condvar,
}

impl Peer {
    pub fn new(addr: Ipv4Addr, port: u16, write_stream: TcpStream) -> Self {
        Self {
            addr,
            port,
            write_stream: Mutex::new(write_stream),
            out: Mutex::new(OutQueue { queue: VecDeque::new() }),
            removed: Condvar::new(),
        }
    }

    /// Appends `frame` to this peer's out_queue, blocking on the "removed"
    /// condition while `out_queue.size >= buf_cap`. Returns whether the
    /// queue transitioned from empty to non-empty, i.e. whether the caller
    /// must now add this peer to the Active-Peer Queue.
    pub fn push_blocking(&self, frame: Frame, buf_cap: usize) -> bool {
        let mut out = self.out.lock().unwrap();
        while out.queue.len() >= buf_cap {
            out = self.removed.wait(out).unwrap();
        }
        let was_empty = out.queue.is_empty();
        out.queue.push_back(frame);
        was_empty
    }

    /// Pops the head message, if any, signalling the "removed" condition,
    /// and atomically reports whether the queue still has pending work —
    /// atomic so a concurrent push can't race the Scheduler's requeue
    /// decision (see §4.4 of the original spec).
    pub fn pop_front_and_check_pending(&self) -> (Option<Frame>, bool) {
        let mut out = self.out.lock().unwrap();
        let frame = out.queue.pop_front();
        if frame.is_some() {
            self.removed.notify_all();
        }
        (frame, !out.queue.is_empty())
    }

    pub fn has_pending(&self) -> bool {
        !self.out.lock().unwrap().queue.is_empty()
    }

    /// Blocks until out_queue is empty — the drain-before-destroy wait the
    /// Handler performs before removing this peer from the directory.
    pub fn wait_drained(&self) {
        let mut out = self.out.lock().unwrap();
        while !out.queue.is_empty() {
            out = self.removed.wait(out).unwrap();
        }
    }

    pub fn write_frame(&self, frame: &Frame) -> io::Result<()> {
        let mut buf = [0u8; FRAME_LEN];
        frame.encode(&mut buf);
        let mut stream = self.write_stream.lock().unwrap();
        stream.write_all(&buf)
    }

    /// Shuts down both directions of the underlying socket. Used during
    /// broker-wide graceful shutdown to force this peer's Handler read
    /// loop to observe EOF.
    pub fn shutdown_socket(&self) {
        let stream = self.write_stream.lock().unwrap();
        let _ = stream.shutdown(Shutdown::Both);
    }
}
