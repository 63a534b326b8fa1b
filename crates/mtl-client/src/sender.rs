use std::io::Write;
use std::net::TcpStream;

use mtl_wire::FRAME_LEN;

use crate::pacing::AdaptivePacer;
use crate::queue::SendQueue;
use crate::stop::{Stopped, sleep_or_stop};

/// Drains `queue` in strict sequence order (NACKed frames take priority over
/// fresh ones), writing each to `stream` and pacing sends per
/// [`AdaptivePacer`]. Returns once `queue` reports no further eligible frame
/// and the stop flag is set, or the socket write fails.
pub fn run(mut stream: TcpStream, queue: &SendQueue, pacer: &AdaptivePacer, stop: &Stopped) {
    let mut prev_count: Option<u16> = None;
    loop {
        let Some(frame) = queue.pop_for_send(prev_count, stop) else {
            return;
        };
        let mut buf = [0u8; FRAME_LEN];
        frame.encode(&mut buf);
        if let Err(e) = stream.write_all(&buf) {
            tracing::warn!(error = %e, "send failed, stopping sender");
            return;
        }
        prev_count = Some(frame.count);
        pacer.on_success();
        sleep_or_stop(pacer.delay(), stop);
    }
}
