use std::io::{self, Read};
use std::net::{SocketAddrV4, TcpStream};
use std::sync::Arc;

use mtl_wire::{FRAME_LEN, Flags, Frame};

use crate::pacing::AdaptivePacer;
use crate::queue::SendQueue;

pub type OnMessage = dyn Fn(SocketAddrV4, &[u8]) + Send + Sync;

/// Demuxes inbound frames per original spec §4.8: a normal delivery
/// (`flags == 0`) goes to the user callback with the source address; a
/// `BUFFER_FULL`/`INVALID_ORDER` NACK is re-queued for priority resend; a
/// `TARGET_DOWN` NACK is surfaced and dropped, there being nothing to retry.
pub fn run(mut stream: TcpStream, queue: &SendQueue, pacer: &AdaptivePacer, on_message: &Arc<OnMessage>) {
    let mut buf = [0u8; FRAME_LEN];
    loop {
        match stream.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return,
            Err(e) => {
                tracing::warn!(error = %e, "receive failed, stopping receiver");
                return;
            }
        }

        let frame = match Frame::decode(&buf) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "malformed frame from broker, stopping receiver");
                return;
            }
        };

        if frame.flags.is_empty() {
            let src = SocketAddrV4::new(frame.src_addr, frame.src_port);
            on_message(src, frame.payload());
            continue;
        }

        if frame.flags.contains(Flags::TARGET_DOWN) {
            tracing::warn!(
                dest = ?frame.dest_addr,
                port = frame.dest_port,
                "message undeliverable, destination is down"
            );
            continue;
        }

        pacer.on_nack();
        queue.push_nacked(frame);
    }
}
