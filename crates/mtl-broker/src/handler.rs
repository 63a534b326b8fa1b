use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use mtl_wire::{FRAME_LEN, Flags, Frame, next_count};

use crate::active_queue::ActiveQueue;
use crate::directory::Directory;
use crate::nack;
use crate::peer::Peer;

/// Owns one accepted connection's read side and its Peer record end to end:
/// registers the Peer, validates and routes every inbound frame, then
/// drains-before-destroy on the way out. See §4.2 of the original spec.
pub fn run(
    stream: TcpStream,
    directory: &Arc<Directory>,
    active: &Arc<ActiveQueue>,
    buf_cap: usize,
) -> io::Result<()> {
    let SocketAddr::V4(peer_addr) = stream.peer_addr()? else {
        return Err(io::Error::new(io::ErrorKind::Unsupported, "only IPv4 peers are supported"));
    };
    let addr = *peer_addr.ip();
    let port = peer_addr.port();

    let write_half = stream.try_clone()?;
    let peer = Arc::new(Peer::new(addr, port, write_half));
    directory.insert(Arc::clone(&peer));
    tracing::info!(?addr, port, "peer connected");

    let mut read_stream = stream;
    let mut expected_count: Option<u16> = None;
    let mut buf = [0u8; FRAME_LEN];

    loop {
        match read_stream.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                tracing::warn!(error = %e, ?addr, port, "short read, closing connection");
                break;
            }
        }

        let mut frame = match Frame::decode(&buf) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, ?addr, port, "malformed frame, closing connection");
                break;
            }
        };

        // Stamp src_* from the Peer record; ignore whatever the client sent.
        frame.src_addr = addr;
        frame.src_port = port;
        frame.flags = Flags::empty();

        let in_order = match expected_count {
            None => true,
            Some(expected) => frame.count == next_count(expected),
        };

        if !in_order {
            nack::send_nack(directory, frame, Flags::INVALID_ORDER);
            continue;
        }

        expected_count = Some(frame.count);
        let was_empty = peer.push_blocking(frame, buf_cap);
        if was_empty {
            active.push(Arc::clone(&peer));
        }
    }

    peer.wait_drained();
    directory.remove(addr, port);
    tracing::info!(?addr, port, "peer disconnected");
    Ok(())
}
