use mtl_wire::{Flags, Frame};

use crate::directory::Directory;
use crate::metrics::MetricsCounters;
use crate::nack;

/// Looks up the destination and performs a single blocking write of the
/// full frame. A short write or error is logged and the connection is left
/// to fail on its own read side; it is not this path's job to tear it down.
/// No destination means `TARGET_DOWN` back to the source.
pub fn forward(directory: &Directory, frame: Frame, metrics: &MetricsCounters) {
    match directory.get(frame.dest_addr, frame.dest_port) {
        Some(dest) => match dest.write_frame(&frame) {
            Ok(()) => metrics.record_forwarded(),
            Err(e) => {
                tracing::warn!(error = %e, dest = ?frame.dest_addr, port = frame.dest_port, "forward failed");
            }
        },
        None => nack::send_nack(directory, frame, Flags::TARGET_DOWN),
    }
}
