use mtl_utils::safe_assert;
use mtl_wire::{Flags, Frame};

use crate::directory::Directory;

/// Reflects `frame` back to its original sender with `error` OR-ed into
/// `flags`. If the source has disconnected, the NACK is dropped silently —
/// there is no recipient to inform. A NACK transmission is at-most-once;
/// NACKs are never queued internally.
pub fn send_nack(directory: &Directory, frame: Frame, error: Flags) {
    safe_assert!(frame.flags.is_empty(), "refusing to NACK an already-NACKed frame");
    let Some(source) = directory.get(frame.src_addr, frame.src_port) else {
        tracing::debug!(src = ?frame.src_addr, port = frame.src_port, "NACK source gone, dropping");
        return;
    };
    let nacked = frame.into_nack(error);
    if let Err(e) = source.write_frame(&nacked) {
        tracing::warn!(error = %e, "failed writing NACK to source, connection will be torn down on its next read");
    }
}
