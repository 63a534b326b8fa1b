use std::net::Ipv4Addr;

use crate::{FrameError, MESSAGE_DATA_LENGTH, flags::Flags};

/// Size of a frame on the wire, in bytes. Fixed, size-stable, byte-exact:
/// the wire format is the compatibility contract for any future peer.
pub const FRAME_LEN: usize = 4 + 2 + 4 + 2 + 1 + 2 + 2 + MESSAGE_DATA_LENGTH;

/// A single message, wire and in-memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub src_addr: Ipv4Addr,
    pub src_port: u16,
    pub dest_addr: Ipv4Addr,
    pub dest_port: u16,
    pub flags: Flags,
    /// Per-sender monotonic sequence, mod 65536.
    pub count: u16,
    pub len: u16,
    pub data: [u8; MESSAGE_DATA_LENGTH],
}

impl Frame {
    /// Builds a frame carrying `payload` bound for `(dest_addr, dest_port)`.
    /// `src_*` and `count` are left zeroed — the broker stamps `src_*` on
    /// forward, and `mtl-client` assigns `count` at enqueue time.
    pub fn new(dest_addr: Ipv4Addr, dest_port: u16, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > MESSAGE_DATA_LENGTH {
            return Err(FrameError::PayloadTooLong(payload.len()));
        }
        let mut data = [0u8; MESSAGE_DATA_LENGTH];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            src_addr: Ipv4Addr::UNSPECIFIED,
            src_port: 0,
            dest_addr,
            dest_port,
            flags: Flags::empty(),
            count: 0,
            len: payload.len() as u16,
            data,
        })
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Turns this frame into a NACK reflecting it back to its original
    /// sender: `src_*`/`dest_*` name the original sender/target unchanged,
    /// only `flags` gains the given error bit(s).
    ///
    /// Never call this on a frame that is already a NACK (`flags != 0`):
    /// the protocol does not distinguish NACKs of NACKs, so reflecting one
    /// again would be silently wrong rather than rejected.
    pub fn into_nack(mut self, error: Flags) -> Self {
        debug_assert!(self.flags.is_empty(), "NACKing an already-NACKed frame");
        self.flags |= error;
        self
    }

    /// Encodes `self` into `buf` in network byte order. Allocation-free,
    /// pure, no partial writes.
    pub fn encode(&self, buf: &mut [u8; FRAME_LEN]) {
        let mut w = 0usize;
        buf[w..w + 4].copy_from_slice(&self.src_addr.octets());
        w += 4;
        buf[w..w + 2].copy_from_slice(&self.src_port.to_be_bytes());
        w += 2;
        buf[w..w + 4].copy_from_slice(&self.dest_addr.octets());
        w += 4;
        buf[w..w + 2].copy_from_slice(&self.dest_port.to_be_bytes());
        w += 2;
        buf[w] = self.flags.bits();
        w += 1;
        buf[w..w + 2].copy_from_slice(&self.count.to_be_bytes());
        w += 2;
        buf[w..w + 2].copy_from_slice(&self.len.to_be_bytes());
        w += 2;
        buf[w..w + MESSAGE_DATA_LENGTH].copy_from_slice(&self.data);
        w += MESSAGE_DATA_LENGTH;
        debug_assert_eq!(w, FRAME_LEN);
    }

    /// Decodes a frame out of `buf`, the inverse of [`Frame::encode`].
    pub fn decode(buf: &[u8; FRAME_LEN]) -> Result<Self, FrameError> {
        let mut r = 0usize;
        let src_addr = Ipv4Addr::new(buf[r], buf[r + 1], buf[r + 2], buf[r + 3]);
        r += 4;
        let src_port = u16::from_be_bytes([buf[r], buf[r + 1]]);
        r += 2;
        let dest_addr = Ipv4Addr::new(buf[r], buf[r + 1], buf[r + 2], buf[r + 3]);
        r += 4;
        let dest_port = u16::from_be_bytes([buf[r], buf[r + 1]]);
        r += 2;
        let flags = Flags::from_bits_truncate(buf[r]);
        r += 1;
        let count = u16::from_be_bytes([buf[r], buf[r + 1]]);
        r += 2;
        let len = u16::from_be_bytes([buf[r], buf[r + 1]]);
        r += 2;
        if len as usize > MESSAGE_DATA_LENGTH {
            return Err(FrameError::LenFieldTooLarge(len));
        }
        let mut data = [0u8; MESSAGE_DATA_LENGTH];
        data.copy_from_slice(&buf[r..r + MESSAGE_DATA_LENGTH]);
        Ok(Self { src_addr, src_port, dest_addr, dest_port, flags, count, len, data })
    }
}
