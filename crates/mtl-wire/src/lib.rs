mod error;
mod flags;
mod frame;

pub use error::FrameError;
pub use flags::Flags;
pub use frame::{FRAME_LEN, Frame};

pub const MESSAGE_DATA_LENGTH: usize = 256;
pub const MESSAGE_COUNT_MAX: u16 = 65535;

/// Returns `count + 1` under mod-65536 wraparound.
#[inline]
pub fn next_count(count: u16) -> u16 {
    count.wrapping_add(1)
}
