use bitflags::bitflags;

bitflags! {
    /// Error bits reflected back to a sender in a NACK frame.
    ///
    /// `flags == 0` marks a normal message; any non-zero value marks a NACK.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Flags: u8 {
        const BUFFER_FULL = 1;
        const INVALID_ORDER = 2;
        const TARGET_DOWN = 4;
    }
}

impl Flags {
    #[inline]
    pub fn is_nack(self) -> bool {
        !self.is_empty()
    }
}
