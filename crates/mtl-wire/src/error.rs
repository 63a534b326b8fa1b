use thiserror::Error;

use crate::MESSAGE_DATA_LENGTH;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("payload length {0} exceeds MESSAGE_DATA_LENGTH ({MESSAGE_DATA_LENGTH})")]
    PayloadTooLong(usize),

    #[error("buffer too short for a frame: got {got}, need {need}")]
    BufferTooShort { got: usize, need: usize },

    #[error("decoded len field {0} exceeds MESSAGE_DATA_LENGTH ({MESSAGE_DATA_LENGTH})")]
    LenFieldTooLarge(u16),
}
