mod error;
mod pacing;
mod queue;
mod receiver;
mod sender;
mod service;
mod stop;

pub use error::ClientError;
pub use service::{MAX_OUT_BUFFER, Service};
