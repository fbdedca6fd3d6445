use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed command payload, rejected before anything reaches the strip.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A pixel write or frame commit failed; the fade it belonged to is
    /// aborted and the strip keeps the last committed frame.
    #[error("hardware i/o: {0}")]
    HardwareIo(#[from] io::Error),

    /// A stream message carried an unrecognized type tag.
    #[error("unrecognized message type")]
    MalformedMessage,
}
