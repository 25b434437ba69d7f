//! Codec error types.

use thiserror::Error;

use super::command::Command;

/// Framing problems found while decoding a buffer.
///
/// Decoding is permissive: response decoders report these next to whatever
/// value could still be recovered instead of refusing the frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown command code: 0x{0:02X}")]
    UnknownCommand(u8),
    #[error("{command} frame has wrong length: expected {expected}, got {actual}")]
    WrongLength {
        command: Command,
        expected: usize,
        actual: usize,
    },
    #[error("{command} frame too short to carry a status: {actual} bytes")]
    MissingStatus { command: Command, actual: usize },
    #[error("buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("unexpected {0} frame from device")]
    UnexpectedCommand(Command),
}
