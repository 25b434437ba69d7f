//! Transport layer abstraction.
//!
//! The session only needs somewhere to put outbound frames. Reading and
//! delineating the inbound stream is left to whoever owns the link.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open {port}: {message}")]
    OpenFailed { port: String, message: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Link disconnected")]
    Disconnected,

    #[error("No response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for fully framed outbound bytes.
///
/// Called synchronously from inside the session; the session logs a failed
/// send and carries on.
pub trait FrameSink: Send + Sync {
    /// Transmit one complete frame.
    fn send(&self, frame: &[u8]) -> Result<usize, TransportError>;
}

impl<T: FrameSink + ?Sized> FrameSink for &T {
    fn send(&self, frame: &[u8]) -> Result<usize, TransportError> {
        (**self).send(frame)
    }
}

impl<T: FrameSink + ?Sized> FrameSink for std::sync::Arc<T> {
    fn send(&self, frame: &[u8]) -> Result<usize, TransportError> {
        (**self).send(frame)
    }
}
