//! Serial port link using the `serialport` crate.

use std::io::{ErrorKind, Read, Write};
use std::sync::Mutex;
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info, instrument};

use super::traits::{FrameSink, TransportError};

/// Read poll interval; short so the caller's watchdog stays responsive.
const READ_POLL: Duration = Duration::from_millis(50);

pub struct SerialTransport {
    port: Mutex<Box<dyn SerialPort>>,
    name: String,
}

impl SerialTransport {
    /// Open `path` at `baud_rate`, 8N1, no flow control.
    #[instrument(level = "info")]
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate)
            .timeout(READ_POLL)
            .open()
            .map_err(|e| TransportError::OpenFailed {
                port: path.to_string(),
                message: e.to_string(),
            })?;
        info!(port = path, baud = baud_rate, "Serial port open");
        Ok(Self {
            port: Mutex::new(port),
            name: path.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read whatever arrived within one poll interval. Empty on silence.
    pub fn read_available(&self) -> Result<Vec<u8>, TransportError> {
        let mut port = self.port.lock().map_err(|_| TransportError::Disconnected)?;
        let mut buf = [0u8; 256];
        match port.read(&mut buf) {
            Ok(0) => Ok(Vec::new()),
            Ok(n) => {
                debug!(len = n, "RX");
                Ok(buf[..n].to_vec())
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(TransportError::Disconnected),
            Err(e) => Err(TransportError::ReadFailed(e.to_string())),
        }
    }
}

impl FrameSink for SerialTransport {
    fn send(&self, frame: &[u8]) -> Result<usize, TransportError> {
        let mut port = self.port.lock().map_err(|_| TransportError::Disconnected)?;
        port.write_all(frame)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        port.flush()?;
        debug!(len = frame.len(), "TX");
        Ok(frame.len())
    }
}
