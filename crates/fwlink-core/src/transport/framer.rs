//! Splits the device's byte stream into response frames.
//!
//! Responses carry no length prefix. Each opcode has a fixed answer length,
//! so the opcode byte alone tells how many bytes to wait for.

use tracing::warn;

use crate::protocol::{Command, MODULE_ID};

#[derive(Debug, Default)]
pub struct ResponseFramer {
    buffer: Vec<u8>,
    /// Each response is preceded by the module routing byte on the wire.
    strip_module_id: bool,
}

impl ResponseFramer {
    pub fn new(strip_module_id: bool) -> Self {
        Self {
            buffer: Vec::with_capacity(64),
            strip_module_id,
        }
    }

    /// Add received bytes to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes waiting for a complete frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Next complete frame, starting at its opcode byte.
    ///
    /// Bytes that cannot start a frame are discarded one at a time.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let skip = usize::from(self.strip_module_id);
        loop {
            if self.buffer.len() <= skip {
                return None;
            }
            if self.strip_module_id && self.buffer[0] != MODULE_ID {
                warn!(byte = %format!("0x{:02X}", self.buffer[0]), "Discarding byte outside a frame");
                self.buffer.remove(0);
                continue;
            }

            let opcode = self.buffer[skip];
            let Some(len) = Command::from_byte(opcode).and_then(Command::response_len) else {
                warn!(byte = %format!("0x{:02X}", opcode), "Discarding byte outside a frame");
                self.buffer.remove(0);
                continue;
            };

            if self.buffer.len() < skip + len {
                return None;
            }
            let frame = self.buffer[skip..skip + len].to_vec();
            self.buffer.drain(..skip + len);
            return Some(frame);
        }
    }
}
