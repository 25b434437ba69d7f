//! Mock sink for testing.

use std::sync::{Arc, Mutex};

use super::traits::{FrameSink, TransportError};

/// Captures every frame written to it.
///
/// Clones share the same log, so a test can hand one clone to the session
/// and inspect another.
#[derive(Clone)]
pub struct MockSink {
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Whether the link is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            write_log: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// Most recent write, if any.
    pub fn last_write(&self) -> Option<Vec<u8>> {
        self.write_log.lock().unwrap().last().cloned()
    }

    /// Drain captured writes.
    pub fn take_writes(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.write_log.lock().unwrap())
    }

    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    /// Simulate a dropped link.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for MockSink {
    fn send(&self, frame: &[u8]) -> Result<usize, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.write_log.lock().unwrap().push(frame.to_vec());
        Ok(frame.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_write_capture() {
        let mock = MockSink::new();
        let shared = mock.clone();
        mock.send(b"Hello").unwrap();
        mock.send(b"World").unwrap();

        let writes = shared.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(shared.last_write().unwrap(), b"World");
        assert_eq!(shared.take_writes().len(), 2);
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockSink::new();
        mock.disconnect();
        assert!(matches!(mock.send(b"test"), Err(TransportError::Disconnected)));
        mock.reconnect();
        assert!(mock.send(b"test").is_ok());
    }
}
