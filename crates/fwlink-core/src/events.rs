//! Event system for UI decoupling.
//!
//! Lets the CLI (or any other front end) follow an update session without
//! reaching into the state machine.

use std::fmt;
use std::path::PathBuf;

use crate::protocol::{Command, FrameError, Status};

/// Upload session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Idle,
    AwaitingDeviceInfo,
    AwaitingStartAck,
    Uploading,
    AwaitingFinishAck,
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdatePhase::Idle => write!(f, "Idle"),
            UpdatePhase::AwaitingDeviceInfo => write!(f, "Awaiting Device Info"),
            UpdatePhase::AwaitingStartAck => write!(f, "Awaiting Start Ack"),
            UpdatePhase::Uploading => write!(f, "Uploading"),
            UpdatePhase::AwaitingFinishAck => write!(f, "Awaiting Finish Ack"),
        }
    }
}

/// Events emitted by the update session.
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// Phase changed.
    PhaseChanged { from: UpdatePhase, to: UpdatePhase },
    /// A frame from the device was decoded.
    FrameReceived {
        command: Command,
        status: Option<Status>,
    },
    /// A frame did not match its fixed layout.
    FramingError { error: FrameError },
    /// A frame was handed to the sink.
    FrameSent { command: Command, length: usize },
    /// Firmware chosen for the reported device.
    FirmwareSelected {
        device_id: u32,
        path: PathBuf,
        image_size: usize,
    },
    /// No catalog entry matches the reported device.
    NoMatchingFirmware { device_id: u32 },
    /// Packet transfer progress.
    Progress {
        packet_index: u32,
        sent_bytes: u64,
        total_bytes: u64,
    },
    /// Device asked to resend from another packet.
    Resync { requested_index: u32 },
    /// Device reported an error status that the session does not handle.
    Stalled { command: Command, status: Status },
    /// Device info arrived or was requested during an active upload.
    AlreadyUpdating,
    /// Reset sent; the upload is complete.
    Complete,
}

/// Observer trait for receiving update events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait UpdateObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &UpdateEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl UpdateObserver for NullObserver {
    fn on_event(&self, _event: &UpdateEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl UpdateObserver for TracingObserver {
    fn on_event(&self, event: &UpdateEvent) {
        match event {
            UpdateEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            UpdateEvent::FrameReceived { command, status } => match status {
                Some(status) => tracing::debug!(command = %command, status = %status, "Frame received"),
                None => tracing::debug!(command = %command, "Frame received"),
            },
            UpdateEvent::FramingError { error } => {
                tracing::warn!(error = %error, "Framing error");
            }
            UpdateEvent::FrameSent { command, length } => {
                tracing::trace!(command = %command, len = length, "Frame sent");
            }
            UpdateEvent::FirmwareSelected {
                device_id,
                path,
                image_size,
            } => {
                tracing::info!(device_id, path = %path.display(), size = image_size, "Firmware selected");
            }
            UpdateEvent::NoMatchingFirmware { device_id } => {
                tracing::warn!(device_id, "There aren't appropriate firmware files");
            }
            UpdateEvent::Progress {
                packet_index,
                sent_bytes,
                total_bytes,
            } => {
                let pct = if *total_bytes > 0 {
                    (*sent_bytes * 100) / *total_bytes
                } else {
                    0
                };
                tracing::debug!(packet = packet_index, progress = %format!("{}%", pct), "Progress");
            }
            UpdateEvent::Resync { requested_index } => {
                tracing::warn!(index = requested_index, "Device requested resync");
            }
            UpdateEvent::Stalled { command, status } => {
                tracing::error!(command = %command, status = %status, "Unhandled device error, session stalled");
            }
            UpdateEvent::AlreadyUpdating => {
                tracing::warn!("Already updating");
            }
            UpdateEvent::Complete => {
                tracing::info!("Update complete");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Collect(Mutex<Vec<String>>);

    impl UpdateObserver for Collect {
        fn on_event(&self, event: &UpdateEvent) {
            self.0.lock().unwrap().push(format!("{:?}", event));
        }
    }

    #[test]
    fn test_observer_receives_events() {
        let obs = Collect(Mutex::new(Vec::new()));
        obs.on_event(&UpdateEvent::Resync { requested_index: 3 });
        obs.on_event(&UpdateEvent::Complete);
        let seen = obs.0.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].contains("requested_index: 3"));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(UpdatePhase::AwaitingStartAck.to_string(), "Awaiting Start Ack");
    }
}
