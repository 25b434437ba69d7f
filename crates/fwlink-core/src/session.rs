//! Update session - drives one device through discovery, upload and reset.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::catalog::FirmwareCatalog;
use crate::checksum::{Checksum, Crc16CcittFalse};
use crate::events::{TracingObserver, UpdateEvent, UpdateObserver, UpdatePhase};
use crate::protocol::{Command, Response};
use crate::state::handlers::{self, HandlerContext, Outcome};
use crate::state::machine::{SessionState, Stall, UploadContext};
use crate::transport::FrameSink;

/// Configuration for an update session and the tools around it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding the firmware binaries.
    pub firmware_dir: PathBuf,
    /// Serial port of the device link.
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Watchdog applied by the caller while a response is outstanding.
    pub response_timeout_ms: u64,
    /// Inbound bytes carry the module id ahead of each response opcode.
    pub strip_module_id: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            firmware_dir: PathBuf::from("firmware"),
            port: None,
            baud_rate: 115_200,
            response_timeout_ms: 2_000,
            strip_module_id: false,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Update session - reacts to device answers one frame at a time.
///
/// The session never reads from a link and never waits. Callers deliver
/// each response frame to [`receive_frame`](Self::receive_frame) and the
/// session writes any follow-up request to its sink before returning.
pub struct UpdateSession<S: FrameSink, C: Checksum = Crc16CcittFalse, O: UpdateObserver = TracingObserver> {
    catalog: FirmwareCatalog,
    sink: S,
    checksum: C,
    observer: Arc<O>,
    state: SessionState,
    stall: Option<Stall>,
}

impl<S: FrameSink> UpdateSession<S> {
    /// Create a session over `catalog` with the CRC-16/CCITT-FALSE checksum
    /// and the tracing observer.
    pub fn new(catalog: FirmwareCatalog, sink: S) -> Self {
        Self::with_parts(catalog, sink, Crc16CcittFalse, Arc::new(TracingObserver))
    }

    /// Scan `firmware_dir` once and create a session over the result.
    pub fn open(firmware_dir: &Path, sink: S) -> Self {
        Self::new(FirmwareCatalog::scan(firmware_dir), sink)
    }
}

impl<S: FrameSink, C: Checksum, O: UpdateObserver> UpdateSession<S, C, O> {
    /// The session has no response timeout of its own; see
    /// [`awaiting`](Self::awaiting) for layering one on top.
    pub const RESPONSE_TIMEOUT: Option<Duration> = None;

    pub fn with_parts(catalog: FirmwareCatalog, sink: S, checksum: C, observer: Arc<O>) -> Self {
        Self {
            catalog,
            sink,
            checksum,
            observer,
            state: SessionState::Idle,
            stall: None,
        }
    }

    fn context(&mut self) -> HandlerContext<'_, S, C, O> {
        HandlerContext {
            sink: &self.sink,
            checksum: &self.checksum,
            observer: self.observer.as_ref(),
            catalog: &self.catalog,
            state: &mut self.state,
            stall: &mut self.stall,
        }
    }

    /// Ask the device to identify itself.
    ///
    /// Refused with [`Outcome::AlreadyUpdating`] while an upload runs.
    #[instrument(skip(self), fields(state = %self.state))]
    pub fn request_device_info(&mut self) -> Outcome {
        let outcome = handlers::request_device_info(&mut self.context());
        self.settle(outcome)
    }

    /// Process one inbound response frame, starting at its opcode byte.
    pub fn receive_frame(&mut self, frame: &[u8]) -> Outcome {
        let decoded = Response::decode(frame);
        if let Some(error) = decoded.error {
            warn!(error = %error, len = frame.len(), "Malformed response frame");
            self.observer.on_event(&UpdateEvent::FramingError { error });
        }
        let Some(response) = decoded.response else {
            return Outcome::Ignored;
        };

        let status = response_status(&response);
        match status {
            Some(s) => info!(command = %response.command(), status = %s, "Received answer"),
            None => info!(command = %response.command(), "Received answer"),
        }
        self.observer.on_event(&UpdateEvent::FrameReceived {
            command: response.command(),
            status,
        });

        let outcome = handlers::handle_response(&response, &mut self.context());
        self.settle(outcome)
    }

    /// Any forward step clears a previous stall.
    fn settle(&mut self, outcome: Outcome) -> Outcome {
        if outcome.progressed() {
            self.stall = None;
        }
        outcome
    }

    /// Drop any upload and stall and return to Idle. Nothing is sent.
    pub fn reset(&mut self) {
        let from = self.state.phase();
        self.state = SessionState::Idle;
        self.stall = None;
        if from != UpdatePhase::Idle {
            info!(from = %from, "Session reset");
            self.observer.on_event(&UpdateEvent::PhaseChanged {
                from,
                to: UpdatePhase::Idle,
            });
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> UpdatePhase {
        self.state.phase()
    }

    /// Current upload, present from StartUpload until the finish answer.
    pub fn upload(&self) -> Option<&UploadContext> {
        self.state.upload()
    }

    pub fn is_updating(&self) -> bool {
        self.state.is_active()
    }

    /// The answer the session is waiting for, if any.
    pub fn awaiting(&self) -> Option<Command> {
        self.state.awaiting()
    }

    /// Error status the device last answered with, until the session moves on.
    pub fn stall(&self) -> Option<Stall> {
        self.stall
    }

    pub fn catalog(&self) -> &FirmwareCatalog {
        &self.catalog
    }
}

fn response_status(response: &Response) -> Option<crate::protocol::Status> {
    match *response {
        Response::StartUpload { status }
        | Response::FwPacket { status, .. }
        | Response::FinishUpload { status } => Some(status),
        Response::DeviceInfo(_) | Response::AbortUpload => None,
    }
}
