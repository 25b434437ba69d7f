//! Response handlers - one per device answer.

use tracing::{debug, info, warn};

use crate::catalog::FirmwareCatalog;
use crate::checksum::Checksum;
use crate::events::{UpdateEvent, UpdateObserver, UpdatePhase};
use crate::protocol::{Command, DeviceReport, Request, Response, Status};
use crate::selector::select_for;
use crate::state::machine::{SessionState, Stall, UploadContext};
use crate::transport::FrameSink;

/// Result of handling one device answer or host request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A request frame went out.
    Sent(Command),
    /// Nothing to do for this frame.
    Ignored,
    /// Device info refused while an upload is active.
    AlreadyUpdating,
    /// The catalog holds nothing usable for the reported device.
    NoMatchingFirmware { device_id: u32 },
    /// The device reported an error this session does not recover from.
    Stalled(Stall),
    /// The upload finished and the device was told to reset.
    Complete,
}

impl Outcome {
    /// The session moved forward: a frame went out.
    pub fn progressed(&self) -> bool {
        matches!(self, Outcome::Sent(_) | Outcome::Complete)
    }
}

/// Everything a handler may touch.
pub struct HandlerContext<'a, S: FrameSink, C: Checksum, O: UpdateObserver + ?Sized> {
    pub sink: &'a S,
    pub checksum: &'a C,
    pub observer: &'a O,
    pub catalog: &'a FirmwareCatalog,
    pub state: &'a mut SessionState,
    pub stall: &'a mut Option<Stall>,
}

impl<S: FrameSink, C: Checksum, O: UpdateObserver + ?Sized> HandlerContext<'_, S, C, O> {
    pub(crate) fn emit(&self, event: UpdateEvent) {
        self.observer.on_event(&event);
    }

    /// Encode and hand `request` to the sink. Sink failures are logged and
    /// otherwise ignored; the session has no retry path.
    pub(crate) fn send(&self, request: &Request) {
        let command = request.command();
        let frame = request.encode();
        match self.sink.send(&frame) {
            Ok(length) => {
                debug!(command = %command, len = length, "Sent request");
                self.emit(UpdateEvent::FrameSent { command, length });
            }
            Err(e) => warn!(command = %command, error = %e, "Sink rejected frame"),
        }
    }

    /// Install `next`, logging the move when the phase changes.
    pub(crate) fn goto(&mut self, from: UpdatePhase, next: SessionState) {
        let to = next.phase();
        *self.state = next;
        if from != to {
            info!(from = %from, to = %to, "State transition");
            self.emit(UpdateEvent::PhaseChanged { from, to });
        }
    }

    fn stalled(&mut self, command: Command, status: Status) -> Outcome {
        let stall = Stall { command, status };
        self.emit(UpdateEvent::Stalled { command, status });
        *self.stall = Some(stall);
        Outcome::Stalled(stall)
    }

    fn progress(&self, upload: &UploadContext, packet_index: u32) {
        let total = upload.total_bytes() as u64;
        self.emit(UpdateEvent::Progress {
            packet_index,
            sent_bytes: total - upload.remaining_bytes() as u64,
            total_bytes: total,
        });
    }
}

/// Send a DeviceInfo request, unless an upload is running.
pub fn request_device_info<S: FrameSink, C: Checksum, O: UpdateObserver + ?Sized>(
    ctx: &mut HandlerContext<'_, S, C, O>,
) -> Outcome {
    if ctx.state.is_active() {
        warn!(state = %ctx.state, "Already updating, device info request refused");
        ctx.emit(UpdateEvent::AlreadyUpdating);
        return Outcome::AlreadyUpdating;
    }
    let from = ctx.state.phase();
    ctx.send(&Request::DeviceInfo);
    ctx.goto(from, SessionState::AwaitingDeviceInfo);
    Outcome::Sent(Command::DeviceInfo)
}

/// Dispatch a decoded device answer.
pub fn handle_response<S: FrameSink, C: Checksum, O: UpdateObserver + ?Sized>(
    response: &Response,
    ctx: &mut HandlerContext<'_, S, C, O>,
) -> Outcome {
    match *response {
        Response::DeviceInfo(report) => handle_device_info(&report, ctx),
        Response::StartUpload { status } => handle_start_upload(status, ctx),
        Response::FwPacket {
            status,
            resync_index,
        } => handle_fw_packet(status, resync_index, ctx),
        Response::FinishUpload { status } => handle_finish_upload(status, ctx),
        Response::AbortUpload => {
            info!(state = %ctx.state, "Device reported abort upload");
            Outcome::Ignored
        }
    }
}

fn handle_device_info<S: FrameSink, C: Checksum, O: UpdateObserver + ?Sized>(
    report: &DeviceReport,
    ctx: &mut HandlerContext<'_, S, C, O>,
) -> Outcome {
    if ctx.state.is_active() {
        warn!(state = %ctx.state, "Already updating, device info ignored");
        ctx.emit(UpdateEvent::AlreadyUpdating);
        return Outcome::AlreadyUpdating;
    }

    info!(
        boot = report.boot_version,
        device_id = report.device_id,
        version = %format!("{}.{}", report.major_version, report.minor_version),
        packet_size = report.firmware_packet_size,
        max_size = report.firmware_max_size,
        "Device info"
    );

    let from = ctx.state.phase();
    let device_id = report.device_id;
    let entry = match select_for(ctx.catalog, device_id) {
        Some(entry) if entry.info.firmware_packet_size > 0 => entry,
        Some(entry) => {
            warn!(path = %entry.path.display(), "Selected firmware declares a zero packet size");
            ctx.emit(UpdateEvent::NoMatchingFirmware { device_id });
            ctx.goto(from, SessionState::Idle);
            return Outcome::NoMatchingFirmware { device_id };
        }
        None => {
            ctx.emit(UpdateEvent::NoMatchingFirmware { device_id });
            ctx.goto(from, SessionState::Idle);
            return Outcome::NoMatchingFirmware { device_id };
        }
    };

    let upload = UploadContext::new(entry);
    let entry = upload.entry();
    ctx.emit(UpdateEvent::FirmwareSelected {
        device_id,
        path: entry.path.clone(),
        image_size: entry.len(),
    });
    ctx.send(&Request::StartUpload {
        info: entry.info,
        image_size: u32::try_from(entry.len()).unwrap_or(u32::MAX),
    });
    ctx.goto(from, SessionState::AwaitingStartAck(upload));
    Outcome::Sent(Command::StartUpload)
}

fn handle_start_upload<S: FrameSink, C: Checksum, O: UpdateObserver + ?Sized>(
    status: Status,
    ctx: &mut HandlerContext<'_, S, C, O>,
) -> Outcome {
    let from = ctx.state.phase();
    match std::mem::take(&mut *ctx.state) {
        SessionState::AwaitingStartAck(mut upload) => {
            if !status.is_success() {
                *ctx.state = SessionState::AwaitingStartAck(upload);
                return ctx.stalled(Command::StartUpload, status);
            }
            let request = upload.take_packet(0);
            ctx.send(&request);
            ctx.progress(&upload, 0);
            ctx.goto(from, SessionState::Uploading(upload));
            Outcome::Sent(Command::FwPacket)
        }
        other => {
            *ctx.state = other;
            unexpected(Command::StartUpload, ctx)
        }
    }
}

fn handle_fw_packet<S: FrameSink, C: Checksum, O: UpdateObserver + ?Sized>(
    status: Status,
    resync_index: u32,
    ctx: &mut HandlerContext<'_, S, C, O>,
) -> Outcome {
    let from = ctx.state.phase();
    let mut upload = match std::mem::take(&mut *ctx.state) {
        SessionState::Uploading(upload) => upload,
        other => {
            *ctx.state = other;
            return unexpected(Command::FwPacket, ctx);
        }
    };

    match status {
        Status::Success if upload.remaining_bytes() > 0 => {
            let index = upload.next_packet_index();
            let request = upload.take_packet(index);
            ctx.send(&request);
            ctx.progress(&upload, index);
            ctx.goto(from, SessionState::Uploading(upload));
            Outcome::Sent(Command::FwPacket)
        }
        Status::Success => {
            let image = upload.entry().image();
            let checksum = ctx.checksum.checksum(image);
            info!(
                size = image.len(),
                crc = %format!("0x{:04X}", checksum),
                "All packets sent, finishing upload"
            );
            ctx.send(&Request::FinishUpload {
                image_len: u32::try_from(image.len()).unwrap_or(u32::MAX),
                checksum,
            });
            ctx.goto(from, SessionState::AwaitingFinishAck(upload));
            Outcome::Sent(Command::FinishUpload)
        }
        Status::WrongPageNumber => {
            ctx.emit(UpdateEvent::Resync {
                requested_index: resync_index,
            });
            let request = upload.resend_packet(resync_index);
            ctx.send(&request);
            ctx.goto(from, SessionState::Uploading(upload));
            Outcome::Sent(Command::FwPacket)
        }
        other => {
            *ctx.state = SessionState::Uploading(upload);
            ctx.stalled(Command::FwPacket, other)
        }
    }
}

fn handle_finish_upload<S: FrameSink, C: Checksum, O: UpdateObserver + ?Sized>(
    status: Status,
    ctx: &mut HandlerContext<'_, S, C, O>,
) -> Outcome {
    let from = ctx.state.phase();
    match std::mem::take(&mut *ctx.state) {
        SessionState::AwaitingFinishAck(upload) => {
            if !status.is_success() {
                *ctx.state = SessionState::AwaitingFinishAck(upload);
                return ctx.stalled(Command::FinishUpload, status);
            }
            info!(path = %upload.entry().path.display(), "Upload accepted, resetting device");
            ctx.send(&Request::SystemReset);
            ctx.emit(UpdateEvent::Complete);
            ctx.goto(from, SessionState::Idle);
            Outcome::Complete
        }
        other => {
            *ctx.state = other;
            unexpected(Command::FinishUpload, ctx)
        }
    }
}

fn unexpected<S: FrameSink, C: Checksum, O: UpdateObserver + ?Sized>(
    command: Command,
    ctx: &HandlerContext<'_, S, C, O>,
) -> Outcome {
    warn!(command = %command, state = %ctx.state, "Unexpected answer for current state, ignoring");
    Outcome::Ignored
}
