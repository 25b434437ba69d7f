//! Upload session state and per-upload bookkeeping.

use std::fmt;
use std::sync::Arc;

use crate::catalog::CatalogEntry;
use crate::events::UpdatePhase;
use crate::protocol::{Command, PACKET_PAD_BYTE, Request, Status};

/// Transfer state of the one upload the session may run.
#[derive(Debug, Clone)]
pub struct UploadContext {
    entry: Arc<CatalogEntry>,
    remaining_bytes: usize,
    next_packet_index: u32,
    packet_size: usize,
    last_sent_index: Option<u32>,
}

impl UploadContext {
    /// Start tracking an upload of `entry`, packetized by the entry's
    /// declared packet size.
    pub fn new(entry: Arc<CatalogEntry>) -> Self {
        let remaining_bytes = entry.len();
        let packet_size = entry.info.firmware_packet_size as usize;
        Self {
            entry,
            remaining_bytes,
            next_packet_index: 0,
            packet_size,
            last_sent_index: None,
        }
    }

    pub fn entry(&self) -> &Arc<CatalogEntry> {
        &self.entry
    }

    pub fn total_bytes(&self) -> usize {
        self.entry.len()
    }

    pub fn remaining_bytes(&self) -> usize {
        self.remaining_bytes
    }

    pub fn next_packet_index(&self) -> u32 {
        self.next_packet_index
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    pub fn last_sent_index(&self) -> Option<u32> {
        self.last_sent_index
    }

    /// Build packet `index` in sequence, charging its bytes against
    /// `remaining_bytes`.
    ///
    /// The real data length is `min(packet_size, remaining_bytes)`; a short
    /// final chunk is padded with `0xFF` to the full packet size.
    pub fn take_packet(&mut self, index: u32) -> Request {
        let chunk = self.packet_size.min(self.remaining_bytes);
        self.remaining_bytes = self.remaining_bytes.saturating_sub(chunk);
        self.build_packet(index, chunk)
    }

    /// Build packet `index` again at the device's request. Accounting is
    /// left untouched.
    pub fn resend_packet(&mut self, index: u32) -> Request {
        let offset = index as usize * self.packet_size;
        let chunk = self.packet_size.min(self.total_bytes().saturating_sub(offset));
        self.build_packet(index, chunk)
    }

    fn build_packet(&mut self, index: u32, chunk: usize) -> Request {
        let offset = index as usize * self.packet_size;
        let image = self.entry.image();
        let start = offset.min(image.len());
        let end = (offset + chunk).min(image.len());

        let mut payload = Vec::with_capacity(self.packet_size);
        payload.extend_from_slice(&image[start..end]);
        payload.resize(self.packet_size, PACKET_PAD_BYTE);

        self.last_sent_index = Some(index);
        self.next_packet_index = index.saturating_add(1);

        Request::FwPacket {
            index,
            packet_size: self.packet_size as u32,
            offset: u32::try_from(offset).unwrap_or(u32::MAX),
            payload,
        }
    }
}

/// Where the session stands in the update exchange.
///
/// The three upload states own the [`UploadContext`], so there is never a
/// context without an active upload or an upload without its context.
#[derive(Debug, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingDeviceInfo,
    AwaitingStartAck(UploadContext),
    Uploading(UploadContext),
    AwaitingFinishAck(UploadContext),
}

impl SessionState {
    pub fn phase(&self) -> UpdatePhase {
        match self {
            SessionState::Idle => UpdatePhase::Idle,
            SessionState::AwaitingDeviceInfo => UpdatePhase::AwaitingDeviceInfo,
            SessionState::AwaitingStartAck(_) => UpdatePhase::AwaitingStartAck,
            SessionState::Uploading(_) => UpdatePhase::Uploading,
            SessionState::AwaitingFinishAck(_) => UpdatePhase::AwaitingFinishAck,
        }
    }

    pub fn upload(&self) -> Option<&UploadContext> {
        match self {
            SessionState::AwaitingStartAck(u)
            | SessionState::Uploading(u)
            | SessionState::AwaitingFinishAck(u) => Some(u),
            _ => None,
        }
    }

    /// An upload is in progress; further device discovery is refused.
    pub fn is_active(&self) -> bool {
        self.upload().is_some()
    }

    /// The answer the session is waiting for, if any.
    pub fn awaiting(&self) -> Option<Command> {
        match self {
            SessionState::Idle => None,
            SessionState::AwaitingDeviceInfo => Some(Command::DeviceInfo),
            SessionState::AwaitingStartAck(_) => Some(Command::StartUpload),
            SessionState::Uploading(_) => Some(Command::FwPacket),
            SessionState::AwaitingFinishAck(_) => Some(Command::FinishUpload),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.phase())
    }
}

/// A device error status the session leaves unhandled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stall {
    pub command: Command,
    pub status: Status,
}

impl fmt::Display for Stall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} answered {}", self.command, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entry_with_image, sample_info};

    fn upload(len: usize, packet_size: u32) -> UploadContext {
        let image: Vec<u8> = (0..len).map(|i| i as u8).collect();
        UploadContext::new(Arc::new(entry_with_image(sample_info(1, 0, packet_size), image)))
    }

    fn payload(request: &Request) -> (u32, u32, Vec<u8>) {
        match request {
            Request::FwPacket {
                index,
                offset,
                payload,
                ..
            } => (*index, *offset, payload.clone()),
            other => panic!("expected FwPacket, got {:?}", other),
        }
    }

    #[test]
    fn test_chunking_with_remainder() {
        // S = 10, P = 4: two full packets and one padded packet with 2 real bytes.
        let mut up = upload(10, 4);
        let (i0, o0, p0) = payload(&up.take_packet(0));
        assert_eq!((i0, o0, p0), (0, 0, vec![0, 1, 2, 3]));
        assert_eq!(up.remaining_bytes(), 6);
        let (_, o1, p1) = payload(&up.take_packet(1));
        assert_eq!((o1, p1), (4, vec![4, 5, 6, 7]));
        assert_eq!(up.remaining_bytes(), 2);
        let (_, o2, p2) = payload(&up.take_packet(2));
        assert_eq!((o2, p2), (8, vec![8, 9, 0xFF, 0xFF]));
        assert_eq!(up.remaining_bytes(), 0);
        assert_eq!(up.next_packet_index(), 3);
    }

    #[test]
    fn test_chunking_exact_multiple() {
        let mut up = upload(8, 4);
        up.take_packet(0);
        let (_, _, last) = payload(&up.take_packet(1));
        assert_eq!(last, vec![4, 5, 6, 7]);
        assert_eq!(up.remaining_bytes(), 0);
    }

    #[test]
    fn test_remaining_after_each_packet() {
        let (size, p) = (23usize, 5usize);
        let mut up = upload(size, p as u32);
        for i in 0..size.div_ceil(p) {
            let request = up.take_packet(i as u32);
            let (_, _, data) = payload(&request);
            assert_eq!(data.len(), p);
            assert_eq!(up.remaining_bytes(), size.saturating_sub((i + 1) * p));
        }
    }

    #[test]
    fn test_remaining_clamps_at_zero() {
        let mut up = upload(3, 4);
        up.take_packet(0);
        up.take_packet(1);
        assert_eq!(up.remaining_bytes(), 0);
    }

    #[test]
    fn test_resend_keeps_accounting() {
        let mut up = upload(10, 4);
        up.take_packet(0);
        up.take_packet(1);
        let before = up.remaining_bytes();
        let (index, offset, data) = payload(&up.resend_packet(0));
        assert_eq!((index, offset), (0, 0));
        assert_eq!(data, vec![0, 1, 2, 3]);
        assert_eq!(up.remaining_bytes(), before);
        assert_eq!(up.next_packet_index(), 1);
        assert_eq!(up.last_sent_index(), Some(0));
    }

    #[test]
    fn test_resend_past_end_is_all_padding() {
        let mut up = upload(10, 4);
        let (_, offset, data) = payload(&up.resend_packet(7));
        assert_eq!(offset, 28);
        assert_eq!(data, vec![0xFF; 4]);
    }

    #[test]
    fn test_state_context_pairing() {
        assert!(!SessionState::Idle.is_active());
        assert!(!SessionState::AwaitingDeviceInfo.is_active());
        let state = SessionState::Uploading(upload(4, 4));
        assert!(state.is_active());
        assert_eq!(state.awaiting(), Some(Command::FwPacket));
        assert_eq!(state.phase(), UpdatePhase::Uploading);
    }
}
