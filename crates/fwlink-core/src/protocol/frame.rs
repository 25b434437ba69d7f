//! Request and response frames.
//!
//! Host→device frames start with `[MODULE_ID, opcode]`. Device→host frames
//! reach the session starting at the opcode byte.
//!
//! ```text
//! request:  | 0x01 | opcode | payload ...          |
//! response: | opcode | status? | fields ...         |
//! ```

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use super::command::{Command, Status};
use super::constants::*;
use super::device_info::{DeviceInfo, DeviceReport};
use super::error::FrameError;

/// Host→device frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    DeviceInfo,
    StartUpload {
        info: DeviceInfo,
        image_size: u32,
    },
    FwPacket {
        index: u32,
        packet_size: u32,
        offset: u32,
        /// Exactly `packet_size` bytes, padding included.
        payload: Vec<u8>,
    },
    FinishUpload {
        image_len: u32,
        checksum: u16,
    },
    SystemReset,
}

impl Request {
    pub fn command(&self) -> Command {
        match self {
            Request::DeviceInfo => Command::DeviceInfo,
            Request::StartUpload { .. } => Command::StartUpload,
            Request::FwPacket { .. } => Command::FwPacket,
            Request::FinishUpload { .. } => Command::FinishUpload,
            Request::SystemReset => Command::SystemReset,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(MODULE_ID);
        buf.push(self.command().opcode());
        match self {
            Request::DeviceInfo | Request::SystemReset => {}
            Request::StartUpload { info, image_size } => {
                info.write_fields(&mut buf);
                buf.extend_from_slice(&image_size.to_le_bytes());
            }
            Request::FwPacket {
                index,
                packet_size,
                offset,
                payload,
            } => {
                buf.extend_from_slice(&index.to_le_bytes());
                buf.extend_from_slice(&packet_size.to_le_bytes());
                buf.extend_from_slice(&offset.to_le_bytes());
                buf.extend_from_slice(payload);
            }
            Request::FinishUpload {
                image_len,
                checksum,
            } => {
                buf.extend_from_slice(&image_len.to_le_bytes());
                buf.extend_from_slice(&checksum.to_le_bytes());
            }
        }
        buf
    }

    fn encoded_len(&self) -> usize {
        match self {
            Request::DeviceInfo => DEVICE_INFO_REQUEST_SIZE,
            Request::StartUpload { .. } => START_UPLOAD_REQUEST_SIZE,
            Request::FwPacket { payload, .. } => FW_PACKET_REQUEST_PREFIX_SIZE + payload.len(),
            Request::FinishUpload { .. } => FINISH_UPLOAD_REQUEST_SIZE,
            Request::SystemReset => SYSTEM_RESET_REQUEST_SIZE,
        }
    }

    /// Strict decode of a host frame, as the device side sees it.
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() < REQUEST_HEADER_SIZE {
            return Err(FrameError::BufferTooSmall {
                expected: REQUEST_HEADER_SIZE,
                actual: frame.len(),
            });
        }
        if frame[0] != MODULE_ID {
            return Err(FrameError::UnknownCommand(frame[0]));
        }
        let command = Command::from_byte(frame[1]).ok_or(FrameError::UnknownCommand(frame[1]))?;
        let body = &frame[REQUEST_HEADER_SIZE..];
        let wrong_length = |expected: usize| FrameError::WrongLength {
            command,
            expected,
            actual: frame.len(),
        };

        match command {
            Command::DeviceInfo => {
                if frame.len() != DEVICE_INFO_REQUEST_SIZE {
                    return Err(wrong_length(DEVICE_INFO_REQUEST_SIZE));
                }
                Ok(Request::DeviceInfo)
            }
            Command::SystemReset => {
                if frame.len() != SYSTEM_RESET_REQUEST_SIZE {
                    return Err(wrong_length(SYSTEM_RESET_REQUEST_SIZE));
                }
                Ok(Request::SystemReset)
            }
            Command::StartUpload => {
                if frame.len() != START_UPLOAD_REQUEST_SIZE {
                    return Err(wrong_length(START_UPLOAD_REQUEST_SIZE));
                }
                let info = DeviceInfo::from_bytes(body)?;
                let mut cursor = Cursor::new(&body[DeviceInfo::SIZE..]);
                let image_size = cursor
                    .read_u32::<LittleEndian>()
                    .map_err(|_| wrong_length(START_UPLOAD_REQUEST_SIZE))?;
                Ok(Request::StartUpload { info, image_size })
            }
            Command::FwPacket => {
                if frame.len() < FW_PACKET_REQUEST_PREFIX_SIZE {
                    return Err(wrong_length(FW_PACKET_REQUEST_PREFIX_SIZE));
                }
                let mut cursor = Cursor::new(body);
                let short = |_: std::io::Error| wrong_length(FW_PACKET_REQUEST_PREFIX_SIZE);
                let index = cursor.read_u32::<LittleEndian>().map_err(short)?;
                let packet_size = cursor.read_u32::<LittleEndian>().map_err(short)?;
                let offset = cursor.read_u32::<LittleEndian>().map_err(short)?;
                let payload = frame[FW_PACKET_REQUEST_PREFIX_SIZE..].to_vec();
                if payload.len() != packet_size as usize {
                    return Err(wrong_length(FW_PACKET_REQUEST_PREFIX_SIZE + packet_size as usize));
                }
                Ok(Request::FwPacket {
                    index,
                    packet_size,
                    offset,
                    payload,
                })
            }
            Command::FinishUpload => {
                if frame.len() != FINISH_UPLOAD_REQUEST_SIZE {
                    return Err(wrong_length(FINISH_UPLOAD_REQUEST_SIZE));
                }
                let mut cursor = Cursor::new(body);
                let short = |_: std::io::Error| wrong_length(FINISH_UPLOAD_REQUEST_SIZE);
                let image_len = cursor.read_u32::<LittleEndian>().map_err(short)?;
                let checksum = cursor.read_u16::<LittleEndian>().map_err(short)?;
                Ok(Request::FinishUpload {
                    image_len,
                    checksum,
                })
            }
            Command::AbortUpload => Err(FrameError::UnexpectedCommand(command)),
        }
    }
}

/// Device→host frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    DeviceInfo(DeviceReport),
    StartUpload { status: Status },
    FwPacket { status: Status, resync_index: u32 },
    FinishUpload { status: Status },
    AbortUpload,
}

/// Result of a permissive response decode.
///
/// `response` holds whatever could be recovered; `error` records why the
/// frame did not match its fixed layout. Both can be set at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub response: Option<Response>,
    pub error: Option<FrameError>,
}

impl Decoded {
    fn failed(error: FrameError) -> Self {
        Self {
            response: None,
            error: Some(error),
        }
    }
}

impl Response {
    pub fn command(&self) -> Command {
        match self {
            Response::DeviceInfo(_) => Command::DeviceInfo,
            Response::StartUpload { .. } => Command::StartUpload,
            Response::FwPacket { .. } => Command::FwPacket,
            Response::FinishUpload { .. } => Command::FinishUpload,
            Response::AbortUpload => Command::AbortUpload,
        }
    }

    /// Decode one response frame.
    ///
    /// A frame of the wrong length is still decoded: missing trailing
    /// fields read as zero, surplus bytes are dropped. Frames that are
    /// empty, carry an unknown opcode, or stop before their status byte
    /// yield no response. An AbortUpload answer is accepted at any length.
    pub fn decode(frame: &[u8]) -> Decoded {
        let Some(&opcode) = frame.first() else {
            return Decoded::failed(FrameError::Empty);
        };
        let Some(command) = Command::from_byte(opcode) else {
            return Decoded::failed(FrameError::UnknownCommand(opcode));
        };
        let Some(expected) = command.response_len() else {
            return Decoded::failed(FrameError::UnexpectedCommand(command));
        };

        let mismatch = command != Command::AbortUpload && frame.len() != expected;
        let error = mismatch.then_some(FrameError::WrongLength {
            command,
            expected,
            actual: frame.len(),
        });
        if command != Command::AbortUpload && frame.len() <= RESPONSE_HEADER_SIZE {
            return Decoded::failed(FrameError::MissingStatus {
                command,
                actual: frame.len(),
            });
        }

        let body = &frame[RESPONSE_HEADER_SIZE..];
        let response = match command {
            Command::DeviceInfo => Response::DeviceInfo(DeviceReport::from_payload(&fixed(body))),
            Command::StartUpload => Response::StartUpload {
                status: Status::from(body[0]),
            },
            Command::FwPacket => {
                let raw: [u8; 5] = fixed(body);
                Response::FwPacket {
                    status: Status::from(raw[0]),
                    resync_index: u32::from_le_bytes([raw[1], raw[2], raw[3], raw[4]]),
                }
            }
            Command::FinishUpload => Response::FinishUpload {
                status: Status::from(body[0]),
            },
            Command::AbortUpload => Response::AbortUpload,
            Command::SystemReset => return Decoded::failed(FrameError::UnexpectedCommand(command)),
        };

        Decoded {
            response: Some(response),
            error,
        }
    }

    /// Encode as the device would send it (opcode first).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.command().opcode()];
        match self {
            Response::DeviceInfo(report) => report.write_fields(&mut buf),
            Response::StartUpload { status } | Response::FinishUpload { status } => {
                buf.push(u8::from(*status));
            }
            Response::FwPacket {
                status,
                resync_index,
            } => {
                buf.push(u8::from(*status));
                buf.extend_from_slice(&resync_index.to_le_bytes());
            }
            Response::AbortUpload => {}
        }
        buf
    }
}

/// Copy up to `N` leading bytes of `body`, zero-filling the rest.
fn fixed<const N: usize>(body: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let n = body.len().min(N);
    out[..n].copy_from_slice(&body[..n]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> DeviceInfo {
        DeviceInfo {
            boot_version: 1,
            device_id: 7,
            major_version: 2,
            minor_version: 3,
            firmware_packet_size: 4,
            firmware_max_size: 0x1000,
            build_time: *b"2024-01-01",
        }
    }

    #[test]
    fn test_device_info_request() {
        assert_eq!(Request::DeviceInfo.encode(), vec![0x01, 0x01]);
        assert_eq!(Request::SystemReset.encode(), vec![0x01, 0x06]);
    }

    #[test]
    fn test_start_upload_layout() {
        let bytes = Request::StartUpload {
            info: info(),
            image_size: 10,
        }
        .encode();
        assert_eq!(bytes.len(), START_UPLOAD_REQUEST_SIZE);
        assert_eq!(&bytes[..2], &[0x01, 0x02]);
        assert_eq!(&bytes[2..4], &1u16.to_le_bytes());
        assert_eq!(&bytes[4..8], &7u32.to_le_bytes());
        assert_eq!(&bytes[20..30], b"2024-01-01");
        assert_eq!(&bytes[30..34], &10u32.to_le_bytes());
    }

    #[test]
    fn test_fw_packet_layout() {
        let bytes = Request::FwPacket {
            index: 2,
            packet_size: 4,
            offset: 8,
            payload: vec![0xAA, 0xBB, 0xFF, 0xFF],
        }
        .encode();
        assert_eq!(
            bytes,
            vec![
                0x01, 0x03, 2, 0, 0, 0, 4, 0, 0, 0, 8, 0, 0, 0, 0xAA, 0xBB, 0xFF, 0xFF
            ]
        );
        assert_eq!(Request::decode(&bytes).unwrap().command(), Command::FwPacket);
    }

    #[test]
    fn test_finish_upload_layout() {
        let bytes = Request::FinishUpload {
            image_len: 10,
            checksum: 0xBEEF,
        }
        .encode();
        assert_eq!(bytes, vec![0x01, 0x04, 10, 0, 0, 0, 0xEF, 0xBE]);
    }

    #[test]
    fn test_request_decode_rejects_payload_mismatch() {
        let mut bytes = Request::FwPacket {
            index: 0,
            packet_size: 4,
            offset: 0,
            payload: vec![1, 2, 3, 4],
        }
        .encode();
        bytes.pop();
        assert!(matches!(
            Request::decode(&bytes),
            Err(FrameError::WrongLength { .. })
        ));
    }

    #[test]
    fn test_decode_device_info_response() {
        let report = DeviceReport {
            boot_version: 1,
            device_id: 0x11223344,
            major_version: 5,
            minor_version: 6,
            firmware_packet_size: 128,
            firmware_max_size: 4096,
        };
        let frame = Response::DeviceInfo(report).encode();
        assert_eq!(frame.len(), DEVICE_INFO_RESPONSE_SIZE);
        let decoded = Response::decode(&frame);
        assert_eq!(decoded.error, None);
        assert_eq!(decoded.response, Some(Response::DeviceInfo(report)));
    }

    #[test]
    fn test_decode_fw_packet_resync() {
        let decoded = Response::decode(&[0x03, 0x04, 0x02, 0x00, 0x00, 0x00]);
        assert_eq!(
            decoded.response,
            Some(Response::FwPacket {
                status: Status::WrongPageNumber,
                resync_index: 2
            })
        );
        assert!(decoded.error.is_none());
    }

    #[test]
    fn test_decode_short_frame_is_permissive() {
        let decoded = Response::decode(&[0x03, 0x00]);
        assert_eq!(
            decoded.response,
            Some(Response::FwPacket {
                status: Status::Success,
                resync_index: 0
            })
        );
        assert_eq!(
            decoded.error,
            Some(FrameError::WrongLength {
                command: Command::FwPacket,
                expected: 6,
                actual: 2
            })
        );
    }

    #[test]
    fn test_decode_long_frame_is_permissive() {
        let decoded = Response::decode(&[0x02, 0x00, 0xAA, 0xBB]);
        assert_eq!(
            decoded.response,
            Some(Response::StartUpload {
                status: Status::Success
            })
        );
        assert!(matches!(decoded.error, Some(FrameError::WrongLength { .. })));
    }

    #[test]
    fn test_decode_without_status() {
        let decoded = Response::decode(&[0x04]);
        assert_eq!(decoded.response, None);
        assert!(matches!(decoded.error, Some(FrameError::MissingStatus { .. })));

        let decoded = Response::decode(&[0x05]);
        assert_eq!(decoded.response, Some(Response::AbortUpload));
        assert_eq!(decoded.error, None);
    }

    #[test]
    fn test_decode_abort_with_trailing_bytes() {
        let decoded = Response::decode(&[0x05, 0x00, 0x00]);
        assert_eq!(decoded.response, Some(Response::AbortUpload));
        assert_eq!(decoded.error, None);
    }

    #[test]
    fn test_request_decode_system_reset() {
        assert_eq!(Request::decode(&[0x01, 0x06]), Ok(Request::SystemReset));
        assert_eq!(Request::decode(&[0x01, 0x01]), Ok(Request::DeviceInfo));
        assert_eq!(
            Request::decode(&[0x01, 0x06, 0x00]),
            Err(FrameError::WrongLength {
                command: Command::SystemReset,
                expected: SYSTEM_RESET_REQUEST_SIZE,
                actual: 3
            })
        );
    }

    #[test]
    fn test_decode_garbage() {
        assert_eq!(Response::decode(&[]).error, Some(FrameError::Empty));
        assert_eq!(
            Response::decode(&[0x42, 0x00]).error,
            Some(FrameError::UnknownCommand(0x42))
        );
        assert_eq!(
            Response::decode(&[0x06]).error,
            Some(FrameError::UnexpectedCommand(Command::SystemReset))
        );
    }
}
