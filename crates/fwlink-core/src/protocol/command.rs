//! Command opcodes and device status codes.
//!
//! Opcodes form a closed set. Status bytes come straight off the wire, so
//! they keep an `Unknown` fallback for values the firmware may add later.

use std::fmt;

use super::constants::*;

/// Updater command opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    DeviceInfo,
    StartUpload,
    FwPacket,
    FinishUpload,
    AbortUpload,
    SystemReset,
}

impl Command {
    /// Parse an opcode byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            CMD_DEVICE_INFO => Some(Self::DeviceInfo),
            CMD_START_UPLOAD => Some(Self::StartUpload),
            CMD_FW_PACKET => Some(Self::FwPacket),
            CMD_FINISH_UPLOAD => Some(Self::FinishUpload),
            CMD_ABORT_UPLOAD => Some(Self::AbortUpload),
            CMD_SYSTEM_RESET => Some(Self::SystemReset),
            _ => None,
        }
    }

    /// Opcode byte.
    pub const fn opcode(self) -> u8 {
        match self {
            Self::DeviceInfo => CMD_DEVICE_INFO,
            Self::StartUpload => CMD_START_UPLOAD,
            Self::FwPacket => CMD_FW_PACKET,
            Self::FinishUpload => CMD_FINISH_UPLOAD,
            Self::AbortUpload => CMD_ABORT_UPLOAD,
            Self::SystemReset => CMD_SYSTEM_RESET,
        }
    }

    /// Fixed length of the device's answer to this command, header included.
    ///
    /// `None` for commands the device never answers.
    pub const fn response_len(self) -> Option<usize> {
        match self {
            Self::DeviceInfo => Some(DEVICE_INFO_RESPONSE_SIZE),
            Self::StartUpload => Some(START_UPLOAD_RESPONSE_SIZE),
            Self::FwPacket => Some(FW_PACKET_RESPONSE_SIZE),
            Self::FinishUpload => Some(FINISH_UPLOAD_RESPONSE_SIZE),
            Self::AbortUpload => Some(ABORT_UPLOAD_RESPONSE_SIZE),
            Self::SystemReset => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::DeviceInfo => write!(f, "DEVICE_INFO"),
            Command::StartUpload => write!(f, "START_UPLOAD"),
            Command::FwPacket => write!(f, "FW_PACKET"),
            Command::FinishUpload => write!(f, "FINISH_UPLOAD"),
            Command::AbortUpload => write!(f, "ABORT_UPLOAD"),
            Command::SystemReset => write!(f, "SYSTEM_RESET"),
        }
    }
}

/// Status byte reported by the device in StartUpload, FwPacket and
/// FinishUpload answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    PacketSizeError,
    OffsetError,
    EraseError,
    /// The device expected a different packet; the answer carries the index
    /// to resend.
    WrongPageNumber,
    FwSizeError,
    WriteError,
    CrcError,
    DeviceIdError,
    VersionError,
    DeviceInfoError,
    Unknown(u8),
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

impl From<u8> for Status {
    fn from(code: u8) -> Self {
        match code {
            STATUS_SUCCESS => Status::Success,
            STATUS_PACKET_SIZE_ERROR => Status::PacketSizeError,
            STATUS_OFFSET_ERROR => Status::OffsetError,
            STATUS_ERASE_ERROR => Status::EraseError,
            STATUS_WRONG_PAGE_NUMBER => Status::WrongPageNumber,
            STATUS_FW_SIZE_ERROR => Status::FwSizeError,
            STATUS_WRITE_ERROR => Status::WriteError,
            STATUS_CRC_ERROR => Status::CrcError,
            STATUS_DEVICE_ID_ERROR => Status::DeviceIdError,
            STATUS_VERSION_ERROR => Status::VersionError,
            STATUS_DEVICE_INFO_ERROR => Status::DeviceInfoError,
            other => Status::Unknown(other),
        }
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => STATUS_SUCCESS,
            Status::PacketSizeError => STATUS_PACKET_SIZE_ERROR,
            Status::OffsetError => STATUS_OFFSET_ERROR,
            Status::EraseError => STATUS_ERASE_ERROR,
            Status::WrongPageNumber => STATUS_WRONG_PAGE_NUMBER,
            Status::FwSizeError => STATUS_FW_SIZE_ERROR,
            Status::WriteError => STATUS_WRITE_ERROR,
            Status::CrcError => STATUS_CRC_ERROR,
            Status::DeviceIdError => STATUS_DEVICE_ID_ERROR,
            Status::VersionError => STATUS_VERSION_ERROR,
            Status::DeviceInfoError => STATUS_DEVICE_INFO_ERROR,
            Status::Unknown(code) => code,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::PacketSizeError => write!(f, "packet size error"),
            Status::OffsetError => write!(f, "offset error"),
            Status::EraseError => write!(f, "erase error"),
            Status::WrongPageNumber => write!(f, "wrong page number"),
            Status::FwSizeError => write!(f, "firmware size error"),
            Status::WriteError => write!(f, "write error"),
            Status::CrcError => write!(f, "crc error"),
            Status::DeviceIdError => write!(f, "device id error"),
            Status::VersionError => write!(f, "version error"),
            Status::DeviceInfoError => write!(f, "device info error"),
            Status::Unknown(code) => write!(f, "unknown status (0x{:02X})", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_table() {
        for byte in 0x01..=0x06u8 {
            let cmd = Command::from_byte(byte).unwrap();
            assert_eq!(cmd.opcode(), byte);
        }
        assert_eq!(Command::from_byte(0x00), None);
        assert_eq!(Command::from_byte(0x07), None);
    }

    #[test]
    fn test_status_unknown_fallback() {
        assert_eq!(Status::from(0x04), Status::WrongPageNumber);
        assert_eq!(Status::from(0x22), Status::DeviceInfoError);
        assert_eq!(Status::from(0x99), Status::Unknown(0x99));
        assert_eq!(u8::from(Status::Unknown(0x99)), 0x99);
        assert!(Status::from(0x00).is_success());
    }

    #[test]
    fn test_reset_has_no_answer() {
        assert_eq!(Command::SystemReset.response_len(), None);
        assert_eq!(Command::DeviceInfo.response_len(), Some(19));
        assert_eq!(Command::FwPacket.response_len(), Some(6));
    }
}
