//! Protocol constants for the MCU updater link.

// ============================================================================
// Framing
// ============================================================================

/// Routing byte that prefixes every host→device updater frame.
pub const MODULE_ID: u8 = 0x01;

/// Header length of an outbound frame: module id + opcode.
pub const REQUEST_HEADER_SIZE: usize = 2;

/// Header length of an inbound frame: opcode only (the transport consumes
/// the module routing byte).
pub const RESPONSE_HEADER_SIZE: usize = 1;

// ============================================================================
// Opcodes
// ============================================================================

pub const CMD_DEVICE_INFO: u8 = 0x01;
pub const CMD_START_UPLOAD: u8 = 0x02;
pub const CMD_FW_PACKET: u8 = 0x03;
pub const CMD_FINISH_UPLOAD: u8 = 0x04;
pub const CMD_ABORT_UPLOAD: u8 = 0x05;
pub const CMD_SYSTEM_RESET: u8 = 0x06;

// ============================================================================
// Status codes reported by the device
// ============================================================================

pub const STATUS_SUCCESS: u8 = 0x00;
pub const STATUS_PACKET_SIZE_ERROR: u8 = 0x01;
pub const STATUS_OFFSET_ERROR: u8 = 0x02;
pub const STATUS_ERASE_ERROR: u8 = 0x03;
pub const STATUS_WRONG_PAGE_NUMBER: u8 = 0x04;
pub const STATUS_FW_SIZE_ERROR: u8 = 0x05;
pub const STATUS_WRITE_ERROR: u8 = 0x06;
pub const STATUS_CRC_ERROR: u8 = 0x07;
pub const STATUS_DEVICE_ID_ERROR: u8 = 0x20;
pub const STATUS_VERSION_ERROR: u8 = 0x21;
pub const STATUS_DEVICE_INFO_ERROR: u8 = 0x22;

// ============================================================================
// Frame sizes
// ============================================================================

pub const DEVICE_INFO_REQUEST_SIZE: usize = 2;
pub const DEVICE_INFO_RESPONSE_SIZE: usize = 19;
pub const START_UPLOAD_REQUEST_SIZE: usize = 34;
pub const START_UPLOAD_RESPONSE_SIZE: usize = 2;
/// FwPacket request header + index/size/offset, before the payload.
pub const FW_PACKET_REQUEST_PREFIX_SIZE: usize = 14;
pub const FW_PACKET_RESPONSE_SIZE: usize = 6;
pub const FINISH_UPLOAD_REQUEST_SIZE: usize = 8;
pub const FINISH_UPLOAD_RESPONSE_SIZE: usize = 2;
pub const ABORT_UPLOAD_RESPONSE_SIZE: usize = 1;
pub const SYSTEM_RESET_REQUEST_SIZE: usize = 2;

// ============================================================================
// Embedded image metadata
// ============================================================================

/// Marker preceding the device info block inside a firmware binary.
pub const DEVICE_INFO_TAG: [u8; 10] = [0x11, 0x07, 0x5A, 0x78, 0x3B, 0x02, 0x96, 0xCC, 0xF0, 0xF0];

/// Length of the raw build time field.
pub const BUILD_TIME_LEN: usize = 10;

/// Filename fragment a candidate firmware image must contain.
pub const FIRMWARE_FILE_MARKER: &str = ".bin";

/// Fill byte for the unused tail of the final firmware packet.
pub const PACKET_PAD_BYTE: u8 = 0xFF;
