//! Fixed binary records shared by firmware images and the device.

use std::fmt;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use super::constants::BUILD_TIME_LEN;
use super::error::FrameError;

/// Device metadata embedded in a firmware image (28 bytes after the tag).
///
/// Layout, little-endian:
///
/// ```text
/// 0  boot_version   u16
/// 2  device_id      u32
/// 6  major_version  u16
/// 8  minor_version  u16
/// 10 packet_size    u32
/// 14 max_size       u32
/// 18 build_time     [u8; 10]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub boot_version: u16,
    pub device_id: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub firmware_packet_size: u32,
    pub firmware_max_size: u32,
    pub build_time: [u8; BUILD_TIME_LEN],
}

impl DeviceInfo {
    pub const SIZE: usize = 28;

    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < Self::SIZE {
            return Err(FrameError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        let boot_version = read_u16(&mut cursor);
        let device_id = read_u32(&mut cursor);
        let major_version = read_u16(&mut cursor);
        let minor_version = read_u16(&mut cursor);
        let firmware_packet_size = read_u32(&mut cursor);
        let firmware_max_size = read_u32(&mut cursor);
        let mut build_time = [0u8; BUILD_TIME_LEN];
        build_time.copy_from_slice(&data[18..18 + BUILD_TIME_LEN]);

        Ok(Self {
            boot_version,
            device_id,
            major_version,
            minor_version,
            firmware_packet_size,
            firmware_max_size,
            build_time,
        })
    }

    /// Serialize back to the 28-byte image layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        self.write_fields(&mut buf);
        buf
    }

    /// Append every field, build time included, to `buf`.
    pub(crate) fn write_fields(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.boot_version.to_le_bytes());
        buf.extend_from_slice(&self.device_id.to_le_bytes());
        buf.extend_from_slice(&self.major_version.to_le_bytes());
        buf.extend_from_slice(&self.minor_version.to_le_bytes());
        buf.extend_from_slice(&self.firmware_packet_size.to_le_bytes());
        buf.extend_from_slice(&self.firmware_max_size.to_le_bytes());
        buf.extend_from_slice(&self.build_time);
    }

    /// Build time as text, one byte per character.
    pub fn build_time_text(&self) -> String {
        self.build_time.iter().map(|&b| b as char).collect()
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BootVersion={}, DeviceId={}, MajorVersion={}, MinorVersion={}, FwPacketSize={}, FwMaxSize={}, BuildTime={}",
            self.boot_version,
            self.device_id,
            self.major_version,
            self.minor_version,
            self.firmware_packet_size,
            self.firmware_max_size,
            self.build_time_text()
        )
    }
}

/// Device identity as answered to a DeviceInfo request.
///
/// Same fields as [`DeviceInfo`] minus the build time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceReport {
    pub boot_version: u16,
    pub device_id: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub firmware_packet_size: u32,
    pub firmware_max_size: u32,
}

impl DeviceReport {
    /// Payload size after the opcode byte.
    pub const SIZE: usize = 18;

    /// Decode from a payload of exactly [`Self::SIZE`] bytes.
    pub(crate) fn from_payload(payload: &[u8; Self::SIZE]) -> Self {
        let mut cursor = Cursor::new(&payload[..]);
        Self {
            boot_version: read_u16(&mut cursor),
            device_id: read_u32(&mut cursor),
            major_version: read_u16(&mut cursor),
            minor_version: read_u16(&mut cursor),
            firmware_packet_size: read_u32(&mut cursor),
            firmware_max_size: read_u32(&mut cursor),
        }
    }

    pub(crate) fn write_fields(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.boot_version.to_le_bytes());
        buf.extend_from_slice(&self.device_id.to_le_bytes());
        buf.extend_from_slice(&self.major_version.to_le_bytes());
        buf.extend_from_slice(&self.minor_version.to_le_bytes());
        buf.extend_from_slice(&self.firmware_packet_size.to_le_bytes());
        buf.extend_from_slice(&self.firmware_max_size.to_le_bytes());
    }
}

impl From<&DeviceInfo> for DeviceReport {
    fn from(info: &DeviceInfo) -> Self {
        Self {
            boot_version: info.boot_version,
            device_id: info.device_id,
            major_version: info.major_version,
            minor_version: info.minor_version,
            firmware_packet_size: info.firmware_packet_size,
            firmware_max_size: info.firmware_max_size,
        }
    }
}

// Callers length-check before reading, so a short read cannot happen.
fn read_u16(cursor: &mut Cursor<&[u8]>) -> u16 {
    cursor.read_u16::<LittleEndian>().unwrap_or_default()
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> u32 {
    cursor.read_u32::<LittleEndian>().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes() -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&0x0102u16.to_le_bytes());
        raw.extend_from_slice(&0xA0B0C0D0u32.to_le_bytes());
        raw.extend_from_slice(&3u16.to_le_bytes());
        raw.extend_from_slice(&14u16.to_le_bytes());
        raw.extend_from_slice(&256u32.to_le_bytes());
        raw.extend_from_slice(&0x20000u32.to_le_bytes());
        raw.extend_from_slice(b"2401011230");
        raw
    }

    #[test]
    fn test_device_info_layout() {
        let info = DeviceInfo::from_bytes(&sample_bytes()).unwrap();
        assert_eq!(info.boot_version, 0x0102);
        assert_eq!(info.device_id, 0xA0B0C0D0);
        assert_eq!(info.major_version, 3);
        assert_eq!(info.minor_version, 14);
        assert_eq!(info.firmware_packet_size, 256);
        assert_eq!(info.firmware_max_size, 0x20000);
        assert_eq!(info.build_time_text(), "2401011230");
        assert_eq!(info.to_bytes(), sample_bytes());
    }

    #[test]
    fn test_device_info_too_short() {
        let raw = sample_bytes();
        let err = DeviceInfo::from_bytes(&raw[..27]).unwrap_err();
        assert_eq!(
            err,
            FrameError::BufferTooSmall {
                expected: 28,
                actual: 27
            }
        );
    }

    #[test]
    fn test_build_time_latin1() {
        let mut raw = sample_bytes();
        raw[18] = 0xE9;
        let info = DeviceInfo::from_bytes(&raw).unwrap();
        assert!(info.build_time_text().starts_with('é'));
    }
}
