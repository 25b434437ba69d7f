//! fwlink-core: host side of the MCU firmware updater protocol.
//!
//! The crate discovers a device, picks the matching firmware image from a
//! directory and streams it to the device's bootloader in fixed-size
//! packets, finishing with a whole-image checksum and a reset.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Opcodes, status codes, device info layout, frame codec
//! - **Catalog**: Firmware directory scan and embedded metadata
//! - **Selector**: Firmware choice for a reported device id
//! - **State**: Upload state machine and response handlers
//! - **Session**: Reactive orchestrator and its configuration
//! - **Events**: Observer pattern for UI decoupling
//! - **Transport**: Frame sink abstraction (serial, mock, simulated device)
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use fwlink_core::session::UpdateSession;
//! use fwlink_core::transport::{ResponseFramer, SerialTransport};
//!
//! let port = SerialTransport::open("/dev/ttyUSB0", 115_200).expect("open port");
//! let mut session = UpdateSession::open(Path::new("firmware"), &port);
//! let mut framer = ResponseFramer::new(false);
//!
//! session.request_device_info();
//! while session.awaiting().is_some() {
//!     framer.push(&port.read_available().expect("read"));
//!     while let Some(frame) = framer.next_frame() {
//!         session.receive_frame(&frame);
//!     }
//! }
//! ```

pub mod catalog;
pub mod checksum;
pub mod events;
pub mod protocol;
pub mod selector;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use catalog::{CatalogEntry, CatalogError, FirmwareCatalog};
pub use checksum::{Checksum, Crc16CcittFalse, crc16_ccitt_false};
pub use events::{NullObserver, TracingObserver, UpdateEvent, UpdateObserver, UpdatePhase};
pub use protocol::{Command, DeviceInfo, DeviceReport, FrameError, Request, Response, Status};
pub use selector::select_for;
pub use session::{SessionConfig, UpdateSession};
pub use state::{Outcome, SessionState, Stall, UploadContext};
pub use transport::{
    FrameSink, MockSink, ResponseFramer, SerialTransport, SimulatedDevice, TransportError,
};

#[cfg(test)]
pub(crate) mod test_support {
    use tempfile::TempDir;

    use crate::catalog::CatalogEntry;
    use crate::protocol::DeviceInfo;
    use crate::protocol::constants::DEVICE_INFO_TAG;

    pub fn sample_info(device_id: u32, minor: u16, packet_size: u32) -> DeviceInfo {
        DeviceInfo {
            boot_version: 1,
            device_id,
            major_version: 1,
            minor_version: minor,
            firmware_packet_size: packet_size,
            firmware_max_size: 0x0001_0000,
            build_time: *b"2401151230",
        }
    }

    /// `prefix`, then the tag and `info`, then `suffix`.
    pub fn tagged_image(prefix: &[u8], info: &DeviceInfo, suffix: &[u8]) -> Vec<u8> {
        let mut image = prefix.to_vec();
        image.extend_from_slice(&DEVICE_INFO_TAG);
        image.extend_from_slice(&info.to_bytes());
        image.extend_from_slice(suffix);
        image
    }

    pub fn entry(name: &str, info: DeviceInfo, body_len: usize) -> CatalogEntry {
        CatalogEntry::new(name, info, vec![0xA5; body_len])
    }

    pub fn entry_with_image(info: DeviceInfo, image: Vec<u8>) -> CatalogEntry {
        CatalogEntry::new("fw.bin", info, image)
    }

    /// Fresh, empty directory removed when the guard drops.
    pub fn scratch_dir(name: &str) -> TempDir {
        tempfile::Builder::new()
            .prefix(&format!("fwlink-{}-", name))
            .tempdir()
            .unwrap()
    }
}
