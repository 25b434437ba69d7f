//! In-process model of the device side of the updater protocol.
//!
//! Used by the `simulate` command and by end-to-end tests: it takes host
//! frames and produces the answers a well-behaved bootloader would send.

use tracing::{debug, info, warn};

use crate::checksum::{Checksum, Crc16CcittFalse};
use crate::protocol::{DeviceReport, PACKET_PAD_BYTE, Request, Response, Status};

#[derive(Debug, Default)]
struct Upload {
    image_size: usize,
    packet_size: usize,
    expected_index: u32,
    flash: Vec<u8>,
}

pub struct SimulatedDevice {
    report: DeviceReport,
    upload: Option<Upload>,
    start_status: Status,
    finish_override: Option<Status>,
    /// Answer WrongPageNumber once when this packet index first arrives.
    hiccup_at: Option<u32>,
    reset_count: usize,
    last_image: Option<Vec<u8>>,
}

impl SimulatedDevice {
    pub fn new(report: DeviceReport) -> Self {
        Self {
            report,
            upload: None,
            start_status: Status::Success,
            finish_override: None,
            hiccup_at: None,
            reset_count: 0,
            last_image: None,
        }
    }

    /// Answer StartUpload with `status` instead of checking the request.
    pub fn with_start_status(mut self, status: Status) -> Self {
        self.start_status = status;
        self
    }

    /// Answer FinishUpload with `status` regardless of the checksum.
    pub fn with_finish_status(mut self, status: Status) -> Self {
        self.finish_override = Some(status);
        self
    }

    /// Reject the first delivery of packet `index` and ask for it again.
    pub fn with_hiccup_at(mut self, index: u32) -> Self {
        self.hiccup_at = Some(index);
        self
    }

    pub fn report(&self) -> &DeviceReport {
        &self.report
    }

    /// Number of SystemReset frames received.
    pub fn reset_count(&self) -> usize {
        self.reset_count
    }

    /// Image accepted by the last successful FinishUpload.
    pub fn last_image(&self) -> Option<&[u8]> {
        self.last_image.as_deref()
    }

    /// Process one host frame, returning the answer frame if any.
    pub fn handle(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        let request = match Request::decode(frame) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Device: undecodable frame");
                return None;
            }
        };

        let response = match request {
            Request::DeviceInfo => Response::DeviceInfo(self.report),
            Request::StartUpload { info, image_size } => Response::StartUpload {
                status: self.start(info.device_id, info.firmware_packet_size, image_size),
            },
            Request::FwPacket {
                index,
                packet_size,
                offset,
                payload,
            } => {
                let (status, resync_index) = self.packet(index, packet_size, offset, &payload);
                Response::FwPacket {
                    status,
                    resync_index,
                }
            }
            Request::FinishUpload {
                image_len,
                checksum,
            } => Response::FinishUpload {
                status: self.finish(image_len, checksum),
            },
            Request::SystemReset => {
                info!("Device: system reset");
                self.upload = None;
                self.reset_count += 1;
                return None;
            }
        };
        Some(response.encode())
    }

    fn start(&mut self, device_id: u32, packet_size: u32, image_size: u32) -> Status {
        if !self.start_status.is_success() {
            return self.start_status;
        }
        if device_id != self.report.device_id {
            return Status::DeviceIdError;
        }
        if packet_size == 0 {
            return Status::PacketSizeError;
        }
        if image_size > self.report.firmware_max_size {
            return Status::FwSizeError;
        }
        let packet_size = packet_size as usize;
        let image_size = image_size as usize;
        let padded = image_size.div_ceil(packet_size) * packet_size;
        debug!(image_size, packet_size, "Device: upload started");
        self.upload = Some(Upload {
            image_size,
            packet_size,
            expected_index: 0,
            flash: vec![PACKET_PAD_BYTE; padded],
        });
        Status::Success
    }

    fn packet(&mut self, index: u32, packet_size: u32, offset: u32, payload: &[u8]) -> (Status, u32) {
        let Some(upload) = self.upload.as_mut() else {
            return (Status::OffsetError, 0);
        };
        if self.hiccup_at == Some(index) {
            self.hiccup_at = None;
            debug!(index, "Device: dropping packet, asking for it again");
            return (Status::WrongPageNumber, index);
        }
        if index != upload.expected_index {
            return (Status::WrongPageNumber, upload.expected_index);
        }
        if packet_size as usize != upload.packet_size {
            return (Status::PacketSizeError, upload.expected_index);
        }
        let offset = offset as usize;
        if offset != index as usize * upload.packet_size || offset + payload.len() > upload.flash.len() {
            return (Status::OffsetError, upload.expected_index);
        }
        upload.flash[offset..offset + payload.len()].copy_from_slice(payload);
        upload.expected_index += 1;
        (Status::Success, upload.expected_index)
    }

    fn finish(&mut self, image_len: u32, checksum: u16) -> Status {
        let Some(upload) = self.upload.as_ref() else {
            return Status::FwSizeError;
        };
        if let Some(status) = self.finish_override {
            return status;
        }
        if image_len as usize != upload.image_size {
            return Status::FwSizeError;
        }
        let image = &upload.flash[..upload.image_size];
        if Crc16CcittFalse.checksum(image) != checksum {
            return Status::CrcError;
        }
        self.last_image = Some(image.to_vec());
        Status::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_info;

    fn device() -> SimulatedDevice {
        SimulatedDevice::new(DeviceReport {
            device_id: 7,
            firmware_max_size: 1024,
            ..Default::default()
        })
    }

    fn start_frame(packet_size: u32, image_size: u32) -> Vec<u8> {
        Request::StartUpload {
            info: sample_info(7, 0, packet_size),
            image_size,
        }
        .encode()
    }

    #[test]
    fn test_answers_device_info() {
        let mut dev = device();
        let answer = dev.handle(&Request::DeviceInfo.encode()).unwrap();
        assert_eq!(answer.len(), 19);
        assert_eq!(&answer[3..7], &7u32.to_le_bytes());
    }

    #[test]
    fn test_wrong_device_rejected() {
        let mut dev = device();
        let frame = Request::StartUpload {
            info: sample_info(8, 0, 4),
            image_size: 10,
        }
        .encode();
        assert_eq!(dev.handle(&frame).unwrap(), vec![0x02, 0x20]);
    }

    #[test]
    fn test_out_of_order_packet() {
        let mut dev = device();
        dev.handle(&start_frame(4, 10)).unwrap();
        let frame = Request::FwPacket {
            index: 1,
            packet_size: 4,
            offset: 4,
            payload: vec![0; 4],
        }
        .encode();
        assert_eq!(dev.handle(&frame).unwrap(), vec![0x03, 0x04, 0, 0, 0, 0]);
    }

    fn finish_frame(image_len: u32, checksum: u16) -> Vec<u8> {
        Request::FinishUpload {
            image_len,
            checksum,
        }
        .encode()
    }

    fn upload_one_packet(dev: &mut SimulatedDevice, payload: &[u8; 4]) {
        dev.handle(&start_frame(4, 4)).unwrap();
        let frame = Request::FwPacket {
            index: 0,
            packet_size: 4,
            offset: 0,
            payload: payload.to_vec(),
        }
        .encode();
        assert_eq!(dev.handle(&frame).unwrap(), vec![0x03, 0x00, 1, 0, 0, 0]);
    }

    #[test]
    fn test_finish_checks_size_and_crc() {
        let mut dev = device();
        upload_one_packet(&mut dev, b"abcd");
        let crc = Crc16CcittFalse.checksum(b"abcd");

        assert_eq!(dev.handle(&finish_frame(3, crc)).unwrap(), vec![0x04, 0x05]);
        assert_eq!(dev.handle(&finish_frame(4, crc ^ 1)).unwrap(), vec![0x04, 0x07]);
        assert!(dev.last_image().is_none());
        assert_eq!(dev.handle(&finish_frame(4, crc)).unwrap(), vec![0x04, 0x00]);
        assert_eq!(dev.last_image(), Some(&b"abcd"[..]));
    }

    #[test]
    fn test_status_overrides() {
        let mut dev = device().with_start_status(Status::VersionError);
        assert_eq!(dev.handle(&start_frame(4, 4)).unwrap(), vec![0x02, 0x21]);

        let mut dev = device().with_finish_status(Status::WriteError);
        upload_one_packet(&mut dev, b"abcd");
        let crc = Crc16CcittFalse.checksum(b"abcd");
        assert_eq!(dev.handle(&finish_frame(4, crc)).unwrap(), vec![0x04, 0x06]);
        assert!(dev.last_image().is_none());
        assert_eq!(dev.report().device_id, 7);
    }

    #[test]
    fn test_reset_has_no_answer() {
        let mut dev = device();
        assert!(dev.handle(&Request::SystemReset.encode()).is_none());
        assert_eq!(dev.reset_count(), 1);
    }
}
