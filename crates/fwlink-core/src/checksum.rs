//! Whole-image checksum used by FinishUpload.

use crc::{CRC_16_IBM_3740, Crc};

/// Computes the 16-bit checksum the device verifies after the last packet.
pub trait Checksum {
    fn checksum(&self, image: &[u8]) -> u16;
}

impl<F> Checksum for F
where
    F: Fn(&[u8]) -> u16,
{
    fn checksum(&self, image: &[u8]) -> u16 {
        self(image)
    }
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection), known to
/// the `crc` catalog as CRC-16/IBM-3740.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc16CcittFalse;

const CRC16_CCITT_FALSE: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

impl Checksum for Crc16CcittFalse {
    fn checksum(&self, image: &[u8]) -> u16 {
        crc16_ccitt_false(image)
    }
}

pub fn crc16_ccitt_false(data: &[u8]) -> u16 {
    CRC16_CCITT_FALSE.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16_ccitt_false(b"123456789"), 0x29B1);
        assert_eq!(crc16_ccitt_false(&[]), 0xFFFF);
    }

    #[test]
    fn test_closure_checksum() {
        let sum = |data: &[u8]| data.iter().map(|&b| b as u16).sum::<u16>();
        assert_eq!(sum.checksum(&[1, 2, 3]), 6);
        assert_eq!(Crc16CcittFalse.checksum(b"123456789"), 0x29B1);
    }
}
