//! Firmware selection for a discovered device.

use std::sync::Arc;

use tracing::debug;

use crate::catalog::{CatalogEntry, FirmwareCatalog};

/// Pick the firmware to upload to `device_id`.
///
/// Among entries with a matching device id, returns the one with the
/// greatest `(firmware_packet_size, minor_version)`; on equal keys the entry
/// later in catalog order wins. `None` when nothing matches.
///
/// The key ranks by packet size rather than by `(major, minor)` version.
/// That is the updater's established ranking and is kept as is.
pub fn select_for(catalog: &FirmwareCatalog, device_id: u32) -> Option<Arc<CatalogEntry>> {
    let selected = catalog
        .iter()
        .filter(|entry| entry.info.device_id == device_id)
        // max_by_key yields the last of several equal maxima.
        .max_by_key(|entry| (entry.info.firmware_packet_size, entry.info.minor_version))
        .cloned();

    if let Some(entry) = &selected {
        debug!(device_id, file = %entry.file_name(), "Selected firmware");
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entry, sample_info};

    #[test]
    fn test_no_match() {
        let catalog = FirmwareCatalog::from_entries([entry("a.bin", sample_info(1, 0, 4), 8)]);
        assert!(select_for(&catalog, 2).is_none());
        assert!(select_for(&FirmwareCatalog::default(), 1).is_none());
    }

    #[test]
    fn test_packet_size_dominates_minor() {
        let catalog = FirmwareCatalog::from_entries([
            entry("big_packets.bin", sample_info(5, 1, 256), 8),
            entry("newer_minor.bin", sample_info(5, 9, 128), 8),
            entry("other_device.bin", sample_info(6, 99, 4096), 8),
        ]);
        let chosen = select_for(&catalog, 5).unwrap();
        assert_eq!(chosen.file_name(), "big_packets.bin");
    }

    #[test]
    fn test_minor_breaks_packet_size_tie() {
        let catalog = FirmwareCatalog::from_entries([
            entry("m3.bin", sample_info(5, 3, 64), 8),
            entry("m7.bin", sample_info(5, 7, 64), 8),
            entry("m5.bin", sample_info(5, 5, 64), 8),
        ]);
        assert_eq!(select_for(&catalog, 5).unwrap().file_name(), "m7.bin");
    }

    #[test]
    fn test_major_version_is_ignored() {
        let mut old = sample_info(5, 2, 64);
        old.major_version = 1;
        let mut new = sample_info(5, 1, 64);
        new.major_version = 9;
        let catalog = FirmwareCatalog::from_entries([entry("old.bin", old, 8), entry("new.bin", new, 8)]);
        assert_eq!(select_for(&catalog, 5).unwrap().file_name(), "old.bin");
    }

    #[test]
    fn test_full_tie_takes_last_in_order() {
        let catalog = FirmwareCatalog::from_entries([
            entry("first.bin", sample_info(5, 2, 64), 8),
            entry("second.bin", sample_info(5, 2, 64), 8),
        ]);
        assert_eq!(select_for(&catalog, 5).unwrap().file_name(), "second.bin");
    }
}
