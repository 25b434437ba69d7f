//! Firmware catalog.
//!
//! Scans a directory for `*.bin*` images carrying an embedded
//! [`DeviceInfo`] block and keeps them in scan order. A scan never fails:
//! unreadable or malformed files are logged and left out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::protocol::constants::{DEVICE_INFO_TAG, FIRMWARE_FILE_MARKER};
use crate::protocol::{DeviceInfo, FrameError};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("firmware directory does not exist: {0}")]
    MissingDirectory(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed device info in {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: FrameError,
    },
    #[error("{path} declares a zero firmware packet size")]
    ZeroPacketSize { path: PathBuf },
}

/// One firmware image and its embedded metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub path: PathBuf,
    pub info: DeviceInfo,
    /// Offset of the tag inside the image, if it carries one.
    pub tag_offset: Option<usize>,
    image: Vec<u8>,
}

impl CatalogEntry {
    /// Wrap an image whose metadata is already known.
    pub fn new(path: impl Into<PathBuf>, info: DeviceInfo, image: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            info,
            tag_offset: find_tag(&image),
            image,
        }
    }

    /// Parse an in-memory image. `Ok(None)` when the image has no tag.
    pub fn from_image(path: impl Into<PathBuf>, image: Vec<u8>) -> Result<Option<Self>, CatalogError> {
        let path = path.into();
        let Some(tag_offset) = find_tag(&image) else {
            return Ok(None);
        };
        let start = tag_offset + DEVICE_INFO_TAG.len();
        let info = DeviceInfo::from_bytes(&image[start..]).map_err(|source| CatalogError::Malformed {
            path: path.clone(),
            source,
        })?;
        if info.firmware_packet_size == 0 {
            return Err(CatalogError::ZeroPacketSize { path });
        }
        Ok(Some(Self {
            path,
            info,
            tag_offset: Some(tag_offset),
            image,
        }))
    }

    /// Full image bytes, exactly as read from disk.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// First position of the device info tag in `data`.
pub fn find_tag(data: &[u8]) -> Option<usize> {
    data.windows(DEVICE_INFO_TAG.len())
        .position(|w| w == DEVICE_INFO_TAG)
}

/// Immutable, ordered set of firmware candidates.
#[derive(Debug, Default, Clone)]
pub struct FirmwareCatalog {
    entries: Vec<Arc<CatalogEntry>>,
}

impl FirmwareCatalog {
    /// Scan `dir` for firmware images.
    ///
    /// Files are visited in file-name order, which is also the catalog's
    /// iteration order.
    #[instrument(level = "info")]
    pub fn scan(dir: &Path) -> Self {
        let candidates = match list_candidates(dir) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Cannot scan firmware directory");
                return Self::default();
            }
        };
        if candidates.is_empty() {
            info!(dir = %dir.display(), "No firmware binaries in directory");
            return Self::default();
        }

        let mut entries = Vec::new();
        for path in candidates {
            match load_entry(&path) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => debug!(path = %path.display(), "No device info tag, skipping"),
                Err(e) => warn!(error = %e, "Error parsing device info"),
            }
        }

        let catalog = Self::from_entries(entries);
        catalog.log_contents();
        catalog
    }

    /// Build a catalog from already parsed entries, keeping their order.
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CatalogEntry>> {
        self.entries.iter()
    }

    pub fn get(&self, path: &Path) -> Option<&Arc<CatalogEntry>> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn log_contents(&self) {
        if self.entries.is_empty() {
            return;
        }
        info!(count = self.entries.len(), "Firmware binary files:");
        for entry in &self.entries {
            info!(file = %entry.file_name(), "{}", entry.info);
        }
    }
}

fn list_candidates(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    if !dir.is_dir() {
        return Err(CatalogError::MissingDirectory(dir.to_path_buf()));
    }
    let read_err = |source: std::io::Error| CatalogError::Read {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().contains(FIRMWARE_FILE_MARKER) {
            names.push(path);
        }
    }
    names.sort();
    Ok(names)
}

fn load_entry(path: &Path) -> Result<Option<CatalogEntry>, CatalogError> {
    let image = std::fs::read(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    CatalogEntry::from_image(path, image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_info, scratch_dir, tagged_image};

    #[test]
    fn test_find_tag_any_offset() {
        for offset in [0usize, 1, 17, 300] {
            let image = tagged_image(&vec![0x55; offset], &sample_info(1, 1, 64), &[]);
            assert_eq!(find_tag(&image), Some(offset));
        }
        assert_eq!(find_tag(&[0u8; 64]), None);
    }

    #[test]
    fn test_entry_from_image() {
        let info = sample_info(7, 2, 4);
        let image = tagged_image(b"head", &info, b"tail");
        let entry = CatalogEntry::from_image("a.bin", image.clone())
            .unwrap()
            .unwrap();
        assert_eq!(entry.info, info);
        assert_eq!(entry.tag_offset, Some(4));
        assert_eq!(entry.image(), &image[..]);
    }

    #[test]
    fn test_first_tag_wins() {
        let second = tagged_image(&[], &sample_info(2, 0, 8), &[]);
        let image = tagged_image(&[0, 0], &sample_info(1, 0, 4), &second);
        let entry = CatalogEntry::from_image("twice.bin", image).unwrap().unwrap();
        assert_eq!(entry.tag_offset, Some(2));
        assert_eq!(entry.info.device_id, 1);
        assert_eq!(entry.info.firmware_packet_size, 4);
    }

    #[test]
    fn test_entry_truncated_metadata() {
        let mut image = DEVICE_INFO_TAG.to_vec();
        image.extend_from_slice(&[0u8; 12]);
        assert!(matches!(
            CatalogEntry::from_image("short.bin", image),
            Err(CatalogError::Malformed { .. })
        ));
    }

    #[test]
    fn test_entry_zero_packet_size() {
        let image = tagged_image(&[], &sample_info(1, 1, 0), &[]);
        assert!(matches!(
            CatalogEntry::from_image("zero.bin", image),
            Err(CatalogError::ZeroPacketSize { .. })
        ));
    }

    #[test]
    fn test_scan_directory() {
        let tmp = scratch_dir("catalog_scan");
        let dir = tmp.path();
        let a = tagged_image(b"aaaa", &sample_info(7, 1, 4), b"");
        let b = tagged_image(b"", &sample_info(9, 3, 8), b"bbbbbbbb");
        std::fs::write(dir.join("b_fw.bin"), &b).unwrap();
        std::fs::write(dir.join("a_fw.bin"), &a).unwrap();
        std::fs::write(dir.join("untagged.bin"), [0u8; 128]).unwrap();
        std::fs::write(dir.join("notes.txt"), &a).unwrap();
        std::fs::create_dir_all(dir.join("nested.bin")).unwrap();

        let catalog = FirmwareCatalog::scan(dir);
        assert_eq!(catalog.len(), 2);
        let names: Vec<_> = catalog.iter().map(|e| e.file_name()).collect();
        assert_eq!(names, vec!["a_fw.bin", "b_fw.bin"]);
        assert_eq!(catalog.iter().next().unwrap().image(), &a[..]);
        assert!(catalog.get(&dir.join("b_fw.bin")).is_some());
    }

    #[test]
    fn test_scan_skips_malformed_file() {
        let tmp = scratch_dir("catalog_malformed");
        let dir = tmp.path();
        let mut broken = DEVICE_INFO_TAG.to_vec();
        broken.extend_from_slice(&[1, 2, 3]);
        std::fs::write(dir.join("broken.bin"), &broken).unwrap();
        std::fs::write(
            dir.join("good.bin"),
            tagged_image(&[], &sample_info(3, 0, 16), &[]),
        )
        .unwrap();

        let catalog = FirmwareCatalog::scan(dir);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.iter().next().unwrap().info.device_id, 3);
    }

    #[test]
    fn test_scan_missing_directory() {
        let catalog = FirmwareCatalog::scan(Path::new("/definitely/not/here"));
        assert!(catalog.is_empty());
    }
}
