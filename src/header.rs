//! File header (base block) parsing.
//!
//! The first 4096 bytes of a REGF file hold the hive metadata: signature,
//! sequence numbers, format version, the root-key offset, and the size of
//! the hive-bins region, protected by an XOR-32 checksum over the first
//! 508 bytes.

use crate::codepage::decode_utf16_le;
use crate::error::{RegfError, Result};
use crate::utils::{header_checksum, read_u32_le, read_u64_le, HIVE_BINS_START};
use std::fmt;

/// Size of the file header in bytes.
pub const FILE_HEADER_SIZE: usize = 4096;

/// Expected file signature.
pub const REGF_SIGNATURE: &[u8; 4] = b"regf";

/// Byte offset of the stored checksum.
const CHECKSUM_OFFSET: usize = 0x1FC;

/// Sentinel hive offset meaning "no cell".
pub const NO_OFFSET: u32 = 0xFFFF_FFFF;

/// Parsed and validated file header.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Primary sequence number, bumped when a write transaction starts.
    pub primary_sequence: u32,

    /// Secondary sequence number, bumped when the transaction commits.
    pub secondary_sequence: u32,

    /// Last-written timestamp (Windows FILETIME).
    pub timestamp: u64,

    /// Major format version; always 1 for supported files.
    pub major_version: u32,

    /// Minor format version, 0 through 6.
    pub minor_version: u32,

    /// File type (0 = primary hive, 1 = transaction log).
    pub file_type: u32,

    /// File format (1 = direct memory load).
    pub file_format: u32,

    /// Hive-relative offset of the root key cell.
    pub root_key_offset: u32,

    /// Size of the hive-bins region in bytes.
    pub hive_bins_size: u32,

    /// Clustering factor (always 1 in practice).
    pub clustering_factor: u32,

    /// Embedded file name (last 32 characters of the hive's path, UTF-16LE).
    pub file_name: String,

    /// Stored XOR-32 checksum.
    pub checksum: u32,
}

impl FileHeader {
    /// Parses the header from the first 4096 bytes of the file.
    ///
    /// `source_size` is the total byte-source size, used to reject a
    /// `hive_bins_size` that runs past end-of-file.
    ///
    /// # Errors
    ///
    /// Fatal to open: wrong signature, checksum mismatch, unsupported
    /// version, or an impossible hive-bins size. A primary/secondary
    /// sequence mismatch is not an error; it only marks the hive dirty.
    pub fn parse(data: &[u8], source_size: u64) -> Result<Self> {
        if data.len() < FILE_HEADER_SIZE {
            return Err(RegfError::truncated(0, FILE_HEADER_SIZE, data.len()));
        }

        if &data[0..4] != REGF_SIGNATURE {
            return Err(RegfError::invalid_signature(0, REGF_SIGNATURE, &data[0..4]));
        }

        let checksum = read_u32_le(data, CHECKSUM_OFFSET)?;
        let computed = header_checksum(data);
        if checksum != computed {
            return Err(RegfError::ChecksumMismatch {
                stored: checksum,
                computed,
            });
        }

        let primary_sequence = read_u32_le(data, 0x04)?;
        let secondary_sequence = read_u32_le(data, 0x08)?;
        let timestamp = read_u64_le(data, 0x0C)?;
        let major_version = read_u32_le(data, 0x14)?;
        let minor_version = read_u32_le(data, 0x18)?;
        let file_type = read_u32_le(data, 0x1C)?;
        let file_format = read_u32_le(data, 0x20)?;
        let root_key_offset = read_u32_le(data, 0x24)?;
        let hive_bins_size = read_u32_le(data, 0x28)?;
        let clustering_factor = read_u32_le(data, 0x2C)?;

        if major_version != 1 || minor_version > 6 {
            return Err(RegfError::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }

        if hive_bins_size == 0 || hive_bins_size % 4096 != 0 {
            return Err(RegfError::malformed(
                0,
                format!("hive-bins size {hive_bins_size:#x} is not a positive multiple of 4096"),
            ));
        }
        if HIVE_BINS_START + u64::from(hive_bins_size) > source_size {
            return Err(RegfError::malformed(
                0,
                format!(
                    "hive-bins region ends at {:#x}, past the file size {source_size:#x}",
                    HIVE_BINS_START + u64::from(hive_bins_size)
                ),
            ));
        }

        // 64 UTF-16LE characters at 0x30. Lossy names are tolerated here;
        // the field is informational.
        let file_name =
            decode_utf16_le(&data[0x30..0xB0], 0).unwrap_or_default();

        Ok(FileHeader {
            primary_sequence,
            secondary_sequence,
            timestamp,
            major_version,
            minor_version,
            file_type,
            file_format,
            root_key_offset,
            hive_bins_size,
            clustering_factor,
            file_name,
            checksum,
        })
    }

    /// True when the primary and secondary sequence numbers disagree. A
    /// dirty hive would need its transaction log replayed to be consistent,
    /// but it is still readable.
    pub fn is_dirty(&self) -> bool {
        self.primary_sequence != self.secondary_sequence
    }

    /// Format version as a `(major, minor)` pair.
    pub fn format_version(&self) -> (u32, u32) {
        (self.major_version, self.minor_version)
    }

    /// True for 1.0/1.1 files, whose security-key and sub-key-list cells
    /// carry an extra reserved u32 before the 2-byte signature.
    pub fn has_cell_preamble(&self) -> bool {
        self.major_version == 1 && self.minor_version <= 1
    }

    /// Last-written timestamp as a UTC datetime.
    pub fn timestamp_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        crate::utils::filetime_to_datetime(self.timestamp)
    }
}

impl fmt::Display for FileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "REGF header: version {}.{}, root key at {:#x}, hive bins {:#x} bytes, {}",
            self.major_version,
            self.minor_version,
            self.root_key_offset,
            self.hive_bins_size,
            if self.is_dirty() { "dirty" } else { "clean" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_header_bytes() -> Vec<u8> {
        let mut data = vec![0u8; FILE_HEADER_SIZE];
        data[0..4].copy_from_slice(REGF_SIGNATURE);
        data[0x04..0x08].copy_from_slice(&7u32.to_le_bytes());
        data[0x08..0x0C].copy_from_slice(&7u32.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&1u32.to_le_bytes());
        data[0x18..0x1C].copy_from_slice(&5u32.to_le_bytes());
        data[0x24..0x28].copy_from_slice(&0x20u32.to_le_bytes());
        data[0x28..0x2C].copy_from_slice(&4096u32.to_le_bytes());
        let checksum = header_checksum(&data);
        data[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
        data
    }

    #[test]
    fn test_parse_valid() {
        let data = valid_header_bytes();
        let header = FileHeader::parse(&data, 8192).unwrap();
        assert_eq!(header.format_version(), (1, 5));
        assert_eq!(header.root_key_offset, 0x20);
        assert_eq!(header.hive_bins_size, 4096);
        assert!(!header.is_dirty());
        assert!(!header.has_cell_preamble());
    }

    #[test]
    fn test_invalid_signature() {
        let mut data = valid_header_bytes();
        data[0..4].copy_from_slice(b"XXXX");
        let result = FileHeader::parse(&data, 8192);
        assert!(matches!(result, Err(RegfError::InvalidSignature { .. })));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut data = valid_header_bytes();
        data[4] = data[4].wrapping_add(1);
        let result = FileHeader::parse(&data, 8192);
        assert!(matches!(result, Err(RegfError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = valid_header_bytes();
        data[0x18..0x1C].copy_from_slice(&7u32.to_le_bytes());
        let checksum = header_checksum(&data);
        data[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
        let result = FileHeader::parse(&data, 8192);
        assert!(matches!(
            result,
            Err(RegfError::UnsupportedVersion { major: 1, minor: 7 })
        ));
    }

    #[test]
    fn test_legacy_version_preamble() {
        let mut data = valid_header_bytes();
        data[0x18..0x1C].copy_from_slice(&1u32.to_le_bytes());
        let checksum = header_checksum(&data);
        data[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
        let header = FileHeader::parse(&data, 8192).unwrap();
        assert!(header.has_cell_preamble());
    }

    #[test]
    fn test_bins_size_must_be_4k_multiple() {
        let mut data = valid_header_bytes();
        data[0x28..0x2C].copy_from_slice(&4100u32.to_le_bytes());
        let checksum = header_checksum(&data);
        data[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
        assert!(matches!(
            FileHeader::parse(&data, 1 << 20),
            Err(RegfError::Malformed { .. })
        ));
    }

    #[test]
    fn test_bins_size_past_eof() {
        let data = valid_header_bytes();
        // Region would end at 8192 but the file is only 6000 bytes.
        assert!(matches!(
            FileHeader::parse(&data, 6000),
            Err(RegfError::Malformed { .. })
        ));
    }

    #[test]
    fn test_dirty_sequence_numbers_do_not_fail_open() {
        let mut data = valid_header_bytes();
        data[0x08..0x0C].copy_from_slice(&8u32.to_le_bytes());
        let checksum = header_checksum(&data);
        data[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
        let header = FileHeader::parse(&data, 8192).unwrap();
        assert!(header.is_dirty());
    }
}
