//! Utility functions for binary field reads, the header checksum, and
//! FILETIME conversion.

use crate::error::{RegfError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// File offset where the hive-bins region starts (after the file header).
pub const HIVE_BINS_START: u64 = 0x1000;

/// Converts a hive-relative offset to an absolute file offset.
#[inline]
pub fn hive_to_file_offset(hive_offset: u32) -> u64 {
    HIVE_BINS_START + u64::from(hive_offset)
}

/// Reads a u16 from a byte slice at the given position.
pub fn read_u16_le(data: &[u8], pos: usize) -> Result<u16> {
    if pos + 2 > data.len() {
        return Err(RegfError::truncated(
            pos as u32,
            2,
            data.len().saturating_sub(pos),
        ));
    }
    let mut cursor = Cursor::new(&data[pos..pos + 2]);
    Ok(cursor.read_u16::<LittleEndian>()?)
}

/// Reads a u32 from a byte slice at the given position.
pub fn read_u32_le(data: &[u8], pos: usize) -> Result<u32> {
    if pos + 4 > data.len() {
        return Err(RegfError::truncated(
            pos as u32,
            4,
            data.len().saturating_sub(pos),
        ));
    }
    let mut cursor = Cursor::new(&data[pos..pos + 4]);
    Ok(cursor.read_u32::<LittleEndian>()?)
}

/// Reads an i32 from a byte slice at the given position.
pub fn read_i32_le(data: &[u8], pos: usize) -> Result<i32> {
    if pos + 4 > data.len() {
        return Err(RegfError::truncated(
            pos as u32,
            4,
            data.len().saturating_sub(pos),
        ));
    }
    let mut cursor = Cursor::new(&data[pos..pos + 4]);
    Ok(cursor.read_i32::<LittleEndian>()?)
}

/// Reads a u64 from a byte slice at the given position.
pub fn read_u64_le(data: &[u8], pos: usize) -> Result<u64> {
    if pos + 8 > data.len() {
        return Err(RegfError::truncated(
            pos as u32,
            8,
            data.len().saturating_sub(pos),
        ));
    }
    let mut cursor = Cursor::new(&data[pos..pos + 8]);
    Ok(cursor.read_u64::<LittleEndian>()?)
}

/// XOR-32 over the first 508 bytes of the file header.
///
/// The accumulator starts at zero and each little-endian u32 word in
/// `data[0..508]` is XORed in. The input must hold at least 508 bytes.
pub fn header_checksum(data: &[u8]) -> u32 {
    let mut checksum: u32 = 0;
    for word in data[..0x1FC].chunks_exact(4) {
        checksum ^= u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
    }
    checksum
}

/// Converts a Windows FILETIME (100ns intervals since 1601-01-01) to a UTC
/// datetime. Returns `None` for values outside chrono's representable range.
pub fn filetime_to_datetime(filetime: u64) -> Option<chrono::DateTime<chrono::Utc>> {
    // Seconds between 1601-01-01 and the Unix epoch.
    const FILETIME_UNIX_DIFF: i64 = 11_644_473_600;

    let seconds = (filetime / 10_000_000) as i64 - FILETIME_UNIX_DIFF;
    let nanos = ((filetime % 10_000_000) * 100) as u32;

    chrono::DateTime::from_timestamp(seconds, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32_le() {
        let data = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(read_u32_le(&data, 0).unwrap(), 0x0403_0201);
        assert!(read_u32_le(&data, 1).is_err());
    }

    #[test]
    fn test_read_i32_le_negative() {
        let data = (-32i32).to_le_bytes();
        assert_eq!(read_i32_le(&data, 0).unwrap(), -32);
    }

    #[test]
    fn test_read_u64_le() {
        let data = [0x01, 0, 0, 0, 0x02, 0, 0, 0];
        assert_eq!(read_u64_le(&data, 0).unwrap(), 0x0000_0002_0000_0001);
    }

    #[test]
    fn test_header_checksum_zero_header() {
        let data = vec![0u8; 512];
        assert_eq!(header_checksum(&data), 0);
    }

    #[test]
    fn test_header_checksum_single_word() {
        let mut data = vec![0u8; 512];
        data[0..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(header_checksum(&data), 0xDEAD_BEEF);

        // A second identical word cancels out.
        data[4..8].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(header_checksum(&data), 0);
    }

    #[test]
    fn test_filetime_epoch() {
        // 1601-01-01 itself.
        let dt = filetime_to_datetime(0).unwrap();
        assert_eq!(dt.timestamp(), -11_644_473_600);
    }

    #[test]
    fn test_hive_to_file_offset() {
        assert_eq!(hive_to_file_offset(0), 0x1000);
        assert_eq!(hive_to_file_offset(0x20), 0x1020);
        assert_eq!(hive_to_file_offset(u32::MAX), 0x1000 + u64::from(u32::MAX));
    }
}
