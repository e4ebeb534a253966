//! Hive-bin headers and in-bin cell decoding.
//!
//! The hive-bins region is a sequence of 4096-byte-multiple bins, each
//! starting with a 32-byte `hbin` header followed by tightly packed cells.
//! A cell's first field is its signed size: negative means allocated, the
//! magnitude is the total cell length including the size field.

use crate::error::{RegfError, Result};
use crate::utils::{read_i32_le, read_u32_le, read_u64_le};
use std::ops::Range;
use std::sync::Arc;

/// Expected bin signature.
pub const HBIN_SIGNATURE: &[u8; 4] = b"hbin";

/// Size of the bin header in bytes.
pub const HBIN_HEADER_SIZE: usize = 32;

/// Parsed hive-bin header.
#[derive(Debug, Clone)]
pub struct HbinHeader {
    /// This bin's hive-relative offset, as stored in the header.
    pub hive_bin_offset: u32,

    /// Bin length in bytes, header included.
    pub size: u32,

    /// Timestamp (Windows FILETIME); only meaningful on the first bin.
    pub timestamp: u64,
}

impl HbinHeader {
    /// Parses a 32-byte bin header.
    ///
    /// Returns `Ok(None)` when the signature is not `hbin`: during the
    /// sequential bin scan that is the stop condition, not corruption.
    pub fn parse(data: &[u8]) -> Result<Option<Self>> {
        if data.len() < HBIN_HEADER_SIZE {
            return Err(RegfError::truncated(0, HBIN_HEADER_SIZE, data.len()));
        }

        if &data[0..4] != HBIN_SIGNATURE {
            return Ok(None);
        }

        Ok(Some(HbinHeader {
            hive_bin_offset: read_u32_le(data, 0x04)?,
            size: read_u32_le(data, 0x08)?,
            timestamp: read_u64_le(data, 0x14)?,
        }))
    }
}

/// A decoded cell, holding a shared reference to its bin's buffer.
///
/// The buffer is reference-counted so the bin cache can evict the bin while
/// a caller still holds the cell. Decoders copy the fields they need out of
/// [`Cell::data`] immediately; no decoded item retains the buffer.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Hive-relative offset of the cell's size field.
    pub hive_offset: u32,

    /// True when the cell is allocated (negative stored size).
    pub allocated: bool,

    buffer: Arc<Vec<u8>>,
    payload: Range<usize>,
}

impl Cell {
    pub(crate) fn new(
        hive_offset: u32,
        allocated: bool,
        buffer: Arc<Vec<u8>>,
        payload: Range<usize>,
    ) -> Self {
        Self {
            hive_offset,
            allocated,
            buffer,
            payload,
        }
    }

    /// The cell payload, excluding the 4-byte size field.
    pub fn data(&self) -> &[u8] {
        &self.buffer[self.payload.clone()]
    }
}

/// Boundaries of one cell inside a bin buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCell {
    /// Hive-relative offset of the cell's size field.
    pub hive_offset: u32,

    /// True when allocated.
    pub allocated: bool,

    /// Payload range within the bin buffer, size field excluded.
    pub payload: Range<usize>,
}

/// Iterates the cells of one bin buffer (header included) in file order.
///
/// The first error encountered truncates enumeration for this bin; other
/// bins are unaffected.
pub struct CellIterator<'a> {
    data: &'a [u8],
    pos: usize,
    bin_hive_offset: u32,
    failed: bool,
}

impl<'a> CellIterator<'a> {
    /// Creates an iterator over a full bin buffer starting at its first cell.
    pub fn new(data: &'a [u8], bin_hive_offset: u32) -> Self {
        Self {
            data,
            pos: HBIN_HEADER_SIZE,
            bin_hive_offset,
            failed: false,
        }
    }
}

impl Iterator for CellIterator<'_> {
    type Item = Result<RawCell>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos + 4 > self.data.len() {
            return None;
        }

        let cell_offset = self.bin_hive_offset + self.pos as u32;

        let raw_size = match read_i32_le(self.data, self.pos) {
            Ok(size) => size,
            Err(err) => {
                self.failed = true;
                return Some(Err(err));
            }
        };

        // i32::MIN has no positive magnitude, so the allocation state is
        // ambiguous.
        if raw_size == i32::MIN {
            self.failed = true;
            return Some(Err(RegfError::malformed(
                cell_offset,
                "cell size 0x80000000 has ambiguous sign",
            )));
        }

        let allocated = raw_size < 0;
        let size = raw_size.unsigned_abs() as usize;

        if size < 8 || size % 8 != 0 || self.pos + size > self.data.len() {
            self.failed = true;
            return Some(Err(RegfError::malformed(
                cell_offset,
                format!("invalid cell size {size}"),
            )));
        }

        let payload = self.pos + 4..self.pos + size;
        self.pos += size;

        Some(Ok(RawCell {
            hive_offset: cell_offset,
            allocated,
            payload,
        }))
    }
}
