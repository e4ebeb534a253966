//! Byte-source adapters over the underlying hive storage.
//!
//! Everything above this layer addresses the file through [`ByteSource`]:
//! exact-length random reads plus a total size. Three adapters are provided:
//! a seekable [`FileSource`] that tracks its read cursor, a memory-mapped
//! [`MmapSource`], and an owned in-memory [`VecSource`].

use crate::error::{RegfError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Random-access reader over a hive image.
///
/// Reads are exact-length: a read that cannot fill the buffer is an error,
/// including reads that run past end-of-file.
pub trait ByteSource: Send {
    /// Fills `buf` with bytes starting at the absolute file offset.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Total size of the underlying image in bytes.
    fn size(&self) -> u64;
}

/// Seekable file adapter.
///
/// Tracks the position left by the previous read and only seeks when the
/// requested offset differs, so sequential scans (the bin index build) do
/// not pay a seek per read.
pub struct FileSource {
    file: File,
    position: u64,
    size: u64,
}

impl FileSource {
    /// Opens a file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(file)
    }

    /// Wraps an already-open file.
    pub fn new(file: File) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            position: 0,
            size,
        })
    }
}

impl ByteSource for FileSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if self.position != offset {
            self.file.seek(SeekFrom::Start(offset))?;
            self.position = offset;
        }
        if let Err(err) = self.file.read_exact(buf) {
            // The OS cursor is indeterminate after a failed read; force a
            // seek on the next call.
            self.position = u64::MAX;
            return Err(err.into());
        }
        self.position += buf.len() as u64;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Memory-mapped file adapter.
pub struct MmapSource {
    map: Mmap,
}

impl MmapSource {
    /// Memory-maps a file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the file is opened read-only, the mapping lives as long as
        // this source, and every access below is bounds-checked against the
        // mapping length. Concurrent truncation of the underlying file by
        // another process is outside this crate's contract.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map })
    }
}

impl ByteSource for MmapSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        copy_range(&self.map, offset, buf)
    }

    fn size(&self) -> u64 {
        self.map.len() as u64
    }
}

/// Owned in-memory adapter.
pub struct VecSource {
    data: Vec<u8>,
}

impl VecSource {
    /// Wraps an owned hive image.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ByteSource for VecSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        copy_range(&self.data, offset, buf)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

fn copy_range(data: &[u8], offset: u64, buf: &mut [u8]) -> Result<()> {
    let start = usize::try_from(offset)
        .map_err(|_| RegfError::short_read(offset, buf.len(), 0))?;
    let end = start
        .checked_add(buf.len())
        .ok_or_else(|| RegfError::short_read(offset, buf.len(), 0))?;
    if end > data.len() {
        return Err(RegfError::short_read(
            offset,
            buf.len(),
            data.len().saturating_sub(start),
        ));
    }
    buf.copy_from_slice(&data[start..end]);
    Ok(())
}
