//! Ordered index of the hive bins with a demand-loaded LRU bin cache.
//!
//! Built once at open by scanning bin headers front to back. Every cell
//! lookup afterwards goes through [`HiveBins::cell_at`]: binary-search the
//! containing bin, load (or fetch from cache) the bin's bytes, then scan
//! its cells for one starting at the queried offset.

use crate::cache::LruCache;
use crate::error::{RegfError, Result};
use crate::hbin::{Cell, CellIterator, HbinHeader, HBIN_HEADER_SIZE};
use crate::header::FileHeader;
use crate::source::ByteSource;
use crate::utils::hive_to_file_offset;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Default number of bin buffers kept in memory.
pub const DEFAULT_BIN_CACHE_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
struct BinEntry {
    /// Hive-relative offset of the bin's first byte.
    hive_offset: u32,

    /// Bin length in bytes, header included.
    size: u32,

    /// Absolute file offset of the bin's first byte.
    file_offset: u64,
}

/// Index of all bins in the file, ordered by hive offset.
pub struct HiveBins {
    entries: Vec<BinEntry>,
    cache: Mutex<LruCache<u32, Arc<Vec<u8>>>>,
}

impl HiveBins {
    /// Scans bin headers starting at file offset 4096.
    ///
    /// The scan stops at the first header whose signature is not `hbin` or
    /// whose geometry is inconsistent; a short hive-bins region is tolerated
    /// and logged, not fatal.
    pub fn scan(
        source: &mut dyn ByteSource,
        header: &FileHeader,
        cache_capacity: usize,
    ) -> Result<Self> {
        let mut entries = Vec::new();
        let mut pos: u32 = 0;

        while u64::from(pos) + HBIN_HEADER_SIZE as u64 <= u64::from(header.hive_bins_size) {
            let file_offset = hive_to_file_offset(pos);
            let mut buf = [0u8; HBIN_HEADER_SIZE];
            source.read_at(file_offset, &mut buf)?;

            let bin = match HbinHeader::parse(&buf)? {
                Some(bin) => bin,
                None => break,
            };

            if bin.size == 0 || bin.size % 4096 != 0 {
                warn!(
                    hive_offset = %format!("{:#x}", pos),
                    size = bin.size,
                    "bin size is not a positive multiple of 4096, stopping scan"
                );
                break;
            }
            if bin.hive_bin_offset != pos {
                warn!(
                    hive_offset = %format!("{:#x}", pos),
                    stored = %format!("{:#x}", bin.hive_bin_offset),
                    "bin header offset disagrees with its position, stopping scan"
                );
                break;
            }
            if u64::from(pos) + u64::from(bin.size) > u64::from(header.hive_bins_size) {
                warn!(
                    hive_offset = %format!("{:#x}", pos),
                    size = bin.size,
                    "bin overruns the hive-bins region, stopping scan"
                );
                break;
            }

            entries.push(BinEntry {
                hive_offset: pos,
                size: bin.size,
                file_offset,
            });
            pos += bin.size;
        }

        if u64::from(pos) != u64::from(header.hive_bins_size) {
            warn!(
                covered = %format!("{:#x}", pos),
                declared = %format!("{:#x}", header.hive_bins_size),
                "bins do not cover the declared hive-bins region"
            );
        }
        debug!(bins = entries.len(), "hive-bins index built");

        Ok(Self {
            entries,
            cache: Mutex::new(LruCache::new(cache_capacity)),
        })
    }

    /// Number of indexed bins.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the scan found no bins.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total bytes covered by indexed bins.
    pub fn covered_size(&self) -> u64 {
        self.entries.iter().map(|entry| u64::from(entry.size)).sum()
    }

    /// Resolves a hive-relative offset to the cell starting there.
    pub fn cell_at(&self, source: &mut dyn ByteSource, hive_offset: u32) -> Result<Cell> {
        let entry = self
            .bin_containing(hive_offset)
            .ok_or(RegfError::OffsetOutOfRange {
                offset: hive_offset,
            })?
            .clone();

        let buffer = self.load_bin(source, &entry)?;

        for raw in CellIterator::new(&buffer, entry.hive_offset) {
            let raw = raw?;
            if raw.hive_offset == hive_offset {
                return Ok(Cell::new(
                    raw.hive_offset,
                    raw.allocated,
                    Arc::clone(&buffer),
                    raw.payload,
                ));
            }
            if raw.hive_offset > hive_offset {
                break;
            }
        }

        Err(RegfError::UnalignedOffset {
            offset: hive_offset,
        })
    }

    fn bin_containing(&self, hive_offset: u32) -> Option<&BinEntry> {
        let index = self
            .entries
            .partition_point(|entry| entry.hive_offset <= hive_offset);
        let entry = &self.entries[index.checked_sub(1)?];
        if u64::from(hive_offset) < u64::from(entry.hive_offset) + u64::from(entry.size) {
            Some(entry)
        } else {
            None
        }
    }

    /// Loads a bin's bytes, serving repeats from the LRU cache. The buffer
    /// is shared out by `Arc` so eviction never invalidates a live cell.
    fn load_bin(&self, source: &mut dyn ByteSource, entry: &BinEntry) -> Result<Arc<Vec<u8>>> {
        let mut cache = self.cache.lock().expect("bin cache lock poisoned");
        if let Some(buffer) = cache.get(&entry.hive_offset) {
            return Ok(Arc::clone(buffer));
        }

        debug!(
            hive_offset = %format!("{:#x}", entry.hive_offset),
            size = entry.size,
            "loading hive bin"
        );
        let mut buffer = vec![0u8; entry.size as usize];
        source.read_at(entry.file_offset, &mut buffer)?;
        let buffer = Arc::new(buffer);
        cache.insert(entry.hive_offset, Arc::clone(&buffer));
        Ok(buffer)
    }

    /// Drops every cached bin buffer.
    pub fn clear_cache(&self) {
        self.cache.lock().expect("bin cache lock poisoned").clear();
    }
}
