//! The file facade: open/close lifecycle, codepage selection, abort
//! signalling, and lazy key-tree traversal.
//!
//! A [`Hive`] owns the byte source, the hive-bins index, and two bounded
//! LRU caches of decoded items. Keys and values hand out borrowed views
//! ([`Key`], [`Value`]) that resolve their sub-key descriptors, value
//! lists, and data streams on first access.
//!
//! Structural failures below the file header are localized: the enclosing
//! key is marked corrupted, the affected attribute comes back empty, and
//! enumeration continues. Only I/O errors and aborts propagate.

use crate::bigdata::{parse_segment_list, BigDataHeader, BIG_DATA_SEGMENT_SIZE};
use crate::bins::{HiveBins, DEFAULT_BIN_CACHE_CAPACITY};
use crate::cache::LruCache;
use crate::codepage::{decode_utf16_le, Codepage};
use crate::error::{RegfError, Result};
use crate::hbin::Cell;
use crate::header::{FileHeader, FILE_HEADER_SIZE};
use crate::key::{KeyFlags, KeyItem, NamedKey};
use crate::security::SecurityKey;
use crate::source::{ByteSource, FileSource, MmapSource, VecSource};
use crate::subkey_list::{name_hash, SubKeyDescriptor, SubKeyList, MAX_LIST_DEPTH};
use crate::utils::read_u32_le;
use crate::value::{DataLocation, DataStream, ValueData, ValueKey, ValueType};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Default capacity of the decoded-key cache.
pub const DEFAULT_KEY_CACHE_CAPACITY: usize = 256;

/// Default capacity of the decoded-value cache.
pub const DEFAULT_VALUE_CACHE_CAPACITY: usize = 256;

/// Per-file configuration for [`Hive::open_with_options`].
#[derive(Debug, Clone)]
pub struct HiveOptions {
    /// Codepage for compressed key and value names.
    pub codepage: Codepage,

    /// Number of bin buffers kept in memory.
    pub bin_cache_capacity: usize,

    /// Number of decoded keys kept in memory.
    pub key_cache_capacity: usize,

    /// Number of decoded values kept in memory.
    pub value_cache_capacity: usize,
}

impl Default for HiveOptions {
    fn default() -> Self {
        Self {
            codepage: Codepage::default(),
            bin_cache_capacity: DEFAULT_BIN_CACHE_CAPACITY,
            key_cache_capacity: DEFAULT_KEY_CACHE_CAPACITY,
            value_cache_capacity: DEFAULT_VALUE_CACHE_CAPACITY,
        }
    }
}

/// An open REGF hive.
///
/// All state is per-instance; two hives never share anything. The struct
/// is synchronous and performs no internal parallelism, but its interior
/// mutability is lock-based so a host may wrap one instance in a
/// reader/writer lock and read it from several threads.
pub struct Hive {
    source: Mutex<Option<Box<dyn ByteSource>>>,
    header: FileHeader,
    bins: HiveBins,
    codepage: RwLock<Codepage>,
    key_cache: RwLock<LruCache<u32, Arc<KeyItem>>>,
    value_cache: RwLock<LruCache<u32, Arc<ValueKey>>>,
    abort: AtomicBool,
    corrupted: AtomicBool,
}

impl Hive {
    /// Opens a hive over a byte source with default options.
    pub fn open(source: Box<dyn ByteSource>) -> Result<Self> {
        Self::open_with_options(source, HiveOptions::default())
    }

    /// Opens a hive over a byte source.
    ///
    /// Reads and validates the file header, then builds the hive-bins
    /// index by scanning bin headers front to back. Everything else is
    /// resolved on demand.
    #[instrument(skip_all)]
    pub fn open_with_options(mut source: Box<dyn ByteSource>, options: HiveOptions) -> Result<Self> {
        info!("opening hive");

        let mut header_buf = vec![0u8; FILE_HEADER_SIZE];
        source.read_at(0, &mut header_buf)?;
        let header = FileHeader::parse(&header_buf, source.size())?;
        debug!(
            version = %format!("{}.{}", header.major_version, header.minor_version),
            dirty = header.is_dirty(),
            root = %format!("{:#x}", header.root_key_offset),
            "file header parsed"
        );

        let bins = HiveBins::scan(source.as_mut(), &header, options.bin_cache_capacity)?;

        Ok(Self {
            source: Mutex::new(Some(source)),
            header,
            bins,
            codepage: RwLock::new(options.codepage),
            key_cache: RwLock::new(LruCache::new(options.key_cache_capacity)),
            value_cache: RwLock::new(LruCache::new(options.value_cache_capacity)),
            abort: AtomicBool::new(false),
            corrupted: AtomicBool::new(false),
        })
    }

    /// Opens a hive file through seekable reads.
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(Box::new(FileSource::open(path)?))
    }

    /// Opens a hive file through a memory mapping.
    pub fn open_mmap<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(Box::new(MmapSource::open(path)?))
    }

    /// Opens a hive held in memory.
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        Self::open(Box::new(VecSource::new(data)))
    }

    /// Releases the byte source and every cache. Idempotent; reads after
    /// close fail with an I/O error.
    pub fn close(&self) {
        self.source.lock().expect("source lock poisoned").take();
        self.bins.clear_cache();
        self.key_cache.write().expect("key cache lock poisoned").clear();
        self.value_cache
            .write()
            .expect("value cache lock poisoned")
            .clear();
    }

    /// Requests that in-flight traversals stop. Long operations observe
    /// the flag at their next check point and fail with
    /// [`RegfError::OperationAborted`]; the hive itself stays usable once
    /// the flag is cleared again.
    pub fn signal_abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Clears a previously signalled abort.
    pub fn reset_abort(&self) {
        self.abort.store(false, Ordering::Relaxed);
    }

    /// True once any decoded item has had a localized resolution failure.
    pub fn is_corrupted(&self) -> bool {
        self.corrupted.load(Ordering::Relaxed)
    }

    /// True when the header sequence numbers disagree (an uncommitted
    /// write transaction; the hive is still readable).
    pub fn is_dirty(&self) -> bool {
        self.header.is_dirty()
    }

    /// The codepage used for compressed names.
    pub fn codepage(&self) -> Codepage {
        *self.codepage.read().expect("codepage lock poisoned")
    }

    /// Switches the codepage for compressed names. Cached keys and values
    /// hold names decoded under the old codepage, so both caches are
    /// dropped.
    pub fn set_codepage(&self, codepage: Codepage) {
        *self.codepage.write().expect("codepage lock poisoned") = codepage;
        self.key_cache.write().expect("key cache lock poisoned").clear();
        self.value_cache
            .write()
            .expect("value cache lock poisoned")
            .clear();
    }

    /// Format version as a `(major, minor)` pair.
    pub fn format_version(&self) -> (u32, u32) {
        self.header.format_version()
    }

    /// File type field from the header (0 = primary hive).
    pub fn file_type(&self) -> u32 {
        self.header.file_type
    }

    /// The parsed file header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// The hive's root key.
    pub fn root_key(&self) -> Result<Key<'_>> {
        let item = self.key_item(self.header.root_key_offset, None)?;
        Ok(Key { hive: self, item })
    }

    /// Looks up a key by backslash-separated path. An empty path yields
    /// the root key. Segment comparison is ASCII case-insensitive.
    pub fn key_by_path(&self, path: &str) -> Result<Option<Key<'_>>> {
        self.key_by_path_with_separator(path, '\\')
    }

    /// Looks up a key by path with a caller-chosen separator.
    pub fn key_by_path_with_separator(
        &self,
        path: &str,
        separator: char,
    ) -> Result<Option<Key<'_>>> {
        let mut current = self.root_key()?;
        for segment in path.split(separator).filter(|s| !s.is_empty()) {
            self.check_abort()?;
            match current.sub_key_by_name(segment)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    pub(crate) fn check_abort(&self) -> Result<()> {
        if self.abort.load(Ordering::Relaxed) {
            Err(RegfError::OperationAborted)
        } else {
            Ok(())
        }
    }

    pub(crate) fn mark_corrupted(&self) {
        self.corrupted.store(true, Ordering::Relaxed);
    }

    /// Resolves a hive offset to its cell through the bins index.
    pub(crate) fn cell_at(&self, hive_offset: u32) -> Result<Cell> {
        let mut guard = self.source.lock().expect("source lock poisoned");
        let source = guard.as_mut().ok_or_else(|| {
            RegfError::Io(io::Error::new(io::ErrorKind::NotConnected, "hive is closed"))
        })?;
        self.bins.cell_at(source.as_mut(), hive_offset)
    }

    /// Records a localized failure against `owner` and keeps going, or
    /// propagates the error when it is fatal.
    fn localize(&self, owner: &KeyItem, context: &str, err: RegfError) -> Result<()> {
        if err.is_fatal() {
            return Err(err);
        }
        warn!(
            key = %format!("{:#x}", owner.hive_offset),
            error = %err,
            "{context} failed, marking key corrupted"
        );
        owner.mark_corrupted();
        self.mark_corrupted();
        Ok(())
    }

    /// Loads a decoded key, serving repeats from the key cache.
    fn key_item(&self, hive_offset: u32, known_hash: Option<u32>) -> Result<Arc<KeyItem>> {
        if let Some(item) = self
            .key_cache
            .write()
            .expect("key cache lock poisoned")
            .get(&hive_offset)
        {
            return Ok(Arc::clone(item));
        }

        let cell = self.cell_at(hive_offset)?;
        if !cell.allocated {
            return Err(RegfError::malformed(
                hive_offset,
                "named key cell is not allocated",
            ));
        }
        let node = NamedKey::parse(cell.data(), hive_offset, self.codepage(), known_hash)?;
        drop(cell);

        let mut corrupted = false;

        let class_name = match self.resolve_class_name(&node) {
            Ok(class_name) => class_name,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(
                    key = %format!("{:#x}", hive_offset),
                    error = %err,
                    "class name resolution failed, marking key corrupted"
                );
                corrupted = true;
                None
            }
        };

        let security_descriptor = match self.resolve_security_descriptor(&node) {
            Ok(descriptor) => descriptor,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(
                    key = %format!("{:#x}", hive_offset),
                    error = %err,
                    "security key resolution failed, marking key corrupted"
                );
                corrupted = true;
                None
            }
        };

        if corrupted {
            self.mark_corrupted();
        }

        let item = Arc::new(KeyItem::new(
            node,
            hive_offset,
            class_name,
            security_descriptor,
            corrupted,
        ));
        self.key_cache
            .write()
            .expect("key cache lock poisoned")
            .insert(hive_offset, Arc::clone(&item));
        Ok(item)
    }

    fn resolve_class_name(&self, node: &NamedKey) -> Result<Option<String>> {
        if !node.has_class_name() {
            return Ok(None);
        }
        let cell = self.cell_at(node.class_name_offset)?;
        let data = cell.data();
        let len = node.class_name_size as usize;
        if data.len() < len {
            return Err(RegfError::malformed(
                node.class_name_offset,
                format!("class name cell holds {} bytes, expected {len}", data.len()),
            ));
        }
        Ok(Some(decode_utf16_le(&data[..len], node.class_name_offset)?))
    }

    fn resolve_security_descriptor(&self, node: &NamedKey) -> Result<Option<Vec<u8>>> {
        if !node.has_security_key() {
            return Ok(None);
        }
        let cell = self.cell_at(node.security_key_offset)?;
        let security_key = SecurityKey::parse(
            cell.data(),
            node.security_key_offset,
            self.header.has_cell_preamble(),
        )?;
        Ok(Some(security_key.descriptor))
    }

    /// Loads a decoded value, serving repeats from the value cache.
    fn value_key(&self, hive_offset: u32) -> Result<Arc<ValueKey>> {
        if let Some(value) = self
            .value_cache
            .write()
            .expect("value cache lock poisoned")
            .get(&hive_offset)
        {
            return Ok(Arc::clone(value));
        }

        let cell = self.cell_at(hive_offset)?;
        if !cell.allocated {
            return Err(RegfError::malformed(
                hive_offset,
                "value key cell is not allocated",
            ));
        }
        let value = Arc::new(ValueKey::parse(cell.data(), hive_offset, self.codepage())?);
        drop(cell);

        self.value_cache
            .write()
            .expect("value cache lock poisoned")
            .insert(hive_offset, Arc::clone(&value));
        Ok(value)
    }

    /// Flattens a sub-key list tree into leaf-level descriptors.
    ///
    /// Interior `ri` entries recurse with a depth bound; an unresolvable
    /// sub-list is dropped from the result and marks `owner` corrupted
    /// without aborting the walk.
    pub(crate) fn flatten_sub_key_list(
        &self,
        list_offset: u32,
        owner: &KeyItem,
    ) -> Result<Vec<SubKeyDescriptor>> {
        let mut descriptors = Vec::new();
        self.flatten_into(list_offset, 0, owner, &mut descriptors)?;
        Ok(descriptors)
    }

    fn flatten_into(
        &self,
        list_offset: u32,
        depth: u32,
        owner: &KeyItem,
        out: &mut Vec<SubKeyDescriptor>,
    ) -> Result<()> {
        self.check_abort()?;
        if depth > MAX_LIST_DEPTH {
            return Err(RegfError::TreeTooDeep {
                offset: list_offset,
                max_depth: MAX_LIST_DEPTH,
            });
        }

        let cell = self.cell_at(list_offset)?;
        let list = SubKeyList::parse(cell.data(), list_offset, self.header.has_cell_preamble())?;
        drop(cell);

        match list {
            SubKeyList::IndexRoot(offsets) => {
                for sub_list in offsets {
                    self.check_abort()?;
                    match self.flatten_into(sub_list, depth + 1, owner, out) {
                        Ok(()) => {}
                        Err(err @ RegfError::TreeTooDeep { .. }) => return Err(err),
                        Err(err) => self.localize(owner, "resolving sub-key list", err)?,
                    }
                }
            }
            SubKeyList::FastLeaf(entries)
            | SubKeyList::HashLeaf(entries)
            | SubKeyList::IndexLeaf(entries) => out.extend(entries),
        }

        Ok(())
    }

    fn read_value_list(&self, list_offset: u32, count: u32) -> Result<Vec<u32>> {
        let cell = self.cell_at(list_offset)?;
        let data = cell.data();
        let count = count as usize;
        if data.len() < count * 4 {
            return Err(RegfError::malformed(
                list_offset,
                format!("value list holds {} bytes for {count} entries", data.len()),
            ));
        }
        (0..count).map(|i| read_u32_le(data, i * 4)).collect()
    }

    /// Builds the physical location of a value's data.
    fn data_location(&self, value: &ValueKey) -> Result<DataLocation> {
        if value.inline {
            return Ok(DataLocation::Inline {
                bytes: value.data_offset.to_le_bytes(),
                len: value.data_size.min(4) as u8,
            });
        }
        if value.data_size == 0 {
            return Ok(DataLocation::Empty);
        }
        if value.data_size <= BIG_DATA_SEGMENT_SIZE {
            return Ok(DataLocation::Cell {
                offset: value.data_offset,
                len: value.data_size,
            });
        }

        let cell = self.cell_at(value.data_offset)?;
        let big_data = BigDataHeader::parse(cell.data(), value.data_offset)?;
        drop(cell);

        let list_cell = self.cell_at(big_data.segment_list_offset)?;
        let segments = parse_segment_list(
            list_cell.data(),
            big_data.segment_list_offset,
            big_data.segment_count,
        )?;
        drop(list_cell);

        let required = BigDataHeader::required_segments(value.data_size);
        if (segments.len() as u32) < required {
            return Err(RegfError::malformed(
                value.data_offset,
                format!(
                    "big data lists {} segments, {required} required for {} bytes",
                    segments.len(),
                    value.data_size
                ),
            ));
        }

        Ok(DataLocation::Big {
            segments,
            len: value.data_size,
        })
    }
}

/// A key in the hive tree, borrowed from its [`Hive`].
pub struct Key<'h> {
    hive: &'h Hive,
    item: Arc<KeyItem>,
}

impl<'h> Key<'h> {
    /// Hive offset of this key's cell.
    pub fn offset(&self) -> u32 {
        self.item.hive_offset
    }

    /// Key name. The root key of most hives has a non-empty name holding
    /// the hive's mount path.
    pub fn name(&self) -> &str {
        &self.item.node.name
    }

    /// Key flag bits.
    pub fn flags(&self) -> KeyFlags {
        self.item.node.flags
    }

    /// Hive offset of the parent key's cell. The root key's parent offset
    /// is not resolvable.
    pub fn parent_offset(&self) -> u32 {
        self.item.node.parent_offset
    }

    /// Class name, when the key carries one.
    pub fn class_name(&self) -> Option<&str> {
        self.item.class_name.as_deref()
    }

    /// Last-written timestamp (Windows FILETIME).
    pub fn last_written_time(&self) -> u64 {
        self.item.node.timestamp
    }

    /// Last-written timestamp as a UTC datetime.
    pub fn last_written_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.item.node.timestamp_datetime()
    }

    /// Raw security descriptor bytes, when the key references one.
    pub fn security_descriptor(&self) -> Option<&[u8]> {
        self.item.security_descriptor.as_deref()
    }

    /// True once any attribute of this key failed to resolve.
    pub fn is_corrupted(&self) -> bool {
        self.item.is_corrupted()
    }

    /// The decoded `nk` fields.
    pub fn node(&self) -> &NamedKey {
        &self.item.node
    }

    /// Flattened sub-key descriptors, materialized on first access.
    fn descriptors(&self) -> Result<&[SubKeyDescriptor]> {
        if let Some(descriptors) = self.item.sub_key_descriptors.get() {
            return Ok(descriptors);
        }

        let node = &self.item.node;
        let collected = if !node.has_sub_keys() {
            Vec::new()
        } else {
            match self
                .hive
                .flatten_sub_key_list(node.sub_keys_list_offset, &self.item)
            {
                Ok(descriptors) => descriptors,
                Err(err) => {
                    self.hive
                        .localize(&self.item, "resolving sub-key descriptors", err)?;
                    Vec::new()
                }
            }
        };

        if collected.len() as u32 != node.number_of_sub_keys {
            warn!(
                key = %format!("{:#x}", self.item.hive_offset),
                expected = node.number_of_sub_keys,
                actual = collected.len(),
                "sub-key descriptor count disagrees with the key header"
            );
            self.item.mark_corrupted();
            self.hive.mark_corrupted();
        }

        Ok(self.item.sub_key_descriptors.get_or_init(|| collected))
    }

    /// Value-cell offsets, materialized on first access.
    fn value_offsets(&self) -> Result<&[u32]> {
        if let Some(offsets) = self.item.value_list.get() {
            return Ok(offsets);
        }

        let node = &self.item.node;
        let collected = if !node.has_values() {
            Vec::new()
        } else {
            match self
                .hive
                .read_value_list(node.value_list_offset, node.number_of_values)
            {
                Ok(offsets) => offsets,
                Err(err) => {
                    self.hive.localize(&self.item, "resolving value list", err)?;
                    Vec::new()
                }
            }
        };

        Ok(self.item.value_list.get_or_init(|| collected))
    }

    /// Number of resolvable sub-keys. A corrupted sub-key index yields 0
    /// rather than an error.
    pub fn number_of_sub_keys(&self) -> Result<u32> {
        Ok(self.descriptors()?.len() as u32)
    }

    /// The sub-key at `index`, or `None` past the end or when the child
    /// fails to resolve (which marks this key corrupted).
    pub fn sub_key(&self, index: usize) -> Result<Option<Key<'h>>> {
        let Some(descriptor) = self.descriptors()?.get(index).copied() else {
            return Ok(None);
        };
        match self.hive.key_item(descriptor.key_offset, descriptor.name_hash) {
            Ok(item) => Ok(Some(Key {
                hive: self.hive,
                item,
            })),
            Err(err) => {
                self.hive.localize(&self.item, "resolving sub-key", err)?;
                Ok(None)
            }
        }
    }

    /// All resolvable sub-keys, in index order. Unresolvable children are
    /// dropped and mark this key corrupted.
    pub fn sub_keys(&self) -> Result<Vec<Key<'h>>> {
        let descriptors = self.descriptors()?;
        let mut keys = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            self.hive.check_abort()?;
            match self.hive.key_item(descriptor.key_offset, descriptor.name_hash) {
                Ok(item) => keys.push(Key {
                    hive: self.hive,
                    item,
                }),
                Err(err) => self.hive.localize(&self.item, "resolving sub-key", err)?,
            }
        }
        Ok(keys)
    }

    /// Finds a sub-key by ASCII case-insensitive name.
    ///
    /// Children from a hash leaf are tried hash-first: candidates whose
    /// stored hash equals the target's hash come first, and only if none
    /// matches by name does the search fall back to the remaining
    /// children. The fallback keeps lookups working on hives whose stored
    /// hashes are wrong.
    pub fn sub_key_by_name(&self, name: &str) -> Result<Option<Key<'h>>> {
        let target = name_hash(name);
        let descriptors = self.descriptors()?;

        for hash_pass in [true, false] {
            for descriptor in descriptors {
                self.hive.check_abort()?;
                let hash_matches = descriptor.name_hash == Some(target);
                if hash_pass != hash_matches {
                    continue;
                }
                match self.hive.key_item(descriptor.key_offset, descriptor.name_hash) {
                    Ok(item) => {
                        if item.node.name.eq_ignore_ascii_case(name) {
                            return Ok(Some(Key {
                                hive: self.hive,
                                item,
                            }));
                        }
                    }
                    Err(err) => self.hive.localize(&self.item, "resolving sub-key", err)?,
                }
            }
        }

        Ok(None)
    }

    /// Number of resolvable values. A corrupted value list yields 0
    /// rather than an error.
    pub fn number_of_values(&self) -> Result<u32> {
        Ok(self.value_offsets()?.len() as u32)
    }

    /// The value at `index`, or `None` past the end or when the value
    /// fails to resolve (which marks this key corrupted).
    pub fn value(&self, index: usize) -> Result<Option<Value<'h>>> {
        let Some(&offset) = self.value_offsets()?.get(index) else {
            return Ok(None);
        };
        match self.hive.value_key(offset) {
            Ok(value) => Ok(Some(Value {
                hive: self.hive,
                owner: Arc::clone(&self.item),
                value,
            })),
            Err(err) => {
                self.hive.localize(&self.item, "resolving value", err)?;
                Ok(None)
            }
        }
    }

    /// All resolvable values, in value-list order.
    pub fn values(&self) -> Result<Vec<Value<'h>>> {
        let offsets = self.value_offsets()?;
        let mut values = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            self.hive.check_abort()?;
            match self.hive.value_key(offset) {
                Ok(value) => values.push(Value {
                    hive: self.hive,
                    owner: Arc::clone(&self.item),
                    value,
                }),
                Err(err) => self.hive.localize(&self.item, "resolving value", err)?,
            }
        }
        Ok(values)
    }

    /// Finds a value by ASCII case-insensitive name. The empty name
    /// addresses the key's default value.
    pub fn value_by_name(&self, name: &str) -> Result<Option<Value<'h>>> {
        let offsets = self.value_offsets()?;
        for &offset in offsets {
            self.hive.check_abort()?;
            match self.hive.value_key(offset) {
                Ok(value) => {
                    if value.name.eq_ignore_ascii_case(name) {
                        return Ok(Some(Value {
                            hive: self.hive,
                            owner: Arc::clone(&self.item),
                            value,
                        }));
                    }
                }
                Err(err) => self.hive.localize(&self.item, "resolving value", err)?,
            }
        }
        Ok(None)
    }
}

/// A value under a key, borrowed from its [`Hive`].
pub struct Value<'h> {
    hive: &'h Hive,
    owner: Arc<KeyItem>,
    value: Arc<ValueKey>,
}

impl<'h> Value<'h> {
    /// Value name; empty for the key's default value.
    pub fn name(&self) -> &str {
        &self.value.name
    }

    /// Declared value type, passed through opaquely.
    pub fn value_type(&self) -> ValueType {
        self.value.value_type
    }

    /// Logical data size in bytes.
    pub fn data_size(&self) -> u32 {
        self.value.data_size
    }

    /// True for the key's unnamed default value.
    pub fn is_default(&self) -> bool {
        self.value.is_default()
    }

    /// The decoded `vk` fields.
    pub fn value_key(&self) -> &ValueKey {
        &self.value
    }

    /// Opens the value's logical data stream. An unresolvable stream
    /// (bad data offset, inconsistent big-data layout) marks the owning
    /// key corrupted and yields an empty stream.
    pub fn data_stream(&self) -> Result<DataStream<'h>> {
        match self.hive.data_location(&self.value) {
            Ok(location) => Ok(DataStream::new(self.hive, location)),
            Err(err) => {
                self.hive.localize(&self.owner, "resolving value data", err)?;
                Ok(DataStream::new(self.hive, DataLocation::Empty))
            }
        }
    }

    /// Reads the value's raw bytes. Localized data corruption yields an
    /// empty buffer and marks the owning key corrupted.
    pub fn data(&self) -> Result<Vec<u8>> {
        let stream = self.data_stream()?;
        match stream.read_all() {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                self.hive.localize(&self.owner, "reading value data", err)?;
                Ok(Vec::new())
            }
        }
    }

    /// Decodes the value's bytes according to its declared type. Bytes
    /// that do not fit the type are surfaced raw instead of failing.
    pub fn typed_data(&self) -> Result<ValueData> {
        let bytes = self.data()?;
        match ValueData::parse(&bytes, self.value.value_type, self.value.hive_offset) {
            Ok(data) => Ok(data),
            Err(err) => {
                self.hive
                    .localize(&self.owner, "decoding typed value data", err)?;
                Ok(ValueData::Unknown(bytes))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::header_checksum;

    /// Builds a single-bin hive image: header plus one 4096-multiple bin
    /// holding the given cells, free space filled with one free cell.
    fn build_image(cells: &[Vec<u8>], root_offset: u32) -> Vec<u8> {
        let mut bin = Vec::new();
        for payload in cells {
            let total = 4 + payload.len();
            let padded = (total + 7) & !7;
            bin.extend_from_slice(&(-(padded as i32)).to_le_bytes());
            bin.extend_from_slice(payload);
            bin.extend(std::iter::repeat(0).take(padded - total));
        }

        let used = 32 + bin.len();
        let bin_size = (used + 4095) & !4095;
        let free = bin_size - used;

        let mut image = vec![0u8; FILE_HEADER_SIZE];
        image[0..4].copy_from_slice(b"regf");
        image[0x04..0x08].copy_from_slice(&1u32.to_le_bytes());
        image[0x08..0x0C].copy_from_slice(&1u32.to_le_bytes());
        image[0x14..0x18].copy_from_slice(&1u32.to_le_bytes());
        image[0x18..0x1C].copy_from_slice(&5u32.to_le_bytes());
        image[0x24..0x28].copy_from_slice(&root_offset.to_le_bytes());
        image[0x28..0x2C].copy_from_slice(&(bin_size as u32).to_le_bytes());
        let checksum = header_checksum(&image);
        image[0x1FC..0x200].copy_from_slice(&checksum.to_le_bytes());

        let mut bin_header = vec![0u8; 32];
        bin_header[0..4].copy_from_slice(b"hbin");
        bin_header[0x08..0x0C].copy_from_slice(&(bin_size as u32).to_le_bytes());
        image.extend_from_slice(&bin_header);
        image.extend_from_slice(&bin);
        if free > 0 {
            let at = image.len();
            image.extend(std::iter::repeat(0).take(free));
            image[at..at + 4].copy_from_slice(&(free as i32).to_le_bytes());
        }
        image
    }

    fn nk_payload(name: &[u8], subkey_list: u32, n_subkeys: u32) -> Vec<u8> {
        let mut data = vec![0u8; 0x4C];
        data[0..2].copy_from_slice(b"nk");
        data[0x02..0x04].copy_from_slice(&(KeyFlags::COMP_NAME | KeyFlags::ROOT_KEY).to_le_bytes());
        data[0x14..0x18].copy_from_slice(&n_subkeys.to_le_bytes());
        data[0x1C..0x20].copy_from_slice(&subkey_list.to_le_bytes());
        data[0x20..0x24].copy_from_slice(&crate::header::NO_OFFSET.to_le_bytes());
        data[0x28..0x2C].copy_from_slice(&crate::header::NO_OFFSET.to_le_bytes());
        data[0x2C..0x30].copy_from_slice(&crate::header::NO_OFFSET.to_le_bytes());
        data[0x30..0x34].copy_from_slice(&crate::header::NO_OFFSET.to_le_bytes());
        data[0x48..0x4A].copy_from_slice(&(name.len() as u16).to_le_bytes());
        data.extend_from_slice(name);
        data
    }

    #[test]
    fn test_self_referencing_index_root_is_tree_too_deep() {
        // Cell 0: root nk (offset 32, size 0x50 padded -> 0x50).
        // Cell 1: ri list pointing at itself.
        let nk = nk_payload(b"", 32 + 0x50, 1);
        let ri_offset: u32 = 32 + 0x50;
        let mut ri = Vec::new();
        ri.extend_from_slice(b"ri");
        ri.extend_from_slice(&1u16.to_le_bytes());
        ri.extend_from_slice(&ri_offset.to_le_bytes());

        let image = build_image(&[nk, ri], 32);
        let hive = Hive::from_vec(image).unwrap();
        let root = hive.root_key().unwrap();
        let item = Arc::clone(&root.item);

        let result = hive.flatten_sub_key_list(ri_offset, &item);
        assert!(matches!(result, Err(RegfError::TreeTooDeep { .. })));

        // Through the facade the failure is localized.
        assert_eq!(root.number_of_sub_keys().unwrap(), 0);
        assert!(root.is_corrupted());
        assert!(hive.is_corrupted());
    }

    #[test]
    fn test_abort_and_reset() {
        let nk = nk_payload(b"", crate::header::NO_OFFSET, 0);
        let image = build_image(&[nk], 32);
        let hive = Hive::from_vec(image).unwrap();

        hive.signal_abort();
        assert!(matches!(
            hive.key_by_path("anything"),
            Err(RegfError::OperationAborted)
        ));

        hive.reset_abort();
        assert!(hive.key_by_path("").unwrap().is_some());
    }

    #[test]
    fn test_reads_after_close_fail() {
        let nk = nk_payload(b"", crate::header::NO_OFFSET, 0);
        let image = build_image(&[nk], 32);
        let hive = Hive::from_vec(image).unwrap();

        hive.close();
        hive.close(); // idempotent
        assert!(matches!(hive.root_key(), Err(RegfError::Io(_))));
    }

    #[test]
    fn test_root_key_on_free_cell_is_malformed() {
        let nk = nk_payload(b"", crate::header::NO_OFFSET, 0);
        let mut image = build_image(&[nk], 32);
        // Flip the root cell's size positive (free).
        let size = i32::from_le_bytes(image[0x1020..0x1024].try_into().unwrap());
        image[0x1020..0x1024].copy_from_slice(&(-size).to_le_bytes());

        let hive = Hive::from_vec(image).unwrap();
        assert!(matches!(
            hive.root_key(),
            Err(RegfError::Malformed { .. })
        ));
    }
}
