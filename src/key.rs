//! Named-key (`nk`) cell decoding.

use crate::codepage::{decode_utf16_le, Codepage};
use crate::error::{RegfError, Result};
use crate::header::NO_OFFSET;
use crate::subkey_list::SubKeyDescriptor;
use crate::utils::{read_u16_le, read_u32_le, read_u64_le};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Minimum `nk` payload size: the fixed fields before the name bytes.
const NAMED_KEY_MIN_SIZE: usize = 0x4C;

/// Flag bits of a named key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFlags(pub u16);

impl KeyFlags {
    /// Key is volatile (not persisted).
    pub const VOLATILE: u16 = 0x0001;

    /// Key is a mount point for another hive.
    pub const HIVE_EXIT: u16 = 0x0002;

    /// Key is the hive's root key.
    pub const ROOT_KEY: u16 = 0x0004;

    /// Key cannot be deleted.
    pub const NO_DELETE: u16 = 0x0008;

    /// Key is a symbolic link.
    pub const SYM_LINK: u16 = 0x0010;

    /// Key name is stored in the hive codepage instead of UTF-16LE.
    pub const COMP_NAME: u16 = 0x0020;

    /// Key is a predefined handle.
    pub const PREDEF_HANDLE: u16 = 0x0040;

    /// Returns true if the given flag bit is set.
    pub fn has(self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    /// True when the name is stored in the hive codepage.
    pub fn name_is_compressed(self) -> bool {
        self.has(Self::COMP_NAME)
    }

    /// True for the hive's root key.
    pub fn is_root(self) -> bool {
        self.has(Self::ROOT_KEY)
    }

    /// True for volatile keys.
    pub fn is_volatile(self) -> bool {
        self.has(Self::VOLATILE)
    }

    /// True for symbolic-link keys.
    pub fn is_symlink(self) -> bool {
        self.has(Self::SYM_LINK)
    }
}

/// Decoded `nk` cell.
#[derive(Debug, Clone)]
pub struct NamedKey {
    /// Key flag bits.
    pub flags: KeyFlags,

    /// Last-written timestamp (Windows FILETIME).
    pub timestamp: u64,

    /// Hive offset of the parent key's cell.
    pub parent_offset: u32,

    /// Number of stable sub-keys.
    pub number_of_sub_keys: u32,

    /// Number of volatile sub-keys; never resolvable from the file.
    pub number_of_volatile_sub_keys: u32,

    /// Hive offset of the sub-keys list, or [`NO_OFFSET`].
    pub sub_keys_list_offset: u32,

    /// Hive offset of the volatile sub-keys list, or [`NO_OFFSET`].
    pub volatile_sub_keys_list_offset: u32,

    /// Number of values.
    pub number_of_values: u32,

    /// Hive offset of the value list, or [`NO_OFFSET`].
    pub value_list_offset: u32,

    /// Hive offset of the security key, or [`NO_OFFSET`].
    pub security_key_offset: u32,

    /// Hive offset of the class-name data, or [`NO_OFFSET`].
    pub class_name_offset: u32,

    /// Class-name byte length; 0 means no class name.
    pub class_name_size: u16,

    /// Key name, decoded per the compression flag.
    pub name: String,

    /// Name hash from the parent's hash-leaf entry, when known.
    pub name_hash: Option<u32>,
}

impl NamedKey {
    /// Decodes an `nk` cell payload.
    ///
    /// `known_hash` is the hash stored alongside this key's offset in the
    /// parent's hash-leaf list, used later as a comparison fast path.
    pub fn parse(
        data: &[u8],
        hive_offset: u32,
        codepage: Codepage,
        known_hash: Option<u32>,
    ) -> Result<Self> {
        if data.len() < NAMED_KEY_MIN_SIZE {
            return Err(RegfError::truncated(
                hive_offset,
                NAMED_KEY_MIN_SIZE,
                data.len(),
            ));
        }

        if &data[0..2] != b"nk" {
            return Err(RegfError::invalid_signature(hive_offset, b"nk", &data[0..2]));
        }

        let flags = KeyFlags(read_u16_le(data, 0x02)?);
        let timestamp = read_u64_le(data, 0x04)?;
        let parent_offset = read_u32_le(data, 0x10)?;
        let number_of_sub_keys = read_u32_le(data, 0x14)?;
        let number_of_volatile_sub_keys = read_u32_le(data, 0x18)?;
        let sub_keys_list_offset = read_u32_le(data, 0x1C)?;
        let volatile_sub_keys_list_offset = read_u32_le(data, 0x20)?;
        let number_of_values = read_u32_le(data, 0x24)?;
        let value_list_offset = read_u32_le(data, 0x28)?;
        let security_key_offset = read_u32_le(data, 0x2C)?;
        let class_name_offset = read_u32_le(data, 0x30)?;
        let name_size = read_u16_le(data, 0x48)?;
        let class_name_size = read_u16_le(data, 0x4A)?;

        // Unsigned comparison against the remaining payload; the name can
        // never extend past the cell.
        let name_size = name_size as usize;
        if name_size > data.len() - NAMED_KEY_MIN_SIZE {
            return Err(RegfError::malformed(
                hive_offset,
                format!("key name length {name_size} exceeds the cell payload"),
            ));
        }

        let name_data = &data[NAMED_KEY_MIN_SIZE..NAMED_KEY_MIN_SIZE + name_size];
        let name = if name_size == 0 {
            String::new()
        } else if flags.name_is_compressed() {
            codepage.decode(name_data)
        } else {
            decode_utf16_le(name_data, hive_offset)?
        };

        Ok(NamedKey {
            flags,
            timestamp,
            parent_offset,
            number_of_sub_keys,
            number_of_volatile_sub_keys,
            sub_keys_list_offset,
            volatile_sub_keys_list_offset,
            number_of_values,
            value_list_offset,
            security_key_offset,
            class_name_offset,
            class_name_size,
            name,
            name_hash: known_hash,
        })
    }

    /// True when a stable sub-keys list is present.
    pub fn has_sub_keys(&self) -> bool {
        self.number_of_sub_keys > 0 && self.sub_keys_list_offset != NO_OFFSET
    }

    /// True when a value list is present.
    pub fn has_values(&self) -> bool {
        self.number_of_values > 0 && self.value_list_offset != NO_OFFSET
    }

    /// True when the key references a security key.
    pub fn has_security_key(&self) -> bool {
        self.security_key_offset != NO_OFFSET
    }

    /// True when the key carries a class name.
    pub fn has_class_name(&self) -> bool {
        self.class_name_offset != NO_OFFSET && self.class_name_size > 0
    }

    /// Last-written timestamp as a UTC datetime.
    pub fn timestamp_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        crate::utils::filetime_to_datetime(self.timestamp)
    }
}

/// Fully resolved, cache-resident view of a key.
///
/// Built from an `nk` cell plus its class name and security descriptor.
/// The child-descriptor and value-index lists materialize on first access;
/// the corruption bit is sticky and set by any localized resolution
/// failure within this key.
#[derive(Debug)]
pub struct KeyItem {
    pub(crate) node: NamedKey,
    pub(crate) hive_offset: u32,
    pub(crate) class_name: Option<String>,
    pub(crate) security_descriptor: Option<Vec<u8>>,
    pub(crate) sub_key_descriptors: OnceLock<Vec<SubKeyDescriptor>>,
    pub(crate) value_list: OnceLock<Vec<u32>>,
    pub(crate) corrupted: AtomicBool,
}

impl KeyItem {
    pub(crate) fn new(
        node: NamedKey,
        hive_offset: u32,
        class_name: Option<String>,
        security_descriptor: Option<Vec<u8>>,
        corrupted: bool,
    ) -> Self {
        Self {
            node,
            hive_offset,
            class_name,
            security_descriptor,
            sub_key_descriptors: OnceLock::new(),
            value_list: OnceLock::new(),
            corrupted: AtomicBool::new(corrupted),
        }
    }

    pub(crate) fn mark_corrupted(&self) {
        self.corrupted.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_corrupted(&self) -> bool {
        self.corrupted.load(Ordering::Relaxed)
    }
}
