//! # Windows NT Registry Hive Reader
//!
//! A read-only parser for the REGF on-disk format: the container Windows
//! uses to persist registry hives (SYSTEM, SOFTWARE, SAM, NTUSER.DAT, …).
//! The crate gives random access to the key/value tree without loading the
//! whole tree into memory.
//!
//! ## Architecture
//!
//! The reader is layered bottom-up:
//!
//! 1. **Byte source**: exact-length random reads over a file, a memory
//!    mapping, or an owned buffer.
//! 2. **File header**: the 4096-byte base block with signature, XOR-32
//!    checksum, format version, and the root-key offset.
//! 3. **Hive-bins index**: an ordered index of the 4KB-aligned bins,
//!    resolving hive-relative cell offsets through an LRU bin cache.
//! 4. **Cell decoders**: named keys (`nk`), value keys (`vk`), security
//!    keys (`sk`), sub-key lists (`lf`/`lh`/`li`/`ri`), and big data
//!    (`db`).
//! 5. **Facade**: lazy key-tree traversal, path lookup, and bounded
//!    caches of decoded keys and values.
//!
//! ## Binary layout
//!
//! ```text
//! [File header - 4096 bytes]
//!   - Signature: "regf"
//!   - Sequence numbers, version, root key offset
//!   - XOR-32 checksum over the first 508 bytes
//!
//! [Hive bins - 4096-byte multiples, contiguous]
//!   [Bin header - 32 bytes, signature "hbin"]
//!   [Cells - 8-byte aligned, tightly packed]
//!     [i32 size: negative = allocated]
//!     [payload: nk | vk | sk | lf | lh | li | ri | db | raw data]
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use regf_reader::Hive;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hive = Hive::open_file("SYSTEM")?;
//!
//! let root = hive.root_key()?;
//! println!("root: {}", root.name());
//!
//! if let Some(select) = hive.key_by_path("Select")? {
//!     if let Some(current) = select.value_by_name("Current")? {
//!         println!("Current = {:?}", current.typed_data()?);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Corruption handling
//!
//! Real-world hives are frequently damaged. Failures below the file
//! header are localized: the enclosing key is marked corrupted (see
//! [`hive::Key::is_corrupted`] and [`Hive::is_corrupted`]), the affected
//! attribute reads back empty, and enumeration of everything else
//! continues. Only I/O errors and aborts propagate unconditionally.
//!
//! Out of scope: writing or repairing hives, transaction-log replay
//! (`.LOG1`/`.LOG2`), and interpretation of security descriptors beyond
//! surfacing their raw bytes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bigdata;
pub mod bins;
pub mod cache;
pub mod codepage;
pub mod error;
pub mod hbin;
pub mod header;
pub mod hive;
pub mod key;
pub mod security;
pub mod source;
pub mod subkey_list;
pub mod utils;
pub mod value;

// Re-export main types for convenience
pub use bigdata::{BigDataHeader, BIG_DATA_SEGMENT_SIZE};
pub use bins::HiveBins;
pub use codepage::Codepage;
pub use error::{RegfError, Result};
pub use hbin::{Cell, HbinHeader};
pub use header::FileHeader;
pub use hive::{Hive, HiveOptions, Key, Value};
pub use key::{KeyFlags, NamedKey};
pub use security::SecurityKey;
pub use source::{ByteSource, FileSource, MmapSource, VecSource};
pub use subkey_list::{name_hash, SubKeyDescriptor, SubKeyList};
pub use value::{DataStream, ValueData, ValueKey, ValueType};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
