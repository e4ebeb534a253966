//! Error types for hive read operations.
//!
//! All fallible operations in this crate return [`RegfError`] through the
//! [`Result`] alias. The set of error kinds is closed: structural problems
//! inside the key tree are localized to the enclosing key (see
//! [`crate::hive::Key::is_corrupted`]) and only I/O failures and aborts
//! propagate unconditionally.

use std::io;
use thiserror::Error;

/// Result type alias for hive read operations.
pub type Result<T> = std::result::Result<T, RegfError>;

/// Errors that can occur while reading a REGF hive.
#[derive(Error, Debug)]
pub enum RegfError {
    /// The byte source failed or returned short.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A structure carries the wrong magic signature.
    #[error("invalid signature at hive offset {offset:#x}: expected {expected:?}, found {found:?}")]
    InvalidSignature {
        offset: u32,
        expected: Vec<u8>,
        found: Vec<u8>,
    },

    /// The file-header XOR-32 does not match the stored value.
    #[error("header checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    /// A hive offset falls outside every known hive bin.
    #[error("hive offset {offset:#x} is outside every hive bin")]
    OffsetOutOfRange { offset: u32 },

    /// A hive offset lands inside a bin but does not start a cell.
    #[error("hive offset {offset:#x} does not start a cell")]
    UnalignedOffset { offset: u32 },

    /// A structural field violates a format invariant.
    #[error("malformed structure at hive offset {offset:#x}: {reason}")]
    Malformed { offset: u32, reason: String },

    /// Sub-key list recursion exceeded the nesting bound.
    #[error("sub-key list at hive offset {offset:#x} nests deeper than {max_depth} levels")]
    TreeTooDeep { offset: u32, max_depth: u32 },

    /// Major/minor format version outside the supported set.
    #[error("unsupported format version {major}.{minor}")]
    UnsupportedVersion { major: u32, minor: u32 },

    /// An abort was signalled while the operation was in progress.
    #[error("operation aborted")]
    OperationAborted,
}

impl RegfError {
    /// Creates an invalid signature error with context.
    pub fn invalid_signature(offset: u32, expected: &[u8], found: &[u8]) -> Self {
        Self::InvalidSignature {
            offset,
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }

    /// Creates a malformed-structure error with a short reason.
    pub fn malformed(offset: u32, reason: impl Into<String>) -> Self {
        Self::Malformed {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a truncation error for a field read past the end of a buffer.
    pub fn truncated(offset: u32, expected: usize, actual: usize) -> Self {
        Self::Malformed {
            offset,
            reason: format!("truncated: expected {expected} bytes, got {actual}"),
        }
    }

    /// Creates an I/O error for a short read from the byte source.
    pub fn short_read(offset: u64, expected: usize, actual: usize) -> Self {
        Self::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("short read at file offset {offset:#x}: wanted {expected} bytes, got {actual}"),
        ))
    }

    /// Returns true for errors that always bubble up instead of being
    /// localized to the enclosing key.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::OperationAborted)
    }
}
