//! Sub-key list (`lf`/`lh`/`li`/`ri`) decoding and the name hash.
//!
//! A key's sub-keys are indexed by one of four on-disk list variants. The
//! three leaf variants point directly at named-key cells; the interior
//! `ri` variant points at further lists. Flattening `ri` trees into a
//! single descriptor list happens in the facade, which also enforces the
//! recursion bound.

use crate::error::{RegfError, Result};
use crate::utils::{read_u16_le, read_u32_le};

/// Maximum nesting depth when flattening `ri` trees.
pub const MAX_LIST_DEPTH: u32 = 256;

/// One entry of a flattened sub-key index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubKeyDescriptor {
    /// Hive offset of the child's `nk` cell.
    pub key_offset: u32,

    /// The child's name hash, present for hash-leaf entries only. Fast-leaf
    /// name prefixes are not comparable to computed hashes and are dropped.
    pub name_hash: Option<u32>,
}

/// Decoded sub-key list cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubKeyList {
    /// `lf`: leaf entries carrying a 4-character name prefix.
    FastLeaf(Vec<SubKeyDescriptor>),

    /// `lh`: leaf entries carrying a computed name hash.
    HashLeaf(Vec<SubKeyDescriptor>),

    /// `li`: leaf entries with offsets only.
    IndexLeaf(Vec<SubKeyDescriptor>),

    /// `ri`: interior node; entries are offsets of further lists.
    IndexRoot(Vec<u32>),
}

impl SubKeyList {
    /// Decodes a sub-key list cell payload.
    ///
    /// `has_preamble` selects the 1.0/1.1 layout, where a reserved u32
    /// precedes the 2-byte signature.
    pub fn parse(data: &[u8], hive_offset: u32, has_preamble: bool) -> Result<Self> {
        let data = if has_preamble {
            if data.len() < 4 {
                return Err(RegfError::truncated(hive_offset, 4, data.len()));
            }
            &data[4..]
        } else {
            data
        };

        if data.len() < 4 {
            return Err(RegfError::truncated(hive_offset, 4, data.len()));
        }

        let signature = &data[0..2];
        let count = read_u16_le(data, 0x02)? as usize;

        match signature {
            b"lf" | b"lh" => {
                let needed = 4 + count * 8;
                if data.len() < needed {
                    return Err(RegfError::truncated(hive_offset, needed, data.len()));
                }
                let hashed = signature == b"lh";
                let mut entries = Vec::with_capacity(count);
                for i in 0..count {
                    let pos = 4 + i * 8;
                    let key_offset = read_u32_le(data, pos)?;
                    let hash = read_u32_le(data, pos + 4)?;
                    entries.push(SubKeyDescriptor {
                        key_offset,
                        name_hash: hashed.then_some(hash),
                    });
                }
                if hashed {
                    Ok(SubKeyList::HashLeaf(entries))
                } else {
                    Ok(SubKeyList::FastLeaf(entries))
                }
            }

            b"li" => {
                let needed = 4 + count * 4;
                if data.len() < needed {
                    return Err(RegfError::truncated(hive_offset, needed, data.len()));
                }
                let mut entries = Vec::with_capacity(count);
                for i in 0..count {
                    entries.push(SubKeyDescriptor {
                        key_offset: read_u32_le(data, 4 + i * 4)?,
                        name_hash: None,
                    });
                }
                Ok(SubKeyList::IndexLeaf(entries))
            }

            b"ri" => {
                let needed = 4 + count * 4;
                if data.len() < needed {
                    return Err(RegfError::truncated(hive_offset, needed, data.len()));
                }
                let mut offsets = Vec::with_capacity(count);
                for i in 0..count {
                    offsets.push(read_u32_le(data, 4 + i * 4)?);
                }
                Ok(SubKeyList::IndexRoot(offsets))
            }

            other => Err(RegfError::invalid_signature(hive_offset, b"lf", other)),
        }
    }

    /// True for the leaf variants, whose entries reference named keys.
    pub fn at_leaf_level(&self) -> bool {
        !matches!(self, SubKeyList::IndexRoot(_))
    }

    /// Number of entries in this list.
    pub fn len(&self) -> usize {
        match self {
            SubKeyList::FastLeaf(entries)
            | SubKeyList::HashLeaf(entries)
            | SubKeyList::IndexLeaf(entries) => entries.len(),
            SubKeyList::IndexRoot(offsets) => offsets.len(),
        }
    }

    /// True when the list holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Computes the 31-bit name hash stored in hash-leaf entries.
///
/// The accumulator starts at zero; each code point of the name, uppercased
/// by the ASCII-only rule (a-z map to A-Z, everything else unchanged), is
/// folded in as `acc * 37 + code_point` modulo 2^32.
pub fn name_hash(name: &str) -> u32 {
    name.chars().fold(0u32, |acc, c| {
        let c = c.to_ascii_uppercase();
        acc.wrapping_mul(37).wrapping_add(c as u32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn list_payload(signature: &[u8; 2], entries: &[(u32, u32)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(signature);
        data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for &(offset, hash) in entries {
            data.extend_from_slice(&offset.to_le_bytes());
            if signature == b"lf" || signature == b"lh" {
                data.extend_from_slice(&hash.to_le_bytes());
            }
        }
        data
    }

    #[test]
    fn test_hash_leaf_entries_keep_hash() {
        let data = list_payload(b"lh", &[(0x100, 0xAAAA), (0x200, 0xBBBB)]);
        let list = SubKeyList::parse(&data, 0, false).unwrap();
        assert!(list.at_leaf_level());
        match list {
            SubKeyList::HashLeaf(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].key_offset, 0x100);
                assert_eq!(entries[0].name_hash, Some(0xAAAA));
            }
            other => panic!("expected hash leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_fast_leaf_drops_prefix() {
        let data = list_payload(b"lf", &[(0x100, u32::from_le_bytes(*b"Foo\0"))]);
        let list = SubKeyList::parse(&data, 0, false).unwrap();
        match list {
            SubKeyList::FastLeaf(entries) => assert_eq!(entries[0].name_hash, None),
            other => panic!("expected fast leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_index_leaf() {
        let data = list_payload(b"li", &[(0x100, 0), (0x200, 0), (0x300, 0)]);
        let list = SubKeyList::parse(&data, 0, false).unwrap();
        assert!(list.at_leaf_level());
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_index_root_is_interior() {
        let data = list_payload(b"ri", &[(0x100, 0), (0x200, 0)]);
        let list = SubKeyList::parse(&data, 0, false).unwrap();
        assert!(!list.at_leaf_level());
        assert_eq!(list, SubKeyList::IndexRoot(vec![0x100, 0x200]));
    }

    #[test]
    fn test_version_preamble_is_skipped() {
        let mut data = vec![0xEE, 0xEE, 0xEE, 0xEE];
        data.extend_from_slice(&list_payload(b"li", &[(0x100, 0)]));
        let list = SubKeyList::parse(&data, 0, true).unwrap();
        assert_eq!(list.len(), 1);

        // Without the preamble flag the reserved bytes are a bad signature.
        assert!(SubKeyList::parse(&data, 0, false).is_err());
    }

    #[test]
    fn test_count_overrunning_cell() {
        let mut data = list_payload(b"lh", &[(0x100, 0xAAAA)]);
        data[2..4].copy_from_slice(&9u16.to_le_bytes());
        assert!(matches!(
            SubKeyList::parse(&data, 0x40, false),
            Err(RegfError::Malformed { .. })
        ));
    }

    #[test]
    fn test_unknown_signature() {
        let data = list_payload(b"zz", &[]);
        assert!(matches!(
            SubKeyList::parse(&data, 0, false),
            Err(RegfError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_name_hash_reference_values() {
        // acc = 'F'; acc = 'F'*37 + 'O'; acc = that*37 + 'O'
        let expected = ((u32::from(b'F') * 37 + u32::from(b'O')) * 37) + u32::from(b'O');
        assert_eq!(name_hash("Foo"), expected);
        assert_eq!(name_hash(""), 0);
    }

    #[test]
    fn test_name_hash_is_ascii_case_insensitive() {
        assert_eq!(name_hash("foo"), name_hash("FOO"));
        assert_eq!(name_hash("ControlSet001"), name_hash("controlset001"));
        // Non-ASCII characters are not uppercased.
        assert_ne!(name_hash("ä"), name_hash("Ä"));
    }
}
