//! Security-key (`sk`) cell decoding.
//!
//! Security keys form a doubly-linked list across the hive so that keys
//! with identical descriptors can share one cell. Read operations never
//! traverse the list; only the descriptor bytes are copied out, opaquely.

use crate::error::{RegfError, Result};
use crate::utils::{read_u16_le, read_u32_le};

/// Fixed `sk` fields before the descriptor bytes.
const SECURITY_KEY_MIN_SIZE: usize = 20;

/// Decoded `sk` cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityKey {
    /// Hive offset of the previous security key in the list; not traversed.
    pub previous_offset: u32,

    /// Hive offset of the next security key in the list; not traversed.
    pub next_offset: u32,

    /// Number of keys referencing this cell.
    pub reference_count: u32,

    /// Raw security descriptor in self-relative layout; not interpreted.
    pub descriptor: Vec<u8>,
}

impl SecurityKey {
    /// Decodes an `sk` cell payload.
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

        if data.len() < SECURITY_KEY_MIN_SIZE {
            return Err(RegfError::truncated(
                hive_offset,
                SECURITY_KEY_MIN_SIZE,
                data.len(),
            ));
        }

        if &data[0..2] != b"sk" {
            return Err(RegfError::invalid_signature(hive_offset, b"sk", &data[0..2]));
        }

        let _reserved = read_u16_le(data, 0x02)?;
        let previous_offset = read_u32_le(data, 0x04)?;
        let next_offset = read_u32_le(data, 0x08)?;
        let reference_count = read_u32_le(data, 0x0C)?;
        let descriptor_size = read_u32_le(data, 0x10)? as usize;

        if descriptor_size > data.len() - SECURITY_KEY_MIN_SIZE {
            return Err(RegfError::malformed(
                hive_offset,
                format!("security descriptor size {descriptor_size} exceeds the cell payload"),
            ));
        }

        Ok(SecurityKey {
            previous_offset,
            next_offset,
            reference_count,
            descriptor: data[SECURITY_KEY_MIN_SIZE..SECURITY_KEY_MIN_SIZE + descriptor_size]
                .to_vec(),
        })
    }
}
