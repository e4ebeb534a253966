//! Value-key (`vk`) cell decoding, the logical data stream, and typed
//! value data.

use crate::bigdata::{segment_spans, SegmentSpan};
use crate::codepage::{decode_utf16_le, Codepage};
use crate::error::{RegfError, Result};
use crate::hive::Hive;
use crate::utils::{read_u16_le, read_u32_le};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Fixed `vk` fields before the name bytes.
const VALUE_KEY_MIN_SIZE: usize = 0x14;

/// Name flag: the value name is stored in the hive codepage.
pub const VALUE_COMP_NAME: u16 = 0x0001;

/// Registry value data types.
///
/// Types are carried through opaquely: unknown identifiers decode to
/// [`ValueType::Unknown`] rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// REG_NONE.
    None,
    /// REG_SZ.
    String,
    /// REG_EXPAND_SZ.
    ExpandString,
    /// REG_BINARY.
    Binary,
    /// REG_DWORD.
    Dword,
    /// REG_DWORD_BIG_ENDIAN.
    DwordBigEndian,
    /// REG_LINK.
    Link,
    /// REG_MULTI_SZ.
    MultiString,
    /// REG_RESOURCE_LIST.
    ResourceList,
    /// REG_FULL_RESOURCE_DESCRIPTOR.
    FullResourceDescriptor,
    /// REG_RESOURCE_REQUIREMENTS_LIST.
    ResourceRequirementsList,
    /// REG_QWORD.
    Qword,
    /// Any other type identifier, passed through unchanged.
    Unknown(u32),
}

impl ValueType {
    /// Maps a stored type identifier to a value type.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => ValueType::None,
            1 => ValueType::String,
            2 => ValueType::ExpandString,
            3 => ValueType::Binary,
            4 => ValueType::Dword,
            5 => ValueType::DwordBigEndian,
            6 => ValueType::Link,
            7 => ValueType::MultiString,
            8 => ValueType::ResourceList,
            9 => ValueType::FullResourceDescriptor,
            10 => ValueType::ResourceRequirementsList,
            11 => ValueType::Qword,
            other => ValueType::Unknown(other),
        }
    }

    /// The stored type identifier.
    pub fn as_u32(self) -> u32 {
        match self {
            ValueType::None => 0,
            ValueType::String => 1,
            ValueType::ExpandString => 2,
            ValueType::Binary => 3,
            ValueType::Dword => 4,
            ValueType::DwordBigEndian => 5,
            ValueType::Link => 6,
            ValueType::MultiString => 7,
            ValueType::ResourceList => 8,
            ValueType::FullResourceDescriptor => 9,
            ValueType::ResourceRequirementsList => 10,
            ValueType::Qword => 11,
            ValueType::Unknown(other) => other,
        }
    }

    /// Windows name of this value type.
    pub fn name(&self) -> String {
        match self {
            ValueType::None => "REG_NONE".to_string(),
            ValueType::String => "REG_SZ".to_string(),
            ValueType::ExpandString => "REG_EXPAND_SZ".to_string(),
            ValueType::Binary => "REG_BINARY".to_string(),
            ValueType::Dword => "REG_DWORD".to_string(),
            ValueType::DwordBigEndian => "REG_DWORD_BIG_ENDIAN".to_string(),
            ValueType::Link => "REG_LINK".to_string(),
            ValueType::MultiString => "REG_MULTI_SZ".to_string(),
            ValueType::ResourceList => "REG_RESOURCE_LIST".to_string(),
            ValueType::FullResourceDescriptor => "REG_FULL_RESOURCE_DESCRIPTOR".to_string(),
            ValueType::ResourceRequirementsList => "REG_RESOURCE_REQUIREMENTS_LIST".to_string(),
            ValueType::Qword => "REG_QWORD".to_string(),
            ValueType::Unknown(value) => format!("REG_UNKNOWN_{value:#010x}"),
        }
    }
}

/// Decoded `vk` cell.
#[derive(Debug, Clone)]
pub struct ValueKey {
    /// Hive offset of this cell.
    pub hive_offset: u32,

    /// Value name; empty for the key's default value.
    pub name: String,

    /// Value data type.
    pub value_type: ValueType,

    /// Logical data size, inline bit masked off.
    pub data_size: u32,

    /// Hive offset of the data cell, or the inline data bytes themselves.
    pub data_offset: u32,

    /// True when the data lives inside the data-offset field.
    pub inline: bool,

    /// Name and storage flag bits.
    pub flags: u16,
}

impl ValueKey {
    /// Decodes a `vk` cell payload.
    pub fn parse(data: &[u8], hive_offset: u32, codepage: Codepage) -> Result<Self> {
        if data.len() < VALUE_KEY_MIN_SIZE {
            return Err(RegfError::truncated(
                hive_offset,
                VALUE_KEY_MIN_SIZE,
                data.len(),
            ));
        }

        if &data[0..2] != b"vk" {
            return Err(RegfError::invalid_signature(hive_offset, b"vk", &data[0..2]));
        }

        let name_size = read_u16_le(data, 0x02)? as usize;
        let raw_data_size = read_u32_le(data, 0x04)?;
        let data_offset = read_u32_le(data, 0x08)?;
        let value_type = ValueType::from_u32(read_u32_le(data, 0x0C)?);
        let flags = read_u16_le(data, 0x10)?;

        let inline = (raw_data_size & 0x8000_0000) != 0;
        let data_size = raw_data_size & 0x7FFF_FFFF;

        if name_size > data.len() - VALUE_KEY_MIN_SIZE {
            return Err(RegfError::malformed(
                hive_offset,
                format!("value name length {name_size} exceeds the cell payload"),
            ));
        }

        let name_data = &data[VALUE_KEY_MIN_SIZE..VALUE_KEY_MIN_SIZE + name_size];
        let name = if name_size == 0 {
            // The unnamed "default" value.
            String::new()
        } else if (flags & VALUE_COMP_NAME) != 0 {
            codepage.decode(name_data)
        } else {
            decode_utf16_le(name_data, hive_offset)?
        };

        Ok(ValueKey {
            hive_offset,
            name,
            value_type,
            data_size,
            data_offset,
            inline,
            flags,
        })
    }

    /// True for the key's unnamed "default" value.
    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }

    /// The inline data bytes: the data-offset field's little-endian
    /// encoding, truncated to the declared size (at most 4 bytes).
    pub fn inline_data(&self) -> Vec<u8> {
        let bytes = self.data_offset.to_le_bytes();
        let len = (self.data_size as usize).min(4);
        bytes[..len].to_vec()
    }
}

/// Where a value's bytes physically live.
#[derive(Debug, Clone)]
pub(crate) enum DataLocation {
    /// No data.
    Empty,

    /// Up to 4 bytes stored in the `vk` cell itself.
    Inline { bytes: [u8; 4], len: u8 },

    /// One raw-data cell, truncated to the logical size.
    Cell { offset: u32, len: u32 },

    /// Segmented big data.
    Big { segments: Vec<u32>, len: u32 },
}

/// Logical, possibly segmented view of a value's bytes.
///
/// The stream borrows the hive: segment and cell fetches go through the
/// hive-bins index and benefit from bin caching.
pub struct DataStream<'h> {
    hive: &'h Hive,
    location: DataLocation,
}

impl<'h> DataStream<'h> {
    pub(crate) fn new(hive: &'h Hive, location: DataLocation) -> Self {
        Self { hive, location }
    }

    /// Logical size of the stream in bytes.
    pub fn size(&self) -> u64 {
        match &self.location {
            DataLocation::Empty => 0,
            DataLocation::Inline { len, .. } => u64::from(*len),
            DataLocation::Cell { len, .. } => u64::from(*len),
            DataLocation::Big { len, .. } => u64::from(*len),
        }
    }

    /// Reads up to `len` bytes starting at the logical offset. Reads past
    /// the end of the stream return short.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        match &self.location {
            DataLocation::Empty => Ok(Vec::new()),

            DataLocation::Inline { bytes, len: total } => {
                let total = usize::from(*total);
                let start = (offset as usize).min(total);
                let end = start.saturating_add(len).min(total);
                Ok(bytes[start..end].to_vec())
            }

            DataLocation::Cell {
                offset: cell_offset,
                len: total,
            } => {
                let cell = self.hive.cell_at(*cell_offset)?;
                let data = cell.data();
                if data.len() < *total as usize {
                    return Err(RegfError::malformed(
                        *cell_offset,
                        format!(
                            "data cell holds {} bytes but the value declares {total}",
                            data.len()
                        ),
                    ));
                }
                let data = &data[..*total as usize];
                let start = (offset as usize).min(data.len());
                let end = start.saturating_add(len).min(data.len());
                Ok(data[start..end].to_vec())
            }

            DataLocation::Big { segments, len: total } => {
                let spans = segment_spans(*total, segments.len(), offset, len);
                let mut out = Vec::with_capacity(spans.iter().map(|s| s.len).sum());
                for span in spans {
                    self.hive.check_abort()?;
                    out.extend_from_slice(&self.read_segment_span(segments, *total, span)?);
                }
                Ok(out)
            }
        }
    }

    /// Reads the whole stream.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let size = self.size();
        self.read_at(0, size as usize)
    }

    fn read_segment_span(
        &self,
        segments: &[u32],
        data_size: u32,
        span: SegmentSpan,
    ) -> Result<Vec<u8>> {
        let segment_offset = segments[span.segment];
        let cell = self.hive.cell_at(segment_offset)?;
        let payload = cell.data();
        let segment_len =
            SegmentSpan::segment_len(span.segment, segments.len(), data_size) as usize;
        if payload.len() < segment_len {
            return Err(RegfError::malformed(
                segment_offset,
                format!(
                    "big-data segment holds {} bytes, expected {segment_len}",
                    payload.len()
                ),
            ));
        }
        Ok(payload[span.start..span.start + span.len].to_vec())
    }
}

/// A value's bytes decoded according to its declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueData {
    /// No data.
    None,
    /// REG_SZ / REG_LINK.
    String(String),
    /// REG_EXPAND_SZ, environment references unexpanded.
    ExpandString(String),
    /// REG_BINARY.
    Binary(Vec<u8>),
    /// REG_DWORD.
    Dword(u32),
    /// REG_DWORD_BIG_ENDIAN.
    DwordBigEndian(u32),
    /// REG_MULTI_SZ.
    MultiString(Vec<String>),
    /// REG_QWORD.
    Qword(u64),
    /// Unknown or resource types, raw.
    Unknown(Vec<u8>),
}

impl ValueData {
    /// Decodes raw value bytes according to the declared type.
    pub fn parse(data: &[u8], value_type: ValueType, hive_offset: u32) -> Result<Self> {
        if data.is_empty() {
            return Ok(ValueData::None);
        }

        match value_type {
            ValueType::None => Ok(ValueData::None),

            ValueType::String | ValueType::Link => {
                Ok(ValueData::String(decode_utf16_le(data, hive_offset)?))
            }

            ValueType::ExpandString => {
                Ok(ValueData::ExpandString(decode_utf16_le(data, hive_offset)?))
            }

            ValueType::Binary => Ok(ValueData::Binary(data.to_vec())),

            ValueType::Dword => {
                if data.len() < 4 {
                    return Err(RegfError::truncated(hive_offset, 4, data.len()));
                }
                let mut cursor = Cursor::new(data);
                Ok(ValueData::Dword(cursor.read_u32::<LittleEndian>()?))
            }

            ValueType::DwordBigEndian => {
                if data.len() < 4 {
                    return Err(RegfError::truncated(hive_offset, 4, data.len()));
                }
                let mut cursor = Cursor::new(data);
                Ok(ValueData::DwordBigEndian(cursor.read_u32::<BigEndian>()?))
            }

            ValueType::Qword => {
                if data.len() < 8 {
                    return Err(RegfError::truncated(hive_offset, 8, data.len()));
                }
                let mut cursor = Cursor::new(data);
                Ok(ValueData::Qword(cursor.read_u64::<LittleEndian>()?))
            }

            ValueType::MultiString => {
                let joined = decode_utf16_le(data, hive_offset)?;
                let strings = joined
                    .split('\0')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                Ok(ValueData::MultiString(strings))
            }

            _ => Ok(ValueData::Unknown(data.to_vec())),
        }
    }
}
