//! Codepage selection for "compressed" (single-byte) key and value names.
//!
//! Keys and values whose name flag marks them as compressed store the name
//! in the hive's ASCII/OEM codepage instead of UTF-16LE. The codepage is a
//! per-file setting; [`Codepage::Windows1252`] is the default, matching what
//! Windows writes on western systems.

use crate::error::{RegfError, Result};
use encoding_rs::Encoding;
use std::fmt;

/// Legal codepages for compressed name decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codepage {
    /// Strict 7-bit ASCII; bytes above 0x7F decode to U+FFFD.
    Ascii,
    /// Windows-874 (Thai).
    Windows874,
    /// Codepage 932 (Japanese, Shift-JIS).
    Windows932,
    /// Codepage 936 (Simplified Chinese, GBK).
    Windows936,
    /// Codepage 949 (Korean, EUC-KR).
    Windows949,
    /// Codepage 950 (Traditional Chinese, Big5).
    Windows950,
    /// Windows-1250 (Central European).
    Windows1250,
    /// Windows-1251 (Cyrillic).
    Windows1251,
    /// Windows-1252 (Western European).
    Windows1252,
    /// Windows-1253 (Greek).
    Windows1253,
    /// Windows-1254 (Turkish).
    Windows1254,
    /// Windows-1255 (Hebrew).
    Windows1255,
    /// Windows-1256 (Arabic).
    Windows1256,
    /// Windows-1257 (Baltic).
    Windows1257,
    /// Windows-1258 (Vietnamese).
    Windows1258,
}

impl Codepage {
    /// Resolves a Windows codepage identifier. Identifiers outside the legal
    /// set are rejected.
    pub fn from_id(id: u16) -> Result<Self> {
        match id {
            20127 => Ok(Self::Ascii),
            874 => Ok(Self::Windows874),
            932 => Ok(Self::Windows932),
            936 => Ok(Self::Windows936),
            949 => Ok(Self::Windows949),
            950 => Ok(Self::Windows950),
            1250 => Ok(Self::Windows1250),
            1251 => Ok(Self::Windows1251),
            1252 => Ok(Self::Windows1252),
            1253 => Ok(Self::Windows1253),
            1254 => Ok(Self::Windows1254),
            1255 => Ok(Self::Windows1255),
            1256 => Ok(Self::Windows1256),
            1257 => Ok(Self::Windows1257),
            1258 => Ok(Self::Windows1258),
            other => Err(RegfError::malformed(
                0,
                format!("unsupported codepage identifier {other}"),
            )),
        }
    }

    /// Returns the Windows codepage identifier.
    pub fn id(self) -> u16 {
        match self {
            Self::Ascii => 20127,
            Self::Windows874 => 874,
            Self::Windows932 => 932,
            Self::Windows936 => 936,
            Self::Windows949 => 949,
            Self::Windows950 => 950,
            Self::Windows1250 => 1250,
            Self::Windows1251 => 1251,
            Self::Windows1252 => 1252,
            Self::Windows1253 => 1253,
            Self::Windows1254 => 1254,
            Self::Windows1255 => 1255,
            Self::Windows1256 => 1256,
            Self::Windows1257 => 1257,
            Self::Windows1258 => 1258,
        }
    }

    fn encoding(self) -> Option<&'static Encoding> {
        match self {
            Self::Ascii => None,
            Self::Windows874 => Some(encoding_rs::WINDOWS_874),
            Self::Windows932 => Some(encoding_rs::SHIFT_JIS),
            Self::Windows936 => Some(encoding_rs::GBK),
            Self::Windows949 => Some(encoding_rs::EUC_KR),
            Self::Windows950 => Some(encoding_rs::BIG5),
            Self::Windows1250 => Some(encoding_rs::WINDOWS_1250),
            Self::Windows1251 => Some(encoding_rs::WINDOWS_1251),
            Self::Windows1252 => Some(encoding_rs::WINDOWS_1252),
            Self::Windows1253 => Some(encoding_rs::WINDOWS_1253),
            Self::Windows1254 => Some(encoding_rs::WINDOWS_1254),
            Self::Windows1255 => Some(encoding_rs::WINDOWS_1255),
            Self::Windows1256 => Some(encoding_rs::WINDOWS_1256),
            Self::Windows1257 => Some(encoding_rs::WINDOWS_1257),
            Self::Windows1258 => Some(encoding_rs::WINDOWS_1258),
        }
    }

    /// Decodes a compressed name buffer, trimming trailing NULs. Undecodable
    /// bytes become U+FFFD rather than failing the read.
    pub fn decode(self, data: &[u8]) -> String {
        let decoded = match self.encoding() {
            Some(encoding) => {
                let (decoded, _, _) = encoding.decode(data);
                decoded.into_owned()
            }
            None => data
                .iter()
                .map(|&b| if b < 0x80 { b as char } else { '\u{FFFD}' })
                .collect(),
        };
        decoded.trim_end_matches('\0').to_string()
    }
}

impl Default for Codepage {
    fn default() -> Self {
        Self::Windows1252
    }
}

impl fmt::Display for Codepage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascii => write!(f, "ascii"),
            other => write!(f, "windows-{}", other.id()),
        }
    }
}

/// Decodes a UTF-16LE buffer, trimming trailing NULs.
///
/// Unlike compressed names, UTF-16LE decoding is strict: an odd byte count
/// or an unpaired surrogate is a malformed structure.
pub fn decode_utf16_le(data: &[u8], hive_offset: u32) -> Result<String> {
    if data.is_empty() {
        return Ok(String::new());
    }
    if data.len() % 2 != 0 {
        return Err(RegfError::malformed(
            hive_offset,
            "UTF-16LE buffer has odd byte count",
        ));
    }

    let (decoded, _, had_errors) = encoding_rs::UTF_16LE.decode(data);
    if had_errors {
        return Err(RegfError::malformed(hive_offset, "invalid UTF-16LE data"));
    }

    Ok(decoded.trim_end_matches('\0').to_string())
}
