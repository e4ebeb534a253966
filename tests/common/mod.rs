//! Synthetic hive images for the integration tests.
//!
//! Real hives are large and carry license baggage, so the tests build
//! minimal REGF images in memory: a valid file header, one or more bins,
//! and hand-placed cells.

#![allow(dead_code)]

/// Sentinel hive offset meaning "no cell".
pub const NO_OFFSET: u32 = 0xFFFF_FFFF;

/// Key flag: name is stored in the hive codepage.
pub const KEY_COMP_NAME: u16 = 0x0020;

/// Key flag: root key.
pub const KEY_ROOT: u16 = 0x0004;

/// Value flag: name is stored in the hive codepage.
pub const VALUE_COMP_NAME: u16 = 0x0001;

/// Incrementally builds a REGF image.
pub struct HiveBuilder {
    finished: Vec<u8>,
    current: Vec<u8>,
    completed_size: u32,
    root_offset: u32,
    minor_version: u32,
    secondary_sequence: u32,
}

impl HiveBuilder {
    pub fn new() -> Self {
        Self {
            finished: Vec::new(),
            current: Vec::new(),
            completed_size: 0,
            root_offset: 32,
            minor_version: 5,
            secondary_sequence: 1,
        }
    }

    /// Uses a legacy minor version (0 or 1) so cells carry the 4-byte
    /// preamble.
    pub fn with_minor_version(mut self, minor: u32) -> Self {
        self.minor_version = minor;
        self
    }

    /// Makes the primary and secondary sequence numbers disagree.
    pub fn dirty(mut self) -> Self {
        self.secondary_sequence = 2;
        self
    }

    /// Hive offset the next added cell will land at.
    pub fn next_offset(&self) -> u32 {
        self.completed_size + 32 + self.current.len() as u32
    }

    /// Adds an allocated cell holding `payload`, 8-byte padded. Returns
    /// the cell's hive offset.
    pub fn add_cell(&mut self, payload: &[u8]) -> u32 {
        let offset = self.next_offset();
        let total = 4 + payload.len();
        let padded = (total + 7) & !7;
        self.current
            .extend_from_slice(&(-(padded as i32)).to_le_bytes());
        self.current.extend_from_slice(payload);
        self.current.extend(std::iter::repeat(0).take(padded - total));
        offset
    }

    /// Closes the bin under construction, rounding it up to a 4096-byte
    /// multiple with a trailing free cell.
    pub fn finish_bin(&mut self) {
        let used = 32 + self.current.len();
        let bin_size = (used + 4095) & !4095;

        let mut bin = vec![0u8; 32];
        bin[0..4].copy_from_slice(b"hbin");
        bin[0x04..0x08].copy_from_slice(&self.completed_size.to_le_bytes());
        bin[0x08..0x0C].copy_from_slice(&(bin_size as u32).to_le_bytes());
        bin.extend_from_slice(&self.current);

        let free = bin_size - used;
        if free > 0 {
            let at = bin.len();
            bin.extend(std::iter::repeat(0).take(free));
            bin[at..at + 4].copy_from_slice(&(free as i32).to_le_bytes());
        }

        self.finished.extend_from_slice(&bin);
        self.completed_size += bin_size as u32;
        self.current.clear();
    }

    pub fn set_root(&mut self, offset: u32) {
        self.root_offset = offset;
    }

    /// Produces the complete image: header plus all bins.
    pub fn build(mut self) -> Vec<u8> {
        if !self.current.is_empty() || self.finished.is_empty() {
            self.finish_bin();
        }

        let mut image = vec![0u8; 4096];
        image[0..4].copy_from_slice(b"regf");
        image[0x04..0x08].copy_from_slice(&1u32.to_le_bytes());
        image[0x08..0x0C].copy_from_slice(&self.secondary_sequence.to_le_bytes());
        image[0x14..0x18].copy_from_slice(&1u32.to_le_bytes());
        image[0x18..0x1C].copy_from_slice(&self.minor_version.to_le_bytes());
        image[0x24..0x28].copy_from_slice(&self.root_offset.to_le_bytes());
        image[0x28..0x2C].copy_from_slice(&self.completed_size.to_le_bytes());

        let mut checksum = 0u32;
        for word in image[..0x1FC].chunks_exact(4) {
            checksum ^= u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        }
        image[0x1FC..0x200].copy_from_slice(&checksum.to_le_bytes());

        image.extend_from_slice(&self.finished);
        image
    }
}

impl Default for HiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `nk` cell payload specification.
pub struct NkCell<'a> {
    pub flags: u16,
    pub parent: u32,
    pub n_subkeys: u32,
    pub subkey_list: u32,
    pub n_values: u32,
    pub value_list: u32,
    pub security_key: u32,
    pub class_offset: u32,
    pub class_size: u16,
    pub name: &'a [u8],
}

impl Default for NkCell<'_> {
    fn default() -> Self {
        Self {
            flags: KEY_COMP_NAME,
            parent: 0,
            n_subkeys: 0,
            subkey_list: NO_OFFSET,
            n_values: 0,
            value_list: NO_OFFSET,
            security_key: NO_OFFSET,
            class_offset: NO_OFFSET,
            class_size: 0,
            name: b"",
        }
    }
}

impl NkCell<'_> {
    pub fn bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8; 0x4C];
        data[0..2].copy_from_slice(b"nk");
        data[0x02..0x04].copy_from_slice(&self.flags.to_le_bytes());
        // Arbitrary fixed FILETIME so timestamps are non-zero.
        data[0x04..0x0C].copy_from_slice(&132_537_600_000_000_000u64.to_le_bytes());
        data[0x10..0x14].copy_from_slice(&self.parent.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&self.n_subkeys.to_le_bytes());
        data[0x1C..0x20].copy_from_slice(&self.subkey_list.to_le_bytes());
        data[0x20..0x24].copy_from_slice(&NO_OFFSET.to_le_bytes());
        data[0x24..0x28].copy_from_slice(&self.n_values.to_le_bytes());
        data[0x28..0x2C].copy_from_slice(&self.value_list.to_le_bytes());
        data[0x2C..0x30].copy_from_slice(&self.security_key.to_le_bytes());
        data[0x30..0x34].copy_from_slice(&self.class_offset.to_le_bytes());
        data[0x48..0x4A].copy_from_slice(&(self.name.len() as u16).to_le_bytes());
        data[0x4A..0x4C].copy_from_slice(&self.class_size.to_le_bytes());
        data.extend_from_slice(self.name);
        data
    }
}

/// `vk` cell payload specification.
pub struct VkCell<'a> {
    pub name: &'a [u8],
    pub raw_data_size: u32,
    pub data_offset: u32,
    pub value_type: u32,
    pub flags: u16,
}

impl Default for VkCell<'_> {
    fn default() -> Self {
        Self {
            name: b"",
            raw_data_size: 0,
            data_offset: 0,
            value_type: 0,
            flags: VALUE_COMP_NAME,
        }
    }
}

impl VkCell<'_> {
    pub fn bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8; 0x14];
        data[0..2].copy_from_slice(b"vk");
        data[0x02..0x04].copy_from_slice(&(self.name.len() as u16).to_le_bytes());
        data[0x04..0x08].copy_from_slice(&self.raw_data_size.to_le_bytes());
        data[0x08..0x0C].copy_from_slice(&self.data_offset.to_le_bytes());
        data[0x0C..0x10].copy_from_slice(&self.value_type.to_le_bytes());
        data[0x10..0x12].copy_from_slice(&self.flags.to_le_bytes());
        data.extend_from_slice(self.name);
        data
    }
}

/// `lh` list payload with explicit hashes.
pub fn lh_list(entries: &[(u32, u32)]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"lh");
    data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for &(offset, hash) in entries {
        data.extend_from_slice(&offset.to_le_bytes());
        data.extend_from_slice(&hash.to_le_bytes());
    }
    data
}

/// `lf` list payload with 4-byte name prefixes.
pub fn lf_list(entries: &[(u32, [u8; 4])]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"lf");
    data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for &(offset, prefix) in entries {
        data.extend_from_slice(&offset.to_le_bytes());
        data.extend_from_slice(&prefix);
    }
    data
}

/// `li` list payload.
pub fn li_list(offsets: &[u32]) -> Vec<u8> {
    plain_list(b"li", offsets)
}

/// `ri` list payload.
pub fn ri_list(offsets: &[u32]) -> Vec<u8> {
    plain_list(b"ri", offsets)
}

fn plain_list(signature: &[u8; 2], offsets: &[u32]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(signature);
    data.extend_from_slice(&(offsets.len() as u16).to_le_bytes());
    for &offset in offsets {
        data.extend_from_slice(&offset.to_le_bytes());
    }
    data
}

/// `sk` cell payload.
pub fn sk_cell(descriptor: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 20];
    data[0..2].copy_from_slice(b"sk");
    data[0x0C..0x10].copy_from_slice(&1u32.to_le_bytes());
    data[0x10..0x14].copy_from_slice(&(descriptor.len() as u32).to_le_bytes());
    data.extend_from_slice(descriptor);
    data
}

/// `db` cell payload.
pub fn db_cell(segment_count: u16, segment_list_offset: u32) -> Vec<u8> {
    let mut data = vec![0u8; 8];
    data[0..2].copy_from_slice(b"db");
    data[0x02..0x04].copy_from_slice(&segment_count.to_le_bytes());
    data[0x04..0x08].copy_from_slice(&segment_list_offset.to_le_bytes());
    data
}

/// Cell payload holding a bare array of u32 hive offsets (value lists and
/// big-data segment lists share this shape).
pub fn offset_list(offsets: &[u32]) -> Vec<u8> {
    let mut data = Vec::new();
    for &offset in offsets {
        data.extend_from_slice(&offset.to_le_bytes());
    }
    data
}

/// Prefixes a payload with the 4-byte reserved preamble used by 1.0/1.1
/// cells.
pub fn with_preamble(payload: Vec<u8>) -> Vec<u8> {
    let mut data = vec![0u8; 4];
    data.extend_from_slice(&payload);
    data
}

/// UTF-16LE bytes of a string, no terminator.
pub fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}
