//! Test utilities for assembling TMOD containers in memory
//!
//! Shared by the unit tests and, through `#[path]`, by the integration tests,
//! so this file only depends on std.

#![allow(dead_code)]

/// Filler placed between the tables and the payload region
pub const FILLER: [u8; 7] = [0xEE; 7];

/// Encode a base-128 varint
pub fn encode_varint(value: u32) -> Vec<u8> {
    let mut value = value;
    let mut data = Vec::new();

    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80;
        }

        data.push(byte);

        if value == 0 {
            break;
        }
    }

    data
}

/// Encode a varint-length-prefixed string
pub fn encode_string(value: &str) -> Vec<u8> {
    let mut data = encode_varint(value.len() as u32);
    data.extend_from_slice(value.as_bytes());
    data
}

/// Insert `markers` into `data`; positions are offsets into the original data
/// and markers at the same position keep their order
pub fn with_markers(data: &[u8], markers: &[(usize, &[u8])]) -> Vec<u8> {
    let mut sorted: Vec<_> = markers.iter().enumerate().collect();
    sorted.sort_by_key(|(order, (position, _))| (*position, *order));

    let mut raw = Vec::with_capacity(data.len() + markers.len() * 5);
    let mut copied = 0;
    for (_, (position, marker)) in sorted {
        raw.extend_from_slice(&data[copied..*position]);
        raw.extend_from_slice(marker);
        copied = *position;
    }
    raw.extend_from_slice(&data[copied..]);
    raw
}

/// Index entry as written into a fixture
#[derive(Debug, Clone)]
pub struct FixtureEntry {
    pub path: String,
    pub archive_index: i32,
    pub byte_offset: i32,
    pub size: i32,
    pub hash: i32,
}

/// Builder for container bytes
#[derive(Debug, Clone, Default)]
pub struct ContainerFixture {
    pub format_version: u16,
    pub properties: Vec<(String, String)>,
    pub entries: Vec<FixtureEntry>,
    pub payload: Vec<u8>,
    /// Overrides the computed header size
    pub header_size: Option<u64>,
    /// Overrides the number of properties announced in the header
    pub property_count: Option<u16>,
}

impl ContainerFixture {
    pub fn new() -> Self {
        Self {
            format_version: 1,
            ..Self::default()
        }
    }

    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.properties.push((key.to_string(), value.to_string()));
        self
    }

    /// Add an entry whose payload contains no markers
    pub fn file(self, path: &str, data: &[u8]) -> Self {
        self.raw_file(path, data, data.len())
    }

    /// Add an entry with marker-laden `raw` bytes and logical `size`
    pub fn raw_file(mut self, path: &str, raw: &[u8], size: usize) -> Self {
        let byte_offset = self.payload.len() as i32;
        self.payload.extend_from_slice(raw);
        self.entries.push(FixtureEntry {
            path: path.to_string(),
            archive_index: 0,
            byte_offset,
            size: size as i32,
            hash: 0x1234_5678,
        });
        self
    }

    /// Add an index entry without touching the payload
    pub fn entry(mut self, entry: FixtureEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Property and index table bytes
    pub fn tables(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for (key, value) in &self.properties {
            data.extend(encode_string(key));
            data.extend(encode_string(value));
        }
        for entry in &self.entries {
            data.extend(encode_string(&entry.path));
            data.extend(encode_varint(entry.archive_index as u32));
            data.extend(encode_varint(entry.byte_offset as u32));
            data.extend(encode_varint(entry.size as u32));
            data.extend(encode_varint(entry.hash as u32));
        }
        data
    }

    /// Header size the tables would produce
    pub fn computed_header_size(&self) -> u64 {
        12 + self.tables().len() as u64
    }

    /// Complete container bytes
    pub fn build(&self) -> Vec<u8> {
        let header_size = self
            .header_size
            .unwrap_or_else(|| self.computed_header_size());
        let property_count = self
            .property_count
            .unwrap_or(self.properties.len() as u16);

        let mut data = Vec::new();
        data.extend_from_slice(&header_size.to_le_bytes());
        data.extend_from_slice(&self.format_version.to_le_bytes());
        data.extend_from_slice(&property_count.to_le_bytes());
        data.extend(self.tables());
        data.extend_from_slice(&FILLER);
        data.extend_from_slice(&self.payload);
        data
    }
}
