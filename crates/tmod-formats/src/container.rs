//! TMOD container header, property table and index table
//!
//! The fixed header is followed by two variable-length tables that together
//! end exactly at `header_size`. Table reads go through a bounded reader so
//! that a table claiming more data than the header region holds fails with
//! [`TmodError::TruncatedIndex`] instead of reading into the payload.

use binrw::BinRead;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Take};
use std::path::Path;
use tracing::{debug, info, trace};

use crate::error::{TmodError, TmodResult};
use crate::varint::{read_i32, read_string};

/// Size of the fixed header fields
pub const FIXED_HEADER_LEN: u64 = 12;

/// Filler between the end of the tables and the first payload byte
///
/// Observed in every sample container; not derived from any header field.
pub const PAYLOAD_PREFIX_LEN: u64 = 7;

/// Property key to value mapping
pub type PropertyMap = HashMap<String, String>;

/// Fixed-width container header
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, Serialize)]
#[br(little)]
pub struct ContainerHeader {
    /// Length of header and tables, measured from the start of the file
    pub header_size: u64,
    /// Format version
    pub format_version: u16,
    /// Number of key/value pairs in the property table
    pub property_count: u16,
}

impl ContainerHeader {
    /// Absolute offset of the payload region, saturating at `u64::MAX`
    pub fn payload_start(&self) -> u64 {
        self.header_size.saturating_add(PAYLOAD_PREFIX_LEN)
    }

    /// Bytes occupied by the property and index tables
    pub fn tables_len(&self) -> u64 {
        self.header_size.saturating_sub(FIXED_HEADER_LEN)
    }
}

/// One sub-file packed in the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    /// Path inside the container, `/`-separated
    pub path: String,
    /// Backing archive; only 0 is supported
    pub archive_index: i32,
    /// Offset into the payload region
    pub byte_offset: i32,
    /// Number of bytes the extracted file must contain
    pub size: i32,
    /// Checksum written by the packer (not verified)
    pub hash: i32,
}

impl IndexEntry {
    /// Read one entry, returning it and the bytes consumed
    pub fn read<R: Read>(reader: &mut R) -> TmodResult<(Self, usize)> {
        let (path, path_len) = read_string(reader)?;
        let (archive_index, a) = read_i32(reader)?;
        let (byte_offset, b) = read_i32(reader)?;
        let (size, c) = read_i32(reader)?;
        let (hash, d) = read_i32(reader)?;

        Ok((
            Self {
                path,
                archive_index,
                byte_offset,
                size,
                hash,
            },
            path_len + a + b + c + d,
        ))
    }

    /// Whether the entry lives in the primary archive
    pub fn is_supported(&self) -> bool {
        self.archive_index == 0
    }

    /// Payload offset and size as unsigned values
    pub fn payload_span(&self) -> TmodResult<(u64, u64)> {
        let offset = u64::try_from(self.byte_offset).map_err(|_| TmodError::InvalidEntry {
            path: self.path.clone(),
            reason: format!("negative byte offset {}", self.byte_offset),
        })?;
        let size = u64::try_from(self.size).map_err(|_| TmodError::InvalidEntry {
            path: self.path.clone(),
            reason: format!("negative size {}", self.size),
        })?;
        Ok((offset, size))
    }
}

/// Parsed container metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmodContainer {
    /// Fixed header
    pub header: ContainerHeader,
    /// Property table
    pub properties: PropertyMap,
    /// Index table, in file order
    pub entries: Vec<IndexEntry>,
}

impl TmodContainer {
    /// Parse header, properties and index from the start of `reader`
    ///
    /// Leaves the reader positioned at `header_size`.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> TmodResult<Self> {
        let header = read_header(reader)?;
        let mut table = TableReader::new(&mut *reader, FIXED_HEADER_LEN, header.header_size);

        let properties = read_properties(&mut table, header.property_count)
            .map_err(|e| table.bound(e, table.position))?;
        let entries = table.read_entries()?;

        debug!(
            "Parsed container v{}: {} properties, {} entries, header size {}",
            header.format_version,
            properties.len(),
            entries.len(),
            header.header_size
        );

        Ok(Self {
            header,
            properties,
            entries,
        })
    }

    /// Open and parse a container file
    pub fn open<P: AsRef<Path>>(path: P) -> TmodResult<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let container = Self::parse(&mut reader)?;
        info!(
            "Opened {} ({} entries)",
            path.display(),
            container.entries.len()
        );
        Ok(container)
    }

    /// Look up a property value
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Find an entry by container path
    pub fn entry(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Entries sorted by ascending payload offset
    pub fn entries_by_offset(&self) -> Vec<IndexEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|e| e.byte_offset);
        entries
    }

    /// Sum of the sizes of all supported entries
    pub fn total_payload_size(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.is_supported())
            .filter_map(|e| u64::try_from(e.size).ok())
            .sum()
    }
}

/// Read the fixed header at offset 0
pub fn read_header<R: Read + Seek>(reader: &mut R) -> TmodResult<ContainerHeader> {
    reader.seek(SeekFrom::Start(0))?;
    let header = ContainerHeader::read(reader)?;

    if header.header_size < FIXED_HEADER_LEN {
        return Err(TmodError::InvalidHeaderSize(header.header_size));
    }

    Ok(header)
}

/// Read `count` key/value pairs from the current position
///
/// Pairs with an empty key or value are dropped; later duplicates replace
/// earlier ones.
pub fn read_properties<R: Read>(reader: &mut R, count: u16) -> TmodResult<PropertyMap> {
    let mut properties = HashMap::with_capacity(usize::from(count));

    for _ in 0..count {
        let (key, _) = read_string(reader)?;
        let (value, _) = read_string(reader)?;

        if key.is_empty() || value.is_empty() {
            debug!("Dropping property with empty key or value: {key:?}={value:?}");
            continue;
        }

        properties.insert(key, value);
    }

    Ok(properties)
}

/// Read index entries from the current position up to `header_size`
pub fn read_index_entries<R: Read + Seek>(
    reader: &mut R,
    header_size: u64,
) -> TmodResult<Vec<IndexEntry>> {
    let start = reader.stream_position()?;
    TableReader::new(reader, start, header_size).read_entries()
}

/// Read only the header and property table of a container file
pub fn read_all_properties<P: AsRef<Path>>(path: P) -> TmodResult<PropertyMap> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = read_header(&mut reader)?;

    let mut table = TableReader::new(&mut reader, FIXED_HEADER_LEN, header.header_size);
    read_properties(&mut table, header.property_count).map_err(|e| table.bound(e, table.position))
}

/// Reader limited to the table region that tracks its absolute position
struct TableReader<R> {
    inner: Take<R>,
    position: u64,
    header_size: u64,
}

impl<R: Read> TableReader<R> {
    fn new(inner: R, start: u64, header_size: u64) -> Self {
        Self {
            inner: inner.take(header_size.saturating_sub(start)),
            position: start,
            header_size,
        }
    }

    /// Turn running out of table bytes into `TruncatedIndex`
    fn bound(&self, error: TmodError, offset: u64) -> TmodError {
        if error.is_truncation() {
            TmodError::TruncatedIndex {
                offset,
                header_size: self.header_size,
            }
        } else {
            error
        }
    }

    fn read_entries(&mut self) -> TmodResult<Vec<IndexEntry>> {
        let mut entries = Vec::new();

        while self.position < self.header_size {
            let offset = self.position;
            let (entry, _) = IndexEntry::read(self).map_err(|e| self.bound(e, offset))?;
            trace!(
                "Index entry at {offset}: {} (offset {}, size {})",
                entry.path, entry.byte_offset, entry.size
            );
            entries.push(entry);
        }

        Ok(entries)
    }
}

impl<R: Read> Read for TableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}
