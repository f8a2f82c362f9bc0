//! Reader and extractor for TMOD asset containers
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Signed fields stored through unsigned varints
#![allow(clippy::cast_precision_loss)] // Progress fractions
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
//! A TMOD file packs the assets of a game mod into a single container:
//!
//! ```text
//! offset 0      u64  header size (header + tables, from file start)
//! offset 8      u16  format version
//! offset 10     u16  property count
//! offset 12     property table   (varint-prefixed UTF-8 key/value pairs)
//! ...           index table      (path + four varints per entry, up to header size)
//! header size   7 filler bytes
//! header size+7 payload region   (entry bytes interleaved with noise markers)
//! ```
//!
//! The packaging tool injects two fixed 5-byte marker sequences into the
//! payload region at data-dependent offsets. Extraction streams each entry
//! through two [`search::BoyerMoore`] engines and drops every marker so that
//! exactly `size` bytes reach the destination file.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tmod_formats::{extract_all, read_all_properties};
//!
//! let properties = read_all_properties("MyMod.tmod")?;
//! println!("author: {:?}", properties.get("author"));
//!
//! let report = extract_all("MyMod.tmod", "out/MyMod", |percent| {
//!     println!("{percent:.0}%");
//! })?;
//! println!("{} files, {} bytes", report.extracted.len(), report.bytes_written);
//! # Ok::<(), tmod_formats::TmodError>(())
//! ```

#![warn(missing_docs)]

/// Container header, property table and index table parsing
pub mod container;
mod error;
/// Marker-stripping payload extraction
pub mod extract;
pub mod search;
pub mod varint;

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
pub(crate) mod test_utils;

pub use container::{
    ContainerHeader, FIXED_HEADER_LEN, IndexEntry, PAYLOAD_PREFIX_LEN, PropertyMap, TmodContainer,
    read_all_properties, read_header, read_index_entries, read_properties,
};
pub use error::{EntryFailure, TmodError, TmodResult, VarintFault};
pub use extract::{
    DEFAULT_BUFFER_SIZE, ExtractOptions, ExtractedFile, ExtractionReport, Extractor,
    MARKER_PRIMARY, MARKER_SECONDARY, NoiseMarkers, destination_path, extract_all,
    extract_all_with,
};
pub use search::BoyerMoore;
