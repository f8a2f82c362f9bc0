//! Streams entry payloads out of the container, dropping noise markers
//!
//! Payload bytes are read in fixed-size windows. The last `marker_len - 1`
//! bytes of each window are held back and moved to the front of the buffer
//! before the next read, so a marker split across two reads is still seen
//! whole. Held-back bytes are written only once they are known not to start a
//! marker.

use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::container::{IndexEntry, PAYLOAD_PREFIX_LEN, TmodContainer};
use crate::error::{EntryFailure, TmodError, TmodResult};
use crate::search::BoyerMoore;

/// First noise sequence injected by the packer
pub const MARKER_PRIMARY: [u8; 5] = [0x00, 0x00, 0x80, 0xFF, 0x7F];

/// Second noise sequence injected by the packer
pub const MARKER_SECONDARY: [u8; 5] = [0x00, 0x44, 0x13, 0xBB, 0xEC];

/// Default working buffer size (1 MiB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// The two marker search engines, built once and borrowed by extractors
#[derive(Debug, Clone)]
pub struct NoiseMarkers {
    engines: [BoyerMoore; 2],
}

impl NoiseMarkers {
    /// Build engines for two arbitrary marker sequences
    pub fn new(primary: &[u8], secondary: &[u8]) -> TmodResult<Self> {
        Ok(Self {
            engines: [BoyerMoore::new(primary)?, BoyerMoore::new(secondary)?],
        })
    }

    /// Engines for [`MARKER_PRIMARY`] and [`MARKER_SECONDARY`]
    pub fn standard() -> TmodResult<Self> {
        Self::new(&MARKER_PRIMARY, &MARKER_SECONDARY)
    }

    /// Bytes held back at the end of each window
    pub fn carry_len(&self) -> usize {
        self.engines.iter().map(BoyerMoore::len).max().unwrap_or(1) - 1
    }

    fn search(&self, engine: usize, window: &[u8], from: usize) -> Option<usize> {
        self.engines[engine].search(window, from, window.len().saturating_sub(from))
    }
}

/// Extraction settings
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Bytes read from the source per window
    pub buffer_size: usize,
    /// Checked between entries; set it to stop the run
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            cancel: None,
        }
    }
}

impl ExtractOptions {
    /// Set the window size (at least one byte)
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Attach a cancellation flag
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// A successfully written entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedFile {
    /// Container path
    pub path: String,
    /// File written on disk
    pub destination: PathBuf,
    /// Bytes written
    pub size: u64,
    /// Marker sequences dropped from the payload
    pub markers_removed: u64,
}

/// Outcome of an extraction run
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Entries written to disk
    pub extracted: Vec<ExtractedFile>,
    /// Entries skipped because they live in another archive
    pub skipped: Vec<EntryFailure>,
    /// Entries that could not be extracted
    pub failed: Vec<EntryFailure>,
    /// Total bytes written across all files
    pub bytes_written: u64,
    /// Whether the run stopped at the cancellation flag
    pub cancelled: bool,
    /// Entries requested
    pub total: usize,
}

impl ExtractionReport {
    /// Entries that were extracted, skipped or failed
    pub fn processed(&self) -> usize {
        self.extracted.len() + self.skipped.len() + self.failed.len()
    }

    /// Total markers dropped across all files
    pub fn markers_removed(&self) -> u64 {
        self.extracted.iter().map(|f| f.markers_removed).sum()
    }

    /// Whether every requested entry was handled without failure
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed.is_empty()
    }

    /// Fail on cancellation or on any failed entry
    pub fn into_result(self) -> TmodResult<Self> {
        if self.cancelled {
            return Err(TmodError::Cancelled {
                completed: self.processed(),
                total: self.total,
            });
        }
        if !self.failed.is_empty() {
            return Err(TmodError::PartialExtraction {
                failed: self.failed,
            });
        }
        Ok(self)
    }
}

/// Counters for one stripped copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CopyOutcome {
    /// Logical bytes still owed when the source ended
    remaining: u64,
    markers_removed: u64,
}

/// Writes container entries to a destination directory
#[derive(Debug)]
pub struct Extractor<'a> {
    markers: &'a NoiseMarkers,
    options: ExtractOptions,
}

impl<'a> Extractor<'a> {
    /// Create an extractor that borrows pre-built marker engines
    pub fn new(markers: &'a NoiseMarkers, options: ExtractOptions) -> Self {
        Self { markers, options }
    }

    /// Extract `entries` in the given order
    ///
    /// Per-entry failures are collected in the report; only an unwritable
    /// destination root aborts the run. `progress` receives the completed
    /// fraction after every entry.
    ///
    /// Each entry is read from its own offset until `size` bytes have been
    /// produced, so a marker completed by the following entry's bytes is
    /// dropped and the entry reads on into that entry's data.
    pub fn extract<R, P, F>(
        &self,
        source: &mut R,
        header_size: u64,
        entries: &[IndexEntry],
        destination_root: P,
        mut progress: F,
    ) -> TmodResult<ExtractionReport>
    where
        R: Read + Seek,
        P: AsRef<Path>,
        F: FnMut(f64),
    {
        let root = destination_root.as_ref();
        fs::create_dir_all(root).map_err(|source| TmodError::DestinationUnwritable {
            path: root.to_path_buf(),
            source,
        })?;

        let mut report = ExtractionReport {
            total: entries.len(),
            ..ExtractionReport::default()
        };
        let mut buffer = vec![0u8; self.markers.carry_len() + self.options.buffer_size.max(1)];

        for (index, entry) in entries.iter().enumerate() {
            if self.options.is_cancelled() {
                warn!(
                    "Extraction cancelled after {index} of {} entries",
                    entries.len()
                );
                report.cancelled = true;
                break;
            }

            match self.extract_entry(source, header_size, entry, root, &mut buffer) {
                Ok(file) => {
                    report.bytes_written += file.size;
                    report.extracted.push(file);
                }
                Err(error @ TmodError::UnsupportedArchiveIndex { .. }) => {
                    warn!("Skipping {}: {error}", entry.path);
                    report.skipped.push(EntryFailure {
                        path: entry.path.clone(),
                        error,
                    });
                }
                Err(error @ TmodError::DestinationUnwritable { .. }) => return Err(error),
                Err(error) => {
                    warn!("Failed to extract {}: {error}", entry.path);
                    report.failed.push(EntryFailure {
                        path: entry.path.clone(),
                        error,
                    });
                }
            }

            progress((index + 1) as f64 / entries.len() as f64);
        }

        info!(
            "Extracted {} of {} entries ({} bytes, {} skipped, {} failed)",
            report.extracted.len(),
            report.total,
            report.bytes_written,
            report.skipped.len(),
            report.failed.len()
        );

        Ok(report)
    }

    fn extract_entry<R: Read + Seek>(
        &self,
        source: &mut R,
        header_size: u64,
        entry: &IndexEntry,
        root: &Path,
        buffer: &mut [u8],
    ) -> TmodResult<ExtractedFile> {
        if !entry.is_supported() {
            return Err(TmodError::UnsupportedArchiveIndex {
                path: entry.path.clone(),
                archive_index: entry.archive_index,
            });
        }

        let (offset, size) = entry.payload_span()?;
        let target = destination_path(root, &entry.path)?;
        let start = header_size
            .checked_add(PAYLOAD_PREFIX_LEN + offset)
            .ok_or_else(|| TmodError::InvalidEntry {
                path: entry.path.clone(),
                reason: format!("payload offset {offset} overflows"),
            })?;

        source.seek(SeekFrom::Start(start))?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| write_error(root, e))?;
        }
        let file = File::create(&target).map_err(|e| write_error(root, e))?;
        let mut writer = BufWriter::new(file);

        let copied = self
            .strip_copy(source, &mut writer, size, buffer)
            .and_then(|outcome| writer.flush().map(|()| outcome));
        drop(writer);

        let outcome = match copied {
            Ok(outcome) => outcome,
            Err(e) => {
                discard(&target);
                return Err(e.into());
            }
        };

        if outcome.remaining > 0 {
            discard(&target);
            return Err(TmodError::TruncatedPayload {
                path: entry.path.clone(),
                remaining: outcome.remaining,
            });
        }

        debug!(
            "Extracted {} ({} bytes from offset {start}, {} markers removed)",
            entry.path, size, outcome.markers_removed
        );

        Ok(ExtractedFile {
            path: entry.path.clone(),
            destination: target,
            size,
            markers_removed: outcome.markers_removed,
        })
    }

    /// Copy `size` logical bytes from `source` to `sink`, dropping markers
    ///
    /// `buffer` holds the carried bytes followed by one window of fresh input.
    fn strip_copy<R: Read, W: Write>(
        &self,
        source: &mut R,
        sink: &mut W,
        size: u64,
        buffer: &mut [u8],
    ) -> io::Result<CopyOutcome> {
        let carry = self.markers.carry_len();
        let window_size = buffer.len() - carry;

        let mut remaining = size;
        let mut carried = 0usize;
        let mut markers_removed = 0u64;

        while remaining > 0 {
            let want = window_size.min(usize::try_from(remaining).unwrap_or(usize::MAX));
            let read = read_full(source, &mut buffer[carried..carried + want])?;

            if read == 0 {
                // Held-back bytes cannot complete a marker any more
                remaining -= emit(sink, &buffer[..carried], remaining)?;
                break;
            }

            let window = &buffer[..carried + read];
            let mut pos = 0;
            let mut next = [
                self.markers.search(0, window, 0),
                self.markers.search(1, window, 0),
            ];

            while let Some((engine, at)) = earliest(next) {
                remaining -= emit(sink, &window[pos..at], remaining)?;
                if remaining == 0 {
                    return Ok(CopyOutcome {
                        remaining,
                        markers_removed,
                    });
                }

                pos = at + self.markers.engines[engine].len();
                markers_removed += 1;

                for (index, found) in next.iter_mut().enumerate() {
                    if found.is_some_and(|p| p < pos) {
                        *found = self.markers.search(index, window, pos);
                    }
                }
            }

            let keep = carry.min(window.len() - pos);
            let tail_end = window.len() - keep;
            remaining -= emit(sink, &window[pos..tail_end], remaining)?;

            buffer.copy_within(tail_end..carried + read, 0);
            carried = keep;
        }

        Ok(CopyOutcome {
            remaining,
            markers_removed,
        })
    }
}

/// Map an entry path onto the destination root using host separators
///
/// Absolute paths, drive prefixes and `.`/`..` components are rejected so that
/// no entry can be written outside `root`.
pub fn destination_path(root: &Path, entry_path: &str) -> TmodResult<PathBuf> {
    let unsafe_path = || TmodError::UnsafeEntryPath(entry_path.to_string());

    if entry_path.starts_with(['/', '\\']) {
        return Err(unsafe_path());
    }

    let mut target = root.to_path_buf();
    let mut depth = 0;
    for part in entry_path.split(['/', '\\']).filter(|p| !p.is_empty()) {
        if part == "." || part == ".." || (depth == 0 && has_drive_prefix(part)) {
            return Err(unsafe_path());
        }
        // Drive-relative paths and alternate data streams
        if cfg!(windows) && part.contains(':') {
            return Err(unsafe_path());
        }
        target.push(part);
        depth += 1;
    }

    if depth == 0 {
        return Err(unsafe_path());
    }

    Ok(target)
}

/// Parse `path` and extract every entry below `destination`
///
/// Entries are processed in payload order. `on_progress` receives a
/// percentage between 0 and 100 after each entry.
pub fn extract_all<P, Q, F>(path: P, destination: Q, on_progress: F) -> TmodResult<ExtractionReport>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    F: FnMut(f64),
{
    extract_all_with(path, destination, ExtractOptions::default(), on_progress)
}

/// [`extract_all`] with explicit options
pub fn extract_all_with<P, Q, F>(
    path: P,
    destination: Q,
    options: ExtractOptions,
    mut on_progress: F,
) -> TmodResult<ExtractionReport>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    F: FnMut(f64),
{
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let container = TmodContainer::parse(&mut reader)?;
    let entries = container.entries_by_offset();

    info!(
        "Extracting {} entries from {} to {}",
        entries.len(),
        path.display(),
        destination.as_ref().display()
    );

    let markers = NoiseMarkers::standard()?;
    let extractor = Extractor::new(&markers, options);
    let report = extractor.extract(
        &mut reader,
        container.header.header_size,
        &entries,
        destination,
        |fraction| on_progress(fraction * 100.0),
    )?;

    report.into_result()
}

/// `C:`-style drive letter at the start of a component
fn has_drive_prefix(part: &str) -> bool {
    let bytes = part.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Earliest pending match as `(engine, position)`; ties go to the first engine
fn earliest(next: [Option<usize>; 2]) -> Option<(usize, usize)> {
    next.iter()
        .enumerate()
        .filter_map(|(engine, found)| found.map(|p| (engine, p)))
        .min_by_key(|&(engine, p)| (p, engine))
}

/// Write at most `limit` bytes of `data`, returning how many were written
fn emit<W: Write>(sink: &mut W, data: &[u8], limit: u64) -> io::Result<u64> {
    let n = data.len().min(usize::try_from(limit).unwrap_or(usize::MAX));
    sink.write_all(&data[..n])?;
    Ok(n as u64)
}

/// Fill `buf` unless the source ends first
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Classify a failure to create output below `root`
fn write_error(root: &Path, error: io::Error) -> TmodError {
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => TmodError::Io(error),
        _ => TmodError::DestinationUnwritable {
            path: root.to_path_buf(),
            source: error,
        },
    }
}

/// Remove a partially written file
fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Could not remove incomplete file {}: {e}", path.display());
    }
}
