//! Error types for TMOD parsing and extraction

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for TMOD operations
pub type TmodResult<T> = Result<T, TmodError>;

/// Why a varint could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintFault {
    /// Continuation bit still set after the maximum number of bytes, or the
    /// decoded value does not fit in 32 bits
    Overlong,
    /// Source ran out in the middle of the sequence
    Exhausted,
}

impl fmt::Display for VarintFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overlong => f.write_str("value exceeds 32 bits"),
            Self::Exhausted => f.write_str("source exhausted mid-sequence"),
        }
    }
}

/// An entry that could not be extracted, with the reason
#[derive(Debug)]
pub struct EntryFailure {
    /// Container path of the entry
    pub path: String,
    /// What went wrong
    pub error: TmodError,
}

/// TMOD-specific error type
#[derive(Debug, Error)]
pub enum TmodError {
    /// Variable-length integer could not be decoded
    #[error("malformed varint after {consumed} bytes: {fault}")]
    MalformedVarint {
        /// Bytes consumed before the fault was detected
        consumed: usize,
        /// Kind of fault
        fault: VarintFault,
    },

    /// Length-prefixed string is longer than the remaining input
    #[error("truncated string: expected {expected} bytes, got {available}")]
    TruncatedString {
        /// Length announced by the prefix
        expected: u64,
        /// Bytes actually available
        available: u64,
    },

    /// String bytes are not valid UTF-8
    #[error("UTF-8 conversion error: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Property or index table runs past the end of the header region
    #[error("truncated index at offset {offset}: header region ends at {header_size}")]
    TruncatedIndex {
        /// Absolute offset of the item that could not be read
        offset: u64,
        /// Declared header size
        header_size: u64,
    },

    /// Header size is smaller than the fixed header fields
    #[error("invalid header size: {0} (must be at least 12)")]
    InvalidHeaderSize(u64),

    /// Entry payload ended before all of its bytes were produced
    #[error("truncated payload for '{path}': {remaining} bytes missing")]
    TruncatedPayload {
        /// Container path of the entry
        path: String,
        /// Bytes still owed when the source ran dry
        remaining: u64,
    },

    /// Entry lives in a secondary backing archive
    #[error("unsupported archive index {archive_index} for '{path}'")]
    UnsupportedArchiveIndex {
        /// Container path of the entry
        path: String,
        /// Archive index found in the entry
        archive_index: i32,
    },

    /// Entry fields cannot describe a payload
    #[error("invalid entry '{path}': {reason}")]
    InvalidEntry {
        /// Container path of the entry
        path: String,
        /// Detailed description
        reason: String,
    },

    /// Entry path would resolve outside the destination root
    #[error("unsafe entry path: {0}")]
    UnsafeEntryPath(String),

    /// Search pattern has no bytes
    #[error("search pattern must not be empty")]
    EmptyPattern,

    /// Destination root cannot be created or written
    #[error("destination {path} is not writable: {source}")]
    DestinationUnwritable {
        /// Destination root
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Some entries failed while the rest were extracted
    #[error("{} entries failed to extract", failed.len())]
    PartialExtraction {
        /// Entries that failed
        failed: Vec<EntryFailure>,
    },

    /// Extraction stopped by the cancellation flag
    #[error("extraction cancelled after {completed} of {total} entries")]
    Cancelled {
        /// Entries processed before cancellation
        completed: usize,
        /// Entries requested
        total: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRead(#[from] binrw::Error),
}

impl TmodError {
    /// Check if this error came from decoding the header or tables
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedVarint { .. }
                | Self::TruncatedString { .. }
                | Self::InvalidUtf8(_)
                | Self::TruncatedIndex { .. }
                | Self::InvalidHeaderSize(_)
                | Self::BinRead(_)
        )
    }

    /// Check if this error only affects a single entry
    pub fn is_entry_error(&self) -> bool {
        matches!(
            self,
            Self::TruncatedPayload { .. }
                | Self::UnsupportedArchiveIndex { .. }
                | Self::InvalidEntry { .. }
                | Self::UnsafeEntryPath(_)
        )
    }

    /// Check if the input ended before the item was complete
    pub(crate) fn is_truncation(&self) -> bool {
        match self {
            Self::MalformedVarint { fault, .. } => *fault == VarintFault::Exhausted,
            Self::TruncatedString { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TmodError::TruncatedPayload {
            path: "Content/a.png".to_string(),
            remaining: 12,
        };
        assert_eq!(
            err.to_string(),
            "truncated payload for 'Content/a.png': 12 bytes missing"
        );

        let err = TmodError::MalformedVarint {
            consumed: 5,
            fault: VarintFault::Overlong,
        };
        assert_eq!(
            err.to_string(),
            "malformed varint after 5 bytes: value exceeds 32 bits"
        );

        let err = TmodError::PartialExtraction {
            failed: vec![EntryFailure {
                path: "x".to_string(),
                error: TmodError::EmptyPattern,
            }],
        };
        assert_eq!(err.to_string(), "1 entries failed to extract");
    }

    #[test]
    fn test_classification() {
        assert!(TmodError::InvalidHeaderSize(3).is_parse_error());
        assert!(!TmodError::InvalidHeaderSize(3).is_entry_error());
        assert!(
            TmodError::UnsupportedArchiveIndex {
                path: "a".to_string(),
                archive_index: 1,
            }
            .is_entry_error()
        );

        assert!(
            TmodError::MalformedVarint {
                consumed: 2,
                fault: VarintFault::Exhausted,
            }
            .is_truncation()
        );
        assert!(
            !TmodError::MalformedVarint {
                consumed: 5,
                fault: VarintFault::Overlong,
            }
            .is_truncation()
        );
    }
}
