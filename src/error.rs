use std::fmt;
use std::io;

use crate::log::RowId;

/// Custom error type for lobstore operations
#[derive(Debug)]
pub enum Error {
    /// I/O error from the underlying storage medium
    Io(io::Error),
    /// The medium rejected the write of a new version for a row
    Write { row_id: RowId, source: io::Error },
    /// Operation on a row id that was never written
    NotFound(RowId),
    /// Allocation table disagrees with the file contents
    CorruptState(String),
    /// File does not start with the lobstore magic
    InvalidMagic,
    /// File was written by an unknown format version
    UnsupportedVersion(u16),
    /// Payload exceeds the configured maximum LOB size
    PayloadTooLarge(usize),
    /// Error when the store file is locked by another process
    FileLocked(String),
    /// Invalid configuration
    Config(String),
    /// Harness run stopped at the given iteration
    Aborted { iteration: u64, source: Box<Error> },
    /// Compaction did not shrink the file enough
    CompactionIneffective { before: u64, after: u64 },
    /// Other store errors
    Other(String),
}

impl Error {
    /// Returns true for failures reported by the storage medium,
    /// including ones wrapped by a harness abort.
    pub fn is_io_failure(&self) -> bool {
        match self {
            Error::Io(_) | Error::Write { .. } => true,
            Error::Aborted { source, .. } => source.is_io_failure(),
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Write { row_id, source } => {
                write!(f, "I/O error writing LOB for row {row_id}: {source}")
            }
            Error::NotFound(row_id) => write!(f, "Row {row_id} not found"),
            Error::CorruptState(msg) => write!(f, "Store corrupted: {msg}"),
            Error::InvalidMagic => write!(f, "Not a lobstore file (bad magic)"),
            Error::UnsupportedVersion(version) => {
                write!(f, "Unsupported storage format version {version}")
            }
            Error::PayloadTooLarge(size) => write!(f, "Payload too large: {size} bytes"),
            Error::FileLocked(msg) => write!(f, "Store file is locked: {msg}"),
            Error::Config(msg) => write!(f, "Config error: {msg}"),
            Error::Aborted { iteration, source } => {
                write!(f, "Run aborted at iteration {iteration}: {source}")
            }
            Error::CompactionIneffective { before, after } => write!(
                f,
                "Compaction did not reclaim enough space: {before} bytes before, {after} bytes after"
            ),
            Error::Other(msg) => write!(f, "Store error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Write { source, .. } => Some(source),
            Error::Aborted { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Other(format!("JSON error: {err}"))
    }
}

/// Result type for lobstore operations
pub type Result<T> = std::result::Result<T, Error>;
