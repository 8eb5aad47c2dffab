//! Error types for the nibclip core library

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Parameter problems detected before any destructive action
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Fill nibble outside 0..=15
    #[error("Invalid fill value {0}: expected 0 <= fill <= 15")]
    InvalidFillValue(u8),

    /// Offset beyond the end of the source
    #[error("Invalid offset {offset:#x}: source is only {source_size} bytes")]
    InvalidOffset {
        /// Requested offset
        offset: u64,
        /// Actual size of the source
        source_size: u64,
    },

    /// Size rejected (zero, out of policy bounds, not addressable)
    #[error("Invalid size {size}: {reason}")]
    InvalidSize {
        /// Requested or resolved size
        size: u64,
        /// Why the size was rejected
        reason: String,
    },

    /// Offset plus length runs past the end of the source
    #[error(
        "Source too small: {length} bytes at offset {offset:#x} requested, source is {source_size} bytes"
    )]
    SourceTooSmall {
        /// Requested offset
        offset: u64,
        /// Requested length
        length: u64,
        /// Actual size of the source
        source_size: u64,
    },

    /// No nibble mode, no size and no offset were requested
    #[error("Nothing to do: no nibble mode, size or offset requested")]
    NothingToDo,

    /// Paths or naming settings that would defeat the replace protocol
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Main error type for nibclip operations
#[derive(Error, Debug)]
pub enum Error {
    /// Parameter validation failed
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Source does not exist
    #[error("Source not found: {path}: {source}")]
    SourceNotFound {
        /// Source path
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Source exists but cannot be queried or is not a regular file
    #[error("Source unreadable: {path}: {source}")]
    SourceUnreadable {
        /// Source path
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Opening, seeking or reading the source failed
    #[error("Error reading from {path}: {source}")]
    SourceRead {
        /// Source path
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// The source ended before the requested window was read
    #[error("Error reading from {path}: expected {expected} bytes, got {actual}")]
    TruncatedRead {
        /// Source path
        path: PathBuf,
        /// Bytes requested
        expected: u64,
        /// Bytes actually read
        actual: u64,
    },

    /// The read buffer could not be allocated
    #[error("Ran out of memory allocating {bytes} bytes")]
    BufferAllocation {
        /// Requested buffer size
        bytes: u64,
    },

    /// The temporary file could not be created
    #[error("Unable to create temp file in {dir}: {source}")]
    TempCreate {
        /// Directory the temp file was to be created in
        dir: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Writing, flushing or syncing the temporary file failed
    #[error("Error writing to {path}: {source}")]
    TempWrite {
        /// Temp file path
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// The temporary file accepted fewer bytes than the buffer holds
    #[error("Error writing to {path}: expected to write {expected} bytes, wrote {actual}")]
    IncompleteWrite {
        /// Temp file path
        path: PathBuf,
        /// Bytes to write
        expected: usize,
        /// Bytes written
        actual: usize,
    },

    /// An old backup could not be deleted
    #[error("Error deleting old backup {backup}: {source}")]
    StaleBackup {
        /// Backup path
        backup: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// The destination could not be renamed to the backup name
    #[error("Error renaming {destination} to {backup}: {source}")]
    Backup {
        /// Destination path
        destination: PathBuf,
        /// Backup path
        backup: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// A pre-existing destination could not be deleted before the swap
    #[error("Error deleting {destination}: {source}")]
    StaleDestination {
        /// Destination path
        destination: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// The final rename failed; the new content is left in the temp file
    #[error("Error renaming {temp} to {destination}: {source} (new content kept in {temp})")]
    Swap {
        /// Temp file holding the new content
        temp: PathBuf,
        /// Destination path
        destination: PathBuf,
        /// Backup holding the original content, if one was taken
        backup: Option<PathBuf>,
        /// The underlying error
        source: std::io::Error,
    },

    /// Permission bits could not be applied after a successful swap
    #[error("Error setting file mode bits {mode:o} on {path}: {source} (content was replaced)")]
    PermissionApply {
        /// Destination path
        path: PathBuf,
        /// Mode bits that were to be applied
        mode: u32,
        /// The underlying error
        source: std::io::Error,
    },
}

/// Coarse classification of [`Error`] by the stage that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad parameters; no I/O attempted beyond the stat query
    Validation,
    /// Source stat/open/read failures; no artifacts created
    SourceAccess,
    /// Temp file could not be created or written; temp removed
    TempFile,
    /// Backing up the destination failed; destination untouched, temp removed
    Backup,
    /// Swapping the temp file into place failed
    Swap,
    /// Content swapped, but permissions could not be applied
    PermissionApply,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::SourceAccess => "source access",
            ErrorCategory::TempFile => "temp file",
            ErrorCategory::Backup => "backup",
            ErrorCategory::Swap => "swap",
            ErrorCategory::PermissionApply => "permission apply",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Stage classification of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation(_) => ErrorCategory::Validation,
            Error::SourceNotFound { .. }
            | Error::SourceUnreadable { .. }
            | Error::SourceRead { .. }
            | Error::TruncatedRead { .. }
            | Error::BufferAllocation { .. } => ErrorCategory::SourceAccess,
            Error::TempCreate { .. } | Error::TempWrite { .. } | Error::IncompleteWrite { .. } => {
                ErrorCategory::TempFile
            }
            Error::StaleBackup { .. } | Error::Backup { .. } => ErrorCategory::Backup,
            Error::StaleDestination { .. } | Error::Swap { .. } => ErrorCategory::Swap,
            Error::PermissionApply { .. } => ErrorCategory::PermissionApply,
        }
    }

    /// Whether the destination already holds the new content
    pub fn content_committed(&self) -> bool {
        matches!(self, Error::PermissionApply { .. })
    }

    /// Temp file left on disk for manual recovery, if any
    pub fn retained_temp(&self) -> Option<&Path> {
        match self {
            Error::Swap { temp, .. } => Some(temp),
            _ => None,
        }
    }
}

/// Result type alias using the nibclip error type
pub type Result<T> = std::result::Result<T, Error>;
