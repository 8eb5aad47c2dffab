//! # Nibclip Platform
//!
//! File-system capabilities consumed by the nibclip replace engine.
//!
//! The engine never touches `std::fs` directly. Everything it needs from the
//! operating system (stat, open, exclusive temp creation, unlink, rename,
//! chmod) goes through the [`FileSystem`] trait, so tests can substitute an
//! implementation that fails on demand.
//!
//! Permission handling differs per platform: Unix exposes full mode bits,
//! other targets only carry a read-only flag.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

/// Number of random characters in a temporary file name
pub const TEMP_RAND_LEN: usize = 6;

/// Trait alias for readers that can also seek
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Result of a stat-like query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Size in bytes
    pub len: u64,

    /// Permission bits (Unix mode bits, or a synthesized 0o444/0o666)
    pub mode: u32,

    /// Whether the path is a regular file
    pub is_file: bool,

    /// Whether the path is a directory
    pub is_dir: bool,
}

/// A freshly created, exclusively owned temporary file
pub trait TempFile: Write {
    /// Path of the file on disk
    fn path(&self) -> &Path;

    /// Flush file contents to stable storage
    fn sync(&mut self) -> io::Result<()>;
}

/// File-system operations needed by the replace engine
pub trait FileSystem {
    /// Query size, permissions and type of a path (follows symlinks)
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// Open a file for reading
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>>;

    /// Create a new file in `dir` named `{prefix}{random}{suffix}`.
    ///
    /// The file must not have existed before; collisions are an error, never
    /// an overwrite. The file is not removed automatically.
    fn create_temp(
        &self,
        dir: &Path,
        prefix: &OsStr,
        suffix: &OsStr,
    ) -> io::Result<Box<dyn TempFile>>;

    /// Delete a file
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Rename `from` to `to`, replacing `to` where the platform allows it
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Apply permission bits to a path
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;
}

/// Delete a file, treating "not found" as success.
///
/// Returns `true` if a file was actually removed.
pub fn remove_if_exists<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> io::Result<bool> {
    match fs.remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// [`FileSystem`] backed by `std::fs` and the `tempfile` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl StdFileSystem {
    /// Create a new instance
    pub fn new() -> Self {
        Self
    }
}

/// Temporary file created by [`StdFileSystem`]
#[derive(Debug)]
pub struct StdTempFile {
    file: File,
    path: PathBuf,
}

impl Write for StdTempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl TempFile for StdTempFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

impl FileSystem for StdFileSystem {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let metadata = fs::metadata(path)?;
        Ok(FileStat {
            len: metadata.len(),
            mode: sys::mode_bits(&metadata),
            is_file: metadata.is_file(),
            is_dir: metadata.is_dir(),
        })
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        let file = File::open(path)?;
        Ok(Box::new(file))
    }

    fn create_temp(
        &self,
        dir: &Path,
        prefix: &OsStr,
        suffix: &OsStr,
    ) -> io::Result<Box<dyn TempFile>> {
        let named = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .rand_bytes(TEMP_RAND_LEN)
            .tempfile_in(dir)?;

        // Cleanup is the caller's decision, so detach from tempfile's drop guard
        let (file, path) = named.keep().map_err(|e| e.error)?;
        tracing::trace!("Created temp file {:?}", path);
        Ok(Box::new(StdTempFile { file, path }))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        sys::apply_mode(path, mode)
    }
}

// Platform-specific permission handling
cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        use unix as sys;
    } else {
        mod portable;
        use portable as sys;
    }
}

pub use sys::MODE_MASK;

// ============================================================================
// UNIT TESTS
// ============================================================================
