//! Transform-and-replace engine
//!
//! Executes a resolved [`Operation`]:
//!
//! 1. read the source window into memory
//! 2. apply the nibble transform in place
//! 3. write the buffer to a fresh temp file next to the destination
//! 4. optionally move the current destination to its backup name
//! 5. rename the temp file over the destination
//! 6. re-apply the source's permission bits
//!
//! The destination is not touched until the temp file holds the complete
//! new content. If the final rename fails, the temp file stays on disk.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::operation::{Operation, OperationRequest, TEMP_SUFFIX};
use crate::transform::{self, FillNibble, NibbleMode};
use nibclip_platform::{remove_if_exists, FileSystem, StdFileSystem, TempFile};
use serde::Serialize;
use std::ffi::OsStr;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Engine states, in execution order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Nothing started yet
    #[default]
    Idle,
    /// Reading the source window
    Reading,
    /// Applying the nibble transform
    Transforming,
    /// Writing the temp file
    WritingTemp,
    /// Moving the destination to its backup name
    BackingUp,
    /// Renaming the temp file over the destination
    Swapping,
    /// Applying permission bits
    Finalizing,
    /// Completed successfully
    Done,
    /// Terminated with an error
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Reading => "reading",
            Stage::Transforming => "transforming",
            Stage::WritingTemp => "writing temp",
            Stage::BackingUp => "backing up",
            Stage::Swapping => "swapping",
            Stage::Finalizing => "finalizing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Stage callback type
pub type StageCallback = Box<dyn Fn(Stage) + Send + Sync>;

/// Result of a completed operation
#[derive(Debug, Clone, Serialize)]
pub struct ReplaceReport {
    /// File that was read
    pub source: PathBuf,

    /// File now holding the result
    pub destination: PathBuf,

    /// Backup of the destination's prior content, if one was taken
    pub backup: Option<PathBuf>,

    /// Offset the window started at
    pub offset: u64,

    /// Bytes read from the source
    pub bytes_read: u64,

    /// Bytes written to the destination
    pub bytes_written: u64,

    /// Transform applied to each byte
    pub nibble_mode: NibbleMode,

    /// Fill nibble used by the transform
    pub fill: FillNibble,

    /// Permission bits applied to the destination
    pub mode_bits: u32,

    /// Total time elapsed
    pub elapsed: Duration,
}

/// Replace engine over a [`FileSystem`]
pub struct Engine<F: FileSystem = StdFileSystem> {
    fs: F,
    config: Config,
    stage_callback: Option<StageCallback>,
}

impl Engine<StdFileSystem> {
    /// Create an engine on the real file system with default configuration
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create an engine on the real file system with custom configuration
    pub fn with_config(config: Config) -> Self {
        Self::with_file_system(StdFileSystem::new(), config)
    }
}

impl Default for Engine<StdFileSystem> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileSystem> Engine<F> {
    /// Create an engine over a custom file system
    pub fn with_file_system(fs: F, config: Config) -> Self {
        Self {
            fs,
            config,
            stage_callback: None,
        }
    }

    /// Set a callback invoked on every stage transition
    pub fn on_stage<C>(mut self, callback: C) -> Self
    where
        C: Fn(Stage) + Send + Sync + 'static,
    {
        self.stage_callback = Some(Box::new(callback));
        self
    }

    /// Get the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the underlying file system
    pub fn file_system(&self) -> &F {
        &self.fs
    }

    /// Validate a request against this engine's file system and configuration
    pub fn resolve(&self, request: &OperationRequest) -> Result<Operation> {
        Operation::resolve(request, &self.config, &self.fs)
    }

    /// Run an operation to completion
    ///
    /// # Returns
    /// * `Ok(ReplaceReport)` - Destination holds the new content with source permissions
    /// * `Err(Error)` - See [`Error::category`] for what was left on disk
    pub fn execute(&self, operation: Operation) -> Result<ReplaceReport> {
        let result = self.execute_internal(&operation);
        match &result {
            Ok(_) => self.enter(Stage::Done),
            Err(e) => {
                tracing::debug!("Operation failed ({}): {}", e.category(), e);
                self.enter(Stage::Failed);
            }
        }
        result
    }

    fn execute_internal(&self, op: &Operation) -> Result<ReplaceReport> {
        let start_time = Instant::now();

        self.enter(Stage::Reading);
        let mut buffer = self.read_window(op)?;
        let bytes_read = buffer.len() as u64;

        self.enter(Stage::Transforming);
        transform::apply(&mut buffer, op.nibble_mode(), op.fill_nibble());

        self.enter(Stage::WritingTemp);
        let temp_path = self.write_temp(op, &buffer)?;
        let bytes_written = buffer.len() as u64;
        drop(buffer);

        if let Some(backup) = op.backup_path() {
            self.enter(Stage::BackingUp);
            if let Err(e) = self.back_up(op.destination_path(), backup) {
                self.discard_temp(&temp_path);
                return Err(e);
            }
        }

        self.enter(Stage::Swapping);
        self.swap(op, &temp_path)?;

        self.enter(Stage::Finalizing);
        let destination = op.destination_path();
        let mode = op.source_mode_bits();
        tracing::debug!("Setting file mode bits {:o} on {:?}", mode, destination);
        self.fs
            .set_mode(destination, mode)
            .map_err(|source| Error::PermissionApply {
                path: destination.to_path_buf(),
                mode,
                source,
            })?;

        let elapsed = start_time.elapsed();
        tracing::info!(
            "Wrote {} bytes to {:?} in {:?}",
            bytes_written,
            destination,
            elapsed
        );

        Ok(ReplaceReport {
            source: op.source_path().to_path_buf(),
            destination: destination.to_path_buf(),
            backup: op.backup_path().map(Path::to_path_buf),
            offset: op.read_offset(),
            bytes_read,
            bytes_written,
            nibble_mode: op.nibble_mode(),
            fill: op.fill_nibble(),
            mode_bits: mode,
            elapsed,
        })
    }

    fn enter(&self, stage: Stage) {
        tracing::trace!("Entering stage: {}", stage);
        if let Some(ref callback) = self.stage_callback {
            callback(stage);
        }
    }

    /// Read exactly `read_length` bytes at `read_offset`
    fn read_window(&self, op: &Operation) -> Result<Vec<u8>> {
        let path = op.source_path();
        let length = op.read_length();
        let read_err = |source: io::Error| Error::SourceRead {
            path: path.to_path_buf(),
            source,
        };

        let capacity = usize::try_from(length).map_err(|_| Error::BufferAllocation { bytes: length })?;
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(capacity)
            .map_err(|_| Error::BufferAllocation { bytes: length })?;

        let mut reader = self.fs.open_read(path).map_err(read_err)?;

        let offset = op.read_offset();
        if offset > 0 {
            tracing::debug!("Seeking to offset {:#x} in {:?}", offset, path);
            let position = reader.seek(SeekFrom::Start(offset)).map_err(read_err)?;
            if position != offset {
                return Err(read_err(io::Error::other(format!(
                    "seek to {offset:#x} landed at {position:#x}"
                ))));
            }
        }

        reader
            .take(length)
            .read_to_end(&mut buffer)
            .map_err(read_err)?;

        if buffer.len() as u64 != length {
            return Err(Error::TruncatedRead {
                path: path.to_path_buf(),
                expected: length,
                actual: buffer.len() as u64,
            });
        }

        tracing::info!("Read {} bytes from {:?}", buffer.len(), path);
        Ok(buffer)
    }

    /// Write the buffer to a new temp file and return its path
    fn write_temp(&self, op: &Operation, buffer: &[u8]) -> Result<PathBuf> {
        let dir = op.working_dir();
        let mut temp = self
            .fs
            .create_temp(&dir, &op.temp_prefix(), OsStr::new(TEMP_SUFFIX))
            .map_err(|source| Error::TempCreate {
                dir: dir.clone(),
                source,
            })?;
        let temp_path = temp.path().to_path_buf();
        tracing::debug!("Opened temp file {:?} for output", temp_path);

        let result = self.write_all_checked(temp.as_mut(), buffer, &temp_path);

        // Close the handle before the file is renamed or removed
        drop(temp);

        if let Err(e) = result {
            self.discard_temp(&temp_path);
            return Err(e);
        }
        Ok(temp_path)
    }

    fn write_all_checked(&self, temp: &mut dyn TempFile, buffer: &[u8], path: &Path) -> Result<()> {
        let write_err = |source: io::Error| Error::TempWrite {
            path: path.to_path_buf(),
            source,
        };

        tracing::debug!("Writing {} bytes to output", buffer.len());
        let mut written = 0;
        while written < buffer.len() {
            match temp.write(&buffer[written..]) {
                Ok(0) => {
                    return Err(Error::IncompleteWrite {
                        path: path.to_path_buf(),
                        expected: buffer.len(),
                        actual: written,
                    });
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(write_err(e)),
            }
        }

        temp.flush().map_err(write_err)?;
        if self.config.sync_temp {
            temp.sync().map_err(write_err)?;
        }
        Ok(())
    }

    /// Replace any old backup with the current destination
    fn back_up(&self, destination: &Path, backup: &Path) -> Result<()> {
        tracing::debug!("Pre-deleting old backup file: {:?}", backup);
        remove_if_exists(&self.fs, backup).map_err(|source| Error::StaleBackup {
            backup: backup.to_path_buf(),
            source,
        })?;

        tracing::info!("Renaming {:?} to {:?}", destination, backup);
        self.fs
            .rename(destination, backup)
            .map_err(|source| Error::Backup {
                destination: destination.to_path_buf(),
                backup: backup.to_path_buf(),
                source,
            })
    }

    /// Move the temp file over the destination
    fn swap(&self, op: &Operation, temp_path: &Path) -> Result<()> {
        let destination = op.destination_path();

        if !op.make_backup() && self.config.remove_before_swap {
            tracing::debug!("Pre-deleting {:?}", destination);
            if let Err(source) = remove_if_exists(&self.fs, destination) {
                self.discard_temp(temp_path);
                return Err(Error::StaleDestination {
                    destination: destination.to_path_buf(),
                    source,
                });
            }
        }

        tracing::debug!("Renaming temp file {:?} to {:?}", temp_path, destination);
        self.fs.rename(temp_path, destination).map_err(|source| {
            tracing::warn!("New content left in {:?} for manual recovery", temp_path);
            if let Some(backup) = op.backup_path() {
                tracing::warn!("Original content is in backup {:?}", backup);
            }
            Error::Swap {
                temp: temp_path.to_path_buf(),
                destination: destination.to_path_buf(),
                backup: op.backup_path().map(Path::to_path_buf),
                source,
            }
        })
    }

    /// Best-effort removal of a temp file after an earlier failure
    fn discard_temp(&self, temp_path: &Path) {
        tracing::debug!("Removing temp file {:?}", temp_path);
        if let Err(e) = remove_if_exists(&self.fs, temp_path) {
            tracing::warn!("Failed to remove temp file {:?}: {}", temp_path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizePolicy;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_keep_low_in_place_with_backup() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("f.bin");
        fs::write(&source, [0x3A; 8]).unwrap();

        let engine = Engine::new();
        let op = engine
            .resolve(
                &OperationRequest::new(&source)
                    .nibble_mode(NibbleMode::KeepLow)
                    .fill(0xF),
            )
            .unwrap();
        let report = engine.execute(op).unwrap();

        assert_eq!(fs::read(&source).unwrap(), vec![0xFA; 8]);
        assert_eq!(fs::read(dir.path().join("f.bin.bak")).unwrap(), vec![0x3A; 8]);
        assert_eq!(report.bytes_written, 8);
        assert_eq!(report.backup, Some(dir.path().join("f.bin.bak")));
        assert_eq!(entries(dir.path()), vec!["f.bin", "f.bin.bak"]);
    }

    #[test]
    fn test_stage_sequence_with_backup() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("f.bin");
        fs::write(&source, [1, 2, 3, 4]).unwrap();

        let stages = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&stages);
        let engine = Engine::new().on_stage(move |stage| recorded.lock().unwrap().push(stage));

        let op = engine.resolve(&OperationRequest::new(&source).size(2)).unwrap();
        engine.execute(op).unwrap();

        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                Stage::Reading,
                Stage::Transforming,
                Stage::WritingTemp,
                Stage::BackingUp,
                Stage::Swapping,
                Stage::Finalizing,
                Stage::Done,
            ]
        );
    }

    #[test]
    fn test_stage_sequence_without_backup() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("f.bin");
        fs::write(&source, [1, 2, 3, 4]).unwrap();

        let stages = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&stages);
        let engine = Engine::new().on_stage(move |stage| recorded.lock().unwrap().push(stage));

        let op = engine
            .resolve(&OperationRequest::new(&source).size(2).backup(false))
            .unwrap();
        engine.execute(op).unwrap();

        let stages = stages.lock().unwrap();
        assert!(!stages.contains(&Stage::BackingUp));
        assert_eq!(stages.last(), Some(&Stage::Done));
        assert_eq!(fs::read(&source).unwrap(), vec![1, 2]);
        assert_eq!(entries(dir.path()), vec!["f.bin"]);
    }

    #[test]
    fn test_stale_backup_replaced() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("f.bin");
        fs::write(&source, b"current").unwrap();
        fs::write(dir.path().join("f.bin.bak"), b"ancient").unwrap();

        let engine = Engine::new();
        let op = engine.resolve(&OperationRequest::new(&source).size(3)).unwrap();
        engine.execute(op).unwrap();

        assert_eq!(fs::read(&source).unwrap(), b"cur");
        assert_eq!(fs::read(dir.path().join("f.bin.bak")).unwrap(), b"current");
    }

    #[test]
    fn test_explicit_output_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("f.bin");
        let output = dir.path().join("out.bin");
        fs::write(&source, [0x3A; 8]).unwrap();
        fs::write(&output, b"old output content").unwrap();

        let engine = Engine::new();
        let op = engine
            .resolve(
                &OperationRequest::new(&source)
                    .nibble_mode(NibbleMode::ShiftHighToLow)
                    .offset(2)
                    .size(4)
                    .output(&output),
            )
            .unwrap();
        let report = engine.execute(op).unwrap();

        assert_eq!(fs::read(&output).unwrap(), vec![0x03; 4]);
        assert_eq!(fs::read(&source).unwrap(), vec![0x3A; 8]);
        assert!(report.backup.is_none());
        assert_eq!(entries(dir.path()), vec!["f.bin", "out.bin"]);
    }

    #[test]
    fn test_rename_over_without_pre_delete() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("f.bin");
        let output = dir.path().join("out.bin");
        fs::write(&source, [7; 4]).unwrap();
        fs::write(&output, b"old").unwrap();

        let engine = Engine::with_config(Config::new().remove_before_swap(false));
        let op = engine
            .resolve(&OperationRequest::new(&source).size(4).output(&output))
            .unwrap();
        engine.execute(op).unwrap();

        assert_eq!(fs::read(&output).unwrap(), vec![7; 4]);
    }

    #[test]
    fn test_empty_window_still_replaces() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("f.bin");
        fs::write(&source, [1, 2, 3]).unwrap();

        let engine = Engine::new();
        let op = engine.resolve(&OperationRequest::new(&source).offset(3)).unwrap();
        let report = engine.execute(op).unwrap();

        assert_eq!(report.bytes_written, 0);
        assert!(fs::read(&source).unwrap().is_empty());
        assert_eq!(fs::read(dir.path().join("f.bin.bak")).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_source_shrunk_after_resolve() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("f.bin");
        fs::write(&source, [0u8; 16]).unwrap();

        let engine = Engine::new();
        let op = engine.resolve(&OperationRequest::new(&source).size(16)).unwrap();
        fs::write(&source, [0u8; 10]).unwrap();

        let result = engine.execute(op);
        assert!(matches!(
            result,
            Err(Error::TruncatedRead {
                expected: 16,
                actual: 10,
                ..
            })
        ));
        assert_eq!(entries(dir.path()), vec!["f.bin"]);
    }

    #[test]
    fn test_missing_output_dir_fails_before_touching_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("f.bin");
        fs::write(&source, [5u8; 4]).unwrap();

        let engine = Engine::new();
        let op = engine
            .resolve(
                &OperationRequest::new(&source)
                    .size(4)
                    .output(dir.path().join("missing").join("out.bin")),
            )
            .unwrap();
        let err = engine.execute(op).unwrap_err();

        assert!(matches!(err, Error::TempCreate { .. }));
        assert_eq!(fs::read(&source).unwrap(), vec![5u8; 4]);
    }

    #[test]
    fn test_power_of_two_policy_clip() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("rom.bin");
        fs::write(&source, (0..=255u8).collect::<Vec<_>>()).unwrap();

        let engine =
            Engine::with_config(Config::new().size_policy(SizePolicy::power_of_two(32, 1024)));
        let op = engine.resolve(&OperationRequest::new(&source).size(64)).unwrap();
        engine.execute(op).unwrap();

        assert_eq!(fs::read(&source).unwrap(), (0..64u8).collect::<Vec<_>>());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::WritingTemp.to_string(), "writing temp");
        assert_eq!(Stage::default(), Stage::Idle);
    }
}
