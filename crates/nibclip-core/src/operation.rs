//! Operation resolution
//!
//! Turns raw user parameters ([`OperationRequest`]) into a validated,
//! immutable [`Operation`]. All checks that can reject a run happen here,
//! before the engine opens or creates anything:
//!
//! - fill nibble range, zero sizes and the "nothing to do" case
//! - backup suffix and destination naming
//! - offset and length against the source's actual size
//! - the configured [`SizePolicy`](crate::config::SizePolicy)

use crate::config::Config;
use crate::error::{Error, Result, ValidationError};
use crate::transform::{FillNibble, NibbleMode};
use nibclip_platform::{FileSystem, TEMP_RAND_LEN};
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};

/// Suffix of temporary working files
pub const TEMP_SUFFIX: &str = ".tmp";

/// Raw parameters as supplied by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    /// File to read
    pub source: PathBuf,

    /// Explicit output path; `None` transforms the source in place
    pub output: Option<PathBuf>,

    /// Byte offset to start reading at
    pub offset: Option<u64>,

    /// Number of bytes to keep
    pub size: Option<u64>,

    /// Nibble transform
    pub nibble_mode: NibbleMode,

    /// Fill value for the discarded nibble (validated during resolution)
    pub fill: u8,

    /// Keep a backup of the original (in-place mode only)
    pub backup: bool,
}

impl OperationRequest {
    /// Create a request for `source` with backups enabled and nothing else set
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: None,
            offset: None,
            size: None,
            nibble_mode: NibbleMode::None,
            fill: 0,
            backup: true,
        }
    }

    /// Set the output path
    pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Set the read offset
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Set the clip size
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the nibble mode
    pub fn nibble_mode(mut self, mode: NibbleMode) -> Self {
        self.nibble_mode = mode;
        self
    }

    /// Set the fill value
    pub fn fill(mut self, fill: u8) -> Self {
        self.fill = fill;
        self
    }

    /// Enable or disable the backup
    pub fn backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }
}

/// A validated transform-and-replace job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    source_path: PathBuf,
    destination_path: PathBuf,
    read_offset: u64,
    read_length: u64,
    nibble_mode: NibbleMode,
    fill_nibble: FillNibble,
    backup_path: Option<PathBuf>,
    source_mode_bits: u32,
}

impl Operation {
    /// Validate `request` against the source on `fs`
    pub fn resolve<F>(request: &OperationRequest, config: &Config, fs: &F) -> Result<Self>
    where
        F: FileSystem + ?Sized,
    {
        let fill_nibble = FillNibble::new(request.fill)?;

        if request.size == Some(0) {
            return Err(ValidationError::InvalidSize {
                size: 0,
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }

        let offset = request.offset.unwrap_or(0);
        if !request.nibble_mode.is_active() && request.size.is_none() && offset == 0 {
            return Err(ValidationError::NothingToDo.into());
        }

        let destination_path = request
            .output
            .clone()
            .unwrap_or_else(|| request.source.clone());
        let destination_name = destination_path.file_name().ok_or_else(|| {
            ValidationError::InvalidConfiguration(format!(
                "output path {} has no file name",
                destination_path.display()
            ))
        })?;
        if is_working_name(destination_name) {
            return Err(ValidationError::InvalidConfiguration(format!(
                "output path {} uses the temporary working file naming pattern",
                destination_path.display()
            ))
            .into());
        }

        // Backups only protect the implicit in-place case
        let backup_path = if request.output.is_none() && request.backup {
            let backup = backup_path_for(&destination_path, &config.backup_suffix)?;
            Some(backup)
        } else {
            None
        };

        tracing::debug!("Checking on input file: {:?}", request.source);
        let stat = fs.stat(&request.source).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::SourceNotFound {
                    path: request.source.clone(),
                    source: e,
                }
            } else {
                Error::SourceUnreadable {
                    path: request.source.clone(),
                    source: e,
                }
            }
        })?;
        if !stat.is_file {
            return Err(Error::SourceUnreadable {
                path: request.source.clone(),
                source: io::Error::other("not a regular file"),
            });
        }

        if request.output.is_some() {
            match fs.stat(&destination_path) {
                Ok(dest) if dest.is_dir => {
                    return Err(ValidationError::InvalidConfiguration(format!(
                        "output path {} is a directory",
                        destination_path.display()
                    ))
                    .into());
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("Could not stat output {:?}: {}", destination_path, e);
                }
            }
        }

        if offset > stat.len {
            return Err(ValidationError::InvalidOffset {
                offset,
                source_size: stat.len,
            }
            .into());
        }
        let read_length = request.size.unwrap_or(stat.len - offset);
        let in_bounds = offset
            .checked_add(read_length)
            .is_some_and(|end| end <= stat.len);
        if !in_bounds {
            return Err(ValidationError::SourceTooSmall {
                offset,
                length: read_length,
                source_size: stat.len,
            }
            .into());
        }

        config.size_policy.check(read_length)?;
        if usize::try_from(read_length).is_err() {
            return Err(ValidationError::InvalidSize {
                size: read_length,
                reason: "does not fit in memory on this platform".to_string(),
            }
            .into());
        }

        Ok(Self {
            source_path: request.source.clone(),
            destination_path,
            read_offset: offset,
            read_length,
            nibble_mode: request.nibble_mode,
            fill_nibble,
            backup_path,
            source_mode_bits: stat.mode,
        })
    }

    /// File to read
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// File that ends up holding the result
    pub fn destination_path(&self) -> &Path {
        &self.destination_path
    }

    /// Whether source and destination are the same path
    pub fn is_in_place(&self) -> bool {
        self.source_path == self.destination_path
    }

    /// Byte offset into the source
    pub fn read_offset(&self) -> u64 {
        self.read_offset
    }

    /// Number of bytes to read and write
    pub fn read_length(&self) -> u64 {
        self.read_length
    }

    /// Nibble transform
    pub fn nibble_mode(&self) -> NibbleMode {
        self.nibble_mode
    }

    /// Fill nibble
    pub fn fill_nibble(&self) -> FillNibble {
        self.fill_nibble
    }

    /// Whether the destination's prior content is kept as a backup
    pub fn make_backup(&self) -> bool {
        self.backup_path.is_some()
    }

    /// Backup name, when a backup is made
    pub fn backup_path(&self) -> Option<&Path> {
        self.backup_path.as_deref()
    }

    /// Permission bits captured from the source
    pub fn source_mode_bits(&self) -> u32 {
        self.source_mode_bits
    }

    /// Directory the temp file is created in (the destination's directory)
    pub fn working_dir(&self) -> PathBuf {
        match self.destination_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Prefix of the temp file name: `.{destination name}.`
    pub fn temp_prefix(&self) -> OsString {
        let mut prefix = OsString::from(".");
        if let Some(name) = self.destination_path.file_name() {
            prefix.push(name);
        }
        prefix.push(".");
        prefix
    }
}

/// `{destination}{suffix}`, rejecting suffixes that would not name a sibling file
fn backup_path_for(destination: &Path, suffix: &str) -> Result<PathBuf> {
    if suffix.is_empty() {
        return Err(ValidationError::InvalidConfiguration(
            "backup suffix is empty, backup would overwrite the output".to_string(),
        )
        .into());
    }
    if suffix.contains('/') || suffix.contains(std::path::MAIN_SEPARATOR) {
        return Err(ValidationError::InvalidConfiguration(format!(
            "backup suffix {suffix:?} contains a path separator"
        ))
        .into());
    }

    let mut name = destination.as_os_str().to_owned();
    name.push(suffix);
    let backup = PathBuf::from(name);
    if backup == destination {
        return Err(ValidationError::InvalidConfiguration(format!(
            "backup path {} equals the output path",
            backup.display()
        ))
        .into());
    }
    Ok(backup)
}

/// Whether `name` matches `.{name}.{random}.tmp`
fn is_working_name(name: &OsStr) -> bool {
    let Some(name) = name.to_str() else {
        return false;
    };
    let Some(stem) = name.strip_suffix(TEMP_SUFFIX) else {
        return false;
    };
    let Some((prefix, random)) = stem.rsplit_once('.') else {
        return false;
    };
    prefix.len() > 1
        && prefix.starts_with('.')
        && random.len() == TEMP_RAND_LEN
        && random.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizePolicy;
    use nibclip_platform::StdFileSystem;
    use std::fs;
    use tempfile::TempDir;

    fn source_file(dir: &TempDir, len: usize) -> PathBuf {
        let path = dir.path().join("f.bin");
        fs::write(&path, vec![0x3A; len]).unwrap();
        path
    }

    fn resolve(request: &OperationRequest) -> Result<Operation> {
        Operation::resolve(request, &Config::default(), &StdFileSystem::new())
    }

    #[test]
    fn test_defaults_to_remaining_length() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 16);

        let op = resolve(&OperationRequest::new(&source).offset(4)).unwrap();
        assert_eq!(op.read_offset(), 4);
        assert_eq!(op.read_length(), 12);
        assert!(op.is_in_place());
        assert_eq!(op.destination_path(), source);
    }

    #[test]
    fn test_in_place_backup_path() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 8);

        let op =
            resolve(&OperationRequest::new(&source).nibble_mode(NibbleMode::KeepLow)).unwrap();
        assert!(op.make_backup());
        assert_eq!(op.backup_path(), Some(dir.path().join("f.bin.bak").as_path()));
    }

    #[test]
    fn test_no_backup_when_suppressed_or_explicit_output() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 8);

        let op = resolve(
            &OperationRequest::new(&source)
                .nibble_mode(NibbleMode::KeepLow)
                .backup(false),
        )
        .unwrap();
        assert!(!op.make_backup());

        let op = resolve(
            &OperationRequest::new(&source)
                .nibble_mode(NibbleMode::KeepLow)
                .output(dir.path().join("out.bin")),
        )
        .unwrap();
        assert!(!op.make_backup());
        assert!(!op.is_in_place());
    }

    #[test]
    fn test_invalid_fill() {
        let result = resolve(
            &OperationRequest::new("does-not-matter.bin")
                .nibble_mode(NibbleMode::KeepLow)
                .fill(16),
        );
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::InvalidFillValue(16)))
        ));
    }

    #[test]
    fn test_nothing_to_do() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 8);

        for request in [
            OperationRequest::new(&source),
            OperationRequest::new(&source).offset(0),
            OperationRequest::new(&source).fill(3),
        ] {
            assert!(matches!(
                resolve(&request),
                Err(Error::Validation(ValidationError::NothingToDo))
            ));
        }
    }

    #[test]
    fn test_zero_size_rejected() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 8);
        assert!(matches!(
            resolve(&OperationRequest::new(&source).size(0)),
            Err(Error::Validation(ValidationError::InvalidSize { size: 0, .. }))
        ));
    }

    #[test]
    fn test_offset_past_end() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 8);
        assert!(matches!(
            resolve(&OperationRequest::new(&source).offset(9)),
            Err(Error::Validation(ValidationError::InvalidOffset {
                offset: 9,
                source_size: 8
            }))
        ));
    }

    #[test]
    fn test_window_past_end() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 8);

        assert!(resolve(&OperationRequest::new(&source).offset(4).size(4)).is_ok());
        assert!(matches!(
            resolve(&OperationRequest::new(&source).offset(4).size(5)),
            Err(Error::Validation(ValidationError::SourceTooSmall { .. }))
        ));
        assert!(matches!(
            resolve(&OperationRequest::new(&source).offset(1).size(u64::MAX)),
            Err(Error::Validation(ValidationError::SourceTooSmall { .. }))
        ));
    }

    #[test]
    fn test_offset_at_end_resolves_empty_window() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 8);
        let op = resolve(&OperationRequest::new(&source).offset(8)).unwrap();
        assert_eq!(op.read_length(), 0);
    }

    #[test]
    fn test_size_policy_applies_to_resolved_length() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 48);
        let config = Config::new().size_policy(SizePolicy::power_of_two(32, 1024));
        let fs_ops = StdFileSystem::new();

        let result = Operation::resolve(
            &OperationRequest::new(&source).nibble_mode(NibbleMode::KeepLow),
            &config,
            &fs_ops,
        );
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::InvalidSize { size: 48, .. }))
        ));

        let op = Operation::resolve(&OperationRequest::new(&source).size(32), &config, &fs_ops)
            .unwrap();
        assert_eq!(op.read_length(), 32);
    }

    #[test]
    fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let result = resolve(&OperationRequest::new(dir.path().join("missing.bin")).size(1));
        assert!(matches!(result, Err(Error::SourceNotFound { .. })));
    }

    #[test]
    fn test_source_is_directory() {
        let dir = TempDir::new().unwrap();
        let result = resolve(&OperationRequest::new(dir.path()).size(1));
        assert!(matches!(result, Err(Error::SourceUnreadable { .. })));
    }

    #[test]
    fn test_output_is_directory() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 8);
        let out_dir = dir.path().join("out");
        fs::create_dir(&out_dir).unwrap();

        let result = resolve(&OperationRequest::new(&source).size(4).output(&out_dir));
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::InvalidConfiguration(_)))
        ));
    }

    #[test]
    fn test_empty_backup_suffix_rejected() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 8);
        let config = Config::new().backup_suffix("");

        let result = Operation::resolve(
            &OperationRequest::new(&source).size(4),
            &config,
            &StdFileSystem::new(),
        );
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::InvalidConfiguration(_)))
        ));

        // Without a backup the suffix is irrelevant
        let result = Operation::resolve(
            &OperationRequest::new(&source).size(4).backup(false),
            &config,
            &StdFileSystem::new(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_backup_suffix_with_separator_rejected() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 8);
        let config = Config::new().backup_suffix("/../x");
        let result = Operation::resolve(
            &OperationRequest::new(&source).size(4),
            &config,
            &StdFileSystem::new(),
        );
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::InvalidConfiguration(_)))
        ));
    }

    #[test]
    fn test_output_named_like_working_file_rejected() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 8);
        let result = resolve(
            &OperationRequest::new(&source)
                .size(4)
                .output(dir.path().join(".out.bin.a1B2c3.tmp")),
        );
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::InvalidConfiguration(_)))
        ));
    }

    #[test]
    fn test_working_name_pattern() {
        assert!(is_working_name(OsStr::new(".f.bin.Ab12Zz.tmp")));
        assert!(!is_working_name(OsStr::new("f.bin.tmp")));
        assert!(!is_working_name(OsStr::new(".f.bin.tmp")));
        assert!(!is_working_name(OsStr::new(".f.bin.abc.tmp")));
        assert!(!is_working_name(OsStr::new("..Ab12Zz.tmp")));
    }

    #[test]
    fn test_working_dir_and_prefix() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 8);
        let op = resolve(&OperationRequest::new(&source).size(8)).unwrap();
        assert_eq!(op.working_dir(), dir.path());
        assert_eq!(op.temp_prefix(), OsString::from(".f.bin."));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_source_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 8);
        fs::set_permissions(&source, fs::Permissions::from_mode(0o640)).unwrap();

        let op = resolve(&OperationRequest::new(&source).size(8)).unwrap();
        assert_eq!(op.source_mode_bits(), 0o640);
    }
}
