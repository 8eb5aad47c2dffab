//! # Nibclip Core
//!
//! Core library for nibclip: clip a binary file to a window, optionally reduce
//! every byte to one nibble, and replace the target file atomically.
//!
//! ## Modules
//!
//! - `operation`: Validates user parameters into an immutable `Operation`
//! - `engine`: Read, transform, write temp, back up, swap and finalize
//! - `transform`: Per-byte nibble transforms
//! - `error`: Error types and result aliases
//! - `config`: Runtime configuration and size policy
//! - `settings`: Persistent user settings from configuration file
//!
//! ## Example
//!
//! ```no_run
//! use nibclip_core::{Engine, NibbleMode, OperationRequest};
//!
//! let engine = Engine::new();
//! let request = OperationRequest::new("rom.bin")
//!     .nibble_mode(NibbleMode::KeepLow)
//!     .fill(0xF);
//!
//! let operation = engine.resolve(&request)?;
//! let report = engine.execute(operation)?;
//! println!("Wrote {} bytes to {:?}", report.bytes_written, report.destination);
//! # Ok::<(), nibclip_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod operation;
pub mod settings;
pub mod transform;

pub use config::{Config, SizePolicy, DEFAULT_BACKUP_SUFFIX, DEFAULT_MAX_SIZE};
pub use engine::{Engine, ReplaceReport, Stage, StageCallback};
pub use error::{Error, ErrorCategory, Result, ValidationError};
pub use operation::{Operation, OperationRequest, TEMP_SUFFIX};
pub use settings::{BackupSettings, Settings, SettingsError, SwapSettings};
pub use transform::{transform_byte, FillNibble, NibbleMode};
