//! Clip command - transforms a file and swaps the result into place
//!
//! Builds the runtime configuration from settings plus command-line
//! overrides, resolves the request, and runs the engine.

use anyhow::Result;
use humansize::{format_size, BINARY};
use std::path::PathBuf;

use nibclip_core::{Config, Engine, NibbleMode, OperationRequest, ReplaceReport, Settings};

/// Arguments for the clip command
pub struct ClipArgs {
    pub source: PathBuf,
    pub output: Option<PathBuf>,
    pub offset: Option<u64>,
    pub size: Option<u64>,
    pub nibble_mode: NibbleMode,
    pub fill: u8,
    pub no_backup: bool,
    pub backup_suffix: Option<String>,
    pub power_of_two: bool,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub json: bool,
    pub settings: Settings,
}

/// Execute the clip command
pub fn execute(args: ClipArgs) -> Result<()> {
    let config = build_config(&args);
    let request = build_request(&args);

    let engine = Engine::with_config(config);
    let operation = engine.resolve(&request)?;

    if request.output.is_none() {
        tracing::info!("Defaulting output file to: {}", operation.destination_path().display());
    }
    tracing::debug!(
        "Processing {} bytes at offset {:#x} ({} mode, fill {:#x})",
        operation.read_length(),
        operation.read_offset(),
        operation.nibble_mode(),
        operation.fill_nibble().value()
    );

    let report = engine.execute(operation)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        log_summary(&report);
    }

    Ok(())
}

/// Settings with command-line overrides applied
fn build_config(args: &ClipArgs) -> Config {
    let mut config = args.settings.to_config();

    if let Some(ref suffix) = args.backup_suffix {
        config.backup_suffix.clone_from(suffix);
    }
    if args.power_of_two {
        config.size_policy = config.size_policy.enforce_power_of_two(true);
    }
    if let Some(min) = args.min_size {
        config.size_policy = config.size_policy.min_size(min);
    }
    if let Some(max) = args.max_size {
        config.size_policy = config.size_policy.max_size(max);
    }

    config
}

fn build_request(args: &ClipArgs) -> OperationRequest {
    OperationRequest {
        source: args.source.clone(),
        output: args.output.clone(),
        offset: args.offset,
        size: args.size,
        nibble_mode: args.nibble_mode,
        fill: args.fill,
        backup: args.settings.backup.enabled && !args.no_backup,
    }
}

fn log_summary(report: &ReplaceReport) {
    tracing::info!(
        "{} -> {}: {} written",
        report.source.display(),
        report.destination.display(),
        format_size(report.bytes_written, BINARY)
    );
    if let Some(ref backup) = report.backup {
        tracing::info!("Original kept in {}", backup.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ClipArgs {
        ClipArgs {
            source: PathBuf::from("f.bin"),
            output: None,
            offset: None,
            size: None,
            nibble_mode: NibbleMode::KeepLow,
            fill: 0xF,
            no_backup: false,
            backup_suffix: None,
            power_of_two: false,
            min_size: None,
            max_size: None,
            json: false,
            settings: Settings::default(),
        }
    }

    #[test]
    fn test_defaults_follow_settings() {
        let config = build_config(&args());
        assert_eq!(config, Settings::default().to_config());

        let request = build_request(&args());
        assert!(request.backup);
        assert_eq!(request.fill, 0xF);
        assert_eq!(request.nibble_mode, NibbleMode::KeepLow);
    }

    #[test]
    fn test_no_backup_flag() {
        let mut a = args();
        a.no_backup = true;
        assert!(!build_request(&a).backup);
    }

    #[test]
    fn test_backup_disabled_in_settings() {
        let mut a = args();
        a.settings.backup.enabled = false;
        assert!(!build_request(&a).backup);
    }

    #[test]
    fn test_policy_overrides() {
        let mut a = args();
        a.power_of_two = true;
        a.min_size = Some(32);
        a.max_size = Some(1024);
        a.backup_suffix = Some(".orig".to_string());

        let config = build_config(&a);
        assert!(config.size_policy.enforce_power_of_two);
        assert_eq!(config.size_policy.min_size, 32);
        assert_eq!(config.size_policy.max_size, 1024);
        assert_eq!(config.backup_suffix, ".orig");
    }
}
