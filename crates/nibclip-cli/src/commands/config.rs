//! Configuration file management

use anyhow::{Context, Result};
use console::style;
use nibclip_core::Settings;
use std::path::PathBuf;

/// Print the effective settings as TOML
pub fn print(config_path: Option<PathBuf>) -> Result<()> {
    let exists = config_path.as_ref().is_some_and(|p| p.exists());
    let settings = Settings::load_from_path(config_path.clone());

    match &config_path {
        Some(path) if exists => println!("# Config file: {}", path.display()),
        Some(path) => println!("# Config file: {} (not found, using defaults)", path.display()),
        None => println!("# No config directory available, using defaults"),
    }

    let rendered = settings
        .to_toml_string()
        .context("Failed to render settings")?;
    print!("{}", rendered);
    Ok(())
}

/// Write a configuration file with default values
pub fn init(config_path: Option<PathBuf>) -> Result<()> {
    let path = config_path.context("No configuration directory on this platform; pass --config <FILE>")?;

    if path.exists() {
        eprintln!(
            "{} Settings file {} already exists, leaving it unchanged",
            style("Warning:").yellow(),
            path.display()
        );
                return Ok(());
    }

    let saved_path = Settings::default()
        .save_to_path(Some(path))
        .context("Failed to write settings file")?;

    println!(
        "{} Created configuration file at: {}",
        style("Success:").green(),
        saved_path.display()
    );
    println!();
    println!("Common overrides:");
    println!();
    println!("  [size_policy]");
    println!("  enforce_power_of_two = true   # Only accept power-of-two sizes");
    println!("  min_size = 32");
    println!("  max_size = 1024");
    println!();
    println!("  [backup]");
    println!("  suffix = \".orig\"              # Backup name suffix");

    Ok(())
}
