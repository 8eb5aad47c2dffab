//! Nibclip - clip binary files and reduce their bytes to nibbles
//!
//! # Usage
//!
//! ```bash
//! # Keep the low nibble of every byte in place, high nibble forced to 0xF
//! nibclip -l -f 0xF rom.bin
//!
//! # Move the high nibble down, clipping 4 bytes at offset 2 into a new file
//! nibclip -H -s 2 -t 4 -o out.bin rom.bin
//!
//! # Clip the first 1K without transforming and without a backup
//! nibclip -t 1K -n rom.bin
//! ```

use anyhow::Result;
use clap::{ArgAction, CommandFactory, Parser};
use clap_complete::{generate, Shell};
use console::style;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use nibclip_core::{ErrorCategory, NibbleMode, Settings};

mod commands;
mod numbers;

/// Nibclip - clip binary files and reduce their bytes to nibbles
#[derive(Parser)]
#[command(name = "nibclip")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// File to process
    #[arg(
        value_name = "FILE",
        required_unless_present_any = ["print_config", "init_config", "completions"]
    )]
    file: Option<PathBuf>,

    /// Value of the nibble that is not kept (0..=15)
    #[arg(short, long, default_value = "0", value_parser = numbers::parse_fill)]
    fill: u8,

    /// Keep the low nibble of every byte
    #[arg(short, long, conflicts_with = "high")]
    low: bool,

    /// Move the high nibble of every byte into the low nibble
    #[arg(short = 'H', long)]
    high: bool,

    /// Do not keep a backup of the original file
    #[arg(short, long)]
    no_backup: bool,

    /// Write the result here instead of replacing FILE
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Start reading at this offset
    #[arg(short = 's', long, value_parser = numbers::parse_size)]
    offset: Option<u64>,

    /// Number of bytes to process (default: to end of file)
    #[arg(short = 't', long, value_parser = numbers::parse_size)]
    size: Option<u64>,

    /// Suffix for the backup file
    #[arg(long, value_name = "SUFFIX")]
    backup_suffix: Option<String>,

    /// Only accept power-of-two sizes
    #[arg(long)]
    power_of_two: bool,

    /// Smallest accepted size
    #[arg(long, value_name = "SIZE", value_parser = numbers::parse_size)]
    min_size: Option<u64>,

    /// Largest accepted size
    #[arg(long, value_name = "SIZE", value_parser = numbers::parse_size)]
    max_size: Option<u64>,

    /// Print a JSON report of the run on stdout
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Suppress all log output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Settings file to use instead of the default location
    #[arg(long, value_name = "FILE", env = "NIBCLIP_CONFIG")]
    config: Option<PathBuf>,

    /// Print the effective settings and exit
    #[arg(long)]
    print_config: bool,

    /// Write a default settings file and exit
    #[arg(long)]
    init_config: bool,

    /// Generate shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

impl Cli {
    fn nibble_mode(&self) -> NibbleMode {
        if self.low {
            NibbleMode::KeepLow
        } else if self.high {
            NibbleMode::ShiftHighToLow
        } else {
            NibbleMode::None
        }
    }

    fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Settings::config_path)
    }
}

fn main() {
    // Set up panic handler for nicer error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{} {}", style("Error:").red().bold(), panic_info);
    }));

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and succeed; usage errors exit 1
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if let Err(e) = run(cli) {
        report_error(&e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.quiet);

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(shell, &mut cmd, name, &mut std::io::stdout());
        return Ok(());
    }

    let config_path = cli.config_path();

    if cli.print_config {
        return commands::config::print(config_path);
    }
    if cli.init_config {
        return commands::config::init(config_path);
    }

    let settings = Settings::load_from_path(config_path);
    let nibble_mode = cli.nibble_mode();
    let Some(source) = cli.file else {
        anyhow::bail!("No input file given");
    };

    commands::clip::execute(commands::clip::ClipArgs {
        source,
        output: cli.output,
        offset: cli.offset,
        size: cli.size,
        nibble_mode,
        fill: cli.fill,
        no_backup: cli.no_backup,
        backup_suffix: cli.backup_suffix,
        power_of_two: cli.power_of_two,
        min_size: cli.min_size,
        max_size: cli.max_size,
        json: cli.json,
        settings,
    })
}

fn init_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("off")
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn report_error(e: &anyhow::Error) {
    let core = e.downcast_ref::<nibclip_core::Error>();

    if core.is_some_and(|err| err.content_committed()) {
        eprintln!("{} {}", style("Warning:").yellow().bold(), e);
    } else {
        eprintln!("{} {}", style("Error:").red().bold(), e);
    }

    if let Some(temp) = core.and_then(|err| err.retained_temp()) {
        eprintln!(
            "  {} transformed data left in {}",
            style("Note:").cyan(),
            temp.display()
        );
    }
    if core.is_some_and(|err| err.category() == ErrorCategory::Validation) {
        eprintln!("Run with --help for usage.");
    }

    // Show cause chain in verbose mode
    if std::env::var("RUST_BACKTRACE").is_ok() {
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  {} {}", style("Caused by:").yellow(), cause);
            source = cause.source();
        }
    }
}
