//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show` and `config init` for inspecting
//! and creating the configuration file.

use clap::Subcommand;
use rvcat_bridge::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the effective configuration (file values over defaults)
    Show,

    /// Create the configuration file with default values
    ///
    /// Leaves an existing file untouched.
    Init,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(),
        ConfigCommands::Show => run_show(),
        ConfigCommands::Init => run_init(),
    }
}

/// Show the configuration file path.
fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

/// Print every setting grouped by section.
fn run_show() -> Result<(), CliError> {
    let config = ConfigFile::load()?;

    println!("Configuration Settings");
    println!("======================");
    println!();

    let timeout = match config.bridge.request_timeout {
        Some(t) => format!("{}s", t.as_secs()),
        None => "(none)".to_string(),
    };

    println!("[bridge]");
    println!(
        "  request_channel_capacity = {}",
        config.bridge.request_channel_capacity
    );
    println!("  request_timeout = {}", timeout);
    println!();

    println!("[worker]");
    println!("  program = {}", config.worker.program);
    println!("  args = {}", display_list(&config.worker.args, " "));
    println!("  preload = {}", display_list(&config.worker.preload, ", "));
    println!();

    println!("[logging]");
    println!("  directory = {}", config.logging.directory.display());
    println!("  file = {}", config.logging.file);

    Ok(())
}

/// Write a default configuration file if none exists.
fn run_init() -> Result<(), CliError> {
    let path = config_file_path();
    if path.exists() {
        println!("Configuration file already exists: {}", path.display());
        return Ok(());
    }

    let path = ConfigFile::ensure_exists()?;
    println!("Created configuration file: {}", path.display());
    Ok(())
}

fn display_list(items: &[String], separator: &str) -> String {
    if items.is_empty() {
        "(not set)".to_string()
    } else {
        items.join(separator)
    }
}
