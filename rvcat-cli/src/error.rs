//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use rvcat_bridge::config::ConfigFileError;
use rvcat_bridge::error::{ChannelError, LifecycleError};
use rvcat_bridge::BridgeError;
use std::fmt;
use std::process;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to build the async runtime
    Runtime(std::io::Error),
    /// The worker did not become ready in time
    Startup(String),
    /// The environment failed to start or answer
    Bridge(BridgeError),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Bridge(BridgeError::Channel(ChannelError::Unavailable(_))) => {
                eprintln!();
                eprintln!("The RVCAT worker could not be started. Check that:");
                eprintln!("  1. [worker] program in the config file points to an executable");
                eprintln!("  2. The worker speaks JSON lines on stdin/stdout");
                eprintln!();
                eprintln!("Run 'rvcat-bridge config path' to locate the config file.");
            }
            CliError::Bridge(BridgeError::Channel(ChannelError::Closed)) => {
                eprintln!();
                eprintln!("The RVCAT worker exited before answering.");
                eprintln!("Run with --verbose to see the worker's stderr output.");
            }
            CliError::Startup(_) => {
                eprintln!();
                eprintln!("Run with --verbose to see the worker's stderr output.");
            }
            CliError::Bridge(e) if e.is_lifecycle(LifecycleError::Terminated) => {
                eprintln!();
                eprintln!("The session was shut down before the command finished.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Startup(msg) => write!(f, "Worker startup failed: {}", msg),
            CliError::Bridge(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Runtime(e) => Some(e),
            CliError::Bridge(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BridgeError> for CliError {
    fn from(e: BridgeError) -> Self {
        CliError::Bridge(e)
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}
