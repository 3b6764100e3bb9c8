//! Settings structs, one per `[section]` of the INI file.

use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// Bridge channel and request settings
    pub bridge: BridgeSettings,
    /// Worker process settings
    pub worker: WorkerSettings,
    /// Log file settings
    pub logging: LoggingSettings,
}

/// `[bridge]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Capacity of the request and reply channels
    pub request_channel_capacity: usize,
    /// Deadline for awaited requests; `None` waits indefinitely
    pub request_timeout: Option<Duration>,
}

/// `[worker]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Worker executable
    pub program: String,
    /// Arguments passed to the worker
    pub args: Vec<String>,
    /// Packages loaded right after initialization
    pub preload: Vec<String>,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Directory holding the log file
    pub directory: PathBuf,
    /// Log file name
    pub file: String,
}
