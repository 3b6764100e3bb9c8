//! Default values and the `ConfigFile::default()` implementation.

use super::file::config_directory;
use super::settings::*;
use crate::bridge::DEFAULT_REQUEST_CHANNEL_CAPACITY;
use crate::environment::DEFAULT_PRELOAD;

/// Default worker executable.
pub const DEFAULT_WORKER_PROGRAM: &str = "rvcat-worker";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "rvcat-bridge.log";

/// Default log directory name under the config directory.
pub const DEFAULT_LOG_DIR_NAME: &str = "logs";

/// Default request timeout in seconds (0 disables it).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 0;

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            request_channel_capacity: DEFAULT_REQUEST_CHANNEL_CAPACITY,
            request_timeout: None,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            program: DEFAULT_WORKER_PROGRAM.to_string(),
            args: Vec::new(),
            preload: DEFAULT_PRELOAD.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: config_directory().join(DEFAULT_LOG_DIR_NAME),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            bridge: BridgeSettings::default(),
            worker: WorkerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
