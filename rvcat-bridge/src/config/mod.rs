//! Configuration file for the bridge, the worker process and logging.
//!
//! Settings are read from `~/.rvcat/config.ini`. Missing files and missing
//! keys fall back to defaults; present but invalid values are errors.
//!
//! ```ini
//! [bridge]
//! request_channel_capacity = 1000
//! request_timeout = 0
//!
//! [worker]
//! program = rvcat-worker
//! args =
//! preload = numpy, rvcat-0.1-py3-none-any.whl
//!
//! [logging]
//! directory = ~/.rvcat/logs
//! file = rvcat-bridge.log
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{BridgeSettings, ConfigFile, LoggingSettings, WorkerSettings};
