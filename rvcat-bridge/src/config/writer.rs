//! INI serialization logic for converting `ConfigFile` → INI string.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let request_timeout = config
        .bridge
        .request_timeout
        .map(|t| t.as_secs())
        .unwrap_or(0);

    format!(
        r#"[bridge]
; Capacity of the request and reply channels (default: 1000)
; Sends fail immediately with "channel full" once this many requests are queued
request_channel_capacity = {}
; Seconds to wait for a reply before giving up (default: 0 = wait forever)
request_timeout = {}

[worker]
; Worker executable speaking JSON lines on stdin/stdout
program = {}
; Arguments passed to the worker, separated by spaces
args = {}
; Packages loaded after initialization, separated by commas
; Leave empty to skip preloading
preload = {}

[logging]
; Directory for the log file
directory = {}
; Log file name
file = {}
"#,
        config.bridge.request_channel_capacity,
        request_timeout,
        config.worker.program,
        config.worker.args.join(" "),
        config.worker.preload.join(", "),
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
