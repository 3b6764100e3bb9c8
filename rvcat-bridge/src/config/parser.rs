//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;
use std::time::Duration;

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [bridge] section
    if let Some(section) = ini.section(Some("bridge")) {
        if let Some(v) = section.get("request_channel_capacity") {
            let capacity = parse_number("bridge", "request_channel_capacity", v)?;
            if capacity == 0 {
                return Err(invalid(
                    "bridge",
                    "request_channel_capacity",
                    v,
                    "must be at least 1",
                ));
            }
            config.bridge.request_channel_capacity = capacity as usize;
        }
        if let Some(v) = section.get("request_timeout") {
            let secs = parse_number("bridge", "request_timeout", v)?;
            config.bridge.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
    }

    // [worker] section
    if let Some(section) = ini.section(Some("worker")) {
        if let Some(v) = section.get("program") {
            let v = v.trim();
            if v.is_empty() {
                return Err(invalid("worker", "program", v, "must not be empty"));
            }
            config.worker.program = v.to_string();
        }
        if let Some(v) = section.get("args") {
            config.worker.args = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = section.get("preload") {
            config.worker.preload = parse_list(v);
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if v.is_empty() || v.contains(['/', '\\']) {
                return Err(invalid(
                    "logging",
                    "file",
                    v,
                    "must be a plain file name",
                ));
            }
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number(section: &str, key: &str, value: &str) -> Result<u64, ConfigFileError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| invalid(section, key, value, "must be a non-negative integer"))
}

/// Parse a comma-separated list, dropping empty entries.
pub(super) fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
