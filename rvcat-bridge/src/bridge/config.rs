//! Bridge configuration.

use std::time::Duration;

use crate::config::ConfigFile;

/// Default request channel capacity.
pub const DEFAULT_REQUEST_CHANNEL_CAPACITY: usize = 1000;

/// Configuration for a [`Bridge`](super::Bridge).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Capacity of each channel direction. Clamped to at least 1.
    pub request_channel_capacity: usize,

    /// Deadline applied by `request()`. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,

    /// Packages requested with `loadPackage` right after `initialize`.
    pub preload_packages: Vec<String>,
}

impl BridgeConfig {
    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.request_channel_capacity = capacity;
        self
    }

    /// Sets the packages loaded after initialization.
    pub fn with_preload<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preload_packages = packages.into_iter().map(Into::into).collect();
        self
    }

    /// Effective channel capacity.
    pub(crate) fn capacity(&self) -> usize {
        self.request_channel_capacity.max(1)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_channel_capacity: DEFAULT_REQUEST_CHANNEL_CAPACITY,
            request_timeout: None,
            preload_packages: Vec::new(),
        }
    }
}

impl From<&ConfigFile> for BridgeConfig {
    fn from(config: &ConfigFile) -> Self {
        Self {
            request_channel_capacity: config.bridge.request_channel_capacity,
            request_timeout: config.bridge.request_timeout,
            preload_packages: config.worker.preload.clone(),
        }
    }
}
