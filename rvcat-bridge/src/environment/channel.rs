//! Launcher exposing the environment side of the channels to the embedder.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{EnvironmentChannel, EnvironmentLauncher};
use crate::bridge::DEFAULT_REQUEST_CHANNEL_CAPACITY;
use crate::error::ChannelError;
use crate::protocol::{Reply, Request};

/// Environment side of a [`ChannelLauncher`].
#[derive(Debug)]
pub struct EnvironmentPort {
    /// Requests sent by the bridge.
    pub requests: mpsc::Receiver<Request>,
    /// Replies routed back to the bridge.
    pub replies: mpsc::Sender<Reply>,
}

/// Single-use launcher backed by pre-built channels.
///
/// The embedder drives the returned [`EnvironmentPort`] itself, which makes
/// this launcher suitable for custom transports and for tests. Channel
/// capacity is fixed at construction; the capacity passed to `launch` is
/// ignored.
pub struct ChannelLauncher {
    pending: Mutex<Option<EnvironmentChannel>>,
}

impl ChannelLauncher {
    /// Creates a launcher with the default channel capacity.
    pub fn new() -> (Self, EnvironmentPort) {
        Self::with_capacity(DEFAULT_REQUEST_CHANNEL_CAPACITY)
    }

    /// Creates a launcher whose channels hold `capacity` messages each.
    pub fn with_capacity(capacity: usize) -> (Self, EnvironmentPort) {
        let capacity = capacity.max(1);
        let (request_tx, request_rx) = mpsc::channel(capacity);
        let (reply_tx, reply_rx) = mpsc::channel(capacity);

        let launcher = Self {
            pending: Mutex::new(Some(EnvironmentChannel {
                requests: request_tx,
                replies: reply_rx,
            })),
        };
        let port = EnvironmentPort {
            requests: request_rx,
            replies: reply_tx,
        };
        (launcher, port)
    }
}

impl EnvironmentLauncher for ChannelLauncher {
    fn launch(
        &self,
        _capacity: usize,
        _shutdown: CancellationToken,
    ) -> Result<EnvironmentChannel, ChannelError> {
        self.pending.lock().take().ok_or_else(|| {
            ChannelError::Unavailable("channel environment was already launched".to_string())
        })
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}
