//! Execution environment boundary.
//!
//! The bridge never talks to an engine directly. It asks an
//! [`EnvironmentLauncher`] for a pair of channels and from then on only
//! exchanges [`Request`]s and [`Reply`]s. Whatever sits behind the channels
//! must honour the same contract:
//!
//! - requests are processed strictly in arrival order, one at a time
//! - every request produces exactly one reply
//! - the reply echoes the request's correlation id when it carried one
//!
//! # Launchers
//!
//! - [`LocalEnvironment`] - runs an in-process [`Engine`] on a dedicated task
//! - [`ProcessLauncher`] - spawns a worker process speaking JSON lines on stdio
//! - [`ChannelLauncher`] - hands the raw channel ends to the embedder

mod channel;
mod engine;
mod local;
mod process;

pub use channel::{ChannelLauncher, EnvironmentPort};
pub use engine::{Engine, EngineFuture};
pub use local::{LocalEnvironment, NOT_STARTED};
pub use process::ProcessLauncher;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ChannelError;
use crate::protocol::{Reply, Request};

/// Packages the RVCAT worker loads during initialization.
pub const DEFAULT_PRELOAD: &[&str] = &["numpy", "rvcat-0.1-py3-none-any.whl"];

/// Host ends of a launched environment.
pub struct EnvironmentChannel {
    /// Requests into the environment.
    pub requests: mpsc::Sender<Request>,
    /// Replies out of the environment.
    pub replies: mpsc::Receiver<Reply>,
}

/// Starts an execution environment.
///
/// Each successful `launch` yields an independent environment. The
/// environment must stop once `shutdown` is cancelled or the request
/// sender is dropped.
pub trait EnvironmentLauncher: Send + Sync + 'static {
    /// Launches an environment with channels of the given capacity.
    fn launch(
        &self,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> Result<EnvironmentChannel, ChannelError>;

    /// Short name for logs.
    fn name(&self) -> &'static str {
        "environment"
    }
}
