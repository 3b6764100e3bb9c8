//! Bridge error types.
//!
//! Failures are grouped by where they originate: the channel to the
//! environment, the environment itself, the wire protocol, the bridge
//! lifecycle, or command validation on the host.

use std::time::Duration;
use thiserror::Error;

use crate::command::CommandError;
use crate::protocol::CorrelationId;

/// The execution environment could not be reached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The environment could not be started.
    #[error("execution environment unavailable: {0}")]
    Unavailable(String),

    /// The request channel is full (backpressure).
    #[error("request channel is full")]
    Full,

    /// The environment has shut down or was terminated.
    #[error("execution environment has shut down")]
    Closed,
}

/// A reply or request could not be encoded or understood.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound text is not a valid message.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Outbound message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The reply parsed, but its payload has an unexpected shape.
    #[error("unexpected payload for '{id}': {reason}")]
    UnexpectedPayload { id: CorrelationId, reason: String },
}

/// An operation was attempted in the wrong lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// `initialize()` has not been called yet.
    #[error("bridge has not been initialized")]
    NotInitialized,

    /// The environment has not acknowledged initialization yet.
    #[error("execution environment is not ready")]
    NotReady,

    /// The bridge was terminated.
    #[error("bridge has been terminated")]
    Terminated,
}

/// Errors surfaced by the bridge and its adapters.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Channel to the environment failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The environment ran the command and it failed.
    #[error("command '{id}' failed: {cause}")]
    Execution { id: CorrelationId, cause: String },

    /// Malformed or unexpected message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Operation attempted before readiness or after termination.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Command rejected before being sent.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// No reply arrived within the configured request timeout.
    #[error("no reply for '{id}' after {after:?}")]
    Timeout { id: CorrelationId, after: Duration },
}

impl BridgeError {
    /// Returns true if this is a lifecycle error of the given kind.
    pub fn is_lifecycle(&self, kind: LifecycleError) -> bool {
        matches!(self, BridgeError::Lifecycle(k) if *k == kind)
    }
}

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
