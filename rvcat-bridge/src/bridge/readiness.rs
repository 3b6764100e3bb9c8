//! Monotonic readiness state shared between the bridge and its observers.

use std::fmt;
use tokio::sync::watch;

/// Readiness of the execution environment.
///
/// Transitions only move forward: `Uninitialized → Initializing → Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadinessState {
    /// `initialize()` has not been called.
    Uninitialized,
    /// The environment was launched and is starting.
    Initializing,
    /// The environment acknowledged initialization.
    Ready,
}

impl ReadinessState {
    /// Returns true once the environment is ready.
    pub fn is_ready(self) -> bool {
        matches!(self, ReadinessState::Ready)
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessState::Uninitialized => write!(f, "uninitialized"),
            ReadinessState::Initializing => write!(f, "initializing"),
            ReadinessState::Ready => write!(f, "ready"),
        }
    }
}

/// Single source of truth for readiness.
///
/// All waiters share one watch channel, so any number of callers can await
/// readiness and every one of them observes the same transition.
pub struct ReadinessCell {
    tx: watch::Sender<ReadinessState>,
}

impl ReadinessCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ReadinessState::Uninitialized);
        Self { tx }
    }

    /// Current state.
    pub fn current(&self) -> ReadinessState {
        *self.tx.borrow()
    }

    /// Moves `Uninitialized` to `Initializing`.
    ///
    /// Returns false if the state had already advanced.
    pub fn begin_initializing(&self) -> bool {
        self.advance(ReadinessState::Initializing)
    }

    /// Moves to `Ready`. Returns false if already ready.
    pub fn mark_ready(&self) -> bool {
        self.advance(ReadinessState::Ready)
    }

    fn advance(&self, next: ReadinessState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state < next {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Returns a receiver observing every transition.
    pub fn subscribe(&self) -> watch::Receiver<ReadinessState> {
        self.tx.subscribe()
    }

    /// Waits until the state is `Ready`; resolves immediately if it already is.
    pub async fn wait_ready(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so wait_for cannot fail here.
        let _ = rx.wait_for(|state| state.is_ready()).await;
    }
}

impl Default for ReadinessCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReadinessCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessCell")
            .field("state", &self.current())
            .finish()
    }
}
