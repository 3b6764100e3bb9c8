//! Reply demultiplexer.
//!
//! Replies are consumed by a single task, one at a time, so subscribers
//! observe them in exactly the order the environment emitted them.
//!
//! ```text
//! replies ──► Demultiplexer ──► initialized ──► readiness = Ready
//!                    │
//!                    ├──► id present ──► once callback ──► persistent handler
//!                    │
//!                    └──► no id ──► logged and dropped
//! ```
//!
//! When the environment closes its reply channel, every pending one-shot
//! callback is dropped (awaiting requests resolve to `ChannelError::Closed`)
//! and the `closed` token is cancelled so later calls fail fast.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::readiness::ReadinessCell;
use super::registry::SubscriptionRegistry;
use crate::protocol::Reply;

/// What happened to a single reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// `initialized` was received; `changed` is false for repeats.
    Ready { changed: bool },
    /// Addressed reply delivered to whichever subscribers existed.
    Delivered { once: bool, persistent: bool },
    /// Reply without id.
    Unaddressed,
}

impl Dispatch {
    /// Returns true if no subscriber saw the reply.
    pub fn is_dropped(&self) -> bool {
        matches!(
            self,
            Dispatch::Unaddressed
                | Dispatch::Delivered {
                    once: false,
                    persistent: false
                }
        )
    }
}

/// Routes replies from the environment to subscribers.
pub struct Demultiplexer {
    readiness: Arc<ReadinessCell>,
    registry: Arc<SubscriptionRegistry>,
    closed: CancellationToken,
}

impl Demultiplexer {
    /// `closed` is cancelled if the environment closes its reply channel.
    pub fn new(
        readiness: Arc<ReadinessCell>,
        registry: Arc<SubscriptionRegistry>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            readiness,
            registry,
            closed,
        }
    }

    /// Routes a single reply.
    pub fn dispatch(&self, reply: Reply) -> Dispatch {
        if let Reply::Initialized = reply {
            let changed = self.readiness.mark_ready();
            if changed {
                info!("Execution environment ready");
            } else {
                debug!("Duplicate initialized reply ignored");
            }
            return Dispatch::Ready { changed };
        }

        let action = reply.action();
        let Some(outcome) = reply.into_outcome() else {
            return Dispatch::Unaddressed;
        };

        let subscribers = self.registry.take_for_dispatch(&outcome.id);
        let (once, persistent) = subscribers.deliver(&outcome);

        if !once && !persistent {
            debug!(id = %outcome.id, action, "Reply had no subscribers");
        } else {
            debug!(
                id = %outcome.id,
                action,
                kind = %outcome.kind,
                once,
                persistent,
                "Reply dispatched"
            );
        }

        Dispatch::Delivered { once, persistent }
    }

    fn log_unaddressed(reply: &Reply) {
        match reply {
            Reply::Executed {
                result, data_type, ..
            } if data_type.is_error() => {
                warn!(error = %result, "Environment reported an error without id");
            }
            Reply::LoadedPackage { package, .. } => {
                info!(package = %package, "Package loaded");
            }
            other => {
                debug!(action = other.action(), "Unaddressed reply dropped");
            }
        }
    }

    fn environment_lost(&self) {
        let dropped = self.registry.clear_once();
        self.closed.cancel();
        warn!(
            dropped_callbacks = dropped,
            "Execution environment closed its reply channel"
        );
    }

    /// Consumes replies until the channel closes or `shutdown` fires.
    pub async fn run(self, mut replies: mpsc::Receiver<Reply>, shutdown: CancellationToken) {
        debug!("Reply demultiplexer started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("Reply demultiplexer cancelled");
                    break;
                }

                reply = replies.recv() => {
                    let Some(reply) = reply else {
                        self.environment_lost();
                        break;
                    };
                    if reply.id().is_none() {
                        Self::log_unaddressed(&reply);
                    }
                    self.dispatch(reply);
                }
            }
        }

        debug!("Reply demultiplexer stopped");
    }
}
