//! Host side of the execution-environment bridge.
//!
//! The [`Bridge`] owns the request channel, a monotonic [`ReadinessState`],
//! and a [`SubscriptionRegistry`] holding one-shot callbacks and persistent
//! handlers keyed by correlation id. A single [`Demultiplexer`] task routes
//! every reply.
//!
//! ```text
//! caller ──execute(cmd, id, cb)──► Bridge ──Request──► environment
//!                                    ▲                     │
//!                                    │                  Reply
//!   once cb / persistent handler ◄── Demultiplexer ◄───────┘
//! ```

mod config;
mod core;
mod demux;
mod readiness;
mod registry;

pub use config::{BridgeConfig, DEFAULT_REQUEST_CHANNEL_CAPACITY};
pub use self::core::Bridge;
pub use demux::{Demultiplexer, Dispatch};
pub use readiness::{ReadinessCell, ReadinessState};
pub use registry::{
    HandlerId, ReplyCallback, ReplyHandler, Subscribers, SubscriptionRegistry,
};
