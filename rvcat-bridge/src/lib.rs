//! RVCAT bridge - host side of an isolated analysis engine
//!
//! The RVCAT analysis engine runs inside an isolated execution environment
//! (an in-process task or a separate worker process). This crate ships
//! typed commands into that environment and routes its asynchronous
//! replies back to the right caller.
//!
//! # High-Level API
//!
//! Most consumers hold a [`session::Session`] and drive it through
//! [`session::RvcatApi`]:
//!
//! ```ignore
//! use rvcat_bridge::bridge::BridgeConfig;
//! use rvcat_bridge::environment::ProcessLauncher;
//! use rvcat_bridge::session::{RvcatApi, Session};
//!
//! let launcher = ProcessLauncher::new("rvcat-worker", Vec::<String>::new());
//! let session = Arc::new(Session::new(BridgeConfig::default(), Arc::new(launcher)));
//! session.wait_for_ready().await?;
//!
//! let api = RvcatApi::new(session);
//! api.import_rvcat().await?;
//! let processors = api.processors().await?;
//! ```

pub mod bridge;
pub mod command;
pub mod config;
pub mod environment;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod session;

pub use bridge::{Bridge, BridgeConfig, ReadinessState};
pub use command::{Command, Selection};
pub use error::{BridgeError, BridgeResult};
pub use protocol::{CorrelationId, Outcome};
pub use session::{HandlerGuard, RvcatApi, Session};

/// Version of the library and CLI.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
