//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (path, show, init)
//! - [`query`] - RVCAT queries against the worker (list, show, analyze)

pub mod config;
pub mod query;
