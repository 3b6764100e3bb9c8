//! Session adapter and the RVCAT API built on it.
//!
//! A [`Session`] is what consumers hold: it owns one bridge, exposes
//! readiness as an observable, gates calls until the environment is ready,
//! and hands out [`HandlerGuard`]s for scoped handler registration.

mod api;
mod facade;
mod guard;

pub use api::{RvcatApi, Topic};
pub use facade::Session;
pub use guard::HandlerGuard;
