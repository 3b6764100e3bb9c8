//! Engine trait hosted by [`LocalEnvironment`](super::LocalEnvironment).

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Boxed engine future. Failures carry the stringified cause.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send + 'a>>;

/// Black-box computation engine.
///
/// The environment owns the engine exclusively and calls it from a single
/// task, so implementations need no internal synchronization.
pub trait Engine: Send + 'static {
    /// Starts the engine. Called once, before any other method.
    fn start(&mut self) -> EngineFuture<'_, ()>;

    /// Loads an extension package.
    fn load_extension<'a>(&'a mut self, name: &'a str) -> EngineFuture<'a, ()>;

    /// Runs engine command text and returns its result.
    fn run<'a>(&'a mut self, code: &'a str) -> EngineFuture<'a, Value>;
}
