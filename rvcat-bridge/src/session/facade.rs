//! Session facade over a lazily constructed bridge.

use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use super::guard::HandlerGuard;
use crate::bridge::{Bridge, BridgeConfig, ReadinessState, ReplyCallback};
use crate::command::Command;
use crate::environment::EnvironmentLauncher;
use crate::error::{BridgeResult, LifecycleError};
use crate::protocol::{CorrelationId, Outcome};

/// Consumer-facing entry point to the execution environment.
///
/// Owns exactly one [`Bridge`], built and initialized on first use. Calls
/// that would reach the environment are rejected with
/// [`LifecycleError::NotReady`] until the environment is ready, except for
/// the `*_when_ready` variants which wait. Dropping the session terminates
/// the bridge.
///
/// # Example
///
/// ```ignore
/// let session = Session::new(BridgeConfig::default(), Arc::new(ProcessLauncher::from(&worker)));
/// session.wait_for_ready().await?;
///
/// let _guard = session.register_handler("run_analysis", |outcome| {
///     println!("{}", outcome.text());
/// })?;
/// session.execute_command(&Command::RunAnalysis, "run_analysis", None)?;
/// ```
pub struct Session {
    config: BridgeConfig,
    launcher: Arc<dyn EnvironmentLauncher>,
    bridge: Mutex<Option<Arc<Bridge>>>,
    terminated: AtomicBool,
}

impl Session {
    /// Creates a session. No environment is launched until first use.
    pub fn new(config: BridgeConfig, launcher: Arc<dyn EnvironmentLauncher>) -> Self {
        Self {
            config,
            launcher,
            bridge: Mutex::new(None),
            terminated: AtomicBool::new(false),
        }
    }

    /// Returns the session's bridge, constructing and initializing it first
    /// if needed.
    ///
    /// If initialization fails the bridge is discarded and the next call
    /// tries again.
    ///
    /// The session lock is held while the environment launches, so
    /// concurrent first callers share one launch. For a process-backed
    /// environment that includes spawning the worker, during which
    /// [`is_ready`](Self::is_ready) and `Debug` formatting block too.
    pub fn bridge(&self) -> BridgeResult<Arc<Bridge>> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(LifecycleError::Terminated.into());
        }

        let mut slot = self.bridge.lock();
        if let Some(bridge) = slot.as_ref() {
            return Ok(Arc::clone(bridge));
        }

        let bridge = Arc::new(Bridge::new(self.config.clone(), Arc::clone(&self.launcher)));
        bridge.initialize()?;
        debug!("Session bridge created");

        *slot = Some(Arc::clone(&bridge));
        Ok(bridge)
    }

    fn ready_bridge(&self) -> BridgeResult<Arc<Bridge>> {
        let bridge = self.bridge()?;
        if !bridge.readiness().is_ready() {
            return Err(LifecycleError::NotReady.into());
        }
        Ok(bridge)
    }

    // =========================================================================
    // Readiness
    // =========================================================================

    /// Observable readiness of the environment.
    pub fn readiness(&self) -> BridgeResult<watch::Receiver<ReadinessState>> {
        Ok(self.bridge()?.subscribe_readiness())
    }

    /// Returns true if the environment is ready and still connected.
    /// Never launches it.
    pub fn is_ready(&self) -> bool {
        self.bridge
            .lock()
            .as_ref()
            .is_some_and(|bridge| bridge.readiness().is_ready() && !bridge.is_closed())
    }

    /// Waits until the environment is ready, launching it if needed.
    pub async fn wait_for_ready(&self) -> BridgeResult<()> {
        let bridge = self.bridge()?;
        bridge.wait_for_ready().await
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Sends a command addressed to `id`. Rejected until ready.
    pub fn execute_command(
        &self,
        command: &Command,
        id: impl Into<CorrelationId>,
        callback: Option<ReplyCallback>,
    ) -> BridgeResult<()> {
        self.ready_bridge()?.execute(command, id, callback)
    }

    /// Waits for readiness, then sends the command.
    pub async fn execute_when_ready(
        &self,
        command: &Command,
        id: impl Into<CorrelationId>,
        callback: Option<ReplyCallback>,
    ) -> BridgeResult<()> {
        let bridge = self.bridge()?;
        bridge.execute_when_ready(command, id, callback).await
    }

    /// Sends a command and waits for its result. Rejected until ready.
    pub async fn request(
        &self,
        command: &Command,
        id: impl Into<CorrelationId>,
    ) -> BridgeResult<Value> {
        let bridge = self.ready_bridge()?;
        bridge.request(command, id).await
    }

    /// Asks the environment to load a package. Rejected until ready.
    pub fn load_package(&self, package: &str) -> BridgeResult<()> {
        self.ready_bridge()?.load_package(package)
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    /// Registers a persistent handler for `id`.
    ///
    /// The handler stays registered until the returned guard is dropped.
    /// Dropping a guard whose registration was since replaced leaves the
    /// newer handler in place.
    pub fn register_handler<F>(
        &self,
        id: impl Into<CorrelationId>,
        handler: F,
    ) -> BridgeResult<HandlerGuard>
    where
        F: Fn(&Outcome) + Send + Sync + 'static,
    {
        let bridge = self.bridge()?;
        let id = id.into();
        let handler_id = bridge.register_handler(id.clone(), handler);
        Ok(HandlerGuard::new(Arc::downgrade(&bridge), id, handler_id))
    }

    /// Terminates the bridge. The session cannot be used afterwards.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(bridge) = self.bridge.lock().take() {
            bridge.terminate();
        }
        info!("Session terminated");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("environment", &self.launcher.name())
            .field("bridge", &*self.bridge.lock())
            .field("terminated", &self.terminated.load(Ordering::SeqCst))
            .finish()
    }
}
