//! The bridge: one execution environment, one reply demultiplexer, one
//! subscription registry.

use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::BridgeConfig;
use super::demux::Demultiplexer;
use super::readiness::{ReadinessCell, ReadinessState};
use super::registry::{HandlerId, ReplyCallback, SubscriptionRegistry};
use crate::command::Command;
use crate::environment::{EnvironmentChannel, EnvironmentLauncher};
use crate::error::{BridgeError, BridgeResult, ChannelError, LifecycleError};
use crate::protocol::{CorrelationId, Outcome, Request};

/// Live connection to a launched environment.
struct Link {
    requests: mpsc::Sender<Request>,
}

/// Owns the channel to one execution environment and routes its replies.
///
/// A bridge is an explicit context object: whoever constructs it owns it,
/// normally a [`Session`](crate::session::Session). Dropping it terminates
/// the environment.
///
/// # Example
///
/// ```ignore
/// let bridge = Bridge::new(BridgeConfig::default(), launcher);
/// bridge.initialize()?;
/// bridge.wait_for_ready().await?;
/// let processors = bridge.request(&Command::ListProcessors, "get_processors").await?;
/// ```
pub struct Bridge {
    config: BridgeConfig,
    launcher: Arc<dyn EnvironmentLauncher>,
    readiness: Arc<ReadinessCell>,
    registry: Arc<SubscriptionRegistry>,
    link: Mutex<Option<Link>>,
    shutdown: CancellationToken,
    /// Cancelled when the environment closes its reply channel.
    closed: CancellationToken,
    terminated: AtomicBool,
}

impl Bridge {
    /// Creates an uninitialized bridge.
    pub fn new(config: BridgeConfig, launcher: Arc<dyn EnvironmentLauncher>) -> Self {
        Self {
            config,
            launcher,
            readiness: Arc::new(ReadinessCell::new()),
            registry: Arc::new(SubscriptionRegistry::new()),
            link: Mutex::new(None),
            shutdown: CancellationToken::new(),
            closed: CancellationToken::new(),
            terminated: AtomicBool::new(false),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Launches the environment and sends `initialize`.
    ///
    /// A second call while initializing or ready does nothing. Must be called
    /// from within a tokio runtime.
    pub fn initialize(&self) -> BridgeResult<()> {
        if self.is_terminated() {
            return Err(LifecycleError::Terminated.into());
        }

        let mut link = self.link.lock();
        if link.is_some() || self.readiness.current() != ReadinessState::Uninitialized {
            debug!(state = %self.readiness.current(), "Bridge already initialized");
            return Ok(());
        }

        let EnvironmentChannel { requests, replies } = self
            .launcher
            .launch(self.config.capacity(), self.shutdown.child_token())?;

        requests
            .try_send(Request::Initialize)
            .map_err(channel_error)?;
        self.readiness.begin_initializing();
        self.queue_preloads(&requests);

        let demux = Demultiplexer::new(
            Arc::clone(&self.readiness),
            Arc::clone(&self.registry),
            self.closed.clone(),
        );
        tokio::spawn(demux.run(replies, self.shutdown.child_token()));

        *link = Some(Link { requests });
        info!(
            environment = self.launcher.name(),
            capacity = self.config.capacity(),
            "Bridge initializing"
        );
        Ok(())
    }

    /// Queues the configured preloads directly behind `initialize`.
    ///
    /// Packages that do not fit in the request channel are skipped.
    fn queue_preloads(&self, requests: &mpsc::Sender<Request>) {
        let packages = &self.config.preload_packages;
        for (queued, package) in packages.iter().enumerate() {
            let request = Request::load_package(package.as_str(), None);
            if let Err(e) = requests.try_send(request) {
                warn!(
                    package = %package,
                    skipped = packages.len() - queued,
                    error = %channel_error(e),
                    "Preload not queued"
                );
                return;
            }
            debug!(package = %package, "Preload queued");
        }
    }

    /// Shuts the environment down and drops every pending one-shot callback.
    ///
    /// Awaiting `request` futures resolve to [`ChannelError::Closed`].
    /// Calling this more than once has no further effect.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.cancel();
        let link = self.link.lock().take();
        let was_linked = link.is_some();
        drop(link);

        let dropped = self.registry.clear_once();
        info!(was_linked, dropped_callbacks = dropped, "Bridge terminated");
    }

    /// Returns true once the environment has closed its reply channel.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Returns true once `terminate()` has been called.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Current readiness.
    pub fn readiness(&self) -> ReadinessState {
        self.readiness.current()
    }

    /// Observable readiness.
    pub fn subscribe_readiness(&self) -> watch::Receiver<ReadinessState> {
        self.readiness.subscribe()
    }

    /// Waits until the environment is ready.
    ///
    /// Resolves immediately if already ready. Fails with
    /// [`LifecycleError::Terminated`] if the bridge terminates first, and
    /// with [`ChannelError::Closed`] if the environment goes away.
    pub async fn wait_for_ready(&self) -> BridgeResult<()> {
        if self.is_terminated() {
            return Err(LifecycleError::Terminated.into());
        }

        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => Err(LifecycleError::Terminated.into()),
            _ = self.closed.cancelled() => Err(ChannelError::Closed.into()),
            _ = self.readiness.wait_ready() => Ok(()),
        }
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Sends a command addressed to `id`, optionally with a one-shot callback.
    ///
    /// Never blocks. The callback replaces any callback still pending for
    /// the same id. Requests sent before the environment is ready are
    /// accepted, but their processing order relative to initialization is
    /// up to the environment.
    pub fn execute(
        &self,
        command: &Command,
        id: impl Into<CorrelationId>,
        callback: Option<ReplyCallback>,
    ) -> BridgeResult<()> {
        let sender = self.sender()?;
        let code = command.render()?;
        let id = id.into();

        debug!(id = %id, command = command.name(), "Executing command");
        self.enqueue(&sender, Request::execute(code, Some(id)), callback)
    }

    /// Sends a command without correlation id. Its reply is only logged.
    pub fn submit(&self, command: &Command) -> BridgeResult<()> {
        let sender = self.sender()?;
        let code = command.render()?;

        debug!(command = command.name(), "Submitting command");
        self.enqueue(&sender, Request::execute(code, None), None)
    }

    /// Waits for readiness, then behaves like [`execute`](Self::execute).
    pub async fn execute_when_ready(
        &self,
        command: &Command,
        id: impl Into<CorrelationId>,
        callback: Option<ReplyCallback>,
    ) -> BridgeResult<()> {
        self.wait_for_ready().await?;
        self.execute(command, id, callback)
    }

    /// Sends a command and waits for its reply.
    ///
    /// Resolves to the result value, or [`BridgeError::Execution`] if the
    /// environment reported an error. With a configured request timeout the
    /// pending callback is withdrawn when the deadline passes.
    pub async fn request(
        &self,
        command: &Command,
        id: impl Into<CorrelationId>,
    ) -> BridgeResult<Value> {
        let id = id.into();
        let (tx, rx) = oneshot::channel();
        let callback: ReplyCallback = Box::new(move |outcome: &Outcome| {
            let _ = tx.send(outcome.clone());
        });

        self.execute(command, id.clone(), Some(callback))?;
        self.await_outcome(id, rx).await
    }

    async fn await_outcome(
        &self,
        id: CorrelationId,
        rx: oneshot::Receiver<Outcome>,
    ) -> BridgeResult<Value> {
        let received = match self.config.request_timeout {
            Some(after) => {
                let result = tokio::time::timeout(after, self.receive(&id, rx)).await;
                match result {
                    Ok(received) => received,
                    Err(_) => {
                        self.registry.cancel_once(id.as_str());
                        warn!(id = %id, timeout_ms = after.as_millis() as u64, "Request timed out");
                        return Err(BridgeError::Timeout { id, after });
                    }
                }
            }
            None => self.receive(&id, rx).await,
        };

        let outcome = received?;
        outcome
            .into_result()
            .map_err(|cause| BridgeError::Execution { id, cause })
    }

    async fn receive(
        &self,
        id: &CorrelationId,
        mut rx: oneshot::Receiver<Outcome>,
    ) -> Result<Outcome, ChannelError> {
        tokio::select! {
            biased;

            // The sender is dropped without a reply on terminate, when the
            // environment goes away, or when a later request reuses the id.
            received = &mut rx => received.map_err(|_| ChannelError::Closed),
            _ = self.closed.cancelled() => {
                self.registry.cancel_once(id.as_str());
                Err(ChannelError::Closed)
            }
        }
    }

    /// Asks the environment to load an extension package.
    pub fn load_package(&self, package: &str) -> BridgeResult<()> {
        let sender = self.sender()?;
        debug!(package, "Loading package");
        self.enqueue(&sender, Request::load_package(package, None), None)
    }

    /// Withdraws the pending one-shot callback for `id`.
    ///
    /// The request itself is not withdrawn; its reply will find no callback.
    pub fn cancel(&self, id: &str) -> bool {
        let removed = self.registry.cancel_once(id);
        if removed {
            debug!(id, "Pending callback cancelled");
        }
        removed
    }

    /// Number of one-shot callbacks waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    fn sender(&self) -> BridgeResult<mpsc::Sender<Request>> {
        if self.is_terminated() {
            return Err(LifecycleError::Terminated.into());
        }
        if self.is_closed() {
            return Err(ChannelError::Closed.into());
        }
        self.link
            .lock()
            .as_ref()
            .map(|link| link.requests.clone())
            .ok_or_else(|| LifecycleError::NotInitialized.into())
    }

    fn enqueue(
        &self,
        sender: &mpsc::Sender<Request>,
        request: Request,
        callback: Option<ReplyCallback>,
    ) -> BridgeResult<()> {
        let installed = match (request.id(), callback) {
            (Some(id), Some(callback)) => {
                if self.registry.install_once(id.clone(), callback) {
                    debug!(id = %id, "Pending callback replaced");
                }
                Some(id.clone())
            }
            _ => None,
        };

        sender.try_send(request).map_err(|e| {
            if let Some(id) = &installed {
                self.registry.cancel_once(id.as_str());
            }
            let err = channel_error(e);
            warn!(error = %err, "Request not sent");
            BridgeError::from(err)
        })
    }

    // =========================================================================
    // Persistent handlers
    // =========================================================================

    /// Registers a handler called for every reply addressed to `id`.
    ///
    /// Replaces any handler already registered for `id`. Replies dispatched
    /// before registration are not replayed.
    pub fn register_handler<F>(&self, id: impl Into<CorrelationId>, handler: F) -> HandlerId
    where
        F: Fn(&Outcome) + Send + Sync + 'static,
    {
        let id = id.into();
        let handler_id = self.registry.register(id.clone(), Arc::new(handler));
        debug!(id = %id, handler = %handler_id, "Handler registered");
        handler_id
    }

    /// Removes the handler registered for `id`, whichever it is.
    pub fn unregister_handler(&self, id: &str) -> bool {
        self.registry.unregister(id)
    }

    /// Removes the handler for `id` only if it is still `handler_id`.
    pub fn unregister_handler_if(&self, id: &str, handler_id: HandlerId) -> bool {
        self.registry.unregister_if(id, handler_id)
    }

    /// Returns true if a persistent handler is registered for `id`.
    pub fn has_handler(&self, id: &str) -> bool {
        self.registry.has_handler(id)
    }

    /// Configuration the bridge was built with.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("environment", &self.launcher.name())
            .field("readiness", &self.readiness())
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

fn channel_error<T>(error: mpsc::error::TrySendError<T>) -> ChannelError {
    match error {
        mpsc::error::TrySendError::Full(_) => ChannelError::Full,
        mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{ChannelLauncher, EnvironmentPort};
    use crate::protocol::Reply;
    use std::time::Duration;

    fn bridge_with_port(config: BridgeConfig) -> (Bridge, EnvironmentPort) {
        let (launcher, port) = ChannelLauncher::new();
        (Bridge::new(config, Arc::new(launcher)), port)
    }

    #[tokio::test]
    async fn test_execute_before_initialize() {
        let (bridge, _port) = bridge_with_port(BridgeConfig::default());
        let err = bridge
            .execute(&Command::ImportRvcat, "a", None)
            .unwrap_err();
        assert!(err.is_lifecycle(LifecycleError::NotInitialized));
    }

    #[tokio::test]
    async fn test_initialize_sends_once() {
        let (bridge, port) = bridge_with_port(BridgeConfig::default());
        let mut requests = port.requests;

        bridge.initialize().unwrap();
        bridge.initialize().unwrap();
        assert_eq!(bridge.readiness(), ReadinessState::Initializing);

        assert_eq!(requests.recv().await, Some(Request::Initialize));
        assert!(requests.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_initialize_after_terminate_rejected() {
        let (bridge, _port) = bridge_with_port(BridgeConfig::default());
        bridge.terminate();
        let err = bridge.initialize().unwrap_err();
        assert!(err.is_lifecycle(LifecycleError::Terminated));
    }

    #[tokio::test]
    async fn test_launch_failure_keeps_uninitialized() {
        let (launcher, _port) = ChannelLauncher::new();
        let launcher = Arc::new(launcher);
        let first = Bridge::new(BridgeConfig::default(), launcher.clone());
        first.initialize().unwrap();

        // Second bridge on the same single-use launcher cannot launch.
        let second = Bridge::new(BridgeConfig::default(), launcher);
        let err = second.initialize().unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Channel(ChannelError::Unavailable(_))
        ));
        assert_eq!(second.readiness(), ReadinessState::Uninitialized);
    }

    #[tokio::test]
    async fn test_request_resolves_with_reply() {
        let (bridge, port) = bridge_with_port(BridgeConfig::default());
        let EnvironmentPort {
            mut requests,
            replies,
        } = port;
        bridge.initialize().unwrap();

        let echo = tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let reply = match request {
                    Request::Initialize => Reply::Initialized,
                    Request::Execute { id, .. } => Reply::text("42", id),
                    Request::LoadPackage { package, id } => Reply::LoadedPackage { package, id },
                };
                if replies.send(reply).await.is_err() {
                    break;
                }
            }
        });

        bridge.wait_for_ready().await.unwrap();
        let value = bridge.request(&Command::RunAnalysis, "run").await.unwrap();
        assert_eq!(value, serde_json::json!("42"));
        assert_eq!(bridge.pending_count(), 0);

        bridge.terminate();
        drop(echo);
    }

    #[tokio::test]
    async fn test_request_execution_error() {
        let (bridge, port) = bridge_with_port(BridgeConfig::default());
        let EnvironmentPort {
            mut requests,
            replies,
        } = port;
        bridge.initialize().unwrap();

        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                if let Request::Execute { id, .. } = request {
                    let _ = replies.send(Reply::error("NameError", id)).await;
                }
            }
        });

        let err = bridge
            .request(&Command::ShowProgram, "program_show")
            .await
            .unwrap_err();
        match err {
            BridgeError::Execution { id, cause } => {
                assert_eq!(id.as_str(), "program_show");
                assert_eq!(cause, "NameError");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_request_timeout_withdraws_callback() {
        let config = BridgeConfig::default().with_request_timeout(Duration::from_millis(20));
        let (bridge, _port) = bridge_with_port(config);
        bridge.initialize().unwrap();

        let err = bridge
            .request(&Command::RunAnalysis, "slow")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_full_channel_removes_callback() {
        let (launcher, _port) = ChannelLauncher::with_capacity(1);
        let bridge = Bridge::new(BridgeConfig::default(), Arc::new(launcher));
        // The initialize request occupies the only slot.
        bridge.initialize().unwrap();

        let err = bridge
            .execute(&Command::ImportRvcat, "a", Some(Box::new(|_: &Outcome| {})))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Channel(ChannelError::Full)));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_command_not_sent() {
        let (bridge, port) = bridge_with_port(BridgeConfig::default());
        let mut requests = port.requests;
        bridge.initialize().unwrap();
        let _ = requests.recv().await;

        let err = bridge
            .execute(&Command::SetRobSize { size: 0 }, "rob", Some(Box::new(|_: &Outcome| {})))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Command(_)));
        assert_eq!(bridge.pending_count(), 0);
        assert!(requests.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_terminate_resolves_pending_requests() {
        let (bridge, _port) = bridge_with_port(BridgeConfig::default());
        let bridge = Arc::new(bridge);
        bridge.initialize().unwrap();

        let waiter = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.request(&Command::RunAnalysis, "run").await })
        };
        while bridge.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        bridge.terminate();
        let result = waiter.await.unwrap();
        assert!(matches!(
            result,
            Err(BridgeError::Channel(ChannelError::Closed))
        ));
    }

    #[tokio::test]
    async fn test_wait_for_ready_fails_on_terminate() {
        let (bridge, _port) = bridge_with_port(BridgeConfig::default());
        let bridge = Arc::new(bridge);
        bridge.initialize().unwrap();

        let waiter = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.wait_for_ready().await })
        };
        tokio::task::yield_now().await;
        bridge.terminate();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(result
            .unwrap_err()
            .is_lifecycle(LifecycleError::Terminated));
    }

    #[tokio::test]
    async fn test_preload_packages_follow_initialize() {
        let config = BridgeConfig::default().with_preload(["numpy", "rvcat.whl"]);
        let (bridge, port) = bridge_with_port(config);
        let mut requests = port.requests;
        bridge.initialize().unwrap();

        // Queued synchronously, ahead of anything sent after initialize.
        bridge.submit(&Command::ImportRvcat).unwrap();
        assert_eq!(requests.try_recv().unwrap(), Request::Initialize);
        assert_eq!(
            requests.try_recv().unwrap(),
            Request::load_package("numpy", None)
        );
        assert_eq!(
            requests.try_recv().unwrap(),
            Request::load_package("rvcat.whl", None)
        );
        assert!(matches!(
            requests.try_recv().unwrap(),
            Request::Execute { id: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_preloads_beyond_capacity_are_skipped() {
        let (launcher, port) = ChannelLauncher::with_capacity(2);
        let config = BridgeConfig::default().with_preload(["numpy", "scipy", "rvcat.whl"]);
        let bridge = Bridge::new(config, Arc::new(launcher));
        let mut requests = port.requests;

        bridge.initialize().unwrap();
        assert_eq!(bridge.readiness(), ReadinessState::Initializing);
        assert_eq!(requests.try_recv().unwrap(), Request::Initialize);
        assert_eq!(
            requests.try_recv().unwrap(),
            Request::load_package("numpy", None)
        );
        assert!(requests.try_recv().is_err());
    }

    #[test]
    fn test_bridge_shared_across_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Bridge>();
        assert_send_sync::<Arc<Bridge>>();
    }

    #[tokio::test]
    async fn test_cancel_pending_callback() {
        let (bridge, _port) = bridge_with_port(BridgeConfig::default());
        bridge.initialize().unwrap();
        bridge
            .execute(&Command::ImportRvcat, "a", Some(Box::new(|_: &Outcome| {})))
            .unwrap();
        assert_eq!(bridge.pending_count(), 1);
        assert!(bridge.cancel("a"));
        assert!(!bridge.cancel("a"));
        assert_eq!(bridge.pending_count(), 0);
    }
}
