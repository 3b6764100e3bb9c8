//! In-process execution environment.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::Engine;
use super::{EnvironmentChannel, EnvironmentLauncher, DEFAULT_PRELOAD};
use crate::error::ChannelError;
use crate::protocol::{Reply, Request};

/// Error text replied to commands received before the engine started.
pub const NOT_STARTED: &str = "environment not started";

/// Runs an [`Engine`] on one dedicated task.
///
/// Every launch builds a fresh engine from the factory. Requests are served
/// strictly in arrival order; the next request is not read until the
/// current one has been answered.
pub struct LocalEnvironment<F> {
    factory: Arc<F>,
    preload: Vec<String>,
}

impl<F, E> LocalEnvironment<F>
where
    F: Fn() -> E + Send + Sync + 'static,
    E: Engine,
{
    /// Creates an environment that preloads [`DEFAULT_PRELOAD`] on start.
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
            preload: DEFAULT_PRELOAD.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Replaces the packages loaded while starting.
    pub fn with_preload<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preload = packages.into_iter().map(Into::into).collect();
        self
    }
}

impl<F, E> EnvironmentLauncher for LocalEnvironment<F>
where
    F: Fn() -> E + Send + Sync + 'static,
    E: Engine,
{
    fn launch(
        &self,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> Result<EnvironmentChannel, ChannelError> {
        let (request_tx, request_rx) = mpsc::channel(capacity);
        let (reply_tx, reply_rx) = mpsc::channel(capacity);

        let engine = (self.factory)();
        let worker = Worker {
            engine,
            preload: self.preload.clone(),
            started: false,
        };
        tokio::spawn(worker.serve(request_rx, reply_tx, shutdown));

        Ok(EnvironmentChannel {
            requests: request_tx,
            replies: reply_rx,
        })
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

struct Worker<E> {
    engine: E,
    preload: Vec<String>,
    started: bool,
}

impl<E: Engine> Worker<E> {
    async fn serve(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        replies: mpsc::Sender<Reply>,
        shutdown: CancellationToken,
    ) {
        debug!("Local environment started");

        loop {
            let request = tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let reply = tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                reply = self.handle(request) => reply,
            };

            if replies.send(reply).await.is_err() {
                break;
            }
        }

        debug!("Local environment stopped");
    }

    async fn handle(&mut self, request: Request) -> Reply {
        match request {
            Request::Initialize => match self.start().await {
                Ok(()) => Reply::Initialized,
                Err(cause) => {
                    warn!(error = %cause, "Engine failed to start");
                    Reply::error(cause, None)
                }
            },
            Request::LoadPackage { package, id } => {
                if !self.started {
                    return Reply::error(NOT_STARTED, id);
                }
                match self.engine.load_extension(&package).await {
                    Ok(()) => {
                        info!(package = %package, "Package loaded");
                        Reply::LoadedPackage { package, id }
                    }
                    Err(cause) => Reply::error(cause, id),
                }
            }
            Request::Execute { code, id } => {
                if !self.started {
                    return Reply::error(NOT_STARTED, id);
                }
                match self.engine.run(&code).await {
                    Ok(result) => Reply::text(result, id),
                    Err(cause) => Reply::error(cause, id),
                }
            }
        }
    }

    async fn start(&mut self) -> Result<(), String> {
        if self.started {
            return Ok(());
        }

        self.engine.start().await?;
        for package in &self.preload {
            self.engine
                .load_extension(package)
                .await
                .map_err(|cause| format!("failed to load '{}': {}", package, cause))?;
        }

        self.started = true;
        info!(preloaded = self.preload.len(), "Engine started");
        Ok(())
    }
}
