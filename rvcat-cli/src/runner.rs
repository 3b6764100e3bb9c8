//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization, runtime creation and
//! session startup so command handlers only deal with RVCAT calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rvcat_bridge::bridge::BridgeConfig;
use rvcat_bridge::config::ConfigFile;
use rvcat_bridge::environment::ProcessLauncher;
use rvcat_bridge::logging::{init_from_settings, LoggingGuard};
use rvcat_bridge::session::{RvcatApi, Session};
use tokio::runtime::Runtime;
use tracing::info;

use crate::error::CliError;

/// Upper bound on worker startup, including package preloading.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(120);

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
    runtime: Runtime,
}

impl CliRunner {
    /// Create a runner, loading config and initializing logging.
    ///
    /// # Arguments
    ///
    /// * `verbose` - When true, logs at debug level unless `RUST_LOG` says otherwise
    pub fn new(verbose: bool) -> Result<Self, CliError> {
        // Load config file (or use defaults if not present)
        let config = ConfigFile::load()?;

        let level = if verbose { "debug" } else { "info" };
        let logging_guard = init_from_settings(&config.logging, level)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;

        Ok(Self {
            logging_guard,
            config,
            runtime,
        })
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("RVCAT bridge v{}", rvcat_bridge::VERSION);
        info!("RVCAT bridge CLI: {} command", command);
    }

    /// Drive a future to completion on the runner's runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Start the configured worker and wait until it is ready.
    ///
    /// Must be called from within [`block_on`](Self::block_on).
    pub async fn connect(&self) -> Result<RvcatApi, CliError> {
        let launcher = ProcessLauncher::from(&self.config.worker);
        info!(
            program = launcher.program(),
            args = ?launcher.args(),
            "Starting RVCAT worker"
        );

        let session = Arc::new(Session::new(
            BridgeConfig::from(&self.config),
            Arc::new(launcher),
        ));

        match tokio::time::timeout(STARTUP_TIMEOUT, session.wait_for_ready()).await {
            Ok(result) => result?,
            Err(_) => {
                session.terminate();
                return Err(CliError::Startup(format!(
                    "worker '{}' did not become ready within {}s",
                    self.config.worker.program,
                    STARTUP_TIMEOUT.as_secs()
                )));
            }
        }
        info!("RVCAT worker ready");

        let api = RvcatApi::new(session);
        api.import_rvcat().await?;
        Ok(api)
    }
}
