//! Worker process speaking newline-delimited JSON on stdio.
//!
//! ```text
//! Request ──► writer task ──► worker stdin   (one JSON object per line)
//! Reply   ◄── reader task ◄── worker stdout  (one JSON object per line)
//!             stderr task ◄── worker stderr  (logged)
//! ```

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EnvironmentChannel, EnvironmentLauncher};
use crate::config::WorkerSettings;
use crate::error::ChannelError;
use crate::protocol::{Reply, Request};

/// Launches the engine as an external worker process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: String,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Worker executable.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Worker arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl From<&WorkerSettings> for ProcessLauncher {
    fn from(settings: &WorkerSettings) -> Self {
        Self::new(settings.program.clone(), settings.args.iter().cloned())
    }
}

impl EnvironmentLauncher for ProcessLauncher {
    fn launch(
        &self,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> Result<EnvironmentChannel, ChannelError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ChannelError::Unavailable(format!("failed to spawn '{}': {}", self.program, e))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let (request_tx, request_rx) = mpsc::channel(capacity);
        let (reply_tx, reply_rx) = mpsc::channel(capacity);

        info!(program = %self.program, pid = child.id(), "Worker process started");

        tokio::spawn(write_requests(stdin, request_rx, shutdown.clone()));
        tokio::spawn(read_replies(stdout, reply_tx, shutdown.clone()));
        tokio::spawn(log_stderr(stderr, shutdown.clone()));
        tokio::spawn(supervise(child, shutdown));

        Ok(EnvironmentChannel {
            requests: request_tx,
            replies: reply_rx,
        })
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

fn missing_pipe(which: &str) -> ChannelError {
    ChannelError::Unavailable(format!("worker {} was not captured", which))
}

async fn write_requests(
    mut stdin: ChildStdin,
    mut requests: mpsc::Receiver<Request>,
    shutdown: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let mut line = match request.encode() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, action = request.action(), "Request not encodable, skipped");
                continue;
            }
        };
        line.push('\n');

        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            warn!(error = %e, "Failed to write to worker stdin");
            break;
        }
        if let Err(e) = stdin.flush().await {
            warn!(error = %e, "Failed to flush worker stdin");
            break;
        }
        debug!(action = request.action(), id = ?request.id(), "Request written to worker");
    }
    // Dropping stdin closes the pipe, which signals end of input to the worker.
}

async fn read_replies(
    stdout: ChildStdout,
    replies: mpsc::Sender<Reply>,
    shutdown: CancellationToken,
) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Worker closed stdout");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read worker stdout");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match Reply::decode(trimmed) {
            Ok(reply) => {
                if replies.send(reply).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, line = %trimmed, "Malformed reply skipped"),
        }
    }
}

async fn log_stderr(stderr: ChildStderr, shutdown: CancellationToken) {
    let mut lines = BufReader::new(stderr).lines();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => debug!(target: "rvcat_bridge::worker", "{}", line),
                _ => break,
            },
        }
    }
}

async fn supervise(mut child: Child, shutdown: CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill worker process");
            } else {
                info!("Worker process killed");
            }
        }
        status = child.wait() => match status {
            Ok(status) if status.success() => info!("Worker process exited"),
            Ok(status) => warn!(status = %status, "Worker process exited with failure"),
            Err(e) => warn!(error = %e, "Failed to wait for worker process"),
        },
    }
}
