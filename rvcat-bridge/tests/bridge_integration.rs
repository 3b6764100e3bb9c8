//! Integration tests for the bridge.
//!
//! These tests drive a real bridge against an in-process environment and
//! against hand-driven channels, verifying:
//! - FIFO dispatch of replies to one-shot callbacks
//! - Readiness waiting
//! - Persistent handler lifetime
//! - At-most-once delivery of one-shot callbacks
//! - Fail-fast behaviour after terminate
//! - Pending calls failing when the environment goes away

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use rvcat_bridge::bridge::{Bridge, BridgeConfig, ReadinessState, ReplyCallback};
use rvcat_bridge::command::Command;
use rvcat_bridge::environment::{
    ChannelLauncher, Engine, EngineFuture, EnvironmentPort, LocalEnvironment, ProcessLauncher,
};
use rvcat_bridge::error::{BridgeError, ChannelError, LifecycleError};
use rvcat_bridge::protocol::{Outcome, Reply, Request};

const WAIT: Duration = Duration::from_secs(2);

// =============================================================================
// Test Helpers
// =============================================================================

/// Engine that echoes the command text back, failing on "raise".
struct EchoEngine {
    delay_ms: u64,
}

impl Engine for EchoEngine {
    fn start(&mut self) -> EngineFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn load_extension<'a>(&'a mut self, _name: &'a str) -> EngineFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn run<'a>(&'a mut self, code: &'a str) -> EngineFuture<'a, Value> {
        let delay = self.delay_ms;
        Box::pin(async move {
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if code.contains("raise") {
                Err(format!("failed: {}", code))
            } else {
                Ok(Value::String(code.to_string()))
            }
        })
    }
}

fn local_bridge(delay_ms: u64) -> Bridge {
    let environment = LocalEnvironment::new(move || EchoEngine { delay_ms })
        .with_preload(Vec::<String>::new());
    Bridge::new(BridgeConfig::default(), Arc::new(environment))
}

async fn ready_local_bridge(delay_ms: u64) -> Bridge {
    let bridge = local_bridge(delay_ms);
    bridge.initialize().unwrap();
    tokio::time::timeout(WAIT, bridge.wait_for_ready())
        .await
        .expect("environment should become ready")
        .unwrap();
    bridge
}

fn channel_bridge() -> (Bridge, EnvironmentPort) {
    let (launcher, port) = ChannelLauncher::new();
    (Bridge::new(BridgeConfig::default(), Arc::new(launcher)), port)
}

/// Callback forwarding the outcome into a channel.
fn forward(tx: &mpsc::UnboundedSender<Outcome>) -> ReplyCallback {
    let tx = tx.clone();
    Box::new(move |outcome: &Outcome| {
        let _ = tx.send(outcome.clone());
    })
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Outcome>) -> Outcome {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a reply")
        .expect("reply channel closed")
}

fn load_program(name: &str) -> Command {
    Command::LoadProgram {
        name: name.to_string(),
    }
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_distinct_ids_dispatch_in_send_order() {
    let bridge = ready_local_bridge(0).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let ids = ["first", "second", "third", "fourth"];
    for id in ids {
        bridge
            .execute(&load_program(id), id, Some(forward(&tx)))
            .unwrap();
    }

    let mut seen = Vec::new();
    for _ in ids {
        seen.push(next(&mut rx).await.id.to_string());
    }
    assert_eq!(seen, ids);
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn test_earlier_callback_fires_first_even_when_slow() {
    let bridge = ready_local_bridge(20).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    bridge
        .execute(&Command::RunAnalysis, "x", Some(forward(&tx)))
        .unwrap();
    bridge
        .execute(&Command::ShowProgram, "y", Some(forward(&tx)))
        .unwrap();

    assert_eq!(next(&mut rx).await.id.as_str(), "x");
    assert_eq!(next(&mut rx).await.id.as_str(), "y");
}

#[tokio::test]
async fn test_error_reply_reaches_callback() {
    let bridge = ready_local_bridge(0).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    bridge
        .execute(&load_program("raise"), "bad", Some(forward(&tx)))
        .unwrap();

    let outcome = next(&mut rx).await;
    assert!(outcome.is_error());
    assert!(outcome.text().contains("failed"));
}

// =============================================================================
// Readiness
// =============================================================================

#[tokio::test]
async fn test_wait_for_ready_resolves_for_all_waiters() {
    let (bridge, port) = channel_bridge();
    let bridge = Arc::new(bridge);
    let EnvironmentPort {
        mut requests,
        replies,
    } = port;
    bridge.initialize().unwrap();
    assert_eq!(bridge.readiness(), ReadinessState::Initializing);

    let resolved = Arc::new(AtomicUsize::new(0));
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let bridge = Arc::clone(&bridge);
            let resolved = Arc::clone(&resolved);
            tokio::spawn(async move {
                bridge.wait_for_ready().await.unwrap();
                resolved.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(resolved.load(Ordering::SeqCst), 0);

    assert_eq!(requests.recv().await, Some(Request::Initialize));
    replies.send(Reply::Initialized).await.unwrap();

    for waiter in waiters {
        tokio::time::timeout(WAIT, waiter).await.unwrap().unwrap();
    }
    assert_eq!(resolved.load(Ordering::SeqCst), 3);
    assert_eq!(bridge.readiness(), ReadinessState::Ready);

    // Already ready: resolves without another initialized reply.
    tokio::time::timeout(Duration::from_millis(50), bridge.wait_for_ready())
        .await
        .expect("should resolve immediately")
        .unwrap();
}

#[tokio::test]
async fn test_readiness_observable_reports_transitions() {
    let (bridge, port) = channel_bridge();
    let mut readiness = bridge.subscribe_readiness();
    assert_eq!(*readiness.borrow(), ReadinessState::Uninitialized);

    bridge.initialize().unwrap();
    assert_eq!(*readiness.borrow_and_update(), ReadinessState::Initializing);

    port.replies.send(Reply::Initialized).await.unwrap();
    tokio::time::timeout(WAIT, readiness.wait_for(|s| s.is_ready()))
        .await
        .unwrap()
        .unwrap();
}

// =============================================================================
// Subscriptions
// =============================================================================

#[tokio::test]
async fn test_persistent_handler_fires_until_unregistered() {
    let bridge = ready_local_bridge(0).await;
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    bridge.register_handler("timeline", move |_: &Outcome| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    for _ in 0..3 {
        bridge
            .execute(&Command::Timeline { iterations: 2 }, "timeline", None)
            .unwrap();
    }
    // FIFO: once the marker replies, every earlier reply has been dispatched.
    bridge
        .execute(&Command::ShowProgram, "marker-1", Some(forward(&tx)))
        .unwrap();
    next(&mut rx).await;
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    assert!(bridge.unregister_handler("timeline"));
    bridge
        .execute(&Command::Timeline { iterations: 2 }, "timeline", None)
        .unwrap();
    bridge
        .execute(&Command::ShowProgram, "marker-2", Some(forward(&tx)))
        .unwrap();
    next(&mut rx).await;
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_once_and_persistent_both_fire_for_one_reply() {
    let bridge = ready_local_bridge(0).await;
    let (handler_tx, mut handler_rx) = mpsc::unbounded_channel();
    bridge.register_handler("run_analysis", move |outcome: &Outcome| {
        let _ = handler_tx.send(outcome.clone());
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    bridge
        .execute(&Command::RunAnalysis, "run_analysis", Some(forward(&tx)))
        .unwrap();

    let once = next(&mut rx).await;
    let persistent = next(&mut handler_rx).await;
    assert_eq!(once, persistent);
}

#[tokio::test]
async fn test_duplicate_reply_is_dropped_after_once_fired() {
    let (bridge, port) = channel_bridge();
    bridge.initialize().unwrap();
    port.replies.send(Reply::Initialized).await.unwrap();
    bridge.wait_for_ready().await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let marker = forward(&tx);
    bridge
        .execute(
            &Command::ShowProgram,
            "dup",
            Some(Box::new(move |_: &Outcome| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();
    bridge
        .execute(&Command::ShowProgram, "marker", Some(marker))
        .unwrap();

    port.replies
        .send(Reply::text("one", Some("dup".into())))
        .await
        .unwrap();
    port.replies
        .send(Reply::text("two", Some("dup".into())))
        .await
        .unwrap();
    port.replies
        .send(Reply::text("", Some("marker".into())))
        .await
        .unwrap();

    next(&mut rx).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_late_registration_never_sees_earlier_reply() {
    let bridge = ready_local_bridge(0).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    bridge.execute(&Command::ProgramJson, "late", None).unwrap();
    bridge
        .execute(&Command::ShowProgram, "marker-1", Some(forward(&tx)))
        .unwrap();
    next(&mut rx).await;

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    bridge.register_handler("late", move |_: &Outcome| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    bridge
        .execute(&Command::ShowProgram, "marker-2", Some(forward(&tx)))
        .unwrap();
    next(&mut rx).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // New replies for the id are delivered.
    bridge.execute(&Command::ProgramJson, "late", None).unwrap();
    bridge
        .execute(&Command::ShowProgram, "marker-3", Some(forward(&tx)))
        .unwrap();
    next(&mut rx).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Requests
// =============================================================================

#[tokio::test]
async fn test_request_returns_result_value() {
    let bridge = ready_local_bridge(0).await;
    let value = bridge
        .request(&Command::Timeline { iterations: 4 }, "timeline")
        .await
        .unwrap();
    assert_eq!(value, json!("rvcat._scheduler.format_timeline(niters=4)"));
}

#[tokio::test]
async fn test_request_surfaces_execution_error() {
    let bridge = ready_local_bridge(0).await;
    let err = bridge
        .request(&load_program("raise"), "set_program")
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Execution { .. }));
}

#[tokio::test]
async fn test_execute_when_ready_waits_for_initialized() {
    let (bridge, port) = channel_bridge();
    let bridge = Arc::new(bridge);
    let EnvironmentPort {
        mut requests,
        replies,
    } = port;
    bridge.initialize().unwrap();
    assert_eq!(requests.recv().await, Some(Request::Initialize));

    let sender = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            bridge
                .execute_when_ready(&Command::ImportRvcat, "import_rvcat", None)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(requests.try_recv().is_err());

    replies.send(Reply::Initialized).await.unwrap();
    tokio::time::timeout(WAIT, sender)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    match requests.recv().await {
        Some(Request::Execute { code, id }) => {
            assert_eq!(code, "import rvcat");
            assert_eq!(id.unwrap().as_str(), "import_rvcat");
        }
        other => panic!("unexpected request: {:?}", other),
    }
}

// =============================================================================
// Termination
// =============================================================================

#[tokio::test]
async fn test_execute_after_terminate_never_reaches_channel() {
    let (bridge, port) = channel_bridge();
    let mut requests = port.requests;
    bridge.initialize().unwrap();
    bridge.terminate();
    bridge.terminate();

    let err = bridge
        .execute(&Command::ImportRvcat, "import_rvcat", None)
        .unwrap_err();
    assert!(err.is_lifecycle(LifecycleError::Terminated));
    assert!(bridge
        .submit(&Command::ImportRvcat)
        .unwrap_err()
        .is_lifecycle(LifecycleError::Terminated));

    assert_eq!(requests.recv().await, Some(Request::Initialize));
    assert_eq!(requests.recv().await, None);
}

#[tokio::test]
async fn test_drop_closes_request_channel() {
    let (bridge, port) = channel_bridge();
    let mut requests = port.requests;
    bridge.initialize().unwrap();
    drop(bridge);

    assert_eq!(requests.recv().await, Some(Request::Initialize));
    assert_eq!(requests.recv().await, None);
}

// =============================================================================
// Environment loss
// =============================================================================

fn is_closed<T>(result: &Result<T, BridgeError>) -> bool {
    matches!(result, Err(BridgeError::Channel(ChannelError::Closed)))
}

#[tokio::test]
async fn test_pending_request_fails_when_environment_goes_away() {
    let (bridge, port) = channel_bridge();
    let bridge = Arc::new(bridge);
    let EnvironmentPort { requests, replies } = port;
    bridge.initialize().unwrap();
    replies.send(Reply::Initialized).await.unwrap();
    bridge.wait_for_ready().await.unwrap();

    let waiter = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.request(&Command::RunAnalysis, "run").await })
    };
    while bridge.pending_count() == 0 {
        tokio::task::yield_now().await;
    }

    drop(replies);
    drop(requests);

    let result = tokio::time::timeout(WAIT, waiter)
        .await
        .expect("pending request should resolve")
        .unwrap();
    assert!(is_closed(&result));
    assert_eq!(bridge.pending_count(), 0);
    assert!(bridge.is_closed());

    // Later calls fail fast instead of queueing.
    assert!(is_closed(&bridge.execute(&Command::ImportRvcat, "import_rvcat", None)));
    assert!(is_closed(&bridge.request(&Command::RunAnalysis, "again").await));
    assert!(is_closed(&bridge.wait_for_ready().await));
}

#[tokio::test]
async fn test_wait_for_ready_fails_when_environment_dies_during_startup() {
    let (bridge, port) = channel_bridge();
    let bridge = Arc::new(bridge);
    bridge.initialize().unwrap();

    let waiter = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.wait_for_ready().await })
    };
    tokio::task::yield_now().await;
    drop(port);

    let result = tokio::time::timeout(WAIT, waiter)
        .await
        .expect("waiter should resolve")
        .unwrap();
    assert!(is_closed(&result));
    assert_eq!(bridge.readiness(), ReadinessState::Initializing);
}

#[cfg(unix)]
#[tokio::test]
async fn test_worker_exit_without_reply_fails_waiters() {
    // Reads initialize and exits without answering.
    let launcher = ProcessLauncher::new("sh", ["-c", "read line; exit 3"]);
    let bridge = Bridge::new(BridgeConfig::default(), Arc::new(launcher));
    bridge.initialize().unwrap();

    let result = tokio::time::timeout(WAIT, bridge.wait_for_ready())
        .await
        .expect("worker exit should be observed");
    assert!(is_closed(&result));
}

#[cfg(unix)]
#[tokio::test]
async fn test_worker_exit_mid_request_fails_request() {
    // Acknowledges initialize, reads one command and exits without a reply.
    let script = r#"read line; echo '{"action":"initialized"}'; read line; exit 0"#;
    let launcher = ProcessLauncher::new("sh", ["-c", script]);
    let bridge = Bridge::new(BridgeConfig::default(), Arc::new(launcher));
    bridge.initialize().unwrap();
    tokio::time::timeout(WAIT, bridge.wait_for_ready())
        .await
        .unwrap()
        .unwrap();

    let result = tokio::time::timeout(WAIT, bridge.request(&Command::RunAnalysis, "run"))
        .await
        .expect("request should resolve once the worker exits");
    assert!(is_closed(&result));
    assert_eq!(bridge.pending_count(), 0);
}
