//! Typed wrapper for the RVCAT analysis tool.
//!
//! Each operation sends one [`Command`] under a fixed correlation id
//! ([`Topic`]) and waits for the result. Consumers that want to observe the
//! same results elsewhere register persistent handlers on those ids.

use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::facade::Session;
use crate::command::{Command, Selection};
use crate::error::{BridgeError, BridgeResult, ProtocolError};
use crate::protocol::CorrelationId;

/// Correlation ids used by [`RvcatApi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ImportRvcat,
    GetProcessors,
    GetPrograms,
    SetProcessor,
    SetProgram,
    Prepare,
    ProgramShow,
    /// Carries a per-call sequence number so each call gets its own id.
    SetRobSize(u64),
    RunAnalysis,
    Timeline,
}

impl Topic {
    /// Correlation id for this topic.
    pub fn id(self) -> CorrelationId {
        match self {
            Topic::SetRobSize(seq) => CorrelationId::new(format!("set_rob_size_{}", seq)),
            other => CorrelationId::new(other.fixed_name()),
        }
    }

    fn fixed_name(self) -> &'static str {
        match self {
            Topic::ImportRvcat => "import_rvcat",
            Topic::GetProcessors => "get_processors",
            Topic::GetPrograms => "get_programs",
            Topic::SetProcessor => "set_processor",
            Topic::SetProgram => "set_program",
            Topic::Prepare => "prepare",
            Topic::ProgramShow => "program_show",
            Topic::SetRobSize(_) => "set_rob_size",
            Topic::RunAnalysis => "run_analysis",
            Topic::Timeline => "timeline",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// RVCAT operations over a [`Session`].
///
/// All operations are gated: they fail with `NotReady` until the
/// environment is ready.
pub struct RvcatApi {
    session: Arc<Session>,
    sequence: AtomicU64,
}

impl RvcatApi {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            sequence: AtomicU64::new(1),
        }
    }

    /// Underlying session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    async fn call(&self, topic: Topic, command: Command) -> BridgeResult<Value> {
        let id = topic.id();
        let result = self.session.request(&command, id.clone()).await;
        match &result {
            Ok(_) => debug!(id = %id, command = command.name(), "RVCAT call completed"),
            Err(e) => warn!(id = %id, command = command.name(), error = %e, "RVCAT call failed"),
        }
        result
    }

    /// Imports the engine module.
    pub async fn import_rvcat(&self) -> BridgeResult<Value> {
        self.call(Topic::ImportRvcat, Command::ImportRvcat).await
    }

    /// Names of the available processor configurations.
    pub async fn processors(&self) -> BridgeResult<Vec<String>> {
        let value = self
            .call(Topic::GetProcessors, Command::ListProcessors)
            .await?;
        parse_names(Topic::GetProcessors.id(), value)
    }

    /// Names of the available programs.
    pub async fn programs(&self) -> BridgeResult<Vec<String>> {
        let value = self.call(Topic::GetPrograms, Command::ListPrograms).await?;
        parse_names(Topic::GetPrograms.id(), value)
    }

    /// Selects a processor configuration.
    pub async fn set_processor(&self, name: &str) -> BridgeResult<Value> {
        let command = Command::LoadProcessor {
            name: name.to_string(),
        };
        self.call(Topic::SetProcessor, command).await
    }

    /// Selects a program.
    pub async fn set_program(&self, name: &str) -> BridgeResult<Value> {
        let command = Command::LoadProgram {
            name: name.to_string(),
        };
        self.call(Topic::SetProgram, command).await
    }

    /// Loads processor, program and scheduler parameters in one step.
    pub async fn prepare(&self, selection: Selection) -> BridgeResult<Value> {
        self.call(Topic::Prepare, Command::Prepare(selection)).await
    }

    /// Annotated listing of the current program.
    pub async fn show_program(&self) -> BridgeResult<String> {
        let value = self.call(Topic::ProgramShow, Command::ShowExecution).await?;
        Ok(value_text(value))
    }

    /// Changes the reorder-buffer size.
    pub async fn set_rob_size(&self, size: u32) -> BridgeResult<Value> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.call(Topic::SetRobSize(seq), Command::SetRobSize { size })
            .await
    }

    /// Scheduler analysis of the current selection.
    pub async fn run_analysis(&self) -> BridgeResult<Value> {
        let value = self.call(Topic::RunAnalysis, Command::RunAnalysis).await?;
        Ok(decode_embedded_json(value))
    }

    /// Execution timeline over `iterations` loop iterations.
    pub async fn timeline(&self, iterations: u32) -> BridgeResult<String> {
        let value = self
            .call(Topic::Timeline, Command::Timeline { iterations })
            .await?;
        Ok(value_text(value))
    }
}

impl fmt::Debug for RvcatApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RvcatApi")
            .field("session", &self.session)
            .finish()
    }
}

/// Name lists arrive either as a JSON array or as a string holding one.
fn parse_names(id: CorrelationId, value: Value) -> BridgeResult<Vec<String>> {
    let parsed = match value {
        Value::String(text) => serde_json::from_str::<Vec<String>>(&text),
        other => serde_json::from_value::<Vec<String>>(other),
    };
    parsed.map_err(|e| {
        BridgeError::from(ProtocolError::UnexpectedPayload {
            id,
            reason: format!("expected a list of names: {}", e),
        })
    })
}

/// Engine JSON helpers return strings; unwrap them when they parse.
fn decode_embedded_json(value: Value) -> Value {
    match value {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_topic_ids() {
        assert_eq!(Topic::ImportRvcat.id().as_str(), "import_rvcat");
        assert_eq!(Topic::GetProcessors.id().as_str(), "get_processors");
        assert_eq!(Topic::ProgramShow.to_string(), "program_show");
        assert_eq!(Topic::SetRobSize(7).id().as_str(), "set_rob_size_7");
    }

    #[test]
    fn test_parse_names_from_string() {
        let names = parse_names("p".into(), json!(r#"["baseline","wide"]"#)).unwrap();
        assert_eq!(names, vec!["baseline", "wide"]);
    }

    #[test]
    fn test_parse_names_from_array() {
        let names = parse_names("p".into(), json!(["a"])).unwrap();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn test_parse_names_rejects_other_shapes() {
        let err = parse_names("get_programs".into(), json!({"a": 1})).unwrap_err();
        match err {
            BridgeError::Protocol(ProtocolError::UnexpectedPayload { id, .. }) => {
                assert_eq!(id.as_str(), "get_programs")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_embedded_json() {
        assert_eq!(
            decode_embedded_json(json!(r#"{"cycles": 4}"#)),
            json!({"cycles": 4})
        );
        assert_eq!(decode_embedded_json(json!("plain")), json!("plain"));
    }
}
