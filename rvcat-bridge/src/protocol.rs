//! Wire messages exchanged with the execution environment.
//!
//! This module defines the request and reply envelopes carried over the
//! bridge channel, plus the [`Outcome`] handed to subscribers once a reply
//! has been demultiplexed.
//!
//! # Wire Format
//!
//! Messages are JSON objects discriminated by an `action` field:
//!
//! ```text
//! host ──► environment   {"action":"initialize"}
//!                        {"action":"loadPackage","package":"numpy"}
//!                        {"action":"execute","code":"import rvcat","id":"import_rvcat"}
//!
//! environment ──► host   {"action":"initialized"}
//!                        {"action":"loadedPackage","package":"numpy"}
//!                        {"action":"executed","result":"...","data_type":"text","id":"import_rvcat"}
//! ```
//!
//! The environment echoes `id` whenever the request carried one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::fmt;

use crate::error::ProtocolError;

// =============================================================================
// Correlation Id
// =============================================================================

/// Caller-supplied token matching a request to its eventual reply.
///
/// Ids are not required to be unique. Reusing an id while a one-shot
/// callback is still pending replaces that callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Creates a correlation id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&CorrelationId> for CorrelationId {
    fn from(id: &CorrelationId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for CorrelationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Data Type
// =============================================================================

/// Discriminates a successful payload from a stringified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// The command ran and produced a result.
    Text,
    /// The command failed; the payload carries the stringified cause.
    Error,
}

impl DataType {
    /// Returns true for error payloads.
    pub fn is_error(self) -> bool {
        matches!(self, DataType::Error)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Text => write!(f, "text"),
            DataType::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Request
// =============================================================================

/// Message sent from the host to the execution environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    /// Start the environment. Answered by [`Reply::Initialized`].
    Initialize,

    /// Load an extension package into the environment.
    LoadPackage {
        /// Package name or wheel file.
        package: String,
        /// Optional correlation id echoed on the reply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<CorrelationId>,
    },

    /// Run rendered command text.
    Execute {
        /// Engine command text.
        code: String,
        /// Optional correlation id echoed on the reply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<CorrelationId>,
    },
}

impl Request {
    /// Creates an execute request.
    pub fn execute(code: impl Into<String>, id: Option<CorrelationId>) -> Self {
        Request::Execute {
            code: code.into(),
            id,
        }
    }

    /// Creates a load-package request.
    pub fn load_package(package: impl Into<String>, id: Option<CorrelationId>) -> Self {
        Request::LoadPackage {
            package: package.into(),
            id,
        }
    }

    /// Returns the correlation id carried by this request, if any.
    pub fn id(&self) -> Option<&CorrelationId> {
        match self {
            Request::Initialize => None,
            Request::LoadPackage { id, .. } | Request::Execute { id, .. } => id.as_ref(),
        }
    }

    /// Returns the wire name of the action.
    pub fn action(&self) -> &'static str {
        match self {
            Request::Initialize => "initialize",
            Request::LoadPackage { .. } => "loadPackage",
            Request::Execute { .. } => "execute",
        }
    }

    /// Encodes the request as a single-line JSON object.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decodes a request from JSON text.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }
}

// =============================================================================
// Reply
// =============================================================================

/// Message sent from the execution environment back to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Reply {
    /// The environment finished starting.
    Initialized,

    /// A package finished loading.
    LoadedPackage {
        /// Package that was loaded.
        package: String,
        /// Correlation id of the originating request, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<CorrelationId>,
    },

    /// A command finished, successfully or not.
    Executed {
        /// Command result, or the stringified failure cause.
        #[serde(default)]
        result: Value,
        /// Whether `result` is a value or an error.
        data_type: DataType,
        /// Correlation id of the originating request, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<CorrelationId>,
    },
}

impl Reply {
    /// Creates a successful executed reply.
    pub fn text(result: impl Into<Value>, id: Option<CorrelationId>) -> Self {
        Reply::Executed {
            result: result.into(),
            data_type: DataType::Text,
            id,
        }
    }

    /// Creates a failed executed reply carrying the stringified cause.
    pub fn error(cause: impl Into<String>, id: Option<CorrelationId>) -> Self {
        Reply::Executed {
            result: Value::String(cause.into()),
            data_type: DataType::Error,
            id,
        }
    }

    /// Returns the correlation id carried by this reply, if any.
    pub fn id(&self) -> Option<&CorrelationId> {
        match self {
            Reply::Initialized => None,
            Reply::LoadedPackage { id, .. } | Reply::Executed { id, .. } => id.as_ref(),
        }
    }

    /// Returns the wire name of the action.
    pub fn action(&self) -> &'static str {
        match self {
            Reply::Initialized => "initialized",
            Reply::LoadedPackage { .. } => "loadedPackage",
            Reply::Executed { .. } => "executed",
        }
    }

    /// Encodes the reply as a single-line JSON object.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decodes a reply from JSON text.
    ///
    /// Unknown actions, invalid JSON and `executed` replies without a
    /// `data_type` are reported as [`ProtocolError::Malformed`].
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    /// Converts an addressed reply into the outcome delivered to subscribers.
    ///
    /// Returns `None` for [`Reply::Initialized`] and for replies without id.
    pub fn into_outcome(self) -> Option<Outcome> {
        match self {
            Reply::Initialized => None,
            Reply::LoadedPackage { package, id } => id.map(|id| Outcome {
                id,
                result: Value::String(package),
                kind: DataType::Text,
            }),
            Reply::Executed {
                result,
                data_type,
                id,
            } => id.map(|id| Outcome {
                id,
                result,
                kind: data_type,
            }),
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Payload delivered to one-shot callbacks and persistent handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Correlation id the reply was addressed to.
    pub id: CorrelationId,
    /// Result value, or the stringified cause for errors.
    pub result: Value,
    /// Success or error discriminator.
    pub kind: DataType,
}

impl Outcome {
    /// Returns true if the environment reported a failure.
    pub fn is_error(&self) -> bool {
        self.kind.is_error()
    }

    /// Returns the result rendered as text.
    ///
    /// String results are returned verbatim; other JSON values are
    /// serialized, and `null` becomes the empty string.
    pub fn text(&self) -> String {
        value_to_text(&self.result)
    }

    /// Splits the outcome into the result value or the failure cause.
    pub fn into_result(self) -> Result<Value, String> {
        match self.kind {
            DataType::Text => Ok(self.result),
            DataType::Error => Err(value_to_text(&self.result)),
        }
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
