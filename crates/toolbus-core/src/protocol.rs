//! Wire envelopes for the tool-invocation protocol
//!
//! Every frame on a transport is one JSON object: either a [`CallEnvelope`]
//! carrying a method invocation, or a [`ResultEnvelope`] answering it. The
//! two are correlated by the session-assigned `id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol version exchanged during the initialize handshake
pub const PROTOCOL_VERSION: &str = "1.0";

/// Argument mapping passed to a tool (parameter name -> value)
pub type ArgMap = Map<String, Value>;

/// A single frame on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    /// Outbound method invocation
    Call(CallEnvelope),
    /// Inbound answer to a previous call
    Result(ResultEnvelope),
}

impl Envelope {
    /// Correlation id carried by this frame
    pub fn id(&self) -> u64 {
        match self {
            Self::Call(call) => call.id,
            Self::Result(result) => result.id,
        }
    }

    /// Check if this is a result frame
    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }
}

/// A method invocation frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEnvelope {
    /// Correlation id, unique and monotonic per session
    pub id: u64,
    /// Method name (see [`methods`])
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// When the issuing session built this envelope
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl CallEnvelope {
    /// Create a new call envelope
    pub fn new(id: u64, method: impl Into<String>) -> Self {
        Self {
            id,
            method: method.into(),
            params: None,
            created_at: Utc::now(),
        }
    }

    /// Add parameters
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Build a `call_tool` envelope for the given tool and arguments
    pub fn call_tool(id: u64, name: impl Into<String>, arguments: ArgMap) -> Self {
        Self::new(id, methods::CALL_TOOL).with_params(serde_json::json!({
            "name": name.into(),
            "arguments": arguments,
        }))
    }

    /// Parse the params of a `call_tool` envelope
    pub fn tool_call_params(&self) -> Result<ToolCallParams, crate::BusError> {
        let params = self
            .params
            .clone()
            .ok_or_else(|| crate::BusError::invalid_arguments("call_tool requires params"))?;
        serde_json::from_value(params)
            .map_err(|e| crate::BusError::invalid_arguments(format!("malformed params: {}", e)))
    }
}

/// Parameters of a `call_tool` invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    /// Tool name
    pub name: String,
    /// Named arguments
    #[serde(default)]
    pub arguments: ArgMap,
}

/// An answer frame; exactly one is produced per call envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// Correlation id this result answers
    pub id: u64,
    /// Result value (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl ResultEnvelope {
    /// Create a success result
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create a failure result
    pub fn failure(id: u64, error: WireError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Check if this is a success result
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Get the result value, consuming the envelope
    pub fn into_result(self) -> Result<Value, WireError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Failure payload carried in a result envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    /// Failure category
    pub kind: WireErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl WireError {
    /// Create a new wire error
    pub fn new(kind: WireErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

/// Failure categories as serialized on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireErrorKind {
    /// Requested tool is not registered on the serving side
    UnknownTool,
    /// Arguments failed schema binding
    InvalidArguments,
    /// The tool body raised
    ToolExecution,
    /// The serving side gave up on the call
    Timeout,
    /// Transport severed
    ConnectionLost,
    /// Malformed frame or unsupported method
    Protocol,
    /// Anything else on the serving side
    Internal,
}

impl From<&crate::BusError> for WireError {
    fn from(err: &crate::BusError) -> Self {
        use crate::BusError;
        match err {
            BusError::UnknownTool { name } => Self::new(WireErrorKind::UnknownTool, name.clone()),
            BusError::InvalidArguments { message } => {
                Self::new(WireErrorKind::InvalidArguments, message.clone())
            }
            BusError::ToolExecution { message } => {
                Self::new(WireErrorKind::ToolExecution, message.clone())
            }
            BusError::Timeout { .. } => Self::new(WireErrorKind::Timeout, err.to_string()),
            BusError::ConnectionLost { message } | BusError::Connect { message } => {
                Self::new(WireErrorKind::ConnectionLost, message.clone())
            }
            BusError::Protocol { message } | BusError::Serialization { message } => {
                Self::new(WireErrorKind::Protocol, message.clone())
            }
            BusError::AmbiguousTool { .. } => Self::new(WireErrorKind::Internal, err.to_string()),
        }
    }
}

/// Identity a serving side reports from the initialize handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Server name
    pub server_name: String,
    /// Server version
    pub server_version: String,
}

impl ServerInfo {
    /// Create new server info
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            server_name: name.into(),
            server_version: version.into(),
        }
    }
}

/// Parameters the client sends with `initialize`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Client name
    pub client_name: String,
    /// Client version
    pub client_version: String,
    /// Protocol version the client speaks
    #[serde(default)]
    pub protocol_version: Option<String>,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            client_name: "toolbus".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: Some(PROTOCOL_VERSION.to_string()),
        }
    }
}

/// Method names understood by the serving side
pub mod methods {
    /// Handshake
    pub const INITIALIZE: &str = "initialize";
    /// Enumerate tool descriptors
    pub const LIST_TOOLS: &str = "list_tools";
    /// Invoke a tool by name
    pub const CALL_TOOL: &str = "call_tool";
}
