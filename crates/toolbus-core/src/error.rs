//! Error types for the toolbus protocol layer

use crate::protocol::{WireError, WireErrorKind};
use thiserror::Error;

/// Errors produced by transports, sessions and tool dispatch.
#[derive(Debug, Error, Clone)]
pub enum BusError {
    /// Initial connection to a server could not be established
    #[error("connect failed: {message}")]
    Connect { message: String },

    /// The transport was severed while the session was live
    #[error("connection lost: {message}")]
    ConnectionLost { message: String },

    /// No response arrived within the per-call deadline
    #[error("call timed out after {millis} ms")]
    Timeout { millis: u64 },

    /// No tool with this name is registered
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    /// Supplied arguments do not satisfy the tool's parameter schema
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// The tool body failed or panicked
    #[error("tool execution failed: {message}")]
    ToolExecution { message: String },

    /// A bare tool name matches more than one connected server
    #[error("ambiguous tool name '{name}' (matches servers: {candidates})")]
    AmbiguousTool { name: String, candidates: String },

    /// A malformed or unexpected frame, method or payload
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Envelope (de)serialization failed
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl BusError {
    /// Create a new Connect error
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Create a new ConnectionLost error
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
        }
    }

    /// Create a new Timeout error
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout {
            millis: duration.as_millis() as u64,
        }
    }

    /// Create a new UnknownTool error
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    /// Create a new InvalidArguments error
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create a new ToolExecution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::ToolExecution {
            message: message.into(),
        }
    }

    /// Create a new AmbiguousTool error
    pub fn ambiguous(name: impl Into<String>, candidates: &[String]) -> Self {
        Self::AmbiguousTool {
            name: name.into(),
            candidates: candidates.join(", "),
        }
    }

    /// Create a new Protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Whether this error should be retried against the local fallback caller.
    ///
    /// Only transport-level failures qualify; caller mistakes
    /// (`UnknownTool`, `InvalidArguments`, `AmbiguousTool`) surface as-is.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ConnectionLost { .. } | Self::Connect { .. }
        )
    }

    /// Rebuild a client-side error from a failure envelope's wire form.
    pub fn from_wire(err: WireError) -> Self {
        match err.kind {
            WireErrorKind::UnknownTool => Self::UnknownTool { name: err.message },
            WireErrorKind::InvalidArguments => Self::InvalidArguments {
                message: err.message,
            },
            WireErrorKind::ToolExecution => Self::ToolExecution {
                message: err.message,
            },
            WireErrorKind::Timeout => Self::Timeout { millis: 0 },
            WireErrorKind::ConnectionLost => Self::ConnectionLost {
                message: err.message,
            },
            WireErrorKind::Protocol | WireErrorKind::Internal => Self::Protocol {
                message: err.message,
            },
        }
    }
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for BusError {
    fn from(err: std::io::Error) -> Self {
        Self::connection_lost(err.to_string())
    }
}
