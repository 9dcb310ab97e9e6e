//! Server and client-manager configuration
//!
//! These are the serde types a configuration loader feeds into
//! [`ClientManager`](crate::ClientManager); loading files and parsing CLI
//! flags happens outside this crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Transport variant a server entry selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Subprocess over stdin/stdout pipes
    Stdio,
    /// Server-push HTTP stream (SSE inbound, POST outbound)
    PushStream,
    /// Persistent bidirectional TCP socket
    Socket,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::PushStream => write!(f, "push-stream"),
            Self::Socket => write!(f, "socket"),
        }
    }
}

/// Configuration for a single remote tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique key used for namespacing and routing
    pub name: String,
    /// Transport variant
    pub transport: TransportKind,
    /// Command to execute (stdio transport)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Command arguments (stdio transport)
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables (stdio transport)
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Endpoint URL (push-stream and socket transports)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Per-call timeout in seconds; overrides the bus-wide default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Whether this server participates in connect_all
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ServerConfig {
    /// Create a stdio server entry
    pub fn stdio(
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Stdio,
            command: Some(command.into()),
            args,
            env: HashMap::new(),
            url: None,
            timeout_secs: None,
            enabled: true,
        }
    }

    /// Create a push-stream server entry
    pub fn push_stream(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::PushStream,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: Some(url.into()),
            timeout_secs: None,
            enabled: true,
        }
    }

    /// Create a socket server entry
    pub fn socket(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Socket,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: Some(url.into()),
            timeout_secs: None,
            enabled: true,
        }
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the per-call timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Disable this entry without removing it
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Top-level configuration for a [`ClientManager`](crate::ClientManager)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Ordered list of server entries
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    /// Bus-wide per-call timeout in seconds
    #[serde(default = "default_timeout")]
    pub default_timeout_secs: u64,
    /// Server preferred when a bare tool name matches several servers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_server: Option<String>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            default_timeout_secs: default_timeout(),
            default_server: None,
        }
    }
}

impl BusConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a server entry
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.servers.push(server);
        self
    }

    /// Set the bus-wide default timeout
    pub fn with_default_timeout(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    /// Prefer a server for ambiguous bare names
    pub fn with_default_server(mut self, name: impl Into<String>) -> Self {
        self.default_server = Some(name.into());
        self
    }

    /// Merge another config into this one (other's entries win on name clash)
    pub fn merge(&mut self, other: BusConfig) {
        for server in other.servers {
            if let Some(existing) = self.servers.iter_mut().find(|s| s.name == server.name) {
                *existing = server;
            } else {
                self.servers.push(server);
            }
        }
        if other.default_timeout_secs != default_timeout() {
            self.default_timeout_secs = other.default_timeout_secs;
        }
        if other.default_server.is_some() {
            self.default_server = other.default_server;
        }
    }

    /// Enabled server entries, in configured order
    pub fn enabled_servers(&self) -> impl Iterator<Item = &ServerConfig> {
        self.servers.iter().filter(|s| s.enabled)
    }

    /// Look up a server entry by name
    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Effective per-call timeout for the named server
    pub fn timeout_for(&self, name: &str) -> Duration {
        let secs = self
            .server(name)
            .and_then(|s| s.timeout_secs)
            .unwrap_or(self.default_timeout_secs);
        Duration::from_secs(secs)
    }
}
