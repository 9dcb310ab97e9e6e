//! Client manager: the client-facing façade over every configured server
//!
//! Owns one [`Session`] per remote server, aggregates their tool catalogs
//! into a single namespace, routes calls to the owning session, and
//! degrades to the local [`FallbackCaller`] when a remote path is
//! unavailable. Orchestrators only ever see this type.

use crate::BusError;
use crate::config::BusConfig;
use crate::descriptor::ToolDescriptor;
use crate::fallback::FallbackCaller;
use crate::protocol::ArgMap;
use crate::session::Session;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Separator between server and tool in a qualified tool name
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Which path answered a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Answered by the named remote server
    Remote(String),
    /// Answered by the local fallback caller
    Fallback,
}

/// A call result together with the path that produced it
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// The tool's return value
    pub value: Value,
    /// Remote or fallback
    pub resolution: Resolution,
}

impl CallOutcome {
    /// Discard the resolution and keep the value
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Whether the local fallback answered
    pub fn was_fallback(&self) -> bool {
        self.resolution == Resolution::Fallback
    }
}

/// One entry in the aggregated tool catalog
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Owning server
    pub server: String,
    /// `server::tool` form, always valid
    pub qualified_name: String,
    /// The tool's advertised shape
    pub descriptor: ToolDescriptor,
}

enum Route {
    Remote {
        session: Arc<Session>,
        server: String,
        tool: String,
    },
    /// No remote owner; only the fallback can answer
    Local,
}

/// Aggregates sessions to every configured server behind one call surface
pub struct ClientManager {
    config: BusConfig,
    sessions: DashMap<String, Arc<Session>>,
    catalog: DashMap<String, CatalogEntry>,
    bare_names: DashMap<String, Vec<String>>,
    unavailable: DashMap<String, String>,
    fallback: Option<FallbackCaller>,
}

impl ClientManager {
    /// Create a manager for the given configuration
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
            catalog: DashMap::new(),
            bare_names: DashMap::new(),
            unavailable: DashMap::new(),
            fallback: None,
        }
    }

    /// Attach a local fallback caller
    pub fn with_fallback(mut self, fallback: FallbackCaller) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Connect to every enabled server and rebuild the catalog.
    ///
    /// A server that fails to connect (or to list its tools) is recorded in
    /// [`unavailable`](Self::unavailable) and skipped; the others still
    /// come up. Returns the number of connected servers.
    pub async fn connect_all(&self) -> usize {
        self.teardown().await;

        for server_config in self.config.enabled_servers() {
            let name = server_config.name.clone();
            let timeout = self.config.timeout_for(&name);

            let session = match Session::connect(server_config, timeout).await {
                Ok(session) => Arc::new(session),
                Err(e) => {
                    warn!(server = %name, error = %e, "server unavailable");
                    self.unavailable.insert(name, e.to_string());
                    continue;
                }
            };

            match session.list_tools().await {
                Ok(descriptors) => {
                    for descriptor in descriptors {
                        self.index_tool(&name, descriptor);
                    }
                    debug!(server = %name, "server connected");
                    self.sessions.insert(name, session);
                }
                Err(e) => {
                    warn!(server = %name, error = %e, "listing tools failed, dropping server");
                    session.close().await;
                    self.unavailable.insert(name, e.to_string());
                }
            }
        }

        self.sessions.len()
    }

    fn index_tool(&self, server: &str, descriptor: ToolDescriptor) {
        let qualified = format!("{}{}{}", server, NAMESPACE_SEPARATOR, descriptor.name);
        self.bare_names
            .entry(descriptor.name.clone())
            .or_default()
            .push(server.to_string());
        self.catalog.insert(
            qualified.clone(),
            CatalogEntry {
                server: server.to_string(),
                qualified_name: qualified,
                descriptor,
            },
        );
    }

    /// The aggregated tool catalog, sorted by qualified name
    pub fn catalog(&self) -> Vec<CatalogEntry> {
        let mut entries: Vec<_> = self.catalog.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        entries
    }

    /// Servers that failed their last connection attempt, with the reason
    pub fn unavailable(&self) -> Vec<(String, String)> {
        self.unavailable
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Names of currently connected servers
    pub fn connected_servers(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// The attached fallback caller, if any
    pub fn fallback(&self) -> Option<&FallbackCaller> {
        self.fallback.as_ref()
    }

    /// Invoke a tool by bare or `server::tool` qualified name.
    ///
    /// Remote `Timeout`/`ConnectionLost` failures are retried against a
    /// same-named local tool when a fallback caller is attached; caller
    /// mistakes (`UnknownTool`, `InvalidArguments`, `AmbiguousTool`)
    /// surface immediately.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: ArgMap,
        timeout: Option<Duration>,
    ) -> Result<CallOutcome, BusError> {
        let bare = bare_name(name);

        match self.resolve_route(name) {
            Ok(Route::Remote {
                session,
                server,
                tool,
            }) => match session.call(&tool, arguments.clone(), timeout).await {
                Ok(value) => Ok(CallOutcome {
                    value,
                    resolution: Resolution::Remote(server),
                }),
                Err(e) if e.triggers_fallback() => self.try_fallback(bare, arguments, e).await,
                Err(e) => Err(e),
            },
            Ok(Route::Local) => match &self.fallback {
                Some(fallback) if fallback.has_tool(bare) => {
                    let value = fallback.call_tool(bare, arguments).await?;
                    Ok(CallOutcome {
                        value,
                        resolution: Resolution::Fallback,
                    })
                }
                _ => Err(BusError::unknown_tool(name)),
            },
            Err(e) if e.triggers_fallback() => self.try_fallback(bare, arguments, e).await,
            Err(e) => Err(e),
        }
    }

    /// Map a tool name to the session that owns it
    fn resolve_route(&self, name: &str) -> Result<Route, BusError> {
        if let Some((server, tool)) = name.split_once(NAMESPACE_SEPARATOR) {
            return match self.sessions.get(server) {
                Some(session) => Ok(Route::Remote {
                    session: Arc::clone(session.value()),
                    server: server.to_string(),
                    tool: tool.to_string(),
                }),
                None if self.config.server(server).is_some() => Err(BusError::connection_lost(
                    format!("server '{}' is not connected", server),
                )),
                None => Err(BusError::unknown_tool(name)),
            };
        }

        let owners = match self.bare_names.get(name) {
            Some(owners) => owners.value().clone(),
            None => return Ok(Route::Local),
        };

        let server = match owners.as_slice() {
            [] => return Ok(Route::Local),
            [only] => only.clone(),
            _ => {
                let preferred = self
                    .config
                    .default_server
                    .as_ref()
                    .filter(|d| owners.contains(d));
                match preferred {
                    Some(server) => server.clone(),
                    None => {
                        let mut candidates = owners.clone();
                        candidates.sort();
                        return Err(BusError::ambiguous(name, &candidates));
                    }
                }
            }
        };

        match self.sessions.get(&server) {
            Some(session) => Ok(Route::Remote {
                session: Arc::clone(session.value()),
                server,
                tool: name.to_string(),
            }),
            None => Err(BusError::connection_lost(format!(
                "server '{}' is not connected",
                server
            ))),
        }
    }

    /// The degrade-gracefully path: retry a failed remote call locally
    async fn try_fallback(
        &self,
        tool: &str,
        arguments: ArgMap,
        remote_error: BusError,
    ) -> Result<CallOutcome, BusError> {
        match &self.fallback {
            Some(fallback) if fallback.has_tool(tool) => {
                warn!(tool = %tool, error = %remote_error, "remote call failed, using local fallback");
                let value = fallback.call_tool(tool, arguments).await?;
                Ok(CallOutcome {
                    value,
                    resolution: Resolution::Fallback,
                })
            }
            _ => Err(remote_error),
        }
    }

    /// Close every session and forget the catalog; idempotent
    pub async fn disconnect_all(&self) {
        self.teardown().await;
    }

    async fn teardown(&self) {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for session in sessions {
            session.close().await;
        }
        self.sessions.clear();
        self.catalog.clear();
        self.bare_names.clear();
        self.unavailable.clear();
    }
}

impl std::fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager")
            .field("connected", &self.connected_servers())
            .field("tools", &self.catalog.len())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Tool part of a possibly qualified name
fn bare_name(name: &str) -> &str {
    name.split_once(NAMESPACE_SEPARATOR)
        .map(|(_, tool)| tool)
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ParamSpec;
    use crate::registry::{FnTool, ToolRegistry};
    use serde_json::json;

    fn local_only_manager() -> ClientManager {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new(
            "local_time",
            "Report a fixed timestamp",
            vec![],
            |_| Ok(json!("2024-01-01T00:00:00Z")),
        )));
        registry.register(Arc::new(FnTool::new(
            "echo",
            "Echo the input text",
            vec![ParamSpec::string("text", "text to echo")],
            |args| Ok(json!(format!("Echo: {}", args["text"].as_str().unwrap_or_default()))),
        )));

        ClientManager::new(BusConfig::new())
            .with_fallback(FallbackCaller::new(Arc::new(registry)))
    }

    #[tokio::test]
    async fn test_local_only_tool_routes_to_fallback() {
        let manager = local_only_manager();
        assert_eq!(manager.connect_all().await, 0);

        let outcome = manager
            .call_tool("local_time", ArgMap::new(), None)
            .await
            .unwrap();
        assert!(outcome.was_fallback());
        assert_eq!(outcome.value, json!("2024-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_unknown_everywhere_is_unknown_tool() {
        let manager = local_only_manager();
        let err = manager
            .call_tool("missing", ArgMap::new(), None)
            .await
            .err()
            .expect("call should fail");
        assert!(matches!(err, BusError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn test_invalid_arguments_not_retried() {
        let manager = local_only_manager();
        let err = manager
            .call_tool("echo", ArgMap::new(), None)
            .await
            .err()
            .expect("call should fail");
        assert!(matches!(err, BusError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_qualified_name_for_unconfigured_server() {
        let manager = local_only_manager();
        let err = manager
            .call_tool("ghost::echo", ArgMap::new(), None)
            .await
            .err()
            .expect("call should fail");
        assert!(matches!(err, BusError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server_recorded_not_fatal() {
        let config = BusConfig::new()
            .with_server(crate::config::ServerConfig::socket("dead", "127.0.0.1:1"));
        let manager = ClientManager::new(config);

        assert_eq!(manager.connect_all().await, 0);
        let unavailable = manager.unavailable();
        assert_eq!(unavailable.len(), 1);
        assert_eq!(unavailable[0].0, "dead");
        assert!(manager.catalog().is_empty());
    }

    #[tokio::test]
    async fn test_qualified_name_for_unavailable_server_falls_back() {
        let config = BusConfig::new()
            .with_server(crate::config::ServerConfig::socket("dead", "127.0.0.1:1"));

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new("echo", "Echo", vec![], |_| {
            Ok(json!("Echo: "))
        })));
        let manager =
            ClientManager::new(config).with_fallback(FallbackCaller::new(Arc::new(registry)));
        manager.connect_all().await;

        let outcome = manager
            .call_tool("dead::echo", ArgMap::new(), None)
            .await
            .unwrap();
        assert!(outcome.was_fallback());
    }

    #[test]
    fn test_bare_name() {
        assert_eq!(bare_name("calc::add"), "add");
        assert_eq!(bare_name("add"), "add");
    }
}
