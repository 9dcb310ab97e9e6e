//! Server-side call dispatch
//!
//! The [`Dispatcher`] resolves incoming call envelopes against a
//! [`ToolRegistry`] and executes them, each in its own task so a slow or
//! panicking tool never blocks other calls on the same connection. Exactly
//! one result envelope is produced per call envelope, whatever happens
//! inside the tool body.

use crate::BusError;
use crate::protocol::{
    ArgMap, CallEnvelope, Envelope, ResultEnvelope, ServerInfo, WireError, WireErrorKind, methods,
};
use crate::registry::ToolRegistry;
use crate::transport::{SocketTransport, StdioServerTransport, Transport};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, warn};

/// Upper bound on tool bodies running concurrently per dispatcher
const DEFAULT_MAX_CONCURRENT_CALLS: usize = 32;

/// Executes call envelopes against a registry
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    info: ServerInfo,
    limit: Arc<Semaphore>,
}

impl Dispatcher {
    /// Create a dispatcher with the default concurrency bound
    pub fn new(registry: Arc<ToolRegistry>, info: ServerInfo) -> Self {
        Self::with_concurrency(registry, info, DEFAULT_MAX_CONCURRENT_CALLS)
    }

    /// Create a dispatcher bounding concurrent tool executions
    pub fn with_concurrency(
        registry: Arc<ToolRegistry>,
        info: ServerInfo,
        max_concurrent: usize,
    ) -> Self {
        Self {
            registry,
            info,
            limit: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// The registry this dispatcher executes against
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Handle one call envelope, producing exactly one result envelope
    pub async fn handle(&self, call: CallEnvelope) -> ResultEnvelope {
        let id = call.id;
        match call.method.as_str() {
            methods::INITIALIZE => ResultEnvelope::success(id, json!(self.info)),
            methods::LIST_TOOLS => ResultEnvelope::success(id, json!(self.registry.descriptors())),
            methods::CALL_TOOL => self.handle_call_tool(call).await,
            other => ResultEnvelope::failure(
                id,
                WireError::new(WireErrorKind::Protocol, format!("unknown method: {}", other)),
            ),
        }
    }

    async fn handle_call_tool(&self, call: CallEnvelope) -> ResultEnvelope {
        let id = call.id;
        let params = match call.tool_call_params() {
            Ok(params) => params,
            Err(e) => return ResultEnvelope::failure(id, WireError::from(&e)),
        };

        // Closed only if the dispatcher is dropped mid-call; treat as shutdown.
        let _permit = match self.limit.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return ResultEnvelope::failure(
                    id,
                    WireError::new(WireErrorKind::Internal, "dispatcher shutting down"),
                );
            }
        };

        match invoke_tool(&self.registry, &params.name, params.arguments).await {
            Ok(value) => ResultEnvelope::success(id, value),
            Err(e) => ResultEnvelope::failure(id, WireError::from(&e)),
        }
    }

    /// Serve one connection: pump frames, dispatch calls concurrently.
    ///
    /// Returns when the peer disconnects. Results produced after the peer
    /// is gone are dropped with the connection.
    pub async fn serve(self: Arc<Self>, transport: Arc<dyn Transport>) {
        let (results_tx, mut results_rx) = mpsc::channel::<ResultEnvelope>(64);

        loop {
            tokio::select! {
                Some(result) = results_rx.recv() => {
                    if let Err(e) = transport.send(Envelope::Result(result)).await {
                        debug!(error = %e, "peer gone while sending result");
                        return;
                    }
                }
                frame = transport.receive() => match frame {
                    Ok(Envelope::Call(call)) => {
                        let dispatcher = Arc::clone(&self);
                        let results_tx = results_tx.clone();
                        tokio::spawn(async move {
                            let result = dispatcher.handle(call).await;
                            let _ = results_tx.send(result).await;
                        });
                    }
                    Ok(Envelope::Result(result)) => {
                        debug!(id = result.id, "ignoring result frame from client");
                    }
                    Err(e) => {
                        debug!(error = %e, "client disconnected");
                        return;
                    }
                }
            }
        }
    }
}

/// Resolve, bind and execute one tool call.
///
/// The body runs in a spawned task: a panic is caught at the join boundary
/// and reported as [`BusError::ToolExecution`] instead of unwinding into
/// the serving loop. Shared by the dispatcher and the fallback caller so
/// both paths fail identically.
pub(crate) async fn invoke_tool(
    registry: &Arc<ToolRegistry>,
    name: &str,
    arguments: ArgMap,
) -> Result<serde_json::Value, BusError> {
    let tool = registry.resolve(name)?;
    let bound = crate::descriptor::bind_arguments(&tool.descriptor(), &arguments)?;

    let name = name.to_string();
    let handle = tokio::spawn(async move { tool.invoke(bound).await });

    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            warn!(tool = %name, "tool body panicked");
            Err(BusError::execution(format!("tool '{}' panicked", name)))
        }
        Err(e) => Err(BusError::execution(format!(
            "tool '{}' was cancelled: {}",
            name, e
        ))),
    }
}

/// Serve a registry over the current process's stdin/stdout.
///
/// This is the entry point for a tool server spawned as a child process by
/// a stdio transport; it returns when the parent closes the pipe.
pub async fn serve_stdio(registry: Arc<ToolRegistry>, info: ServerInfo) {
    info!(server = %info.server_name, "serving tools on stdio");
    let dispatcher = Arc::new(Dispatcher::new(registry, info));
    let transport: Arc<dyn Transport> = Arc::new(StdioServerTransport::new());
    dispatcher.serve(transport).await;
}

/// Serve a registry on a TCP listener, one serving loop per connection.
///
/// Runs until the listener fails; callers typically spawn this.
pub async fn serve_socket(
    listener: TcpListener,
    registry: Arc<ToolRegistry>,
    info: ServerInfo,
) -> Result<(), BusError> {
    info!(server = %info.server_name, addr = ?listener.local_addr().ok(), "serving tools on socket");
    let dispatcher = Arc::new(Dispatcher::new(registry, info));

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| BusError::connection_lost(format!("accept failed: {}", e)))?;
        debug!(peer = %peer, "accepted tool client");

        let dispatcher = Arc::clone(&dispatcher);
        let transport: Arc<dyn Transport> = Arc::new(SocketTransport::from_stream(stream));
        tokio::spawn(dispatcher.serve(transport));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ParamSpec;
    use crate::registry::{FnTool, ToolRegistry};
    use serde_json::json;

    fn test_registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new(
            "add",
            "Add two numbers",
            vec![
                ParamSpec::number("a", "first operand"),
                ParamSpec::number("b", "second operand"),
            ],
            |args| {
                let a = args["a"].as_f64().unwrap_or_default();
                let b = args["b"].as_f64().unwrap_or_default();
                Ok(json!(a + b))
            },
        )));
        registry.register(Arc::new(FnTool::new("panicky", "Always panics", vec![], |_| {
            panic!("boom")
        })));
        Arc::new(registry)
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(test_registry(), ServerInfo::new("test-server", "0.0.0"))
    }

    fn call_tool_envelope(id: u64, name: &str, args: serde_json::Value) -> CallEnvelope {
        CallEnvelope::new(id, methods::CALL_TOOL).with_params(json!({
            "name": name,
            "arguments": args,
        }))
    }

    #[tokio::test]
    async fn test_call_produces_matching_id() {
        let result = dispatcher()
            .handle(call_tool_envelope(41, "add", json!({"a": 2, "b": 3})))
            .await;
        assert_eq!(result.id, 41);
        assert_eq!(result.into_result().unwrap(), json!(5.0));
    }

    #[tokio::test]
    async fn test_unknown_tool_never_hangs() {
        let result = dispatcher()
            .handle(call_tool_envelope(1, "frobnicate", json!({})))
            .await;
        let err = result.into_result().unwrap_err();
        assert_eq!(err.kind, WireErrorKind::UnknownTool);
    }

    #[tokio::test]
    async fn test_invalid_arguments_rejected_before_execution() {
        let result = dispatcher()
            .handle(call_tool_envelope(2, "add", json!({"a": 2})))
            .await;
        let err = result.into_result().unwrap_err();
        assert_eq!(err.kind, WireErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn test_panic_becomes_tool_execution_failure() {
        let result = dispatcher()
            .handle(call_tool_envelope(3, "panicky", json!({})))
            .await;
        let err = result.into_result().unwrap_err();
        assert_eq!(err.kind, WireErrorKind::ToolExecution);
        assert!(err.message.contains("panicked"));
    }

    #[tokio::test]
    async fn test_initialize_reports_identity() {
        let result = dispatcher()
            .handle(CallEnvelope::new(1, methods::INITIALIZE))
            .await;
        let value = result.into_result().unwrap();
        assert_eq!(value["serverName"], "test-server");
    }

    #[tokio::test]
    async fn test_list_tools_returns_descriptors() {
        let result = dispatcher()
            .handle(CallEnvelope::new(1, methods::LIST_TOOLS))
            .await;
        let value = result.into_result().unwrap();
        let names: Vec<_> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["add", "panicky"]);
    }

    #[tokio::test]
    async fn test_unknown_method_is_protocol_error() {
        let result = dispatcher().handle(CallEnvelope::new(1, "shutdown")).await;
        let err = result.into_result().unwrap_err();
        assert_eq!(err.kind, WireErrorKind::Protocol);
    }
}
