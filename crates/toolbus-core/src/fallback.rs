//! Local fallback tool caller
//!
//! An in-process registry with the same call contract as a remote session,
//! minus framing and transport. The client manager consults it when a tool
//! has no reachable remote owner, so orchestrators see one outcome shape
//! whichever path answered.

use crate::BusError;
use crate::descriptor::ToolDescriptor;
use crate::dispatcher::invoke_tool;
use crate::protocol::ArgMap;
use crate::registry::ToolRegistry;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_LOCAL_TIMEOUT: Duration = Duration::from_secs(30);

/// In-process tool caller used when remote resolution is unavailable
pub struct FallbackCaller {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl FallbackCaller {
    /// Create a fallback caller over a registry
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_LOCAL_TIMEOUT,
        }
    }

    /// Bound how long a local tool body may run
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether a local tool with this name exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.registry.has_tool(name)
    }

    /// Descriptors of every local tool
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.registry.descriptors()
    }

    /// Invoke a local tool with remote-identical semantics.
    ///
    /// Arguments are bound against the tool's descriptor, the body runs in
    /// its own task (a panic becomes [`BusError::ToolExecution`]), and the
    /// configured timeout yields [`BusError::Timeout`].
    pub async fn call_tool(&self, name: &str, arguments: ArgMap) -> Result<Value, BusError> {
        match tokio::time::timeout(self.timeout, invoke_tool(&self.registry, name, arguments)).await
        {
            Ok(result) => result,
            Err(_) => Err(BusError::timeout(self.timeout)),
        }
    }
}

impl std::fmt::Debug for FallbackCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackCaller")
            .field("tools", &self.registry.tool_names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ParamSpec;
    use crate::registry::FnTool;
    use serde_json::json;

    fn caller() -> FallbackCaller {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new(
            "echo",
            "Echo the input text",
            vec![ParamSpec::string("text", "text to echo")],
            |args| {
                let text = args["text"].as_str().unwrap_or_default();
                Ok(json!(format!("Echo: {}", text)))
            },
        )));
        FallbackCaller::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_local_call_matches_remote_shape() {
        let caller = caller();
        let mut args = ArgMap::new();
        args.insert("text".to_string(), json!("local"));

        let value = caller.call_tool("echo", args).await.unwrap();
        assert_eq!(value, json!("Echo: local"));
    }

    #[tokio::test]
    async fn test_unknown_local_tool() {
        let err = caller()
            .call_tool("missing", ArgMap::new())
            .await
            .err()
            .expect("call should fail");
        assert!(matches!(err, BusError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn test_binding_applies_locally_too() {
        let err = caller()
            .call_tool("echo", ArgMap::new())
            .await
            .err()
            .expect("call should fail");
        assert!(matches!(err, BusError::InvalidArguments { .. }));
    }
}
