//! Server-side tool registry
//!
//! A [`ToolRegistry`] is an explicit table of callable tools owned by
//! whichever process constructs it (a serving dispatcher or the local
//! fallback caller); there is deliberately no process-wide registry.

use crate::BusError;
use crate::descriptor::{ParamSpec, ToolDescriptor};
use crate::protocol::ArgMap;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A callable tool: an advertised shape plus an invocation body.
///
/// `invoke` receives arguments already bound against the tool's parameter
/// list (see [`bind_arguments`](crate::descriptor::bind_arguments)); a
/// failing body reports [`BusError::ToolExecution`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within one registry
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Ordered parameter list
    fn parameters(&self) -> Vec<ParamSpec>;

    /// Execute with bound arguments
    async fn invoke(&self, args: ArgMap) -> Result<Value, BusError>;

    /// The advertised shape of this tool
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name(), self.description(), self.parameters())
    }
}

/// Adapter registering a plain function or closure as a tool
pub struct FnTool<F> {
    name: String,
    description: String,
    parameters: Vec<ParamSpec>,
    handler: F,
}

impl<F> FnTool<F>
where
    F: Fn(ArgMap) -> Result<Value, BusError> + Send + Sync,
{
    /// Wrap a synchronous handler with an explicit descriptor
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ParamSpec>,
        handler: F,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        }
    }
}

#[async_trait]
impl<F> Tool for FnTool<F>
where
    F: Fn(ArgMap) -> Result<Value, BusError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        self.parameters.clone()
    }

    async fn invoke(&self, args: ArgMap) -> Result<Value, BusError> {
        (self.handler)(args)
    }
}

/// Table of callable tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool; re-registering a name overwrites the prior entry
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            debug!(tool = %name, "overwriting previously registered tool");
        }
    }

    /// Register several tools at once
    pub fn register_all(&mut self, tools: Vec<Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    /// Resolve a name to its callable
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, BusError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::unknown_tool(name))
    }

    /// Check whether a tool is registered
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Descriptors of every registered tool, sorted by name
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<_> = self.tools.values().map(|t| t.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Names of every registered tool
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool() -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            "echo",
            "Echo the input text",
            vec![ParamSpec::string("text", "text to echo")],
            |args| {
                let text = args["text"].as_str().unwrap_or_default();
                Ok(json!(format!("Echo: {}", text)))
            },
        ))
    }

    #[tokio::test]
    async fn test_register_and_invoke() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool());

        let tool = registry.resolve("echo").unwrap();
        let mut args = ArgMap::new();
        args.insert("text".to_string(), json!("hi"));

        let value = tool.invoke(args).await.unwrap();
        assert_eq!(value, json!("Echo: hi"));
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = ToolRegistry::new();
        let err = registry.resolve("nope").err().unwrap();
        assert!(matches!(err, BusError::UnknownTool { name } if name == "nope"));
    }

    #[test]
    fn test_last_write_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool());
        registry.register(Arc::new(FnTool::new(
            "echo",
            "Replacement echo",
            vec![],
            |_| Ok(json!("replaced")),
        )));

        assert_eq!(registry.len(), 1);
        let descriptor = registry.resolve("echo").unwrap().descriptor();
        assert_eq!(descriptor.description, "Replacement echo");
    }

    #[test]
    fn test_descriptors_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FnTool::new("zeta", "", vec![], |_| Ok(json!(0)))));
        registry.register(Arc::new(FnTool::new("alpha", "", vec![], |_| Ok(json!(0)))));

        let names: Vec<_> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["alpha", "zeta"]);
    }
}
