//! Utility tools

use crate::args;
use async_trait::async_trait;
use chrono::Local;
use serde_json::{Value, json};
use toolbus_core::{ArgMap, BusError, ParamSpec, Tool};
use uuid::Uuid;

/// Report the current local time
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current local time"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    async fn invoke(&self, _arguments: ArgMap) -> Result<Value, BusError> {
        Ok(json!(Local::now().format("%Y-%m-%d %H:%M:%S").to_string()))
    }
}

/// Generate a random UUID
pub struct GenerateUuidTool;

#[async_trait]
impl Tool for GenerateUuidTool {
    fn name(&self) -> &str {
        "generate_uuid"
    }

    fn description(&self) -> &str {
        "Generate a random unique identifier"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    async fn invoke(&self, _arguments: ArgMap) -> Result<Value, BusError> {
        Ok(json!(Uuid::new_v4().to_string()))
    }
}

/// Pretty-print a JSON string
pub struct FormatJsonTool;

#[async_trait]
impl Tool for FormatJsonTool {
    fn name(&self) -> &str {
        "format_json"
    }

    fn description(&self) -> &str {
        "Pretty-print a JSON string"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::string("data", "JSON text to format")]
    }

    async fn invoke(&self, arguments: ArgMap) -> Result<Value, BusError> {
        let data = args::string(&arguments, "data")?;
        let parsed: Value = serde_json::from_str(data)
            .map_err(|e| BusError::execution(format!("JSON parsing error: {}", e)))?;
        let pretty = serde_json::to_string_pretty(&parsed)
            .map_err(|e| BusError::execution(e.to_string()))?;
        Ok(json!(pretty))
    }
}
