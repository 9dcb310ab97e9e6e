//! Text manipulation tools

use crate::args;
use async_trait::async_trait;
use serde_json::{Value, json};
use toolbus_core::{ArgMap, BusError, ParamSpec, Tool};

fn text_param() -> Vec<ParamSpec> {
    vec![ParamSpec::string("text", "Input text")]
}

/// Echo the input back, prefixed
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input text back"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        text_param()
    }

    async fn invoke(&self, arguments: ArgMap) -> Result<Value, BusError> {
        let text = args::string(&arguments, "text")?;
        Ok(json!(format!("Echo: {}", text)))
    }
}

/// Convert text to upper case
pub struct UppercaseTool;

#[async_trait]
impl Tool for UppercaseTool {
    fn name(&self) -> &str {
        "uppercase"
    }

    fn description(&self) -> &str {
        "Convert text to upper case"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        text_param()
    }

    async fn invoke(&self, arguments: ArgMap) -> Result<Value, BusError> {
        Ok(json!(args::string(&arguments, "text")?.to_uppercase()))
    }
}

/// Convert text to lower case
pub struct LowercaseTool;

#[async_trait]
impl Tool for LowercaseTool {
    fn name(&self) -> &str {
        "lowercase"
    }

    fn description(&self) -> &str {
        "Convert text to lower case"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        text_param()
    }

    async fn invoke(&self, arguments: ArgMap) -> Result<Value, BusError> {
        Ok(json!(args::string(&arguments, "text")?.to_lowercase()))
    }
}

/// Reverse the characters of the text
pub struct ReverseTextTool;

#[async_trait]
impl Tool for ReverseTextTool {
    fn name(&self) -> &str {
        "reverse_text"
    }

    fn description(&self) -> &str {
        "Reverse the characters of the text"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        text_param()
    }

    async fn invoke(&self, arguments: ArgMap) -> Result<Value, BusError> {
        let reversed: String = args::string(&arguments, "text")?.chars().rev().collect();
        Ok(json!(reversed))
    }
}

/// Count whitespace-separated words
pub struct CountWordsTool;

#[async_trait]
impl Tool for CountWordsTool {
    fn name(&self) -> &str {
        "count_words"
    }

    fn description(&self) -> &str {
        "Count whitespace-separated words in the text"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        text_param()
    }

    async fn invoke(&self, arguments: ArgMap) -> Result<Value, BusError> {
        Ok(json!(args::string(&arguments, "text")?.split_whitespace().count()))
    }
}
