//! Arithmetic tools

use crate::args;
use async_trait::async_trait;
use serde_json::{Value, json};
use toolbus_core::{ArgMap, BusError, ParamSpec, Tool};

fn binary_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::number("a", "First operand"),
        ParamSpec::number("b", "Second operand"),
    ]
}

/// Add two numbers
pub struct AddTool;

#[async_trait]
impl Tool for AddTool {
    fn name(&self) -> &str {
        "add"
    }

    fn description(&self) -> &str {
        "Add two numbers"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        binary_params()
    }

    async fn invoke(&self, arguments: ArgMap) -> Result<Value, BusError> {
        Ok(json!(args::number(&arguments, "a")? + args::number(&arguments, "b")?))
    }
}

/// Subtract the second number from the first
pub struct SubtractTool;

#[async_trait]
impl Tool for SubtractTool {
    fn name(&self) -> &str {
        "subtract"
    }

    fn description(&self) -> &str {
        "Subtract the second number from the first"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        binary_params()
    }

    async fn invoke(&self, arguments: ArgMap) -> Result<Value, BusError> {
        Ok(json!(args::number(&arguments, "a")? - args::number(&arguments, "b")?))
    }
}

/// Multiply two numbers
pub struct MultiplyTool;

#[async_trait]
impl Tool for MultiplyTool {
    fn name(&self) -> &str {
        "multiply"
    }

    fn description(&self) -> &str {
        "Multiply two numbers"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        binary_params()
    }

    async fn invoke(&self, arguments: ArgMap) -> Result<Value, BusError> {
        Ok(json!(args::number(&arguments, "a")? * args::number(&arguments, "b")?))
    }
}

/// Divide the first number by the second
pub struct DivideTool;

#[async_trait]
impl Tool for DivideTool {
    fn name(&self) -> &str {
        "divide"
    }

    fn description(&self) -> &str {
        "Divide the first number by the second"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        binary_params()
    }

    async fn invoke(&self, arguments: ArgMap) -> Result<Value, BusError> {
        let a = args::number(&arguments, "a")?;
        let b = args::number(&arguments, "b")?;
        if b == 0.0 {
            return Err(BusError::execution("division by zero"));
        }
        Ok(json!(a / b))
    }
}

/// Raise a base to an exponent
pub struct PowerTool;

#[async_trait]
impl Tool for PowerTool {
    fn name(&self) -> &str {
        "power"
    }

    fn description(&self) -> &str {
        "Raise a base to an exponent"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::number("base", "Base value"),
            ParamSpec::number("exponent", "Exponent value"),
        ]
    }

    async fn invoke(&self, arguments: ArgMap) -> Result<Value, BusError> {
        let base = args::number(&arguments, "base")?;
        let exponent = args::number(&arguments, "exponent")?;
        Ok(json!(base.powf(exponent)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num_args(pairs: &[(&str, f64)]) -> ArgMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[tokio::test]
    async fn test_add() {
        let value = AddTool
            .invoke(num_args(&[("a", 3.5), ("b", 2.5)]))
            .await
            .unwrap();
        assert_eq!(value, json!(6.0));
    }

    #[tokio::test]
    async fn test_divide_by_zero_is_tool_error() {
        let err = DivideTool
            .invoke(num_args(&[("a", 1.0), ("b", 0.0)]))
            .await
            .err()
            .expect("divide by zero should fail");
        assert!(matches!(err, BusError::ToolExecution { .. }));
    }

    #[tokio::test]
    async fn test_power() {
        let value = PowerTool
            .invoke(num_args(&[("base", 2.0), ("exponent", 10.0)]))
            .await
            .unwrap();
        assert_eq!(value, json!(1024.0));
    }

    #[tokio::test]
    async fn test_missing_operand() {
        let err = AddTool
            .invoke(num_args(&[("a", 1.0)]))
            .await
            .err()
            .expect("missing operand should fail");
        assert!(matches!(err, BusError::InvalidArguments { .. }));
    }
}
