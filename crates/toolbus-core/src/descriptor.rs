//! Tool descriptors and argument binding
//!
//! A [`ToolDescriptor`] is the advertised shape of a tool: name, description
//! and an ordered parameter list. [`bind_arguments`] checks a caller-supplied
//! argument map against that shape before the tool body ever runs, so tool
//! implementations can assume well-typed input.

use crate::BusError;
use crate::protocol::ArgMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The advertised shape of one callable tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, unique within one registry
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Ordered parameter list
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
}

impl ToolDescriptor {
    /// Create a new descriptor
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ParamSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Look up a parameter spec by name
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// One parameter of a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name
    pub name: String,
    /// Parameter description
    #[serde(default)]
    pub description: String,
    /// Expected value type
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Whether the parameter must be supplied
    #[serde(default)]
    pub required: bool,
    /// Default filled in when an optional parameter is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    fn new(name: impl Into<String>, description: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type,
            required: true,
            default: None,
        }
    }

    /// Create a required string parameter
    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ParamType::String)
    }

    /// Create a required number parameter
    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ParamType::Number)
    }

    /// Create a required integer parameter
    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ParamType::Integer)
    }

    /// Create a required boolean parameter
    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ParamType::Boolean)
    }

    /// Create a required object parameter
    pub fn object(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ParamType::Object)
    }

    /// Create a required array parameter
    pub fn array(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ParamType::Array)
    }

    /// Make this parameter optional
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Set a default value; implies optional
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self.required = false;
        self
    }
}

/// Value types a parameter may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// UTF-8 text
    String,
    /// Floating point number
    Number,
    /// Whole number
    Integer,
    /// true/false
    Boolean,
    /// JSON object
    Object,
    /// JSON array
    Array,
}

impl ParamType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// Bind supplied arguments against a descriptor.
///
/// Missing required parameters and uncoercible values fail with
/// [`BusError::InvalidArguments`]; unknown extra arguments are dropped;
/// declared defaults fill in absent optionals. Coercion is attempted once
/// per value (a numeric string becomes a number, a scalar becomes a string)
/// and never chains.
pub fn bind_arguments(descriptor: &ToolDescriptor, supplied: &ArgMap) -> Result<ArgMap, BusError> {
    let mut bound = ArgMap::new();

    for spec in &descriptor.parameters {
        match supplied.get(&spec.name) {
            Some(value) if !value.is_null() => {
                let value = if spec.param_type.matches(value) {
                    value.clone()
                } else {
                    coerce(value, spec.param_type).ok_or_else(|| {
                        BusError::invalid_arguments(format!(
                            "parameter '{}' expects {:?}, got {}",
                            spec.name,
                            spec.param_type,
                            type_name(value)
                        ))
                    })?
                };
                bound.insert(spec.name.clone(), value);
            }
            _ => {
                if let Some(default) = &spec.default {
                    bound.insert(spec.name.clone(), default.clone());
                } else if spec.required {
                    return Err(BusError::invalid_arguments(format!(
                        "missing required parameter '{}'",
                        spec.name
                    )));
                }
            }
        }
    }

    Ok(bound)
}

/// Single-attempt type coercion; None means the value cannot be adapted.
fn coerce(value: &Value, target: ParamType) -> Option<Value> {
    match (target, value) {
        (ParamType::Number, Value::String(s)) => {
            s.trim().parse::<f64>().ok().and_then(|n| {
                serde_json::Number::from_f64(n).map(Value::Number)
            })
        }
        (ParamType::Integer, Value::String(s)) => {
            s.trim().parse::<i64>().ok().map(Value::from)
        }
        // A float carrying a whole value satisfies an integer parameter.
        (ParamType::Integer, Value::Number(n)) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| Value::from(f as i64)),
        (ParamType::Boolean, Value::String(s)) => match s.trim() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (ParamType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (ParamType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
