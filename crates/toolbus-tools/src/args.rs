//! Typed argument extraction shared by the builtin tools

use toolbus_core::{ArgMap, BusError};

pub(crate) fn number(args: &ArgMap, name: &str) -> Result<f64, BusError> {
    args.get(name)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| BusError::invalid_arguments(format!("parameter '{}' must be a number", name)))
}

pub(crate) fn integer(args: &ArgMap, name: &str) -> Result<i64, BusError> {
    args.get(name)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| {
            BusError::invalid_arguments(format!("parameter '{}' must be an integer", name))
        })
}

pub(crate) fn string<'a>(args: &'a ArgMap, name: &str) -> Result<&'a str, BusError> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| BusError::invalid_arguments(format!("parameter '{}' must be a string", name)))
}
