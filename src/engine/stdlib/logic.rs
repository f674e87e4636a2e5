//! Boolean and fallback functions

use serde_json::Value as JsonValue;

use super::expect_arity;
use crate::engine::errors::{EngineError, Result};
use crate::engine::types::values::is_truthy;

pub fn and(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    if args.is_empty() {
        return Err(EngineError::invalid_argument("and", "expected at least 1 argument"));
    }
    Ok(JsonValue::Bool(args.iter().all(|a| is_truthy(a.as_ref()))))
}

pub fn or(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    if args.is_empty() {
        return Err(EngineError::invalid_argument("or", "expected at least 1 argument"));
    }
    Ok(JsonValue::Bool(args.iter().any(|a| is_truthy(a.as_ref()))))
}

pub fn not(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    expect_arity("not", args, 1)?;
    Ok(JsonValue::Bool(!is_truthy(args[0].as_ref())))
}

/// default(value, fallback) - fallback when value is undefined or null
pub fn default(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    expect_arity("default", args, 2)?;
    match &args[0] {
        None | Some(JsonValue::Null) => Ok(args[1].clone().unwrap_or(JsonValue::Null)),
        Some(v) => Ok(v.clone()),
    }
}
