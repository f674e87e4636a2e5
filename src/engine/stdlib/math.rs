//! Arithmetic functions

use serde_json::Value as JsonValue;

use super::{expect_arity, expect_number};
use crate::engine::errors::{EngineError, Result};
use crate::engine::types::values::number;

fn binary(func: &str, args: &[Option<JsonValue>]) -> Result<(f64, f64)> {
    expect_arity(func, args, 2)?;
    Ok((expect_number(func, &args[0])?, expect_number(func, &args[1])?))
}

/// add(a, b)
pub fn add(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    let (a, b) = binary("add", args)?;
    Ok(number(a + b))
}

/// subtract(a, b)
pub fn subtract(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    let (a, b) = binary("subtract", args)?;
    Ok(number(a - b))
}

/// multiply(a, b)
pub fn multiply(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    let (a, b) = binary("multiply", args)?;
    Ok(number(a * b))
}

/// divide(a, b) - a zero divisor is an error, not Infinity
pub fn divide(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    let (a, b) = binary("divide", args)?;
    if b == 0.0 {
        return Err(EngineError::DivisionByZero);
    }
    Ok(number(a / b))
}
