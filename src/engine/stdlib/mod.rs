//! Built-in function implementations
//!
//! Functions are pure: they receive already-resolved arguments (`None` is
//! undefined) and never touch execution state.

pub mod compare;
pub mod logic;
pub mod math;

use serde_json::Value as JsonValue;

use super::errors::{EngineError, Result};

/// Built-in function identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdlibFunc {
    Add,
    Subtract,
    Multiply,
    Divide,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Includes,
    Equals,
    NotEquals,
    And,
    Or,
    Not,
    Default,
}

impl StdlibFunc {
    pub fn from_name(name: &str) -> Option<Self> {
        let func = match name {
            "add" => StdlibFunc::Add,
            "subtract" => StdlibFunc::Subtract,
            "multiply" => StdlibFunc::Multiply,
            "divide" => StdlibFunc::Divide,
            "greaterThan" => StdlibFunc::GreaterThan,
            "lessThan" => StdlibFunc::LessThan,
            "greaterThanOrEqual" => StdlibFunc::GreaterThanOrEqual,
            "lessThanOrEqual" => StdlibFunc::LessThanOrEqual,
            "includes" => StdlibFunc::Includes,
            "equals" => StdlibFunc::Equals,
            "notEquals" => StdlibFunc::NotEquals,
            "and" => StdlibFunc::And,
            "or" => StdlibFunc::Or,
            "not" => StdlibFunc::Not,
            "default" => StdlibFunc::Default,
            _ => return None,
        };
        Some(func)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StdlibFunc::Add => "add",
            StdlibFunc::Subtract => "subtract",
            StdlibFunc::Multiply => "multiply",
            StdlibFunc::Divide => "divide",
            StdlibFunc::GreaterThan => "greaterThan",
            StdlibFunc::LessThan => "lessThan",
            StdlibFunc::GreaterThanOrEqual => "greaterThanOrEqual",
            StdlibFunc::LessThanOrEqual => "lessThanOrEqual",
            StdlibFunc::Includes => "includes",
            StdlibFunc::Equals => "equals",
            StdlibFunc::NotEquals => "notEquals",
            StdlibFunc::And => "and",
            StdlibFunc::Or => "or",
            StdlibFunc::Not => "not",
            StdlibFunc::Default => "default",
        }
    }
}

/// Call a function by name
pub fn call(name: &str, args: &[Option<JsonValue>]) -> Result<JsonValue> {
    let func = StdlibFunc::from_name(name)
        .ok_or_else(|| EngineError::UnknownFunction(name.to_string()))?;
    call_stdlib_func(func, args)
}

pub fn call_stdlib_func(func: StdlibFunc, args: &[Option<JsonValue>]) -> Result<JsonValue> {
    match func {
        StdlibFunc::Add => math::add(args),
        StdlibFunc::Subtract => math::subtract(args),
        StdlibFunc::Multiply => math::multiply(args),
        StdlibFunc::Divide => math::divide(args),
        StdlibFunc::GreaterThan => compare::greater_than(args),
        StdlibFunc::LessThan => compare::less_than(args),
        StdlibFunc::GreaterThanOrEqual => compare::greater_than_or_equal(args),
        StdlibFunc::LessThanOrEqual => compare::less_than_or_equal(args),
        StdlibFunc::Includes => compare::includes(args),
        StdlibFunc::Equals => compare::equals(args),
        StdlibFunc::NotEquals => compare::not_equals(args),
        StdlibFunc::And => logic::and(args),
        StdlibFunc::Or => logic::or(args),
        StdlibFunc::Not => logic::not(args),
        StdlibFunc::Default => logic::default(args),
    }
}

/* ===================== Argument helpers ===================== */

pub(crate) fn expect_arity(func: &str, args: &[Option<JsonValue>], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(EngineError::invalid_argument(
            func,
            format!("expected {} arguments, got {}", n, args.len()),
        ));
    }
    Ok(())
}

pub(crate) fn expect_number(func: &str, arg: &Option<JsonValue>) -> Result<f64> {
    match arg {
        Some(JsonValue::Number(n)) => n
            .as_f64()
            .ok_or_else(|| EngineError::invalid_argument(func, "number out of range")),
        Some(other) => Err(EngineError::invalid_argument(
            func,
            format!("expected a number, got {}", super::types::values::type_name(other)),
        )),
        None => Err(EngineError::invalid_argument(func, "expected a number, got undefined")),
    }
}
