//! Comparison functions

use serde_json::Value as JsonValue;

use super::{expect_arity, expect_number};
use crate::engine::errors::{EngineError, Result};

fn compare<F>(func: &str, args: &[Option<JsonValue>], op: F) -> Result<JsonValue>
where
    F: Fn(f64, f64) -> bool,
{
    expect_arity(func, args, 2)?;
    let left = expect_number(func, &args[0])?;
    let right = expect_number(func, &args[1])?;
    Ok(JsonValue::Bool(op(left, right)))
}

pub fn greater_than(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    compare("greaterThan", args, |l, r| l > r)
}

pub fn less_than(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    compare("lessThan", args, |l, r| l < r)
}

pub fn greater_than_or_equal(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    compare("greaterThanOrEqual", args, |l, r| l >= r)
}

pub fn less_than_or_equal(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    compare("lessThanOrEqual", args, |l, r| l <= r)
}

/// includes(container, needle)
///
/// Array membership or substring test. An undefined container includes
/// nothing.
pub fn includes(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    expect_arity("includes", args, 2)?;
    let found = match (&args[0], &args[1]) {
        (None, _) | (Some(JsonValue::Null), _) => false,
        (Some(JsonValue::Array(items)), Some(needle)) => items.iter().any(|i| loose_eq(i, needle)),
        (Some(JsonValue::Array(_)), None) => false,
        (Some(JsonValue::String(hay)), Some(JsonValue::String(needle))) => hay.contains(needle.as_str()),
        (Some(JsonValue::String(_)), _) => false,
        (Some(other), _) => {
            return Err(EngineError::invalid_argument(
                "includes",
                format!("cannot search a {}", crate::engine::types::values::type_name(other)),
            ))
        }
    };
    Ok(JsonValue::Bool(found))
}

pub fn equals(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    expect_arity("equals", args, 2)?;
    Ok(JsonValue::Bool(opt_eq(&args[0], &args[1])))
}

pub fn not_equals(args: &[Option<JsonValue>]) -> Result<JsonValue> {
    expect_arity("notEquals", args, 2)?;
    Ok(JsonValue::Bool(!opt_eq(&args[0], &args[1])))
}

fn opt_eq(a: &Option<JsonValue>, b: &Option<JsonValue>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => loose_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Deep equality where `1` and `1.0` are the same number
fn loose_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        (JsonValue::Array(x), JsonValue::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| loose_eq(a, b))
        }
        (JsonValue::Object(x), JsonValue::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).map(|w| loose_eq(v, w)).unwrap_or(false))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(values: &[JsonValue]) -> Vec<Option<JsonValue>> {
        values.iter().cloned().map(Some).collect()
    }

    #[test]
    fn test_numeric_comparisons() {
        assert_eq!(greater_than(&args(&[json!(3), json!(2)])).unwrap(), json!(true));
        assert_eq!(less_than(&args(&[json!(3), json!(2)])).unwrap(), json!(false));
        assert_eq!(greater_than_or_equal(&args(&[json!(2), json!(2.0)])).unwrap(), json!(true));
        assert_eq!(less_than_or_equal(&args(&[json!(2.5), json!(2)])).unwrap(), json!(false));
        assert!(greater_than(&args(&[json!("3"), json!(2)])).is_err());
    }

    #[test]
    fn test_includes() {
        assert_eq!(includes(&args(&[json!([1, 2, 3]), json!(2.0)])).unwrap(), json!(true));
        assert_eq!(includes(&args(&[json!(["a"]), json!("b")])).unwrap(), json!(false));
        assert_eq!(includes(&args(&[json!("hello world"), json!("world")])).unwrap(), json!(true));
        assert_eq!(includes(&[None, Some(json!("x"))]).unwrap(), json!(false));
        assert!(includes(&args(&[json!(5), json!(5)])).is_err());
    }

    #[test]
    fn test_equals() {
        assert_eq!(equals(&args(&[json!(1), json!(1.0)])).unwrap(), json!(true));
        assert_eq!(equals(&args(&[json!({"a": [1]}), json!({"a": [1.0]})])).unwrap(), json!(true));
        assert_eq!(equals(&args(&[json!(1), json!("1")])).unwrap(), json!(false));
        assert_eq!(equals(&[None, None]).unwrap(), json!(true));
        assert_eq!(equals(&[None, Some(json!(null))]).unwrap(), json!(false));
        assert_eq!(not_equals(&args(&[json!(2), json!(1)])).unwrap(), json!(true));
    }
}
