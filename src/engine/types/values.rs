//! Runtime value helpers
//!
//! Values are plain `serde_json::Value`s; "undefined" is `None`.

use serde_json::{Number, Value as JsonValue};

/// JS-style truthiness
///
/// Falsy: undefined, null, false, 0, NaN, "". Empty arrays and objects are
/// truthy.
pub fn is_truthy(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Some(JsonValue::String(s)) => !s.is_empty(),
        Some(JsonValue::Array(_)) | Some(JsonValue::Object(_)) => true,
    }
}

/// Number value, preferring integer representation when exact
pub fn number(f: f64) -> JsonValue {
    if f.fract() == 0.0 && f.is_finite() && f.abs() < (i64::MAX as f64) {
        JsonValue::Number(Number::from(f as i64))
    } else {
        Number::from_f64(f).map(JsonValue::Number).unwrap_or(JsonValue::Null)
    }
}

/// Render a value as output text
///
/// Strings render raw, numbers without a trailing `.0`, undefined and null
/// render empty, containers as compact JSON.
pub fn to_text(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        Some(JsonValue::Number(n)) => match n.as_f64() {
            Some(f) if f == 0.0 => "0".to_string(),
            // Whole floats print in full below 1e21, exponent form above
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e21 => f.to_string(),
            _ => n.to_string(),
        },
        Some(other) => other.to_string(),
    }
}

/// Short type name used in error messages and `set` field checks
pub fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
