//! Expression resolution
//!
//! Resolves deferred attribute values against the live state. Pure: reads
//! the stack, never mutates it, so an expression can be resolved any number
//! of times.

use serde_json::{Map, Value as JsonValue};

use super::context::Context;
use super::errors::Result;
use super::stdlib;
use super::types::Expression;

/// Resolve an expression; `None` is undefined
pub fn resolve(expr: &Expression, ctx: &Context) -> Result<Option<JsonValue>> {
    match expr {
        Expression::Literal(v) => Ok(Some(v.clone())),

        Expression::Variable { path } => Ok(resolve_path(path, ctx)),

        Expression::Function { name, parameters } => {
            let args = parameters
                .iter()
                .map(|p| resolve(p, ctx))
                .collect::<Result<Vec<_>>>()?;
            stdlib::call(name, &args).map(Some)
        }

        Expression::Array(items) => {
            let resolved = items
                .iter()
                .map(|item| resolve(item, ctx).map(|v| v.unwrap_or(JsonValue::Null)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(JsonValue::Array(resolved)))
        }

        Expression::Object(fields) => {
            let mut resolved = Map::new();
            for (key, value) in fields {
                resolved.insert(key.clone(), resolve(value, ctx)?.unwrap_or(JsonValue::Null));
            }
            Ok(Some(JsonValue::Object(resolved)))
        }
    }
}

/// Resolve an optional attribute expression
pub fn resolve_opt(expr: Option<&Expression>, ctx: &Context) -> Result<Option<JsonValue>> {
    match expr {
        Some(expr) => resolve(expr, ctx),
        None => Ok(None),
    }
}

/// Look up the first segment on the stack, then walk the rest
fn resolve_path(path: &[String], ctx: &Context) -> Option<JsonValue> {
    let (head, rest) = path.split_first()?;
    let root = ctx.lookup(head)?;
    walk_segments(root, rest)
}

/// Walk member segments; any missing segment yields undefined
pub fn walk_segments(root: JsonValue, segments: &[String]) -> Option<JsonValue> {
    let mut current = root;
    for segment in segments {
        current = match current {
            JsonValue::Object(mut obj) => obj.remove(segment)?,
            JsonValue::Array(mut items) => {
                if segment == "length" {
                    JsonValue::from(items.len())
                } else {
                    let idx: usize = segment.parse().ok()?;
                    if idx >= items.len() {
                        return None;
                    }
                    items.swap_remove(idx)
                }
            }
            JsonValue::String(s) if segment == "length" => JsonValue::from(s.chars().count()),
            _ => return None,
        };
    }
    Some(current)
}
