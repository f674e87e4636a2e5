//! `loop`
//!
//! Iterates `items` or `count` times, sequentially. Each iteration runs in
//! its own scope which is unwound before the next one starts.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use super::{attr_string, attr_value, AttributeKind, AttributeSpec, TagHandler};
use crate::engine::context::Context;
use crate::engine::errors::{EngineError, Result};
use crate::engine::fragment::Sink;
use crate::engine::types::values::type_name;
use crate::engine::types::Node;
use crate::engine::walker::walk_all;

const ATTRIBUTES: &[AttributeSpec] = &[
    AttributeSpec::optional("count", AttributeKind::Number),
    AttributeSpec::optional("items", AttributeKind::Array),
    AttributeSpec::optional("id", AttributeKind::String),
];

pub struct LoopTag;

/// Parse `count` into a non-negative iteration count
fn parse_count(value: &JsonValue) -> Result<usize> {
    let n = value.as_f64().ok_or_else(|| {
        EngineError::invalid_attribute("loop", "count", format!("expected number, got {}", type_name(value)))
    })?;
    if n < 0.0 || n.fract() != 0.0 || !n.is_finite() {
        return Err(EngineError::invalid_attribute(
            "loop",
            "count",
            format!("expected a non-negative integer, got {}", n),
        ));
    }
    Ok(n as usize)
}

#[async_trait]
impl TagHandler for LoopTag {
    fn render_name(&self) -> &str {
        "loop"
    }

    fn attributes(&self) -> &[AttributeSpec] {
        ATTRIBUTES
    }

    async fn run(&self, node: &Node, ctx: &Context, sink: &mut Sink) -> Result<()> {
        let items = match attr_value(node, "items", ctx)? {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Array(items)) => Some(items),
            Some(other) => {
                return Err(EngineError::invalid_attribute(
                    "loop",
                    "items",
                    format!("expected array, got {}", type_name(&other)),
                ))
            }
        };
        let count = match attr_value(node, "count", ctx)? {
            None | Some(JsonValue::Null) => None,
            Some(value) => Some(parse_count(&value)?),
        };

        let count = match (&items, count) {
            (Some(items), Some(count)) => count.min(items.len()),
            (Some(items), None) => items.len(),
            (None, Some(count)) => count,
            (None, None) => return Err(EngineError::missing("loop", "count")),
        };
        let id = attr_string(node, "id", ctx)?.filter(|id| id != "loop");

        debug!(count, "loop started");
        for index in 0..count {
            ctx.checkpoint("loop iteration")?;

            let item = items
                .as_ref()
                .and_then(|items| items.get(index).cloned())
                .unwrap_or(JsonValue::Null);
            let frame = json!({
                "index": index,
                "count": count,
                "item": item,
                "isFirst": index == 0,
                "isLast": index + 1 == count,
            });

            let (iteration_ctx, _guard) = ctx.enter_scope();
            if let Some(id) = &id {
                iteration_ctx.push(id.clone(), frame.clone());
            }
            iteration_ctx.push("loop", frame);
            walk_all(node.child_nodes(), &iteration_ctx, sink).await?;
        }

        Ok(())
    }
}
