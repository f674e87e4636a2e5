//! `ai`
//!
//! Calls the `ai` adapter's `generate` operation with the prompt and the
//! text rendered so far in scope, then binds and emits the reply.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use super::code::unwrap_result;
use super::{attr_string, attr_value, body_text, scope_id, AttributeKind, AttributeSpec, TagHandler};
use crate::engine::context::Context;
use crate::engine::errors::Result;
use crate::engine::fragment::Sink;
use crate::engine::types::values::to_text;
use crate::engine::types::Node;
use crate::engine::walker::emit_text;

const ATTRIBUTES: &[AttributeSpec] = &[
    AttributeSpec::optional("prompt", AttributeKind::String),
    AttributeSpec::optional("model", AttributeKind::String),
    AttributeSpec::optional("temperature", AttributeKind::Number),
    AttributeSpec::optional("id", AttributeKind::String),
];

pub struct AiTag;

#[async_trait]
impl TagHandler for AiTag {
    fn render_name(&self) -> &str {
        "ai"
    }

    fn attributes(&self) -> &[AttributeSpec] {
        ATTRIBUTES
    }

    async fn run(&self, node: &Node, ctx: &Context, sink: &mut Sink) -> Result<()> {
        let id = scope_id(node, ctx, "ai")?;
        let prompt = match attr_string(node, "prompt", ctx)? {
            Some(prompt) => prompt,
            None => body_text(node.child_nodes(), ctx)?,
        };

        let args = json!({
            "prompt": prompt,
            "model": attr_value(node, "model", ctx)?.unwrap_or(JsonValue::Null),
            "temperature": attr_value(node, "temperature", ctx)?.unwrap_or(JsonValue::Null),
            "context": ctx.scoped_text(),
        });
        let result = unwrap_result(ctx.runtime().adapters.invoke("ai", "generate", args, ctx).await?);

        ctx.state().events().on_result(&id, &result);
        let text = to_text(Some(&result));
        ctx.push(id, json!({ "result": result }));
        emit_text(&text, ctx, sink).await
    }
}
