//! `code`
//!
//! Sends the tag body to the `code` adapter's `eval` operation together with
//! every variable visible from the current scope.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use super::{attr_string, body_text, scope_id, AttributeKind, AttributeSpec, TagHandler};
use crate::engine::context::Context;
use crate::engine::errors::Result;
use crate::engine::fragment::{Fragment, Sink};
use crate::engine::types::values::to_text;
use crate::engine::types::Node;
use crate::engine::walker::emit_text;

const ATTRIBUTES: &[AttributeSpec] = &[
    AttributeSpec::optional("code", AttributeKind::String),
    AttributeSpec::optional("language", AttributeKind::String),
    AttributeSpec::optional("id", AttributeKind::String),
];

pub struct CodeTag;

/// Adapters answer `{result}`; a bare value is taken as the result itself
pub(crate) fn unwrap_result(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(mut obj) if obj.contains_key("result") => {
            obj.remove("result").unwrap_or(JsonValue::Null)
        }
        other => other,
    }
}

#[async_trait]
impl TagHandler for CodeTag {
    fn render_name(&self) -> &str {
        "code"
    }

    fn attributes(&self) -> &[AttributeSpec] {
        ATTRIBUTES
    }

    async fn run(&self, node: &Node, ctx: &Context, sink: &mut Sink) -> Result<()> {
        let id = scope_id(node, ctx, "code")?;
        let code = match attr_string(node, "code", ctx)? {
            Some(code) => code,
            None => body_text(node.child_nodes(), ctx)?,
        };
        let language = attr_string(node, "language", ctx)?.unwrap_or_else(|| "js".to_string());

        let args = json!({
            "code": code,
            "language": language,
            "variables": ctx.visible_variables(),
        });
        let result = unwrap_result(ctx.runtime().adapters.invoke("code", "eval", args, ctx).await?);

        ctx.state().events().on_result(&id, &result);
        match &result {
            JsonValue::String(_) | JsonValue::Number(_) => {
                emit_text(&to_text(Some(&result)), ctx, sink).await?
            }
            JsonValue::Object(_) | JsonValue::Array(_) => {
                sink.emit(Fragment::Data {
                    tag: "code".to_string(),
                    value: result.clone(),
                })
                .await?
            }
            _ => {}
        }
        ctx.push(id, json!({ "result": result }));
        Ok(())
    }
}
