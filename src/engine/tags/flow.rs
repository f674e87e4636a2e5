//! `flow`
//!
//! Runs another document as a sub-flow: load, compile, pick the input,
//! execute with a fresh state under the same session, then bind
//! `{input, path, content, output}` under `id`. The sub-flow's output is
//! captured, not streamed into the parent.

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::code::unwrap_result;
use super::{attr_value, required_string, scope_id, AttributeKind, AttributeSpec, TagHandler};
use crate::engine::context::Context;
use crate::engine::errors::{EngineError, Result};
use crate::engine::fragment::{render_fragments, Sink};
use crate::engine::run_document;
use crate::engine::runtime::Environment;
use crate::engine::state::ExecutionState;
use crate::engine::types::values::type_name;
use crate::engine::types::{Document, Frontmatter, Node};

const ATTRIBUTES: &[AttributeSpec] = &[
    AttributeSpec::required("path", AttributeKind::String),
    AttributeSpec::optional("input", AttributeKind::Object),
    AttributeSpec::optional("id", AttributeKind::String),
];

pub struct FlowTag;

/// JSON schema describing a document's declared inputs
pub fn input_schema(frontmatter: &Frontmatter) -> JsonValue {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in &frontmatter.input {
        let mut property = Map::new();
        property.insert("type".to_string(), json!(param.param_type));
        if let Some(description) = &param.description {
            property.insert("description".to_string(), json!(description));
        }
        if let Some(default) = &param.schema.default {
            property.insert("default".to_string(), default.clone());
        } else {
            required.push(param.name.clone());
        }
        properties.insert(param.name.clone(), JsonValue::Object(property));
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Ask the `ai` adapter for an input object matching the sub-flow's schema
///
/// Retries `max_retries` more times with exponential backoff. Aborts and a
/// missing adapter are not retried.
async fn synthesize_input(document: &Document, ctx: &Context) -> Result<Map<String, JsonValue>> {
    if document.frontmatter.input.is_empty() {
        return Ok(Map::new());
    }

    let settings = &ctx.runtime().settings;
    let args = json!({
        "schema": input_schema(&document.frontmatter),
        "context": ctx.scoped_text(),
    });

    let mut attempt: u32 = 0;
    loop {
        let failure = match ctx
            .runtime()
            .adapters
            .invoke("ai", "generateObject", args.clone(), ctx)
            .await
        {
            Ok(value) => match unwrap_result(value) {
                JsonValue::Object(obj) => return Ok(obj),
                other => format!("expected an object, got {}", type_name(&other)),
            },
            Err(e) if e.is_aborted() || matches!(e, EngineError::UnknownAdapter { .. }) => {
                return Err(e)
            }
            Err(e) => e.to_string(),
        };

        if attempt >= settings.max_retries {
            return Err(EngineError::external(
                "ai.generateObject",
                format!("gave up after {} attempts: {}", attempt + 1, failure),
            ));
        }

        let delay = settings
            .retry_backoff
            .saturating_mul(2u32.saturating_pow(attempt));
        warn!(attempt = attempt + 1, error = %failure, ?delay, "input synthesis failed, retrying");
        ctx.cancellable("flow input retry", async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await?;
        attempt += 1;
    }
}

/// Execute `document` as a nested run and return its rendered text
async fn run_subflow(document: &Document, input: Map<String, JsonValue>, ctx: &Context) -> Result<String> {
    let parent = ctx.state();
    let state = Arc::new(ExecutionState::new(
        Uuid::new_v4().to_string(),
        ctx.runtime().clone(),
        parent.session().nested(),
    ));
    debug!(
        parent = parent.execution_id(),
        child = state.execution_id(),
        depth = state.session().depth,
        "starting sub-flow"
    );

    let mut buffer = Sink::buffer();
    run_document(document, state, input, &mut buffer).await?;
    Ok(render_fragments(&buffer.into_fragments()))
}

#[async_trait]
impl TagHandler for FlowTag {
    fn render_name(&self) -> &str {
        "flow"
    }

    fn attributes(&self) -> &[AttributeSpec] {
        ATTRIBUTES
    }

    fn self_closing(&self) -> bool {
        true
    }

    async fn run(&self, node: &Node, ctx: &Context, _sink: &mut Sink) -> Result<()> {
        ctx.checkpoint("flow start")?;
        let path = required_string("flow", node, "path", ctx)?;
        let id = scope_id(node, ctx, "flow")?;
        let runtime = ctx.runtime().clone();

        let depth = ctx.state().session().depth;
        if depth >= runtime.settings.max_flow_depth {
            return Err(EngineError::invalid_attribute(
                "flow",
                "path",
                format!("sub-flow nesting exceeds {} levels", runtime.settings.max_flow_depth),
            ));
        }
        if runtime.settings.environment == Environment::Browser && runtime.content.is_local_filesystem() {
            return Err(EngineError::external(
                "content",
                "filesystem content is unavailable in the browser environment",
            ));
        }

        let content = ctx.cancellable("flow content", runtime.content.load(&path)).await?;
        ctx.checkpoint("flow content loaded")?;

        let document = ctx
            .cancellable("flow compile", runtime.compiler.compile(&path, &content))
            .await?;
        ctx.checkpoint("flow compiled")?;

        let input = match attr_value(node, "input", ctx)? {
            None | Some(JsonValue::Null) => synthesize_input(&document, ctx).await?,
            Some(JsonValue::Object(obj)) => obj,
            Some(other) => {
                return Err(EngineError::invalid_attribute(
                    "flow",
                    "input",
                    format!("expected object, got {}", type_name(&other)),
                ))
            }
        };

        let output = run_subflow(&document, input.clone(), ctx).await?;
        ctx.checkpoint("flow finalize")?;

        ctx.push(
            id,
            json!({
                "input": input,
                "path": path,
                "content": content,
                "output": output,
            }),
        );
        Ok(())
    }
}
