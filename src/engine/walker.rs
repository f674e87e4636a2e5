//! AST walker
//!
//! Dispatches each node to its handler and pushes fragments into the sink
//! as they are produced. Errors propagate unchanged.

use futures::future::BoxFuture;
use tracing::debug;

use super::context::Context;
use super::errors::{EngineError, Result};
use super::fragment::{Fragment, Sink};
use super::resolver;
use super::types::values::to_text;
use super::types::Node;

/// Walk one node
///
/// Boxed because handlers walk their children through it.
pub fn walk<'a>(node: &'a Node, ctx: &'a Context, sink: &'a mut Sink) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        ctx.checkpoint("node")?;

        match node {
            Node::Text { content } => {
                let value = resolver::resolve(content, ctx)?;
                emit_text(&to_text(value.as_ref()), ctx, sink).await
            }

            Node::Comment { .. } => Ok(()),

            Node::Tag { name, .. } => {
                let handler = ctx
                    .runtime()
                    .tags
                    .get(name)
                    .ok_or_else(|| EngineError::UnknownTag(name.clone()))?;

                if let Some(missing) = handler
                    .attributes()
                    .iter()
                    .find(|spec| spec.required && node.attribute(spec.name).is_none())
                {
                    return Err(EngineError::missing(name, missing.name));
                }

                ctx.state().events().on_step(name);
                debug!(tag = %name, scope = ctx.scope(), "dispatching tag");
                handler.run(node, ctx, sink).await
            }
        }
    })
}

/// Walk nodes strictly in document order
pub async fn walk_all(nodes: &[Node], ctx: &Context, sink: &mut Sink) -> Result<()> {
    for node in nodes {
        walk(node, ctx, sink).await?;
    }
    Ok(())
}

/// Record text in the context's scope and emit it
pub async fn emit_text(text: &str, ctx: &Context, sink: &mut Sink) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    ctx.record_text(text);
    sink.emit(Fragment::text(text)).await
}
