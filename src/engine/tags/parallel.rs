//! `parallel`
//!
//! One concurrent walk per child, each in its own scope and buffer. All
//! branch futures are joined inside the current task and raced against the
//! execution's signal; abort or the first branch error drops the remaining
//! branches, which unwinds their scopes and abandons their external waits.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::json;
use tracing::debug;

use super::{scope_id, AttributeKind, AttributeSpec, TagHandler};
use crate::engine::context::Context;
use crate::engine::errors::Result;
use crate::engine::fragment::{render_fragments, Fragment, Sink};
use crate::engine::types::Node;
use crate::engine::walker::walk;

const ATTRIBUTES: &[AttributeSpec] = &[AttributeSpec::optional("id", AttributeKind::String)];

pub struct ParallelTag;

/// Walk one child in a fresh scope, buffering its output
async fn run_branch(child: &Node, ctx: &Context) -> Result<Vec<Fragment>> {
    let (branch_ctx, _guard) = ctx.enter_scope();
    let mut buffer = Sink::buffer();
    walk(child, &branch_ctx, &mut buffer).await?;
    Ok(buffer.into_fragments())
}

#[async_trait]
impl TagHandler for ParallelTag {
    fn render_name(&self) -> &str {
        "parallel"
    }

    fn attributes(&self) -> &[AttributeSpec] {
        ATTRIBUTES
    }

    async fn run(&self, node: &Node, ctx: &Context, sink: &mut Sink) -> Result<()> {
        let id = scope_id(node, ctx, "parallel")?;
        let children = node.child_nodes();
        debug!(branches = children.len(), "parallel fan-out");

        let branches = children.iter().map(|child| run_branch(child, ctx));
        let outputs = ctx.cancellable("parallel", try_join_all(branches)).await?;

        let mut results = Vec::with_capacity(outputs.len());
        for fragments in outputs {
            let text = render_fragments(&fragments);
            ctx.record_text(&text);
            results.push(text);
            sink.emit_all(fragments).await?;
        }

        ctx.push(id, json!({ "results": results }));
        Ok(())
    }
}
