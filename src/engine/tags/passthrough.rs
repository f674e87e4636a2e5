//! Structural Markdown tags
//!
//! The compiler keeps document structure as tags (`paragraph`, `heading`,
//! ...). They render their children; block-level ones end with a newline.

use async_trait::async_trait;

use super::{attr_string, TagHandler};
use crate::engine::context::Context;
use crate::engine::errors::Result;
use crate::engine::fragment::Sink;
use crate::engine::types::Node;
use crate::engine::walker::{emit_text, walk_all};

/// Tag name and whether it is block-level
pub const STRUCTURAL_TAGS: &[(&str, bool)] = &[
    ("document", false),
    ("inline", false),
    ("strong", false),
    ("em", false),
    ("paragraph", true),
    ("heading", true),
    ("list", true),
    ("item", true),
    ("blockquote", true),
    ("fence", true),
    ("hr", true),
    ("softbreak", true),
    ("hardbreak", true),
];

pub struct PassthroughTag {
    name: &'static str,
    block: bool,
}

impl PassthroughTag {
    pub fn new(name: &'static str, block: bool) -> Self {
        Self { name, block }
    }
}

#[async_trait]
impl TagHandler for PassthroughTag {
    fn render_name(&self) -> &str {
        self.name
    }

    fn self_closing(&self) -> bool {
        matches!(self.name, "hr" | "softbreak" | "hardbreak")
    }

    async fn run(&self, node: &Node, ctx: &Context, sink: &mut Sink) -> Result<()> {
        // fences carry their body as an attribute
        if let Some(content) = attr_string(node, "content", ctx)? {
            emit_text(&content, ctx, sink).await?;
        }
        walk_all(node.child_nodes(), ctx, sink).await?;
        if self.block {
            emit_text("\n", ctx, sink).await?;
        }
        Ok(())
    }
}
