//! Tag handlers
//!
//! Every tag the engine understands, built-in or plugin-provided, is a
//! `TagHandler`. The walker looks handlers up by name in the `TagRegistry`
//! and hands them the node, the walk context and the sink to emit into.

pub mod ai;
pub mod code;
pub mod conditional;
pub mod flow;
pub mod input;
pub mod loops;
pub mod parallel;
pub mod passthrough;
pub mod set;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::context::Context;
use super::errors::{EngineError, Result};
use super::fragment::Sink;
use super::resolver;
use super::types::values::to_text;
use super::types::Node;

/// Declared attribute type, used for listings and validation messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Any,
    String,
    Number,
    Boolean,
    Array,
    Object,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttributeSpec {
    pub name: &'static str,
    pub kind: AttributeKind,
    pub required: bool,
}

impl AttributeSpec {
    pub const fn required(name: &'static str, kind: AttributeKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: AttributeKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

#[async_trait]
pub trait TagHandler: Send + Sync {
    /// Name of the render-tree element this tag produces
    fn render_name(&self) -> &str;

    /// Attribute schema; required attributes are checked before `run`
    fn attributes(&self) -> &[AttributeSpec] {
        &[]
    }

    fn self_closing(&self) -> bool {
        false
    }

    async fn run(&self, node: &Node, ctx: &Context, sink: &mut Sink) -> Result<()>;
}

/// Built-in handlers keyed by tag name
pub fn builtins() -> Vec<(String, Arc<dyn TagHandler>)> {
    let mut tags: Vec<(String, Arc<dyn TagHandler>)> = vec![
        ("if".to_string(), Arc::new(conditional::IfTag)),
        ("else".to_string(), Arc::new(conditional::ElseTag)),
        ("loop".to_string(), Arc::new(loops::LoopTag)),
        ("parallel".to_string(), Arc::new(parallel::ParallelTag)),
        ("set".to_string(), Arc::new(set::SetTag)),
        ("flow".to_string(), Arc::new(flow::FlowTag)),
        ("input".to_string(), Arc::new(input::InputTag)),
        ("code".to_string(), Arc::new(code::CodeTag)),
        ("ai".to_string(), Arc::new(ai::AiTag)),
    ];
    for &(name, block) in passthrough::STRUCTURAL_TAGS {
        tags.push((
            name.to_string(),
            Arc::new(passthrough::PassthroughTag::new(name, block)),
        ));
    }
    tags
}

/* ===================== Attribute helpers ===================== */

/// Resolve an attribute; `None` when absent or undefined
pub(crate) fn attr_value(node: &Node, key: &str, ctx: &Context) -> Result<Option<JsonValue>> {
    resolver::resolve_opt(node.attribute(key), ctx)
}

/// Resolve an attribute to text, if present
pub(crate) fn attr_string(node: &Node, key: &str, ctx: &Context) -> Result<Option<String>> {
    Ok(attr_value(node, key, ctx)?
        .filter(|v| !v.is_null())
        .map(|v| to_text(Some(&v))))
}

pub(crate) fn required_string(tag: &str, node: &Node, key: &str, ctx: &Context) -> Result<String> {
    attr_string(node, key, ctx)?.ok_or_else(|| EngineError::missing(tag, key))
}

/// Frame id from the `id` attribute, or the tag's default
pub(crate) fn scope_id(node: &Node, ctx: &Context, default: &str) -> Result<String> {
    Ok(attr_string(node, "id", ctx)?.unwrap_or_else(|| default.to_string()))
}

/// Source text of a tag body, without rendering it
///
/// Text nodes are resolved and concatenated; nested tags contribute their
/// own body text.
pub(crate) fn body_text(nodes: &[Node], ctx: &Context) -> Result<String> {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text { content } => out.push_str(&to_text(resolver::resolve(content, ctx)?.as_ref())),
            Node::Tag { children, .. } => out.push_str(&body_text(children, ctx)?),
            Node::Comment { .. } => {}
        }
    }
    Ok(out)
}
