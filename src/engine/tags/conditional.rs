//! `if` / `else`
//!
//! `{% if $a %}A{% else $b /%}B{% else /%}C{% /if %}`: the children of `if`
//! are split on `else` tags. An `else` carrying a `primary` condition is an
//! else-if; a bare `else` always matches once reached.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use super::{scope_id, AttributeKind, AttributeSpec, TagHandler};
use crate::engine::context::Context;
use crate::engine::errors::Result;
use crate::engine::fragment::Sink;
use crate::engine::resolver;
use crate::engine::types::{is_truthy, Expression, Node};
use crate::engine::walker::walk_all;

const IF_ATTRIBUTES: &[AttributeSpec] = &[
    AttributeSpec::optional("primary", AttributeKind::Any),
    AttributeSpec::optional("id", AttributeKind::String),
];

const ELSE_ATTRIBUTES: &[AttributeSpec] = &[AttributeSpec::optional("primary", AttributeKind::Any)];

enum Guard<'a> {
    /// Condition attribute; absent resolves to undefined
    When(Option<&'a Expression>),
    Always,
}

struct Branch<'a> {
    label: &'static str,
    guard: Guard<'a>,
    children: &'a [Node],
}

/// Split `if` children into branches at each `else` tag
fn branches(node: &Node) -> Vec<Branch<'_>> {
    let children = node.child_nodes();
    let mut result = Vec::new();
    let mut label = "if";
    let mut guard = Guard::When(node.attribute("primary"));
    let mut start = 0;

    for (i, child) in children.iter().enumerate() {
        if child.tag_name() == Some("else") {
            let next = match child.attribute("primary") {
                Some(expr) => Guard::When(Some(expr)),
                None => Guard::Always,
            };
            result.push(Branch {
                label,
                guard: std::mem::replace(&mut guard, next),
                children: &children[start..i],
            });
            label = "else";
            start = i + 1;
        }
    }
    result.push(Branch {
        label,
        guard,
        children: &children[start..],
    });
    result
}

pub struct IfTag;

#[async_trait]
impl TagHandler for IfTag {
    fn render_name(&self) -> &str {
        "if"
    }

    fn attributes(&self) -> &[AttributeSpec] {
        IF_ATTRIBUTES
    }

    async fn run(&self, node: &Node, ctx: &Context, sink: &mut Sink) -> Result<()> {
        let id = scope_id(node, ctx, "if")?;

        for branch in branches(node) {
            let condition = match branch.guard {
                Guard::When(expr) => resolver::resolve_opt(expr, ctx)?,
                Guard::Always => Some(JsonValue::Bool(true)),
            };
            if !is_truthy(condition.as_ref()) {
                continue;
            }

            debug!(branch = branch.label, "condition selected");
            let (branch_ctx, _guard) = ctx.enter_scope();
            branch_ctx.push(
                id.clone(),
                json!({
                    "condition": condition.unwrap_or(JsonValue::Null),
                    "isTrue": true,
                    "branch": branch.label,
                }),
            );
            return walk_all(branch.children, &branch_ctx, sink).await;
        }

        Ok(())
    }
}

/// Branch separator; renders nothing when reached outside an `if`
pub struct ElseTag;

#[async_trait]
impl TagHandler for ElseTag {
    fn render_name(&self) -> &str {
        "else"
    }

    fn attributes(&self) -> &[AttributeSpec] {
        ELSE_ATTRIBUTES
    }

    fn self_closing(&self) -> bool {
        true
    }

    async fn run(&self, _node: &Node, _ctx: &Context, _sink: &mut Sink) -> Result<()> {
        Ok(())
    }
}
