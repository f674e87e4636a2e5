//! `set`
//!
//! `{% set #v number=2 label="two" /%}` pushes `{number: 2, label: "two"}`
//! under `v`. Fields are resolved against the state as it was before the
//! push; a repeated id shadows, it never overwrites.

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use super::{required_string, AttributeKind, AttributeSpec, TagHandler};
use crate::engine::context::Context;
use crate::engine::errors::{EngineError, Result};
use crate::engine::fragment::Sink;
use crate::engine::resolver;
use crate::engine::types::values::type_name;
use crate::engine::types::Node;

const ATTRIBUTES: &[AttributeSpec] = &[
    AttributeSpec::required("id", AttributeKind::String),
    AttributeSpec::optional("number", AttributeKind::Number),
    AttributeSpec::optional("string", AttributeKind::String),
    AttributeSpec::optional("boolean", AttributeKind::Boolean),
    AttributeSpec::optional("object", AttributeKind::Object),
    AttributeSpec::optional("array", AttributeKind::Array),
];

/// Fields named after a type must hold a value of that type
const TYPED_FIELDS: &[&str] = &["number", "string", "boolean", "object", "array"];

pub struct SetTag;

fn check_field_type(field: &str, value: Option<&JsonValue>) -> Result<()> {
    if !TYPED_FIELDS.contains(&field) {
        return Ok(());
    }
    let actual = value.map(type_name).unwrap_or("undefined");
    if actual != field {
        return Err(EngineError::invalid_attribute(
            "set",
            field,
            format!("expected {}, got {}", field, actual),
        ));
    }
    Ok(())
}

#[async_trait]
impl TagHandler for SetTag {
    fn render_name(&self) -> &str {
        "set"
    }

    fn attributes(&self) -> &[AttributeSpec] {
        ATTRIBUTES
    }

    fn self_closing(&self) -> bool {
        true
    }

    async fn run(&self, node: &Node, ctx: &Context, _sink: &mut Sink) -> Result<()> {
        let id = required_string("set", node, "id", ctx)?;

        let Node::Tag { attributes, .. } = node else {
            return Ok(());
        };

        let mut fields = Map::new();
        for (key, expr) in attributes.iter().filter(|(key, _)| key.as_str() != "id") {
            let value = resolver::resolve(expr, ctx)?;
            check_field_type(key, value.as_ref())?;
            fields.insert(key.clone(), value.unwrap_or(JsonValue::Null));
        }

        let value = JsonValue::Object(fields);
        ctx.state().events().on_result(&id, &value);
        ctx.push(id, value);
        Ok(())
    }
}
