//! `input`
//!
//! Asks the session's `InputProvider` for a value and binds it under `name`.
//! A `src` attribute both names where the value comes from and, through its
//! extension, decides the content type.

use async_trait::async_trait;
use tracing::debug;

use super::{attr_string, required_string, AttributeKind, AttributeSpec, TagHandler};
use crate::engine::collaborators::InputRequest;
use crate::engine::context::Context;
use crate::engine::errors::{EngineError, Result};
use crate::engine::fragment::Sink;
use crate::engine::types::Node;

const ATTRIBUTES: &[AttributeSpec] = &[
    AttributeSpec::required("name", AttributeKind::String),
    AttributeSpec::optional("description", AttributeKind::String),
    AttributeSpec::optional("type", AttributeKind::String),
    AttributeSpec::optional("src", AttributeKind::String),
];

const DEFAULT_CONTENT_TYPE: &str = "text/plain";

const ALLOWED_SCHEMES: &[&str] = &["file://", "http://", "https://"];

pub struct InputTag;

/// Content type for a file extension
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "json" => "application/json",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => return None,
    };
    Some(mime)
}

/// Extension of the last path segment, ignoring query and fragment
fn source_extension(src: &str) -> Option<&str> {
    let path = src.split(['?', '#']).next().unwrap_or(src);
    let file = path.rsplit('/').next().unwrap_or(path);
    file.rsplit_once('.').map(|(_, ext)| ext).filter(|ext| !ext.is_empty())
}

pub fn validate_source(src: &str) -> Result<()> {
    if ALLOWED_SCHEMES.iter().any(|scheme| src.starts_with(scheme)) {
        Ok(())
    } else {
        Err(EngineError::InvalidSource(src.to_string()))
    }
}

/// Declared type, overridden by a recognized `src` extension
pub fn content_type_for(declared: Option<&str>, src: Option<&str>) -> String {
    src.and_then(source_extension)
        .and_then(mime_for_extension)
        .or(declared)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

#[async_trait]
impl TagHandler for InputTag {
    fn render_name(&self) -> &str {
        "input"
    }

    fn attributes(&self) -> &[AttributeSpec] {
        ATTRIBUTES
    }

    fn self_closing(&self) -> bool {
        true
    }

    async fn run(&self, node: &Node, ctx: &Context, _sink: &mut Sink) -> Result<()> {
        let name = required_string("input", node, "name", ctx)?;
        let description = attr_string(node, "description", ctx)?;
        let declared = attr_string(node, "type", ctx)?;
        let src = attr_string(node, "src", ctx)?;

        if let Some(src) = &src {
            validate_source(src)?;
        }

        let request = InputRequest {
            content_type: content_type_for(declared.as_deref(), src.as_deref()),
            name,
            description,
            src,
        };
        debug!(name = %request.name, content_type = %request.content_type, "awaiting input");

        let provider = ctx.state().session().input_provider.clone();
        let value = ctx.cancellable("input", provider.ask(&request)).await?;

        ctx.state().events().on_result(&request.name, &value);
        ctx.push(request.name, value);
        Ok(())
    }
}
