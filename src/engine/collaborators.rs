//! External collaborators the engine calls through
//!
//! - `ContentResolver`: loads sub-flow source by path
//! - `DocumentCompiler`: turns loaded content into a `Document`
//! - `InputProvider`: answers `input` tags (pre-supplied values or a prompt)

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use super::errors::{EngineError, Result};
use super::types::Document;

/* ===================== Content ===================== */

#[async_trait]
pub trait ContentResolver: Send + Sync {
    async fn load(&self, path: &str) -> Result<String>;

    /// True if this resolver reads the local filesystem
    fn is_local_filesystem(&self) -> bool {
        false
    }
}

/// Reads documents from a directory; paths may not escape it
#[derive(Debug, Clone)]
pub struct FsContentResolver {
    root: PathBuf,
}

impl FsContentResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.strip_prefix("file://").unwrap_or(path));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(EngineError::ContentNotFound(format!(
                "{} (path must stay inside the content root)",
                path
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ContentResolver for FsContentResolver {
    async fn load(&self, path: &str) -> Result<String> {
        let full = self.resolve_path(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::ContentNotFound(path.to_string()))
            }
            Err(e) => Err(EngineError::external("content", format!("{}: {}", full.display(), e))),
        }
    }

    fn is_local_filesystem(&self) -> bool {
        true
    }
}

/// In-memory documents keyed by path
#[derive(Debug, Clone, Default)]
pub struct MemoryContentResolver {
    documents: HashMap<String, String>,
}

impl MemoryContentResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.documents.insert(path.into(), content.into());
        self
    }
}

#[async_trait]
impl ContentResolver for MemoryContentResolver {
    async fn load(&self, path: &str) -> Result<String> {
        self.documents
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::ContentNotFound(path.to_string()))
    }
}

/* ===================== Compiler ===================== */

#[async_trait]
pub trait DocumentCompiler: Send + Sync {
    async fn compile(&self, path: &str, content: &str) -> Result<Document>;
}

/// Accepts the serialized AST the markup compiler emits
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCompiler;

#[async_trait]
impl DocumentCompiler for JsonCompiler {
    async fn compile(&self, path: &str, content: &str) -> Result<Document> {
        serde_json::from_str(content).map_err(|e| EngineError::Compile {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}

/* ===================== User Input ===================== */

/// What an `input` tag asks for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputRequest {
    pub name: String,
    pub description: Option<String>,
    pub content_type: String,
    pub src: Option<String>,
}

#[async_trait]
pub trait InputProvider: Send + Sync {
    async fn ask(&self, request: &InputRequest) -> Result<JsonValue>;
}

/// Fails every request; the default when the host supplies nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInputProvider;

#[async_trait]
impl InputProvider for NoInputProvider {
    async fn ask(&self, request: &InputRequest) -> Result<JsonValue> {
        Err(EngineError::external(
            "input",
            format!("no input provider configured for '{}'", request.name),
        ))
    }
}

/// Pre-supplied answers keyed by input name
#[derive(Debug, Clone, Default)]
pub struct StaticInputs {
    values: HashMap<String, JsonValue>,
}

impl StaticInputs {
    pub fn new(values: HashMap<String, JsonValue>) -> Self {
        Self { values }
    }
}

#[async_trait]
impl InputProvider for StaticInputs {
    async fn ask(&self, request: &InputRequest) -> Result<JsonValue> {
        self.values.get(&request.name).cloned().ok_or_else(|| {
            EngineError::external("input", format!("no value supplied for '{}'", request.name))
        })
    }
}
