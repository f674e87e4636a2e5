//! Test helpers for engine tests
//!
//! Document parsing, default engines, and recording collaborators

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

use crate::engine::context::Context;
use crate::engine::errors::{EngineError, Result};
use crate::engine::fragment::{Fragment, Sink};
use crate::engine::tags::TagHandler;
use crate::engine::types::{Document, Node};
use crate::engine::{Engine, ExecutionEvents, ExecutionOptions};

/// Parse a document from compiler JSON
pub fn doc(json: &str) -> Document {
    serde_json::from_str(json).expect("Document JSON failed to parse")
}

/// Parse a node list from compiler JSON into a document
pub fn nodes(json: &str) -> Document {
    let nodes: Vec<Node> = serde_json::from_str(json).expect("Node JSON failed to parse");
    Document::new(nodes)
}

/// Render with a default engine and the given variables
pub async fn render(document: &Document, variables: JsonValue) -> Result<String> {
    let mut options = ExecutionOptions::default();
    if let JsonValue::Object(vars) = variables {
        options.variables = vars;
    }
    Engine::builder().build().render(document, options).await
}

/// Variable reference in compiler JSON form
pub fn var(path: &str) -> JsonValue {
    json!({ "$$mdtype": "Variable", "path": path.split('.').collect::<Vec<_>>() })
}

/// Function call in compiler JSON form
pub fn call(name: &str, args: Vec<JsonValue>) -> JsonValue {
    let parameters: serde_json::Map<String, JsonValue> = args
        .into_iter()
        .enumerate()
        .map(|(i, a)| (i.to_string(), a))
        .collect();
    json!({ "$$mdtype": "Function", "name": name, "parameters": parameters })
}

/// Records every lifecycle callback in order
#[derive(Default)]
pub struct RecordingEvents {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingEvents {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

impl ExecutionEvents for RecordingEvents {
    fn on_start(&self, _execution_id: &str) {
        self.record("start".to_string());
    }

    fn on_step(&self, tag: &str) {
        self.record(format!("step:{}", tag));
    }

    fn on_data(&self, fragment: &Fragment) {
        self.record(format!("data:{}", fragment.to_text()));
    }

    fn on_error(&self, _error: &EngineError) {
        self.record("error".to_string());
    }

    fn on_abort(&self, _error: &EngineError) {
        self.record("abort".to_string());
    }

    fn on_success(&self, _execution_id: &str) {
        self.record("success".to_string());
    }

    fn on_finish(&self, _execution_id: &str) {
        self.record("finish".to_string());
    }
}

/// Test tag that records what `ids` resolve to at the point it runs
pub struct Peek {
    pub ids: Vec<&'static str>,
    pub seen: Arc<Mutex<Vec<Vec<Option<JsonValue>>>>>,
}

impl Peek {
    pub fn new(ids: Vec<&'static str>) -> (Arc<Self>, Arc<Mutex<Vec<Vec<Option<JsonValue>>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Arc::new(Self {
                ids,
                seen: seen.clone(),
            }),
            seen,
        )
    }
}

#[async_trait]
impl TagHandler for Peek {
    fn render_name(&self) -> &str {
        "peek"
    }

    fn self_closing(&self) -> bool {
        true
    }

    async fn run(&self, _node: &Node, ctx: &Context, _sink: &mut Sink) -> Result<()> {
        let values = self.ids.iter().map(|id| ctx.lookup(id)).collect();
        self.seen.lock().push(values);
        Ok(())
    }
}

/// Test tag that sleeps, then emits its `text` attribute
pub struct Sleep;

#[async_trait]
impl TagHandler for Sleep {
    fn render_name(&self) -> &str {
        "sleep"
    }

    async fn run(&self, node: &Node, ctx: &Context, sink: &mut Sink) -> Result<()> {
        let ms = crate::engine::tags::attr_value(node, "ms", ctx)?
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let text = crate::engine::tags::attr_string(node, "text", ctx)?.unwrap_or_default();
        ctx.cancellable("sleep", async {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            Ok(())
        })
        .await?;
        crate::engine::walker::emit_text(&text, ctx, sink).await
    }
}

/// Test tag that always fails
pub struct Fail;

#[async_trait]
impl TagHandler for Fail {
    fn render_name(&self) -> &str {
        "fail"
    }

    async fn run(&self, _node: &Node, _ctx: &Context, _sink: &mut Sink) -> Result<()> {
        Err(EngineError::external("fail", "boom"))
    }
}

/// Plugin carrying the `sleep` and `fail` test tags
pub fn test_plugin() -> crate::engine::Plugin {
    crate::engine::Plugin::new("test", "0.1.0")
        .tag("sleep", Arc::new(Sleep))
        .tag("fail", Arc::new(Fail))
}
