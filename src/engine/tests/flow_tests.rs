//! Tests for sub-flows

use super::helpers::{nodes, var};
use crate::engine::tags::flow::FlowTag;
use crate::engine::types::{Document, Node};
use crate::engine::walker::walk_all;
use crate::engine::{
    handler_fn, Adapter, AdapterContext, ContentResolver, Context, DocumentCompiler, Engine,
    EngineError, Environment, ExecutionOptions, ExecutionState, Frame, FsContentResolver,
    JsonCompiler, MemoryContentResolver, Plugin, Result, RuntimeSettings, Session, Sink,
    TagHandler,
};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn topic_flow() -> String {
    json!({
        "frontmatter": { "input": [{ "name": "topic", "type": "string" }] },
        "nodes": [
            { "type": "text", "content": "About " },
            { "type": "text", "content": var("frontmatter.input.topic") }
        ]
    })
    .to_string()
}

fn fast_retries(max_retries: u32) -> RuntimeSettings {
    RuntimeSettings {
        max_retries,
        retry_backoff: Duration::from_millis(1),
        ..RuntimeSettings::default()
    }
}

#[tokio::test]
async fn test_flow_with_explicit_input() {
    let engine = Engine::builder()
        .content_resolver(Arc::new(MemoryContentResolver::new().insert("topic.json", topic_flow())))
        .build();
    let document = nodes(&json!([
        {
            "type": "tag",
            "name": "flow",
            "attributes": { "path": "topic.json", "input": { "topic": "cats" }, "id": "f" }
        },
        { "type": "text", "content": var("f.output") },
        { "type": "text", "content": "|" },
        { "type": "text", "content": var("f.input.topic") },
        { "type": "text", "content": "|" },
        { "type": "text", "content": var("f.path") }
    ])
    .to_string());

    let out = engine.render(&document, ExecutionOptions::default()).await.unwrap();
    assert_eq!(out, "About cats|cats|topic.json");
}

#[tokio::test]
async fn test_flow_output_is_captured_not_streamed() {
    let engine = Engine::builder()
        .content_resolver(Arc::new(MemoryContentResolver::new().insert("topic.json", topic_flow())))
        .build();
    let document = nodes(&json!([
        { "type": "tag", "name": "flow", "attributes": { "path": "topic.json", "input": { "topic": "x" } } }
    ])
    .to_string());

    let out = engine.render(&document, ExecutionOptions::default()).await.unwrap();
    assert_eq!(out, "");
}

#[tokio::test]
async fn test_flow_synthesizes_input() {
    let adapter = Adapter::new("ai").handler(
        "generateObject",
        handler_fn(|args: JsonValue, _ctx: AdapterContext| async move {
            assert_eq!(args["schema"]["required"], json!(["topic"]));
            Ok::<_, EngineError>(json!({ "result": { "topic": "dogs" } }))
        }),
    );
    let engine = Engine::builder()
        .adapter(adapter)
        .content_resolver(Arc::new(MemoryContentResolver::new().insert("topic.json", topic_flow())))
        .build();
    let document = nodes(&json!([
        { "type": "tag", "name": "flow", "attributes": { "path": "topic.json" } },
        { "type": "text", "content": var("flow.output") }
    ])
    .to_string());

    let out = engine.render(&document, ExecutionOptions::default()).await.unwrap();
    assert_eq!(out, "About dogs");
}

#[tokio::test]
async fn test_flow_without_declared_inputs_skips_synthesis() {
    let sub = json!({ "nodes": [{ "type": "text", "content": "plain" }] }).to_string();
    // No ai adapter registered: synthesis would fail if attempted
    let engine = Engine::builder()
        .content_resolver(Arc::new(MemoryContentResolver::new().insert("plain.json", sub)))
        .build();
    let document = nodes(&json!([
        { "type": "tag", "name": "flow", "attributes": { "path": "plain.json" } },
        { "type": "text", "content": var("flow.output") }
    ])
    .to_string());

    let out = engine.render(&document, ExecutionOptions::default()).await.unwrap();
    assert_eq!(out, "plain");
}

#[tokio::test]
async fn test_flow_input_synthesis_retries_then_succeeds() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let adapter = Adapter::new("ai").handler(
        "generateObject",
        handler_fn(move |_args: JsonValue, _ctx: AdapterContext| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(EngineError::external("ai", "rate limited"))
                } else {
                    Ok(json!({ "topic": "birds" }))
                }
            }
        }),
    );
    let engine = Engine::builder()
        .adapter(adapter)
        .content_resolver(Arc::new(MemoryContentResolver::new().insert("topic.json", topic_flow())))
        .settings(fast_retries(3))
        .build();
    let document = nodes(&json!([
        { "type": "tag", "name": "flow", "attributes": { "path": "topic.json" } },
        { "type": "text", "content": var("flow.output") }
    ])
    .to_string());

    let out = engine.render(&document, ExecutionOptions::default()).await.unwrap();
    assert_eq!(out, "About birds");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_flow_input_synthesis_gives_up() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let adapter = Adapter::new("ai").handler(
        "generateObject",
        handler_fn(move |_args: JsonValue, _ctx: AdapterContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, EngineError>(json!("not an object")) }
        }),
    );
    let engine = Engine::builder()
        .adapter(adapter)
        .content_resolver(Arc::new(MemoryContentResolver::new().insert("topic.json", topic_flow())))
        .settings(fast_retries(2))
        .build();
    let document = nodes(&json!([
        { "type": "tag", "name": "flow", "attributes": { "path": "topic.json" } }
    ])
    .to_string());

    let err = engine.render(&document, ExecutionOptions::default()).await.unwrap_err();
    match err {
        EngineError::ExternalCall { source_name, message } => {
            assert_eq!(source_name, "ai.generateObject");
            assert!(message.contains("gave up after 3 attempts"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_flow_missing_content_and_bad_compile() {
    let engine = Engine::builder()
        .content_resolver(Arc::new(MemoryContentResolver::new().insert("broken.json", "not json")))
        .build();

    let missing = nodes(&json!([
        { "type": "tag", "name": "flow", "attributes": { "path": "nope.json", "input": {} } }
    ])
    .to_string());
    let err = engine.render(&missing, ExecutionOptions::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::ContentNotFound(p) if p == "nope.json"));

    let broken = nodes(&json!([
        { "type": "tag", "name": "flow", "attributes": { "path": "broken.json", "input": {} } }
    ])
    .to_string());
    let err = engine.render(&broken, ExecutionOptions::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::Compile { path, .. } if path == "broken.json"));
}

#[tokio::test]
async fn test_flow_input_must_be_object() {
    let engine = Engine::builder()
        .content_resolver(Arc::new(MemoryContentResolver::new().insert("topic.json", topic_flow())))
        .build();
    let document = nodes(&json!([
        { "type": "tag", "name": "flow", "attributes": { "path": "topic.json", "input": 3 } }
    ])
    .to_string());

    let err = engine.render(&document, ExecutionOptions::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidAttribute { attribute, .. } if attribute == "input"));
}

#[tokio::test]
async fn test_recursive_flow_hits_depth_limit() {
    let recursive = json!({
        "nodes": [
            { "type": "tag", "name": "flow", "attributes": { "path": "self.json", "input": {} } }
        ]
    })
    .to_string();
    let engine = Engine::builder()
        .content_resolver(Arc::new(MemoryContentResolver::new().insert("self.json", recursive)))
        .settings(RuntimeSettings {
            max_flow_depth: 3,
            ..RuntimeSettings::default()
        })
        .build();
    let document = nodes(&json!([
        { "type": "tag", "name": "flow", "attributes": { "path": "self.json", "input": {} } }
    ])
    .to_string());

    let err = engine.render(&document, ExecutionOptions::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidAttribute { tag, .. } if tag == "flow"));
}

#[tokio::test]
async fn test_filesystem_flows_rejected_in_browser() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("topic.json"), topic_flow()).unwrap();

    let document = nodes(&json!([
        { "type": "tag", "name": "flow", "attributes": { "path": "topic.json", "input": { "topic": "x" } } },
        { "type": "text", "content": var("flow.output") }
    ])
    .to_string());

    let node_engine = Engine::builder()
        .content_resolver(Arc::new(FsContentResolver::new(dir.path())))
        .build();
    let out = node_engine.render(&document, ExecutionOptions::default()).await.unwrap();
    assert_eq!(out, "About x");

    let browser_engine = Engine::builder()
        .content_resolver(Arc::new(FsContentResolver::new(dir.path())))
        .settings(RuntimeSettings {
            environment: Environment::Browser,
            ..RuntimeSettings::default()
        })
        .build();
    let err = browser_engine
        .render(&document, ExecutionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExternalCall { source_name, .. } if source_name == "content"));
}

fn plain_flow() -> String {
    json!({ "nodes": [{ "type": "text", "content": "plain" }] }).to_string()
}

fn flow_node(path: &str) -> Document {
    nodes(&json!([
        { "type": "tag", "name": "flow", "attributes": { "path": path, "input": {} } }
    ])
    .to_string())
}

/// Walk `document` at the root of a fresh state and return what the stack held afterwards
async fn walk_with_signal(
    engine: &Engine,
    document: &Document,
    signal: CancellationToken,
) -> (Result<()>, Vec<Frame>) {
    let state = Arc::new(ExecutionState::new(
        "flow-test",
        engine.runtime().clone(),
        Session::new(signal),
    ));
    let ctx = Context::root(state.clone());
    let mut sink = Sink::buffer();
    let result = walk_all(&document.nodes, &ctx, &mut sink).await;
    (result, state.stack_snapshot())
}

fn assert_aborted_at(result: Result<()>, at: &str) {
    match result {
        Err(EngineError::Aborted { reason }) => {
            assert!(reason.contains(at), "reason {:?} should mention {:?}", reason, at)
        }
        other => panic!("expected abort at {}, got {:?}", at, other),
    }
}

fn has_flow_frame(frames: &[Frame]) -> bool {
    frames.iter().any(|frame| frame.id == "flow")
}

struct SlowContent;

#[async_trait]
impl ContentResolver for SlowContent {
    async fn load(&self, _path: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(plain_flow())
    }
}

/// Fires the held token while loading, then succeeds
struct CancellingContent(CancellationToken);

#[async_trait]
impl ContentResolver for CancellingContent {
    async fn load(&self, _path: &str) -> Result<String> {
        self.0.cancel();
        Ok(plain_flow())
    }
}

/// Fires the held token while compiling, then succeeds
struct CancellingCompiler(CancellationToken);

#[async_trait]
impl DocumentCompiler for CancellingCompiler {
    async fn compile(&self, path: &str, content: &str) -> Result<Document> {
        self.0.cancel();
        JsonCompiler.compile(path, content).await
    }
}

/// Tag that fires the execution's signal and returns normally
struct Halt;

#[async_trait]
impl TagHandler for Halt {
    fn render_name(&self) -> &str {
        "halt"
    }

    fn self_closing(&self) -> bool {
        true
    }

    async fn run(&self, _node: &Node, ctx: &Context, _sink: &mut Sink) -> Result<()> {
        ctx.state().signal().cancel();
        Ok(())
    }
}

#[tokio::test]
async fn test_flow_checks_signal_before_starting() {
    let engine = Engine::builder()
        .content_resolver(Arc::new(MemoryContentResolver::new().insert("plain.json", plain_flow())))
        .build();
    let document = flow_node("plain.json");
    let signal = CancellationToken::new();
    signal.cancel();

    let state = Arc::new(ExecutionState::new(
        "flow-test",
        engine.runtime().clone(),
        Session::new(signal),
    ));
    let ctx = Context::root(state.clone());
    let mut sink = Sink::buffer();
    let result = FlowTag.run(&document.nodes[0], &ctx, &mut sink).await;

    assert_aborted_at(result, "flow start");
    assert!(!has_flow_frame(&state.stack_snapshot()));
}

#[tokio::test]
async fn test_abort_while_loading_flow_content() {
    let engine = Engine::builder().content_resolver(Arc::new(SlowContent)).build();
    let document = flow_node("slow.json");
    let signal = CancellationToken::new();
    let trigger = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let (result, frames) = walk_with_signal(&engine, &document, signal).await;

    assert_aborted_at(result, "flow content");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!has_flow_frame(&frames));
}

#[tokio::test]
async fn test_abort_observed_after_content_loaded() {
    let signal = CancellationToken::new();
    let engine = Engine::builder()
        .content_resolver(Arc::new(CancellingContent(signal.clone())))
        .build();

    let (result, frames) = walk_with_signal(&engine, &flow_node("plain.json"), signal).await;

    assert_aborted_at(result, "flow content loaded");
    assert!(!has_flow_frame(&frames));
}

#[tokio::test]
async fn test_abort_observed_after_compile() {
    let signal = CancellationToken::new();
    let engine = Engine::builder()
        .content_resolver(Arc::new(MemoryContentResolver::new().insert("plain.json", plain_flow())))
        .compiler(Arc::new(CancellingCompiler(signal.clone())))
        .build();

    let (result, frames) = walk_with_signal(&engine, &flow_node("plain.json"), signal).await;

    assert_aborted_at(result, "flow compiled");
    assert!(!has_flow_frame(&frames));
}

#[tokio::test]
async fn test_abort_during_subflow_skips_binding() {
    let sub = json!({
        "nodes": [
            { "type": "text", "content": "partial" },
            { "type": "tag", "name": "halt" }
        ]
    })
    .to_string();
    let engine = Engine::builder()
        .plugin(Plugin::new("halt", "0.1.0").tag("halt", Arc::new(Halt)))
        .content_resolver(Arc::new(MemoryContentResolver::new().insert("halt.json", sub)))
        .build();

    let (result, frames) =
        walk_with_signal(&engine, &flow_node("halt.json"), CancellationToken::new()).await;

    assert_aborted_at(result, "flow finalize");
    assert!(!has_flow_frame(&frames));
}

#[tokio::test]
async fn test_abort_during_retry_backoff() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let adapter = Adapter::new("ai").handler(
        "generateObject",
        handler_fn(move |_args: JsonValue, _ctx: AdapterContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Err::<JsonValue, _>(EngineError::external("ai", "rate limited")) }
        }),
    );
    let engine = Engine::builder()
        .adapter(adapter)
        .content_resolver(Arc::new(MemoryContentResolver::new().insert("topic.json", topic_flow())))
        .settings(RuntimeSettings {
            max_retries: 5,
            retry_backoff: Duration::from_secs(10),
            ..RuntimeSettings::default()
        })
        .build();
    let document = nodes(&json!([
        { "type": "tag", "name": "flow", "attributes": { "path": "topic.json" } }
    ])
    .to_string());
    let signal = CancellationToken::new();
    let trigger = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = engine
        .render(&document, ExecutionOptions::default().signal(signal))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Aborted { ref reason } if reason.contains("flow input retry")));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
