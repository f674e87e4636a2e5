//! # AIM document execution engine
//!
//! A tree-walking interpreter over compiled AIM documents.
//!
//! ## Core Principles
//!
//! 1. **Explicit state**: one `ExecutionState` per execution, threaded through
//!    every handler in a `Context`; nothing is process-global
//! 2. **Scoped frames**: handlers bind values as frames tagged with a scope
//!    token and unwind them with a `ScopeGuard`
//! 3. **Streaming**: fragments are pushed into a bounded channel as soon as
//!    they are produced
//! 4. **One signal**: a single `CancellationToken` per execution is checked
//!    before every node and raced against every external wait
//!
//! ```no_run
//! use aim_core::engine::{Engine, ExecutionOptions};
//! use aim_core::engine::types::{Document, Expression, Node};
//!
//! # async fn demo() -> aim_core::engine::Result<()> {
//! let engine = Engine::builder().build();
//! let doc = Document::new(vec![Node::text("Hello "), Node::expr(Expression::var("name"))]);
//! let options = ExecutionOptions::default().variable("name", "world");
//! assert_eq!(engine.render(&doc, options).await?, "Hello world");
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod collaborators;
pub mod context;
pub mod errors;
pub mod events;
pub mod fragment;
pub mod lifecycle;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod state;
pub mod stdlib;
pub mod tags;
pub mod types;
pub mod walker;

#[cfg(test)]
mod tests;

pub use adapter::{handler_fn, Adapter, AdapterContext, AdapterHandler, Secrets, SECRET_ENV_PREFIX};
pub use collaborators::{
    ContentResolver, DocumentCompiler, FsContentResolver, InputProvider, InputRequest, JsonCompiler,
    MemoryContentResolver, StaticInputs,
};
pub use context::Context;
pub use errors::{EngineError, Result};
pub use events::{ExecutionEvents, NoopEvents, TracingEvents};
pub use fragment::{render_fragments, Fragment, Sink};
pub use registry::{Plugin, PluginPrecedence, TagRegistry};
pub use runtime::{Environment, Runtime, RuntimeSettings};
pub use state::{ExecutionState, Frame, Session};
pub use tags::{AttributeKind, AttributeSpec, TagHandler};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use adapter::AdapterRegistry;
use collaborators::NoInputProvider;
use types::Document;

/* ===================== Options ===================== */

/// Per-execution options
#[derive(Clone)]
pub struct ExecutionOptions {
    /// Generated (uuid v4) when not set
    pub execution_id: Option<String>,
    /// Bound in the global scope, one frame per entry
    pub variables: Map<String, JsonValue>,
    /// Values for the document's declared frontmatter inputs
    pub inputs: Map<String, JsonValue>,
    /// Cancelling this aborts the execution
    pub signal: CancellationToken,
    /// Overrides the engine's default timeout
    pub timeout: Option<Duration>,
    pub events: Arc<dyn ExecutionEvents>,
    pub input_provider: Arc<dyn InputProvider>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            execution_id: None,
            variables: Map::new(),
            inputs: Map::new(),
            signal: CancellationToken::new(),
            timeout: None,
            events: Arc::new(NoopEvents),
            input_provider: Arc::new(NoInputProvider),
        }
    }
}

impl ExecutionOptions {
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn input(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = signal;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn events(mut self, events: Arc<dyn ExecutionEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn input_provider(mut self, provider: Arc<dyn InputProvider>) -> Self {
        self.input_provider = provider;
        self
    }

    pub fn execution_id(mut self, id: impl Into<String>) -> Self {
        self.execution_id = Some(id.into());
        self
    }
}

/// Summary of a finished execution
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Frames left in the global scope
    pub globals: Vec<Frame>,
}

/* ===================== Engine ===================== */

/// Builds an `Engine`. Tags, adapters and collaborators are fixed here.
#[derive(Default)]
pub struct EngineBuilder {
    adapters: Vec<Adapter>,
    plugins: Vec<Plugin>,
    precedence: PluginPrecedence,
    content: Option<Arc<dyn ContentResolver>>,
    compiler: Option<Arc<dyn DocumentCompiler>>,
    secrets: HashMap<String, String>,
    settings: RuntimeSettings,
}

impl EngineBuilder {
    pub fn adapter(mut self, adapter: Adapter) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn plugin_precedence(mut self, precedence: PluginPrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn content_resolver(mut self, resolver: Arc<dyn ContentResolver>) -> Self {
        self.content = Some(resolver);
        self
    }

    pub fn compiler(mut self, compiler: Arc<dyn DocumentCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn secrets(mut self, secrets: HashMap<String, String>) -> Self {
        self.secrets.extend(secrets);
        self
    }

    pub fn settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Engine {
        let mut tags = TagRegistry::with_builtins();
        tags.register_plugins(&self.plugins, self.precedence);

        let mut adapters = AdapterRegistry::default();
        for adapter in self.adapters {
            adapters.register(adapter);
        }

        let runtime = Runtime {
            tags,
            adapters,
            content: self
                .content
                .unwrap_or_else(|| Arc::new(MemoryContentResolver::new())),
            compiler: self.compiler.unwrap_or_else(|| Arc::new(JsonCompiler)),
            secrets: Arc::new(Secrets::new(self.secrets)),
            settings: self.settings,
        };
        debug!(?runtime, "engine built");
        Engine {
            runtime: Arc::new(runtime),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    runtime: Arc<Runtime>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Execute `document`, pushing fragments into `sink` as they are produced
    ///
    /// Fires `on_start`, then `on_success`, `on_abort` or `on_error`, then
    /// `on_finish`. Fragments already emitted stay emitted on failure.
    pub async fn execute(
        &self,
        document: &Document,
        options: ExecutionOptions,
        sink: &mut Sink,
    ) -> Result<ExecutionReport> {
        let execution_id = options
            .execution_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let started_at = Utc::now();
        let events = options.events.clone();
        sink.observe(events.clone());

        // A child token so a timeout never cancels the caller's token
        let signal = options.signal.child_token();
        let timer = options
            .timeout
            .or(self.runtime.settings.default_timeout)
            .map(|timeout| lifecycle::spawn_timeout(signal.clone(), timeout));

        let session = Session {
            signal,
            events: events.clone(),
            input_provider: options.input_provider,
            variables: options.variables,
            depth: 0,
        };
        let state = Arc::new(ExecutionState::new(
            execution_id.clone(),
            self.runtime.clone(),
            session,
        ));

        info!(execution_id = %execution_id, "execution started");
        events.on_start(&execution_id);

        let result = run_document(document, state.clone(), options.inputs, sink).await;

        if let Some(timer) = timer {
            timer.abort();
        }

        match &result {
            Ok(()) => events.on_success(&execution_id),
            Err(e) if e.is_aborted() => events.on_abort(e),
            Err(e) => events.on_error(e),
        }
        events.on_finish(&execution_id);
        info!(execution_id = %execution_id, ok = result.is_ok(), "execution finished");

        result?;
        Ok(ExecutionReport {
            execution_id,
            started_at,
            finished_at: Utc::now(),
            globals: state.stack_snapshot(),
        })
    }

    /// Start `document` on a background task, streaming fragments
    pub fn stream(&self, document: Document, mut options: ExecutionOptions) -> Execution {
        let id = options
            .execution_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let (tx, rx) = mpsc::channel(self.runtime.settings.channel_capacity.max(1));
        let signal = options.signal.clone();
        let engine = self.clone();

        let handle = tokio::spawn(async move {
            let mut sink = Sink::channel(tx, options.events.clone());
            engine.execute(&document, options, &mut sink).await
        });

        Execution {
            id,
            fragments: rx,
            handle,
            signal,
        }
    }

    /// Execute `document` and return its whole rendered text
    pub async fn render(&self, document: &Document, options: ExecutionOptions) -> Result<String> {
        let mut sink = Sink::buffer();
        self.execute(document, options, &mut sink).await?;
        Ok(render_fragments(&sink.into_fragments()))
    }
}

/// A running streamed execution
pub struct Execution {
    pub id: String,
    pub fragments: mpsc::Receiver<Fragment>,
    pub handle: JoinHandle<Result<ExecutionReport>>,
    signal: CancellationToken,
}

impl Execution {
    /// Fire the execution's cancellation signal
    pub fn abort(&self) {
        self.signal.cancel();
    }

    /// Drain remaining fragments, then wait for the outcome
    pub async fn finish(mut self) -> (Vec<Fragment>, Result<ExecutionReport>) {
        let mut fragments = Vec::new();
        while let Some(fragment) = self.fragments.recv().await {
            fragments.push(fragment);
        }
        let report = match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(EngineError::external("engine", format!("execution task failed: {}", e))),
        };
        (fragments, report)
    }
}

/* ===================== Document runs ===================== */

/// Seed the global scope and walk the document's root nodes
///
/// Shared by top-level executions and sub-flows.
pub(crate) async fn run_document(
    document: &Document,
    state: Arc<ExecutionState>,
    inputs: Map<String, JsonValue>,
    sink: &mut Sink,
) -> Result<()> {
    let ctx = Context::root(state);
    seed_globals(&ctx, document, inputs);
    walker::walk_all(&document.nodes, &ctx, sink).await
}

/// Bind execution variables and `frontmatter.input` in the global scope
///
/// Declared inputs take the provided value, else their schema default.
/// Undeclared provided values are passed through.
fn seed_globals(ctx: &Context, document: &Document, mut inputs: Map<String, JsonValue>) {
    for (name, value) in &ctx.state().session().variables {
        ctx.push(name.clone(), value.clone());
    }

    let mut resolved = Map::new();
    for param in &document.frontmatter.input {
        let value = inputs
            .remove(&param.name)
            .or_else(|| param.schema.default.clone());
        if let Some(value) = value {
            resolved.insert(param.name.clone(), value);
        }
    }
    resolved.extend(inputs);

    ctx.push("frontmatter", serde_json::json!({ "input": resolved }));
}
