//! Adapter interface
//!
//! Adapters are how tag handlers reach anything outside the engine:
//! sandboxed code evaluation (`code`), model calls (`ai`), or host-defined
//! kinds. An adapter is a kind plus a table of named async operations.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::context::Context;
use super::errors::{EngineError, Result};
use super::events::ExecutionEvents;

#[async_trait]
pub trait AdapterHandler: Send + Sync {
    async fn call(&self, args: JsonValue, ctx: AdapterContext) -> Result<JsonValue>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> AdapterHandler for FnHandler<F>
where
    F: Fn(JsonValue, AdapterContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JsonValue>> + Send + 'static,
{
    async fn call(&self, args: JsonValue, ctx: AdapterContext) -> Result<JsonValue> {
        (self.0)(args, ctx).await
    }
}

/// Wrap an async closure as an operation handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn AdapterHandler>
where
    F: Fn(JsonValue, AdapterContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JsonValue>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// One adapter: a kind (e.g. "code") and its operations (e.g. "eval")
#[derive(Clone)]
pub struct Adapter {
    pub kind: String,
    pub handlers: HashMap<String, Arc<dyn AdapterHandler>>,
}

impl Adapter {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            handlers: HashMap::new(),
        }
    }

    pub fn handler(mut self, operation: impl Into<String>, handler: Arc<dyn AdapterHandler>) -> Self {
        self.handlers.insert(operation.into(), handler);
        self
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ops: Vec<_> = self.handlers.keys().collect();
        ops.sort();
        f.debug_struct("Adapter")
            .field("kind", &self.kind)
            .field("operations", &ops)
            .finish()
    }
}

/// Environment variables under this prefix are readable as secrets
pub const SECRET_ENV_PREFIX: &str = "AIM_SECRET_";

/// Named secrets adapters may read
///
/// A name missing from the configured values falls back to
/// `AIM_SECRET_<name>`; the rest of the process environment stays hidden.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: HashMap<String, String>,
}

impl Secrets {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.values
            .get(name)
            .cloned()
            .or_else(|| std::env::var(format!("{}{}", SECRET_ENV_PREFIX, name)).ok())
    }
}

/// What an operation handler can see of the execution
#[derive(Clone)]
pub struct AdapterContext {
    pub execution_id: String,
    secrets: Arc<Secrets>,
    signal: CancellationToken,
    events: Arc<dyn ExecutionEvents>,
}

impl AdapterContext {
    pub fn new(
        execution_id: impl Into<String>,
        secrets: Arc<Secrets>,
        signal: CancellationToken,
        events: Arc<dyn ExecutionEvents>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            secrets,
            signal,
            events,
        }
    }

    pub fn get_secret(&self, name: &str) -> Option<String> {
        self.secrets.get(name)
    }

    /// Fires when the execution is aborted
    pub fn signal(&self) -> &CancellationToken {
        &self.signal
    }

    pub fn log(&self, message: &str) {
        self.events.on_log(message);
    }
}

/// Adapters by kind, fixed at engine build time
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Adapter>,
}

impl AdapterRegistry {
    /// Register an adapter; operations of an existing kind are merged, the
    /// later registration winning per operation
    pub fn register(&mut self, adapter: Adapter) {
        match self.adapters.get_mut(&adapter.kind) {
            Some(existing) => existing.handlers.extend(adapter.handlers),
            None => {
                self.adapters.insert(adapter.kind.clone(), adapter);
            }
        }
    }

    pub fn get(&self, kind: &str, operation: &str) -> Option<Arc<dyn AdapterHandler>> {
        self.adapters.get(kind)?.handlers.get(operation).cloned()
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.adapters.keys().map(String::as_str).collect();
        kinds.sort();
        kinds
    }

    /// Invoke `kind.operation`, racing it against the execution's signal
    pub async fn invoke(
        &self,
        kind: &str,
        operation: &str,
        args: JsonValue,
        ctx: &Context,
    ) -> Result<JsonValue> {
        let handler = self.get(kind, operation).ok_or_else(|| EngineError::UnknownAdapter {
            kind: kind.to_string(),
            operation: operation.to_string(),
        })?;
        let state = ctx.state();
        let adapter_ctx = AdapterContext::new(
            state.execution_id(),
            ctx.runtime().secrets.clone(),
            state.signal().clone(),
            state.events().clone(),
        );
        debug!(kind, operation, "invoking adapter");
        let what = format!("{}.{}", kind, operation);
        ctx.cancellable(&what, handler.call(args, adapter_ctx)).await
    }
}
