//! Walk context
//!
//! A `Context` is the view a handler has of the execution: the shared state
//! plus the chain of scope tokens from global to innermost. Child contexts
//! extend the chain with a freshly allocated token.

use serde_json::{Map, Value as JsonValue};
use std::future::Future;
use std::sync::Arc;

use super::errors::Result;
use super::lifecycle;
use super::runtime::Runtime;
use super::state::{ExecutionState, Frame, ScopeGuard, ScopeId, GLOBAL_SCOPE};

#[derive(Clone)]
pub struct Context {
    state: Arc<ExecutionState>,
    chain: Arc<[ScopeId]>,
}

impl Context {
    /// Root context in the global scope
    pub fn root(state: Arc<ExecutionState>) -> Self {
        Self {
            state,
            chain: Arc::from(vec![GLOBAL_SCOPE]),
        }
    }

    /// Enter a new scope. Dropping the guard unwinds it.
    pub fn enter_scope(&self) -> (Context, ScopeGuard) {
        let scope = self.state.new_scope();
        let mut chain = self.chain.to_vec();
        chain.push(scope);
        let child = Context {
            state: self.state.clone(),
            chain: Arc::from(chain),
        };
        (child, ScopeGuard::new(self.state.clone(), scope))
    }

    pub fn state(&self) -> &Arc<ExecutionState> {
        &self.state
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        self.state.runtime()
    }

    /// Innermost scope token
    pub fn scope(&self) -> ScopeId {
        *self.chain.last().unwrap_or(&GLOBAL_SCOPE)
    }

    pub fn chain(&self) -> &[ScopeId] {
        &self.chain
    }

    pub fn lookup(&self, id: &str) -> Option<JsonValue> {
        self.state.lookup(id, &self.chain)
    }

    /// Push a frame into the innermost scope
    pub fn push(&self, id: impl Into<String>, variables: JsonValue) {
        self.state
            .push_stack(Frame::new(id, self.scope(), variables));
    }

    pub fn record_text(&self, text: &str) {
        if !text.is_empty() {
            self.state.add_to_text_registry(text, self.scope());
        }
    }

    /// Text rendered so far that this context can see
    pub fn scoped_text(&self) -> String {
        self.state.scoped_text(&self.chain).concat()
    }

    pub fn visible_variables(&self) -> Map<String, JsonValue> {
        self.state.visible_variables(&self.chain)
    }

    /// Fail with `Aborted` if the execution's token has fired
    pub fn checkpoint(&self, at: &str) -> Result<()> {
        lifecycle::checkpoint(self.state.signal(), at)
    }

    /// Await an external call, abandoning the wait if the token fires
    pub async fn cancellable<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        lifecycle::cancellable(self.state.signal(), what, fut).await
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("execution_id", &self.state.execution_id())
            .field("chain", &self.chain)
            .finish()
    }
}
