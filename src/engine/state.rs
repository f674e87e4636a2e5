//! Execution state store
//!
//! One `ExecutionState` exists per top-level execution. It holds the frame
//! stack, the text registry and the scope arena. All mutation goes through
//! push/pop/add/clear; the mutex only makes each operation atomic; isolation
//! between concurrent branches comes from disjoint scope tokens.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::collaborators::{InputProvider, NoInputProvider};
use super::events::{ExecutionEvents, NoopEvents};
use super::runtime::Runtime;

/// Scope token. Allocated from a monotonic arena, never reused within an
/// execution.
pub type ScopeId = u64;

pub const GLOBAL_SCOPE: ScopeId = 0;

/// One variable binding on the stack
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub id: String,
    pub scope: ScopeId,
    pub variables: JsonValue,
}

impl Frame {
    pub fn new(id: impl Into<String>, scope: ScopeId, variables: JsonValue) -> Self {
        Self {
            id: id.into(),
            scope,
            variables,
        }
    }
}

/// One rendered text entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextEntry {
    pub text: String,
    pub scope: ScopeId,
}

#[derive(Debug, Default)]
struct Store {
    stack: Vec<Frame>,
    text_registry: Vec<TextEntry>,
}

/// Per-execution collaborators, inherited by sub-flows
#[derive(Clone)]
pub struct Session {
    pub signal: CancellationToken,
    pub events: Arc<dyn ExecutionEvents>,
    pub input_provider: Arc<dyn InputProvider>,
    /// Top-level variables the execution was started with
    pub variables: Map<String, JsonValue>,
    /// Sub-flow nesting depth (0 for a top-level execution)
    pub depth: usize,
}

impl Session {
    pub fn new(signal: CancellationToken) -> Self {
        Self {
            signal,
            events: Arc::new(NoopEvents),
            input_provider: Arc::new(NoInputProvider),
            variables: Map::new(),
            depth: 0,
        }
    }

    /// Session for a nested execution: same collaborators, one level deeper
    pub fn nested(&self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self.clone()
        }
    }
}

/// Per-execution mutable state
pub struct ExecutionState {
    execution_id: String,
    store: Mutex<Store>,
    next_scope: AtomicU64,
    session: Session,
    runtime: Arc<Runtime>,
}

impl ExecutionState {
    pub fn new(execution_id: impl Into<String>, runtime: Arc<Runtime>, session: Session) -> Self {
        Self {
            execution_id: execution_id.into(),
            store: Mutex::new(Store::default()),
            next_scope: AtomicU64::new(GLOBAL_SCOPE + 1),
            session,
            runtime,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn signal(&self) -> &CancellationToken {
        &self.session.signal
    }

    pub fn events(&self) -> &Arc<dyn ExecutionEvents> {
        &self.session.events
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /* ===================== Scopes ===================== */

    pub fn new_scope(&self) -> ScopeId {
        self.next_scope.fetch_add(1, Ordering::Relaxed)
    }

    /* ===================== Stack ===================== */

    pub fn push_stack(&self, frame: Frame) {
        self.store.lock().stack.push(frame);
    }

    /// Remove every frame tagged with `scope`
    pub fn pop_stack(&self, scope: ScopeId) {
        self.store.lock().stack.retain(|f| f.scope != scope);
    }

    /// Most recent frame for `id` whose scope is in `chain`
    pub fn lookup(&self, id: &str, chain: &[ScopeId]) -> Option<JsonValue> {
        let store = self.store.lock();
        store
            .stack
            .iter()
            .rev()
            .find(|f| f.id == id && chain.contains(&f.scope))
            .map(|f| f.variables.clone())
    }

    /// All bindings visible from `chain`, most recent winning
    pub fn visible_variables(&self, chain: &[ScopeId]) -> Map<String, JsonValue> {
        let store = self.store.lock();
        let mut vars = Map::new();
        for frame in store.stack.iter().filter(|f| chain.contains(&f.scope)) {
            vars.insert(frame.id.clone(), frame.variables.clone());
        }
        vars
    }

    pub fn stack_snapshot(&self) -> Vec<Frame> {
        self.store.lock().stack.clone()
    }

    /* ===================== Text Registry ===================== */

    pub fn add_to_text_registry(&self, text: impl Into<String>, scope: ScopeId) {
        self.store.lock().text_registry.push(TextEntry {
            text: text.into(),
            scope,
        });
    }

    pub fn clear_text_registry(&self, scope: ScopeId) {
        self.store.lock().text_registry.retain(|e| e.scope != scope);
    }

    /// Registry text visible from `chain`, in insertion order
    pub fn scoped_text(&self, chain: &[ScopeId]) -> Vec<String> {
        let store = self.store.lock();
        store
            .text_registry
            .iter()
            .filter(|e| chain.contains(&e.scope))
            .map(|e| e.text.clone())
            .collect()
    }

    pub fn text_registry_snapshot(&self) -> Vec<TextEntry> {
        self.store.lock().text_registry.clone()
    }
}

impl std::fmt::Debug for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionState")
            .field("execution_id", &self.execution_id)
            .field("store", &*self.store.lock())
            .finish_non_exhaustive()
    }
}

/// Unwinds a scope's footprint (frames and registry entries) on drop
pub struct ScopeGuard {
    state: Arc<ExecutionState>,
    scope: ScopeId,
}

impl ScopeGuard {
    pub fn new(state: Arc<ExecutionState>, scope: ScopeId) -> Self {
        Self { state, scope }
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.state.pop_stack(self.scope);
        self.state.clear_text_registry(self.scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runtime::Runtime;
    use serde_json::json;

    fn state() -> Arc<ExecutionState> {
        Arc::new(ExecutionState::new(
            "test-execution-id",
            Arc::new(Runtime::default()),
            Session::new(CancellationToken::new()),
        ))
    }

    #[test]
    fn test_lookup_prefers_most_recent_frame() {
        let state = state();
        state.push_stack(Frame::new("v", GLOBAL_SCOPE, json!({ "number": 2 })));
        state.push_stack(Frame::new("v", GLOBAL_SCOPE, json!({ "number": 3 })));

        assert_eq!(
            state.lookup("v", &[GLOBAL_SCOPE]),
            Some(json!({ "number": 3 }))
        );
        assert_eq!(state.lookup("missing", &[GLOBAL_SCOPE]), None);
    }

    #[test]
    fn test_lookup_is_restricted_to_chain() {
        let state = state();
        let a = state.new_scope();
        let b = state.new_scope();
        assert_ne!(a, b);

        state.push_stack(Frame::new("x", a, json!("from a")));

        assert_eq!(state.lookup("x", &[GLOBAL_SCOPE, a]), Some(json!("from a")));
        assert_eq!(state.lookup("x", &[GLOBAL_SCOPE, b]), None);
    }

    #[test]
    fn test_pop_stack_removes_scope_frames() {
        let state = state();
        let scope = state.new_scope();
        state.push_stack(Frame::new("kept", GLOBAL_SCOPE, json!(1)));
        state.push_stack(Frame::new("x", scope, json!(1)));
        state.push_stack(Frame::new("x", scope, json!(2)));

        state.pop_stack(scope);

        assert_eq!(state.lookup("x", &[GLOBAL_SCOPE, scope]), None);
        assert_eq!(state.lookup("kept", &[GLOBAL_SCOPE]), Some(json!(1)));
    }

    #[test]
    fn test_scoped_text_and_clear() {
        let state = state();
        let scope = state.new_scope();
        state.add_to_text_registry("intro ", GLOBAL_SCOPE);
        state.add_to_text_registry("branch", scope);

        assert_eq!(state.scoped_text(&[GLOBAL_SCOPE]), vec!["intro "]);
        assert_eq!(state.scoped_text(&[GLOBAL_SCOPE, scope]), vec!["intro ", "branch"]);

        state.clear_text_registry(scope);
        assert_eq!(state.scoped_text(&[GLOBAL_SCOPE, scope]), vec!["intro "]);
    }

    #[test]
    fn test_scope_guard_unwinds_on_drop() {
        let state = state();
        let scope = state.new_scope();
        {
            let _guard = ScopeGuard::new(state.clone(), scope);
            state.push_stack(Frame::new("x", scope, json!(1)));
            state.add_to_text_registry("t", scope);
        }

        assert!(state.stack_snapshot().is_empty());
        assert!(state.text_registry_snapshot().is_empty());
    }

    #[test]
    fn test_visible_variables_snapshot() {
        let state = state();
        let hidden = state.new_scope();
        state.push_stack(Frame::new("a", GLOBAL_SCOPE, json!(1)));
        state.push_stack(Frame::new("a", GLOBAL_SCOPE, json!(2)));
        state.push_stack(Frame::new("b", hidden, json!(3)));

        let vars = state.visible_variables(&[GLOBAL_SCOPE]);
        assert_eq!(vars.get("a"), Some(&json!(2)));
        assert!(vars.get("b").is_none());
    }
}
