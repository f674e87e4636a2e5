//! Execution lifecycle callbacks

use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use super::errors::EngineError;
use super::fragment::Fragment;

/// Hooks fired during an execution. All methods default to no-ops.
pub trait ExecutionEvents: Send + Sync {
    fn on_start(&self, _execution_id: &str) {}

    /// A tag node is about to be dispatched
    fn on_step(&self, _tag: &str) {}

    /// A fragment reached the output stream
    fn on_data(&self, _fragment: &Fragment) {}

    /// Free-form log line from a handler or adapter
    fn on_log(&self, _message: &str) {}

    fn on_error(&self, _error: &EngineError) {}

    fn on_abort(&self, _error: &EngineError) {}

    fn on_success(&self, _execution_id: &str) {}

    fn on_finish(&self, _execution_id: &str) {}

    /// Value a handler bound, for hosts that surface intermediate results
    fn on_result(&self, _id: &str, _value: &JsonValue) {}
}

pub struct NoopEvents;

impl ExecutionEvents for NoopEvents {}

/// Forwards every callback to `tracing`
pub struct TracingEvents;

impl ExecutionEvents for TracingEvents {
    fn on_start(&self, execution_id: &str) {
        info!(execution_id, "execution started");
    }

    fn on_step(&self, tag: &str) {
        debug!(tag, "step");
    }

    fn on_log(&self, message: &str) {
        info!("{}", message);
    }

    fn on_error(&self, err: &EngineError) {
        error!(error = %err, "execution failed");
    }

    fn on_abort(&self, err: &EngineError) {
        warn!(error = %err, "execution aborted");
    }

    fn on_success(&self, execution_id: &str) {
        debug!(execution_id, "execution succeeded");
    }

    fn on_finish(&self, execution_id: &str) {
        info!(execution_id, "execution finished");
    }

    fn on_result(&self, id: &str, value: &JsonValue) {
        debug!(id, %value, "bound result");
    }
}
