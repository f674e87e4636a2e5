//! Engine error taxonomy

use thiserror::Error;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The execution's cancellation token fired
    #[error("execution aborted: {reason}")]
    Aborted { reason: String },

    #[error("unknown tag '{0}'")]
    UnknownTag(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("'{tag}' requires the '{attribute}' attribute")]
    MissingRequiredAttribute { tag: String, attribute: String },

    #[error("invalid '{attribute}' on '{tag}': {message}")]
    InvalidAttribute {
        tag: String,
        attribute: String,
        message: String,
    },

    #[error("invalid source '{0}': must start with file://, http:// or https://")]
    InvalidSource(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("{function}(): {message}")]
    InvalidArgument { function: String, message: String },

    #[error("no adapter registered for '{kind}' with operation '{operation}'")]
    UnknownAdapter { kind: String, operation: String },

    #[error("{source_name} call failed: {message}")]
    ExternalCall { source_name: String, message: String },

    #[error("content not found: {0}")]
    ContentNotFound(String),

    #[error("failed to compile '{path}': {message}")]
    Compile { path: String, message: String },

    /// The output consumer went away
    #[error("output channel closed")]
    OutputClosed,
}

impl EngineError {
    pub fn aborted(reason: impl Into<String>) -> Self {
        EngineError::Aborted {
            reason: reason.into(),
        }
    }

    pub fn missing(tag: &str, attribute: &str) -> Self {
        EngineError::MissingRequiredAttribute {
            tag: tag.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub fn invalid_attribute(tag: &str, attribute: &str, message: impl Into<String>) -> Self {
        EngineError::InvalidAttribute {
            tag: tag.to_string(),
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_argument(function: &str, message: impl Into<String>) -> Self {
        EngineError::InvalidArgument {
            function: function.to_string(),
            message: message.into(),
        }
    }

    pub fn external(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::ExternalCall {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, EngineError::Aborted { .. })
    }
}
