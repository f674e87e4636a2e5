pub mod cli;
pub mod config;
pub mod engine;

// Re-export main types
pub use engine::{
    Adapter, Engine, EngineBuilder, EngineError, Execution, ExecutionEvents, ExecutionOptions,
    ExecutionReport, Fragment, Plugin, PluginPrecedence,
};
pub use engine::types::{Document, Expression, Node};
