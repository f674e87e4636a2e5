//! Engine runtime: everything fixed at build time
//!
//! A `Runtime` is shared by every execution an `Engine` starts, including
//! nested sub-flow executions. It is never mutated once built.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::adapter::{AdapterRegistry, Secrets};
use super::collaborators::{ContentResolver, DocumentCompiler, JsonCompiler, MemoryContentResolver};
use super::registry::TagRegistry;

/// Host environment the engine runs in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Node,
    /// No local filesystem access for sub-flows
    Browser,
}

/// Tunables shared by all executions of an engine
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    /// Additional attempts for structured-output generation
    pub max_retries: u32,
    /// Base delay between retries, doubled per attempt
    pub retry_backoff: Duration,
    pub environment: Environment,
    /// Bound of the top-level fragment channel
    pub channel_capacity: usize,
    /// Maximum sub-flow nesting depth
    pub max_flow_depth: usize,
    /// Timeout applied when an execution does not set its own
    pub default_timeout: Option<Duration>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(200),
            environment: Environment::Node,
            channel_capacity: 64,
            max_flow_depth: 8,
            default_timeout: None,
        }
    }
}

pub struct Runtime {
    pub tags: TagRegistry,
    pub adapters: AdapterRegistry,
    pub content: Arc<dyn ContentResolver>,
    pub compiler: Arc<dyn DocumentCompiler>,
    pub secrets: Arc<Secrets>,
    pub settings: RuntimeSettings,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            tags: TagRegistry::with_builtins(),
            adapters: AdapterRegistry::default(),
            content: Arc::new(MemoryContentResolver::new()),
            compiler: Arc::new(JsonCompiler),
            secrets: Arc::new(Secrets::default()),
            settings: RuntimeSettings::default(),
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("tags", &self.tags.names())
            .field("adapters", &self.adapters.kinds())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
