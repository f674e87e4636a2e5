//! Configuration management for AIM
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Builder overrides (CLI flags such as --timeout)
//! 2. Environment variables (AIM_ENGINE_TIMEOUT_SECS, etc.)
//! 3. Config file (aim.toml in the working directory or ~/.config/aim/config.toml)
//! 4. Built-in defaults
//!
//! # Example Config File (aim.toml)
//!
//! ```toml
//! [engine]
//! timeout_secs = 120
//! max_retries = 3
//! environment = "node"
//! plugin_precedence = "last_registered_wins"
//!
//! [content]
//! root = "./flows"
//!
//! [secrets]
//! OPENAI_API_KEY = "sk-..."
//! ```
//!
//! # Environment Variables
//!
//! - AIM_CONFIG_PATH
//! - AIM_ENGINE_TIMEOUT_SECS
//! - AIM_ENGINE_MAX_RETRIES
//! - AIM_ENGINE_RETRY_BACKOFF_MS
//! - AIM_ENGINE_ENVIRONMENT
//! - AIM_ENGINE_CHANNEL_CAPACITY
//! - AIM_ENGINE_MAX_FLOW_DEPTH
//! - AIM_ENGINE_PLUGIN_PRECEDENCE
//! - AIM_CONTENT_ROOT
//! - AIM_SECRET_<name> (read at lookup time for secrets not set in the file)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{Engine, EngineBuilder, Environment, FsContentResolver, PluginPrecedence, RuntimeSettings};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub content: ContentConfig,

    /// Values adapters can read through `get_secret`; names not listed
    /// here are looked up as `AIM_SECRET_<name>` in the environment
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}

/// Execution engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Abort executions after this many seconds (unset: no timeout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Additional attempts for structured-output generation
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry delay in milliseconds, doubled per attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default)]
    pub environment: Environment,

    /// Bound of the streaming fragment channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_max_flow_depth")]
    pub max_flow_depth: usize,

    #[serde(default)]
    pub plugin_precedence: PluginPrecedence,
}

/// Where sub-flow documents are loaded from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_content_root")]
    pub root: PathBuf,
}

// Default value functions for serde
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    200
}
fn default_channel_capacity() -> usize {
    64
}
fn default_max_flow_depth() -> usize {
    8
}
fn default_content_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            environment: Environment::default(),
            channel_capacity: default_channel_capacity(),
            max_flow_depth: default_max_flow_depth(),
            plugin_precedence: PluginPrecedence::default(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            root: default_content_root(),
        }
    }
}

impl Config {
    /// Load configuration with full priority chain:
    /// overrides → env vars → config file → defaults
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    /// Load configuration from a specific file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        Ok(config)
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            max_retries: self.engine.max_retries,
            retry_backoff: Duration::from_millis(self.engine.retry_backoff_ms),
            environment: self.engine.environment,
            channel_capacity: self.engine.channel_capacity,
            max_flow_depth: self.engine.max_flow_depth,
            default_timeout: self.engine.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Engine builder preloaded with content root, secrets and settings
    pub fn engine_builder(&self) -> EngineBuilder {
        Engine::builder()
            .content_resolver(Arc::new(FsContentResolver::new(&self.content.root)))
            .secrets(self.secrets.clone().into_iter().collect())
            .plugin_precedence(self.engine.plugin_precedence)
            .settings(self.runtime_settings())
    }

    /// TOML rendering with secret values masked
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        for value in shown.secrets.values_mut() {
            *value = "********".to_string();
        }
        toml::to_string_pretty(&shown).context("Failed to render config")
    }
}

/// Builder for constructing Config with optional overrides
#[derive(Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    timeout_secs: Option<u64>,
    content_root: Option<PathBuf>,
    environment: Option<Environment>,
}

impl ConfigBuilder {
    /// Override the config file path
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn timeout_secs(mut self, timeout: Option<u64>) -> Self {
        self.timeout_secs = timeout;
        self
    }

    pub fn content_root(mut self, root: Option<PathBuf>) -> Self {
        self.content_root = root;
        self
    }

    pub fn environment(mut self, environment: Option<Environment>) -> Self {
        self.environment = environment;
        self
    }

    /// Build the final config by applying priority chain
    pub fn build(self) -> Result<Config> {
        // Load .env first so real env vars still override it
        let _ = dotenvy::dotenv();

        let mut config = self.load_from_file()?.unwrap_or_default();
        self.apply_env_vars(&mut config)?;
        self.apply_overrides(&mut config);

        if config.engine.channel_capacity == 0 {
            anyhow::bail!("engine.channel_capacity must be at least 1");
        }

        Ok(config)
    }

    /// Try to load config from file (searches default locations if no path specified)
    fn load_from_file(&self) -> Result<Option<Config>> {
        let config_path = if let Some(path) = &self.config_path {
            if !path.exists() {
                anyhow::bail!("Config file not found: {:?}", path);
            }
            Some(path.clone())
        } else if let Ok(path_str) = env::var("AIM_CONFIG_PATH") {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                anyhow::bail!("Config file not found: {:?}", path);
            }
            Some(path)
        } else {
            self.find_config_file()
        };

        config_path.map(Config::from_file).transpose()
    }

    /// Search for config file in default locations
    fn find_config_file(&self) -> Option<PathBuf> {
        let project_config = PathBuf::from("aim.toml");
        if project_config.exists() {
            return Some(project_config);
        }

        let home = env::var_os("HOME")?;
        let user_config = PathBuf::from(home).join(".config").join("aim").join("config.toml");
        user_config.exists().then_some(user_config)
    }

    /// Apply environment variables to config
    fn apply_env_vars(&self, config: &mut Config) -> Result<()> {
        if let Some(timeout) = env_parse("AIM_ENGINE_TIMEOUT_SECS")? {
            config.engine.timeout_secs = Some(timeout);
        }
        if let Some(retries) = env_parse("AIM_ENGINE_MAX_RETRIES")? {
            config.engine.max_retries = retries;
        }
        if let Some(backoff) = env_parse("AIM_ENGINE_RETRY_BACKOFF_MS")? {
            config.engine.retry_backoff_ms = backoff;
        }
        if let Some(capacity) = env_parse("AIM_ENGINE_CHANNEL_CAPACITY")? {
            config.engine.channel_capacity = capacity;
        }
        if let Some(depth) = env_parse("AIM_ENGINE_MAX_FLOW_DEPTH")? {
            config.engine.max_flow_depth = depth;
        }
        if let Ok(environment) = env::var("AIM_ENGINE_ENVIRONMENT") {
            config.engine.environment = parse_enum("AIM_ENGINE_ENVIRONMENT", &environment)?;
        }
        if let Ok(precedence) = env::var("AIM_ENGINE_PLUGIN_PRECEDENCE") {
            config.engine.plugin_precedence = parse_enum("AIM_ENGINE_PLUGIN_PRECEDENCE", &precedence)?;
        }
        if let Ok(root) = env::var("AIM_CONTENT_ROOT") {
            config.content.root = PathBuf::from(root);
        }
        Ok(())
    }

    /// Apply builder overrides (highest priority)
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(timeout) = self.timeout_secs {
            config.engine.timeout_secs = Some(timeout);
        }
        if let Some(root) = &self.content_root {
            config.content.root = root.clone();
        }
        if let Some(environment) = self.environment {
            config.engine.environment = environment;
        }
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid {}={:?}: {}", name, raw, e)),
        Err(_) => Ok(None),
    }
}

/// Parse a lowercase enum value the way the config file spells it
fn parse_enum<T: serde::de::DeserializeOwned>(name: &str, raw: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase()))
        .with_context(|| format!("Invalid {}={:?}", name, raw))
}
