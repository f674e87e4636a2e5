//! Tag registry and plugins
//!
//! Built-ins are registered first, then plugins in order. When names
//! collide, `PluginPrecedence` decides who keeps the name.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

use super::tags::{self, TagHandler};

/// Who wins when a plugin registers an existing tag name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginPrecedence {
    /// The most recent registration replaces earlier ones, built-ins included
    #[default]
    LastRegisteredWins,
    /// Built-ins are never replaced; among plugins the first one wins
    BuiltinsFirst,
}

/// A named bundle of tag handlers
#[derive(Clone)]
pub struct Plugin {
    pub name: String,
    pub version: String,
    pub tags: BTreeMap<String, Arc<dyn TagHandler>>,
}

impl Plugin {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn tag(mut self, name: impl Into<String>, handler: Arc<dyn TagHandler>) -> Self {
        self.tags.insert(name.into(), handler);
        self
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("tags", &self.tags.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Clone)]
struct Registration {
    handler: Arc<dyn TagHandler>,
    /// `None` for built-ins
    plugin: Option<String>,
}

/// Tag name to handler, resolved once at engine build time
#[derive(Clone, Default)]
pub struct TagRegistry {
    tags: HashMap<String, Registration>,
}

impl TagRegistry {
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        for (name, handler) in tags::builtins() {
            registry.tags.insert(
                name,
                Registration {
                    handler,
                    plugin: None,
                },
            );
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TagHandler>> {
        self.tags.get(name).map(|r| r.handler.clone())
    }

    /// Plugin that provided `name`, `None` for built-ins or unknown tags
    pub fn provider(&self, name: &str) -> Option<&str> {
        self.tags.get(name)?.plugin.as_deref()
    }

    /// Registered tag names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tags.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    pub fn register_plugins(&mut self, plugins: &[Plugin], precedence: PluginPrecedence) {
        for plugin in plugins {
            for (name, handler) in &plugin.tags {
                self.register_plugin_tag(plugin, name, handler.clone(), precedence);
            }
        }
    }

    fn register_plugin_tag(
        &mut self,
        plugin: &Plugin,
        name: &str,
        handler: Arc<dyn TagHandler>,
        precedence: PluginPrecedence,
    ) {
        let registration = Registration {
            handler,
            plugin: Some(plugin.name.clone()),
        };
        let Some(existing) = self.tags.get(name) else {
            self.tags.insert(name.to_string(), registration);
            return;
        };

        let previous = existing.plugin.as_deref().unwrap_or("builtin").to_string();
        match precedence {
            PluginPrecedence::LastRegisteredWins => {
                warn!(
                    tag = name,
                    plugin = %plugin.name,
                    shadowed = %previous,
                    "plugin tag shadows an existing tag"
                );
                self.tags.insert(name.to_string(), registration);
            }
            PluginPrecedence::BuiltinsFirst => {
                warn!(
                    tag = name,
                    plugin = %plugin.name,
                    kept = %previous,
                    "plugin tag ignored, name already registered"
                );
            }
        }
    }
}

impl std::fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagRegistry")
            .field("tags", &self.names())
            .finish()
    }
}
