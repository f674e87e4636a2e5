//! Rendered fragments and the sinks they are pushed into

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::errors::{EngineError, Result};
use super::events::ExecutionEvents;

/// One unit of rendered output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t", content = "v")]
pub enum Fragment {
    Text(String),
    /// Structured render-tree item produced by a tag; hosts read it off the
    /// stream, it has no text form
    Data { tag: String, value: JsonValue },
}

impl Fragment {
    pub fn text(s: impl Into<String>) -> Self {
        Fragment::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Fragment::Text(s) if s.is_empty())
    }

    /// Text form of the fragment, as it appears in rendered output
    pub fn to_text(&self) -> String {
        match self {
            Fragment::Text(s) => s.clone(),
            Fragment::Data { .. } => String::new(),
        }
    }
}

/// Concatenate the text of fragments
pub fn render_fragments(fragments: &[Fragment]) -> String {
    fragments.iter().map(Fragment::to_text).collect()
}

/// Destination for fragments produced by a walk
///
/// The top-level walk streams into a bounded channel or an observed buffer;
/// fan-out handlers give each branch an unobserved buffer and re-emit in
/// document order, so every fragment reaches `on_data` exactly once.
pub enum Sink {
    Channel {
        tx: mpsc::Sender<Fragment>,
        events: Arc<dyn ExecutionEvents>,
    },
    Buffer {
        fragments: Vec<Fragment>,
        events: Option<Arc<dyn ExecutionEvents>>,
    },
}

impl Sink {
    pub fn channel(tx: mpsc::Sender<Fragment>, events: Arc<dyn ExecutionEvents>) -> Self {
        Sink::Channel { tx, events }
    }

    pub fn buffer() -> Self {
        Sink::Buffer {
            fragments: Vec::new(),
            events: None,
        }
    }

    /// Report fragments pushed into this buffer through `events`
    ///
    /// Channel sinks already carry their events and are left as they are.
    pub fn observe(&mut self, observer: Arc<dyn ExecutionEvents>) {
        if let Sink::Buffer { events, .. } = self {
            *events = Some(observer);
        }
    }

    /// Push one fragment; empty text is dropped
    pub async fn emit(&mut self, fragment: Fragment) -> Result<()> {
        if fragment.is_empty() {
            return Ok(());
        }
        match self {
            Sink::Channel { tx, events } => {
                events.on_data(&fragment);
                tx.send(fragment).await.map_err(|_| EngineError::OutputClosed)
            }
            Sink::Buffer { fragments, events } => {
                if let Some(events) = events {
                    events.on_data(&fragment);
                }
                fragments.push(fragment);
                Ok(())
            }
        }
    }

    pub async fn emit_all(&mut self, fragments: Vec<Fragment>) -> Result<()> {
        for fragment in fragments {
            self.emit(fragment).await?;
        }
        Ok(())
    }

    /// Buffered fragments (empty for channel sinks)
    pub fn into_fragments(self) -> Vec<Fragment> {
        match self {
            Sink::Buffer { fragments, .. } => fragments,
            Sink::Channel { .. } => Vec::new(),
        }
    }
}
