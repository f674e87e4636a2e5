//! Type definitions for the engine
//!
//! - AST nodes and expressions (Document, Node, Expression)
//! - Runtime value helpers (truthiness, rendering)

pub mod ast;
pub mod values;

pub use ast::{Document, Expression, Frontmatter, InputParam, InputSchema, Node};
pub use values::{is_truthy, to_text};
