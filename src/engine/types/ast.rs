//! Document AST node types
//!
//! Mirrors the JSON the external Markdoc-compatible compiler emits. The
//! engine never parses markup; it only deserializes these trees.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/* ===================== Document ===================== */

/// A compiled document: ordered root nodes plus frontmatter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub frontmatter: Frontmatter,
}

impl Document {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            frontmatter: Frontmatter::default(),
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<InputParam>) -> Self {
        self.frontmatter.input = inputs;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frontmatter {
    /// Declared input parameters
    #[serde(default)]
    pub input: Vec<InputParam>,
}

/// One declared frontmatter input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputParam {
    pub name: String,

    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub schema: InputSchema,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}

fn default_param_type() -> String {
    "string".to_string()
}

impl InputParam {
    pub fn new(name: impl Into<String>, param_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: None,
            schema: InputSchema::default(),
        }
    }

    pub fn with_default(mut self, value: JsonValue) -> Self {
        self.schema.default = Some(value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/* ===================== Nodes ===================== */

/// Document tree element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Tag {
        name: String,
        #[serde(default)]
        attributes: BTreeMap<String, Expression>,
        #[serde(default)]
        children: Vec<Node>,
    },
    Text {
        content: Expression,
    },
    Comment {
        #[serde(default)]
        content: String,
    },
}

impl Node {
    pub fn tag(name: impl Into<String>) -> Self {
        Node::Tag {
            name: name.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Node::Text {
            content: Expression::Literal(JsonValue::String(content.into())),
        }
    }

    /// Interpolated expression, e.g. `{% $topic %}`
    pub fn expr(content: Expression) -> Self {
        Node::Text { content }
    }

    /// Builder: set an attribute (no-op for non-tag nodes)
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Expression>) -> Self {
        if let Node::Tag { attributes, .. } = &mut self {
            attributes.insert(key.into(), value.into());
        }
        self
    }

    /// Builder: append a child (no-op for non-tag nodes)
    pub fn child(mut self, node: Node) -> Self {
        if let Node::Tag { children, .. } = &mut self {
            children.push(node);
        }
        self
    }

    pub fn children(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        if let Node::Tag { children, .. } = &mut self {
            children.extend(nodes);
        }
        self
    }

    pub fn tag_name(&self) -> Option<&str> {
        match self {
            Node::Tag { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&Expression> {
        match self {
            Node::Tag { attributes, .. } => attributes.get(key),
            _ => None,
        }
    }

    pub fn child_nodes(&self) -> &[Node] {
        match self {
            Node::Tag { children, .. } => children,
            _ => &[],
        }
    }
}

/* ===================== Expressions ===================== */

/// Attribute or interpolation value
///
/// Serialized as Markdoc does: deferred values carry a `$$mdtype` marker,
/// everything else is plain JSON (arrays and objects may nest deferred
/// values).
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(JsonValue),
    Variable { path: Vec<String> },
    Function { name: String, parameters: Vec<Expression> },
    Array(Vec<Expression>),
    Object(BTreeMap<String, Expression>),
}

const MDTYPE: &str = "$$mdtype";

impl Expression {
    /// `$a.b.c`
    pub fn var(path: &str) -> Self {
        Expression::Variable {
            path: path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn call(name: impl Into<String>, parameters: impl IntoIterator<Item = Expression>) -> Self {
        Expression::Function {
            name: name.into(),
            parameters: parameters.into_iter().collect(),
        }
    }

    pub fn lit(value: impl Into<JsonValue>) -> Self {
        Expression::Literal(value.into())
    }

    /// True if resolving this expression never touches state
    pub fn is_literal(&self) -> bool {
        match self {
            Expression::Literal(_) => true,
            Expression::Variable { .. } | Expression::Function { .. } => false,
            Expression::Array(items) => items.iter().all(Expression::is_literal),
            Expression::Object(fields) => fields.values().all(Expression::is_literal),
        }
    }

    /// Build from plain JSON, recognizing Markdoc deferred markers
    pub fn from_json(value: JsonValue) -> Result<Self, String> {
        match value {
            JsonValue::Object(mut obj) => match obj.get(MDTYPE).and_then(|t| t.as_str()) {
                Some("Variable") => {
                    let path = match obj.remove("path") {
                        Some(JsonValue::Array(segments)) => segments
                            .into_iter()
                            .map(|s| match s {
                                JsonValue::String(s) => Ok(s),
                                JsonValue::Number(n) => Ok(n.to_string()),
                                other => Err(format!("invalid variable path segment: {}", other)),
                            })
                            .collect::<Result<Vec<_>, _>>()?,
                        Some(JsonValue::String(s)) => s.split('.').map(str::to_string).collect(),
                        _ => return Err("variable is missing 'path'".to_string()),
                    };
                    Ok(Expression::Variable { path })
                }
                Some("Function") => {
                    let name = match obj.remove("name") {
                        Some(JsonValue::String(name)) => name,
                        _ => return Err("function is missing 'name'".to_string()),
                    };
                    let parameters = match obj.remove("parameters") {
                        None | Some(JsonValue::Null) => Vec::new(),
                        Some(JsonValue::Array(items)) => items
                            .into_iter()
                            .map(Expression::from_json)
                            .collect::<Result<Vec<_>, _>>()?,
                        Some(JsonValue::Object(params)) => ordered_parameters(params)?,
                        Some(other) => {
                            return Err(format!("invalid function parameters: {}", other))
                        }
                    };
                    Ok(Expression::Function { name, parameters })
                }
                Some(other) => Err(format!("unsupported $$mdtype '{}'", other)),
                None => {
                    let fields = obj
                        .into_iter()
                        .map(|(k, v)| Expression::from_json(v).map(|e| (k, e)))
                        .collect::<Result<BTreeMap<_, _>, _>>()?;
                    if fields.values().all(Expression::is_literal) {
                        Ok(Expression::Literal(JsonValue::Object(
                            fields.into_iter().map(|(k, e)| (k, e.into_json())).collect(),
                        )))
                    } else {
                        Ok(Expression::Object(fields))
                    }
                }
            },
            JsonValue::Array(items) => {
                let items = items
                    .into_iter()
                    .map(Expression::from_json)
                    .collect::<Result<Vec<_>, _>>()?;
                if items.iter().all(Expression::is_literal) {
                    Ok(Expression::Literal(JsonValue::Array(
                        items.into_iter().map(Expression::into_json).collect(),
                    )))
                } else {
                    Ok(Expression::Array(items))
                }
            }
            literal => Ok(Expression::Literal(literal)),
        }
    }

    /// Serialize back to Markdoc-style JSON
    pub fn into_json(self) -> JsonValue {
        match self {
            Expression::Literal(v) => v,
            Expression::Variable { path } => {
                let mut obj = Map::new();
                obj.insert(MDTYPE.to_string(), JsonValue::from("Variable"));
                obj.insert(
                    "path".to_string(),
                    JsonValue::Array(path.into_iter().map(JsonValue::String).collect()),
                );
                JsonValue::Object(obj)
            }
            Expression::Function { name, parameters } => {
                let mut params = Map::new();
                for (i, p) in parameters.into_iter().enumerate() {
                    params.insert(i.to_string(), p.into_json());
                }
                let mut obj = Map::new();
                obj.insert(MDTYPE.to_string(), JsonValue::from("Function"));
                obj.insert("name".to_string(), JsonValue::String(name));
                obj.insert("parameters".to_string(), JsonValue::Object(params));
                JsonValue::Object(obj)
            }
            Expression::Array(items) => {
                JsonValue::Array(items.into_iter().map(Expression::into_json).collect())
            }
            Expression::Object(fields) => JsonValue::Object(
                fields.into_iter().map(|(k, v)| (k, v.into_json())).collect(),
            ),
        }
    }
}

/// Markdoc keys positional parameters "0", "1", ...; named ones sort after
fn ordered_parameters(params: Map<String, JsonValue>) -> Result<Vec<Expression>, String> {
    let mut entries: Vec<(Option<usize>, String, JsonValue)> = params
        .into_iter()
        .map(|(k, v)| (k.parse::<usize>().ok(), k, v))
        .collect();
    entries.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.1.cmp(&b.1),
    });
    entries
        .into_iter()
        .map(|(_, _, v)| Expression::from_json(v))
        .collect()
}

impl From<JsonValue> for Expression {
    fn from(value: JsonValue) -> Self {
        Expression::Literal(value)
    }
}

impl From<&str> for Expression {
    fn from(value: &str) -> Self {
        Expression::Literal(JsonValue::String(value.to_string()))
    }
}

impl From<String> for Expression {
    fn from(value: String) -> Self {
        Expression::Literal(JsonValue::String(value))
    }
}

impl From<i32> for Expression {
    fn from(value: i32) -> Self {
        Expression::Literal(JsonValue::from(value))
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Expression::Literal(JsonValue::from(value))
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Expression::Literal(JsonValue::from(value))
    }
}

impl From<bool> for Expression {
    fn from(value: bool) -> Self {
        Expression::Literal(JsonValue::Bool(value))
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.clone().into_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Expression::from_json(value).map_err(de::Error::custom)
    }
}
