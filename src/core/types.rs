//! AZ-001: Core types for paths, references, values and nodes.
//!
//! Attribute values are either literals or deferred references to another
//! node's attribute. Nothing here resolves anything; resolution happens once
//! the whole tree exists (see `resolver`).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Separator between identifier segments when a path is rendered.
pub const PATH_SEPARATOR: char = '/';

// ============================================================================
// Paths
// ============================================================================

/// Ordered identifier segments from the stack root down to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(Vec<String>);

impl NodePath {
    /// Path of a stack root.
    pub fn root(stack: impl Into<String>) -> Self {
        Self(vec![stack.into()])
    }

    /// Parse a rendered path (`stack/rg/rg`).
    pub fn parse(rendered: &str) -> Self {
        Self(
            rendered
                .split(PATH_SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Path of a child of this node.
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment (the node's own identifier).
    pub fn leaf(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl Serialize for NodePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ============================================================================
// Reference tokens
// ============================================================================

/// Deferred value: the eventual value of `attribute` on the node at `source`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub source: NodePath,
    pub attribute: String,
}

impl Reference {
    pub fn new(source: NodePath, attribute: impl Into<String>) -> Self {
        Self {
            source,
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.source, self.attribute)
    }
}

// ============================================================================
// Attribute values
// ============================================================================

/// An attribute value: a literal, a reference token, or a composite that
/// may embed tokens at any depth.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// Deferred reference to another node's attribute
    Ref(Reference),
    /// Parts joined into one string once every part is resolved
    Concat(Vec<Value>),
}

/// Attribute map of a node. Insertion order is emission order.
pub type Attributes = IndexMap<String, Value>;

impl Value {
    /// Build a list value.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Build a map value, keeping the given key order.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a string concatenation.
    pub fn concat<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::Concat(parts.into_iter().map(Into::into).collect())
    }

    /// Every reference token embedded in this value, depth-first.
    pub fn references(&self) -> Vec<&Reference> {
        let mut found = Vec::new();
        collect_references(self, &mut found);
        found
    }

    /// True when the value carries no reference tokens.
    pub fn is_literal(&self) -> bool {
        self.references().is_empty()
    }
}

fn collect_references<'a>(value: &'a Value, found: &mut Vec<&'a Reference>) {
    match value {
        Value::Ref(r) => found.push(r),
        Value::List(items) | Value::Concat(items) => {
            for item in items {
                collect_references(item, found);
            }
        }
        Value::Map(entries) => {
            for item in entries.values() {
                collect_references(item, found);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n).map_or(Self::Null, Self::Number)
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Self::Ref(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Self::list(items)
    }
}

impl From<&IndexMap<String, String>> for Value {
    fn from(entries: &IndexMap<String, String>) -> Self {
        Self::map(entries.iter().map(|(k, v)| (k.clone(), v.clone())))
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// Handle to a node inside one `ConstructTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Type tag distinguishing node variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Composition unit; groups children and emits nothing itself
    Scope,
    /// Managed resource block of the given provider type
    Resource(String),
    /// Data source block of the given provider type
    Data(String),
}

impl NodeType {
    pub fn resource(provider_type: impl Into<String>) -> Self {
        Self::Resource(provider_type.into())
    }

    pub fn data(provider_type: impl Into<String>) -> Self {
        Self::Data(provider_type.into())
    }

    /// Provider type name, if this node is emitted.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Self::Scope => None,
            Self::Resource(t) | Self::Data(t) => Some(t),
        }
    }

    pub fn is_emitted(&self) -> bool {
        !matches!(self, Self::Scope)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scope => write!(f, "scope"),
            Self::Resource(t) => write!(f, "resource:{}", t),
            Self::Data(t) => write!(f, "data:{}", t),
        }
    }
}

/// Requested and resolved API version of a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDescriptor {
    pub resource_type: String,
    pub requested: String,
    pub resolved: String,
}

/// A single declared infrastructure unit.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    pub(crate) path: NodePath,
    pub(crate) node_type: NodeType,
    pub(crate) attributes: Attributes,
    pub(crate) children: Vec<NodeId>,
    pub(crate) api_version: Option<VersionDescriptor>,
}

impl ResourceNode {
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn api_version(&self) -> Option<&VersionDescriptor> {
        self.api_version.as_ref()
    }
}

// ============================================================================
// Tests
// ============================================================================
