//! AZ-002: Construct tree, the exclusive owner of resource nodes.
//!
//! Nodes live in an arena and are addressed by `NodeId`. `create_node` is
//! the only structural mutation: it appends a child in call order, and that
//! order is the emission order of the synthesized document.

use super::context::StackContext;
use super::error::{ComposeError, ComposeResult};
use super::types::*;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Ownership hierarchy of resource nodes rooted at a stack.
#[derive(Debug, Clone)]
pub struct ConstructTree {
    nodes: Vec<ResourceNode>,
    index: FxHashMap<NodePath, NodeId>,
    context: StackContext,
}

impl ConstructTree {
    /// Create a tree whose root is a scope named after the stack.
    pub fn new(stack_name: &str, context: StackContext) -> ComposeResult<Self> {
        validate_segment("", stack_name)?;
        let path = NodePath::root(stack_name);
        let root = ResourceNode {
            path: path.clone(),
            node_type: NodeType::Scope,
            attributes: Attributes::new(),
            children: Vec::new(),
            api_version: None,
        };
        let mut index = FxHashMap::default();
        index.insert(path, NodeId(0));
        Ok(Self {
            nodes: vec![root],
            index,
            context,
        })
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn stack_name(&self) -> &str {
        self.nodes[0].path.leaf()
    }

    pub fn context(&self) -> &StackContext {
        &self.context
    }

    /// Declare a node under `parent`.
    pub fn create_node(
        &mut self,
        parent: NodeId,
        segment: &str,
        node_type: NodeType,
        attributes: Attributes,
    ) -> ComposeResult<NodeId> {
        let parent_path = self.node(parent).path.clone();
        validate_segment(&parent_path.to_string(), segment)?;

        let path = parent_path.child(segment);
        if self.index.contains_key(&path) {
            return Err(ComposeError::DuplicateIdentifier {
                parent: parent_path.to_string(),
                segment: segment.to_string(),
            });
        }

        let id = NodeId(self.nodes.len());
        debug!("declare {} ({})", path, node_type);
        self.nodes.push(ResourceNode {
            path: path.clone(),
            node_type,
            attributes,
            children: Vec::new(),
            api_version: None,
        });
        self.index.insert(path, id);
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Declare a composition scope under `parent`.
    pub fn create_scope(&mut self, parent: NodeId, segment: &str) -> ComposeResult<NodeId> {
        self.create_node(parent, segment, NodeType::Scope, Attributes::new())
    }

    /// Set (or replace) an attribute after creation.
    pub fn set_attribute(&mut self, id: NodeId, name: impl Into<String>, value: impl Into<Value>) {
        self.nodes[id.0].attributes.insert(name.into(), value.into());
    }

    /// Record the resolved API version for a node.
    pub fn set_api_version(&mut self, id: NodeId, version: VersionDescriptor) {
        self.nodes[id.0].api_version = Some(version);
    }

    /// Borrow a node. Panics if `id` belongs to another tree.
    pub fn node(&self, id: NodeId) -> &ResourceNode {
        &self.nodes[id.0]
    }

    pub fn path(&self, id: NodeId) -> &NodePath {
        &self.nodes[id.0].path
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&Value> {
        self.nodes[id.0].attributes.get(name)
    }

    pub fn find(&self, path: &NodePath) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    /// Reference token for `attribute` of the node `id`.
    pub fn reference(&self, id: NodeId, attribute: &str) -> Value {
        Value::Ref(Reference::new(self.path(id).clone(), attribute))
    }

    /// Pre-order traversal: parents before children, children in
    /// registration order.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }

    /// Number of nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Identifier segments must be non-empty and free of the path separator.
pub(crate) fn validate_segment(parent: &str, segment: &str) -> ComposeResult<()> {
    let reason = if segment.is_empty() {
        "identifier must not be empty"
    } else if segment.contains(PATH_SEPARATOR) {
        "identifier must not contain '/'"
    } else {
        return Ok(());
    };
    Err(ComposeError::InvalidIdentifier {
        parent: parent.to_string(),
        segment: segment.to_string(),
        reason: reason.to_string(),
    })
}
