//! AZ-020: Resource group with optional role assignments.

use super::rbac::bind_role_assignments;
use super::{default_api_version, default_location, export_all, pin_version, tags_value, Export};
use crate::core::error::ComposeResult;
use crate::core::stack::Stack;
use crate::core::tree::ConstructTree;
use crate::core::types::*;
use crate::core::versions::resource_types::RESOURCE_GROUP;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Resource group properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceGroupProps {
    pub name: String,

    #[serde(default = "default_location")]
    pub location: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default)]
    pub tags: IndexMap<String, String>,

    /// Attributes the provisioning engine should not reconcile
    #[serde(default)]
    pub ignore_changes: Vec<String>,

    /// Principal object id → role name, assigned at resource group scope
    #[serde(default)]
    pub rbac: IndexMap<String, String>,
}

impl ResourceGroupProps {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            api_version: default_api_version(),
            tags: IndexMap::new(),
            ignore_changes: Vec::new(),
            rbac: IndexMap::new(),
        }
    }
}

/// Where dependent units are placed: a resource group's name and location,
/// as literals or tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceGroupRef {
    pub name: Value,
    pub location: Value,
}

impl ResourceGroupRef {
    /// A resource group managed outside this stack.
    pub fn existing(name: &str, location: &str) -> Self {
        Self {
            name: Value::from(name),
            location: Value::from(location),
        }
    }

    /// `location` if given, else the group's location.
    pub(crate) fn location_or(&self, location: Option<&String>) -> Value {
        location.map_or_else(|| self.location.clone(), Value::from)
    }
}

/// Handles to a declared resource group.
#[derive(Debug, Clone)]
pub struct ResourceGroup {
    pub scope: NodeId,
    pub node: NodeId,
    pub client_config: NodeId,
    pub role_assignments: Vec<NodeId>,
}

impl ResourceGroup {
    pub fn new(
        stack: &mut Stack,
        parent: NodeId,
        id: &str,
        props: &ResourceGroupProps,
    ) -> ComposeResult<Self> {
        let tree = &mut stack.tree;
        let scope = tree.create_scope(parent, id)?;

        let mut attributes = Attributes::new();
        attributes.insert("name".into(), Value::from(&props.name));
        attributes.insert("location".into(), Value::from(&props.location));
        attributes.insert("tags".into(), tags_value(&props.tags));
        if !props.ignore_changes.is_empty() {
            attributes.insert(
                "lifecycle".into(),
                Value::map([("ignore_changes", Value::from(props.ignore_changes.clone()))]),
            );
        }
        let node = tree.create_node(
            scope,
            "rg",
            NodeType::resource("azurerm_resource_group"),
            attributes,
        )?;
        pin_version(tree, node, RESOURCE_GROUP, &props.api_version)?;

        let client_config = tree.create_node(
            scope,
            "client_config",
            NodeType::data("azurerm_client_config"),
            Attributes::new(),
        )?;

        let role_assignments = if props.rbac.is_empty() {
            Vec::new()
        } else {
            let rbac = tree.create_scope(scope, "rbac")?;
            let rg_id = tree.reference(node, "id");
            bind_role_assignments(tree, rbac, &rg_id, &props.rbac)?
        };

        let rg = Self {
            scope,
            node,
            client_config,
            role_assignments,
        };
        let exports = vec![
            Export::new("id", rg.id(&stack.tree)),
            Export::new("name", rg.name(&stack.tree)),
            Export::new("location", rg.location(&stack.tree)),
            Export::new("subscription_id", rg.subscription_id(&stack.tree)),
        ];
        export_all(stack, scope, exports)?;
        Ok(rg)
    }

    pub fn id(&self, tree: &ConstructTree) -> Value {
        tree.reference(self.node, "id")
    }

    pub fn name(&self, tree: &ConstructTree) -> Value {
        tree.reference(self.node, "name")
    }

    pub fn location(&self, tree: &ConstructTree) -> Value {
        tree.reference(self.node, "location")
    }

    /// Subscription the group is deployed into, known at provisioning time.
    pub fn subscription_id(&self, tree: &ConstructTree) -> Value {
        tree.reference(self.client_config, "subscription_id")
    }

    /// Placement handle for units declared inside this group.
    pub fn reference(&self, tree: &ConstructTree) -> ResourceGroupRef {
        ResourceGroupRef {
            name: self.name(tree),
            location: self.location(tree),
        }
    }
}
