//! AZ-024: Container registry.

use super::resource_group::ResourceGroupRef;
use super::{default_api_version, export_all, pin_version, tags_value, Export};
use crate::core::error::ComposeResult;
use crate::core::stack::Stack;
use crate::core::tree::ConstructTree;
use crate::core::types::*;
use crate::core::versions::resource_types::CONTAINER_REGISTRY;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// SKU that permits geo-replication.
pub const GEOREPLICATION_SKU: &str = "Premium";

fn default_sku() -> String {
    "Basic".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContainerRegistryProps {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_sku")]
    pub sku: String,
    #[serde(default)]
    pub admin_enabled: bool,
    /// Replica regions; requires the Premium SKU
    #[serde(default)]
    pub georeplication_locations: Vec<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub tags: IndexMap<String, String>,
}

impl ContainerRegistryProps {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
            sku: default_sku(),
            admin_enabled: false,
            georeplication_locations: Vec::new(),
            api_version: default_api_version(),
            tags: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerRegistry {
    pub scope: NodeId,
    pub node: NodeId,
}

impl ContainerRegistry {
    pub fn new(
        stack: &mut Stack,
        parent: NodeId,
        id: &str,
        rg: &ResourceGroupRef,
        props: &ContainerRegistryProps,
    ) -> ComposeResult<Self> {
        let tree = &mut stack.tree;
        let scope = tree.create_scope(parent, id)?;

        let georeplications = if props.georeplication_locations.is_empty() {
            Value::Null
        } else {
            Value::list(
                props
                    .georeplication_locations
                    .iter()
                    .map(|loc| Value::map([("location", loc.as_str())])),
            )
        };
        let node = tree.create_node(
            scope,
            "acr",
            NodeType::resource("azurerm_container_registry"),
            Attributes::from([
                ("name".to_string(), Value::from(&props.name)),
                ("resource_group_name".to_string(), rg.name.clone()),
                ("location".to_string(), rg.location_or(props.location.as_ref())),
                ("sku".to_string(), Value::from(&props.sku)),
                ("admin_enabled".to_string(), Value::from(props.admin_enabled)),
                ("georeplications".to_string(), georeplications),
                ("tags".to_string(), tags_value(&props.tags)),
            ]),
        )?;
        pin_version(tree, node, CONTAINER_REGISTRY, &props.api_version)?;

        let registry = Self { scope, node };
        let exports = vec![
            Export::new("id", registry.id(&stack.tree)),
            Export::new("name", stack.tree.reference(node, "name")),
            Export::new("login_server", registry.login_server(&stack.tree)),
        ];
        export_all(stack, scope, exports)?;
        Ok(registry)
    }

    pub fn id(&self, tree: &ConstructTree) -> Value {
        tree.reference(self.node, "id")
    }

    pub fn login_server(&self, tree: &ConstructTree) -> Value {
        tree.reference(self.node, "login_server")
    }
}
