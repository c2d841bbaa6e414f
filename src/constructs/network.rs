//! AZ-022: Virtual network with subnet fan-out and peering.

use super::resource_group::ResourceGroupRef;
use super::{default_api_version, export_all, pin_version, tags_value, Export};
use crate::core::error::ComposeResult;
use crate::core::fanout::bind_fan_out;
use crate::core::stack::Stack;
use crate::core::tree::ConstructTree;
use crate::core::types::*;
use crate::core::versions::resource_types::{SUBNET, VIRTUAL_NETWORK};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Address space used when none is given.
pub const DEFAULT_ADDRESS_SPACE: &str = "10.0.0.0/16";

/// Subnet declared when none are given.
pub const DEFAULT_SUBNET: (&str, &str) = ("default", "10.0.0.0/24");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SubnetProps {
    pub name: String,
    pub address_prefixes: Vec<String>,
}

impl SubnetProps {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address_prefixes: vec![prefix.into()],
        }
    }
}

fn default_address_space() -> Vec<String> {
    vec![DEFAULT_ADDRESS_SPACE.to_string()]
}

fn default_subnets() -> Vec<SubnetProps> {
    vec![SubnetProps::new(DEFAULT_SUBNET.0, DEFAULT_SUBNET.1)]
}

/// Virtual network properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NetworkProps {
    /// Defaults to `vnet-<id>`
    #[serde(default)]
    pub name: Option<String>,

    /// Defaults to the resource group's location
    #[serde(default)]
    pub location: Option<String>,

    #[serde(default = "default_address_space")]
    pub address_space: Vec<String>,

    #[serde(default = "default_subnets")]
    pub subnets: Vec<SubnetProps>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default)]
    pub tags: IndexMap<String, String>,
}

impl Default for NetworkProps {
    fn default() -> Self {
        Self {
            name: None,
            location: None,
            address_space: default_address_space(),
            subnets: default_subnets(),
            api_version: default_api_version(),
            tags: IndexMap::new(),
        }
    }
}

/// Per-direction peering flags. Unset flags are left to the engine default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PeerSettings {
    #[serde(default)]
    pub allow_virtual_network_access: Option<bool>,
    #[serde(default)]
    pub allow_forwarded_traffic: Option<bool>,
    #[serde(default)]
    pub allow_gateway_transit: Option<bool>,
    #[serde(default)]
    pub use_remote_gateways: Option<bool>,
}

/// Handles to a declared virtual network.
#[derive(Debug, Clone)]
pub struct Network {
    pub scope: NodeId,
    pub vnet: NodeId,
    pub subnets: IndexMap<String, NodeId>,
    resource_group: ResourceGroupRef,
}

impl Network {
    pub fn new(
        stack: &mut Stack,
        parent: NodeId,
        id: &str,
        rg: &ResourceGroupRef,
        props: &NetworkProps,
    ) -> ComposeResult<Self> {
        let tree = &mut stack.tree;
        let scope = tree.create_scope(parent, id)?;

        let name = props.name.clone().unwrap_or_else(|| format!("vnet-{}", id));
        let vnet = tree.create_node(
            scope,
            "vnet",
            NodeType::resource("azurerm_virtual_network"),
            Attributes::from([
                ("name".to_string(), Value::from(name)),
                ("location".to_string(), rg.location_or(props.location.as_ref())),
                ("resource_group_name".to_string(), rg.name.clone()),
                ("address_space".to_string(), Value::from(props.address_space.clone())),
                ("tags".to_string(), tags_value(&props.tags)),
            ]),
        )?;
        pin_version(tree, vnet, VIRTUAL_NETWORK, &props.api_version)?;

        let vnet_name = tree.reference(vnet, "name");
        let handles = bind_fan_out(
            tree,
            scope,
            &props.subnets,
            |s| s.name.clone(),
            |tree, owner, segment, subnet| {
                let node = tree.create_node(
                    owner,
                    segment,
                    NodeType::resource("azurerm_subnet"),
                    Attributes::from([
                        ("name".to_string(), Value::from(&subnet.name)),
                        ("resource_group_name".to_string(), rg.name.clone()),
                        ("virtual_network_name".to_string(), vnet_name.clone()),
                        (
                            "address_prefixes".to_string(),
                            Value::from(subnet.address_prefixes.clone()),
                        ),
                    ]),
                )?;
                pin_version(tree, node, SUBNET, &props.api_version)?;
                Ok(node)
            },
        )?;
        let subnets = props
            .subnets
            .iter()
            .map(|s| s.name.clone())
            .zip(handles)
            .collect();

        let network = Self {
            scope,
            vnet,
            subnets,
            resource_group: rg.clone(),
        };
        let exports = vec![
            Export::new("id", network.id(&stack.tree)),
            Export::new("name", network.name(&stack.tree)),
        ];
        export_all(stack, scope, exports)?;
        Ok(network)
    }

    pub fn id(&self, tree: &ConstructTree) -> Value {
        tree.reference(self.vnet, "id")
    }

    pub fn name(&self, tree: &ConstructTree) -> Value {
        tree.reference(self.vnet, "name")
    }

    pub fn subnet(&self, name: &str) -> Option<NodeId> {
        self.subnets.get(name).copied()
    }

    /// First declared subnet.
    pub fn default_subnet(&self) -> Option<NodeId> {
        self.subnets.values().next().copied()
    }

    pub fn subnet_id(&self, tree: &ConstructTree, name: &str) -> Option<Value> {
        self.subnet(name).map(|s| tree.reference(s, "id"))
    }

    /// Peer this network with `remote` in both directions.
    ///
    /// Both peerings live under `peer-<remote id>` in this network's scope
    /// and are named `<local name>to<remote name>` and the reverse.
    pub fn peer(
        &self,
        tree: &mut ConstructTree,
        remote: &Network,
        local_to_remote: &PeerSettings,
        remote_to_local: &PeerSettings,
    ) -> ComposeResult<(NodeId, NodeId)> {
        let segment = format!("peer-{}", tree.path(remote.scope).leaf());
        let scope = tree.create_scope(self.scope, &segment)?;

        let forward = peering_attributes(tree, self, remote, local_to_remote);
        let forward = tree.create_node(
            scope,
            "local_to_remote",
            NodeType::resource("azurerm_virtual_network_peering"),
            forward,
        )?;
        let reverse = peering_attributes(tree, remote, self, remote_to_local);
        let reverse = tree.create_node(
            scope,
            "remote_to_local",
            NodeType::resource("azurerm_virtual_network_peering"),
            reverse,
        )?;
        Ok((forward, reverse))
    }
}

fn peering_attributes(
    tree: &ConstructTree,
    from: &Network,
    to: &Network,
    settings: &PeerSettings,
) -> Attributes {
    Attributes::from([
        (
            "name".to_string(),
            Value::concat([from.name(tree), Value::from("to"), to.name(tree)]),
        ),
        (
            "resource_group_name".to_string(),
            from.resource_group.name.clone(),
        ),
        ("virtual_network_name".to_string(), from.name(tree)),
        ("remote_virtual_network_id".to_string(), to.id(tree)),
        (
            "allow_virtual_network_access".to_string(),
            Value::from(settings.allow_virtual_network_access),
        ),
        (
            "allow_forwarded_traffic".to_string(),
            Value::from(settings.allow_forwarded_traffic),
        ),
        (
            "allow_gateway_transit".to_string(),
            Value::from(settings.allow_gateway_transit),
        ),
        (
            "use_remote_gateways".to_string(),
            Value::from(settings.use_remote_gateways),
        ),
    ])
}
