//! Composition units. Each one declares a scope and the resource nodes
//! beneath it, and exports its public attributes as outputs.

pub mod app_insights;
pub mod network;
pub mod rbac;
pub mod registry;
pub mod resource_group;
pub mod storage;
pub mod virtual_machine;

pub use app_insights::{AppInsights, AppInsightsProps};
pub use network::{Network, NetworkProps, PeerSettings, SubnetProps};
pub use registry::{ContainerRegistry, ContainerRegistryProps};
pub use resource_group::{ResourceGroup, ResourceGroupProps, ResourceGroupRef};
pub use storage::{
    AclEntry, BlobProps, ContainerProps, FileShareProps, NetworkRulesProps, QueueProps,
    StorageAccount, StorageAccountProps, TableProps,
};
pub use virtual_machine::{ImageReference, OsType, VirtualMachine, VirtualMachineProps};

use crate::core::context::StackContext;
use crate::core::error::{ComposeError, ComposeResult};
use crate::core::outputs::OutputRegistry;
use crate::core::parser::StackFile;
use crate::core::stack::Stack;
use crate::core::tree::ConstructTree;
use crate::core::types::{NodeId, Value};
use crate::core::versions::{resolve_version, LATEST};
use indexmap::IndexMap;
use tracing::debug;

/// Default region for units that are not placed explicitly.
pub const DEFAULT_LOCATION: &str = "eastus";

pub(crate) fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

pub(crate) fn default_api_version() -> String {
    LATEST.to_string()
}

pub(crate) fn default_true() -> bool {
    true
}

/// Tag map as an attribute value. An empty map is omitted.
pub(crate) fn tags_value(tags: &IndexMap<String, String>) -> Value {
    if tags.is_empty() {
        Value::Null
    } else {
        Value::from(tags)
    }
}

/// Resolve `requested` against the registry and pin it on `node`.
pub(crate) fn pin_version(
    tree: &mut ConstructTree,
    node: NodeId,
    resource_type: &str,
    requested: &str,
) -> ComposeResult<()> {
    let version = resolve_version(resource_type, requested)?;
    debug!(
        "{} pinned to {} {}",
        tree.path(node),
        resource_type,
        version.resolved
    );
    tree.set_api_version(node, version);
    Ok(())
}

/// One exported attribute of a unit.
pub(crate) struct Export {
    pub attribute: &'static str,
    pub value: Value,
    pub sensitive: bool,
}

impl Export {
    pub fn new(attribute: &'static str, value: Value) -> Self {
        Self {
            attribute,
            value,
            sensitive: false,
        }
    }

    pub fn sensitive(attribute: &'static str, value: Value) -> Self {
        Self {
            attribute,
            value,
            sensitive: true,
        }
    }
}

/// Register the exports of the unit at `scope`.
pub(crate) fn export_all(stack: &mut Stack, scope: NodeId, exports: Vec<Export>) -> ComposeResult<()> {
    let path = stack.tree.path(scope).clone();
    for e in exports {
        stack.outputs.export(&path, e.attribute, e.value, e.sensitive)?;
    }
    Ok(())
}

// ============================================================================
// Stack file → stack
// ============================================================================

/// Build a stack from a parsed stack file.
///
/// Units are declared in file order, section by section. Cross references
/// (`resource_group`, `network`, `peer_with`) must name units declared in
/// an earlier section or earlier in the same section.
pub fn build_stack(file: &StackFile, context: StackContext) -> ComposeResult<Stack> {
    let mut stack = Stack::new(&file.name, context)?;
    stack.outputs = OutputRegistry::with_naming(file.output_naming);
    let root = stack.root();

    let mut groups: IndexMap<&str, ResourceGroupRef> = IndexMap::new();
    for decl in &file.resource_groups {
        let rg = ResourceGroup::new(&mut stack, root, &decl.id, &decl.props)?;
        groups.insert(decl.id.as_str(), rg.reference(&stack.tree));
    }
    let group = |id: &str| {
        groups
            .get(id)
            .cloned()
            .ok_or_else(|| ComposeError::StackFile(format!("unknown resource group '{}'", id)))
    };

    let mut networks: IndexMap<&str, Network> = IndexMap::new();
    for decl in &file.networks {
        let rg = group(&decl.resource_group)?;
        let net = Network::new(&mut stack, root, &decl.id, &rg, &decl.props)?;
        networks.insert(decl.id.as_str(), net);
    }
    for decl in &file.networks {
        for peer in &decl.peer_with {
            let (Some(local), Some(remote)) = (networks.get(decl.id.as_str()), networks.get(peer.as_str()))
            else {
                return Err(ComposeError::StackFile(format!(
                    "network '{}' peers with unknown network '{}'",
                    decl.id, peer
                )));
            };
            local.peer(&mut stack.tree, remote, &decl.peer_settings, &decl.peer_settings)?;
        }
    }

    for decl in &file.storage_accounts {
        let rg = group(&decl.resource_group)?;
        StorageAccount::new(&mut stack, root, &decl.id, &rg, &decl.props)?;
    }
    for decl in &file.container_registries {
        let rg = group(&decl.resource_group)?;
        ContainerRegistry::new(&mut stack, root, &decl.id, &rg, &decl.props)?;
    }
    for decl in &file.virtual_machines {
        let rg = group(&decl.resource_group)?;
        let network = match &decl.network {
            Some(id) => Some(networks.get(id.as_str()).ok_or_else(|| {
                ComposeError::StackFile(format!(
                    "virtual machine '{}' references unknown network '{}'",
                    decl.id, id
                ))
            })?),
            None => None,
        };
        VirtualMachine::new(&mut stack, root, &decl.id, &rg, network, &decl.props)?;
    }
    for decl in &file.app_insights {
        let rg = group(&decl.resource_group)?;
        AppInsights::new(&mut stack, root, &decl.id, &rg, &decl.props)?;
    }

    debug!(
        "built stack {} with {} node(s)",
        stack.name(),
        stack.tree.node_count()
    );
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_stack;
    use crate::core::outputs::OutputNaming;
    use serde_json::json;

    const FULL: &str = r#"
version: "1.0"
name: demo
context:
  tenant_id: 00000000-0000-0000-0000-000000000001
  subscription_id: sub-1
resource_groups:
  - id: core
    name: rg-demo
    location: westeurope
    tags: { env: dev }
    rbac:
      bbbb: Reader
      aaaa: Contributor
networks:
  - id: hub
    resource_group: core
    address_space: ["10.0.0.0/16"]
    subnets:
      - { name: subnet2, address_prefixes: ["10.0.2.0/24"] }
      - { name: subnet1, address_prefixes: ["10.0.1.0/24"] }
  - id: spoke
    resource_group: core
    name: vnet-spoke
    address_space: ["10.1.0.0/16"]
    subnets:
      - { name: default, address_prefixes: ["10.1.0.0/24"] }
    peer_with: [hub]
storage_accounts:
  - id: data
    resource_group: core
    name: stdemo001
    containers:
      - name: assets
        blobs:
          - { name: readme.txt, source: ./README.md }
    file_shares: [{ name: docs, quota: 100 }]
    queues: [{ name: jobs }]
    tables: [{ name: events }]
    network_rules: { bypass: [AzureServices], ip_rules: ["1.2.3.4/32"] }
container_registries:
  - id: acr
    resource_group: core
    name: acrdemo
    sku: Premium
    georeplication_locations: [northeurope]
virtual_machines:
  - id: jump
    resource_group: core
    network: hub
    subnet: subnet1
    admin_username: ops
    ssh_public_key: ssh-ed25519 AAAA
    public_ip: true
  - id: build
    resource_group: core
    os_type: windows
    admin_password: "P@ssw0rd-1234"
app_insights:
  - id: telemetry
    resource_group: core
    name: appi-demo
"#;

    fn build(yaml: &str) -> ComposeResult<Stack> {
        let file = parse_stack(yaml)?;
        build_stack(&file, file.context.apply(StackContext::placeholder()))
    }

    #[test]
    fn test_az013_full_file_builds_and_synthesizes() {
        let stack = build(FULL).unwrap();
        let doc = stack.synthesize().unwrap();
        assert_eq!(doc.stack, "demo");
        assert_eq!(doc.metadata.subscription_id.as_deref(), Some("sub-1"));

        let types: Vec<&str> = doc.resources.iter().map(|r| r.resource_type.as_str()).collect();
        for expected in [
            "azurerm_resource_group",
            "azurerm_client_config",
            "azurerm_role_assignment",
            "azurerm_virtual_network",
            "azurerm_subnet",
            "azurerm_virtual_network_peering",
            "azurerm_storage_account",
            "azurerm_storage_container",
            "azurerm_storage_blob",
            "azurerm_container_registry",
            "azurerm_public_ip",
            "azurerm_network_interface",
            "azurerm_linux_virtual_machine",
            "azurerm_windows_virtual_machine",
            "azurerm_storage_share",
            "azurerm_storage_queue",
            "azurerm_storage_table",
            "azurerm_storage_account_network_rules",
            "azurerm_application_insights",
        ] {
            assert!(types.contains(&expected), "missing {}", expected);
        }
        let rg = doc.resource("demo/core/rg").unwrap();
        assert_eq!(rg.attributes["location"], json!("westeurope"));
        let share = doc.resource("demo/data/docs").unwrap();
        assert_eq!(share.attributes["quota"], json!(100));
        let windows = doc.resource("demo/build/vm").unwrap();
        assert_eq!(windows.attributes["location"], json!("westeurope"));
    }

    #[test]
    fn test_az013_full_file_validates() {
        let file = parse_stack(FULL).unwrap();
        let errors: Vec<String> = crate::core::parser::validate_stack(&file)
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn test_az013_rbac_sorted_by_principal() {
        let doc = build(FULL).unwrap().synthesize().unwrap();
        let principals: Vec<&serde_json::Value> = doc
            .resources
            .iter()
            .filter(|r| r.resource_type == "azurerm_role_assignment")
            .map(|r| &r.attributes["principal_id"])
            .collect();
        assert_eq!(principals, vec![&json!("aaaa"), &json!("bbbb")]);
    }

    #[test]
    fn test_az013_build_is_deterministic() {
        let a = build(FULL).unwrap().synthesize().unwrap();
        let b = build(FULL).unwrap().synthesize().unwrap();
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
        assert_eq!(a.to_engine_json().unwrap(), b.to_engine_json().unwrap());
    }

    #[test]
    fn test_az013_unknown_resource_group() {
        let yaml = r#"
version: "1.0"
name: demo
networks:
  - id: hub
    resource_group: nope
"#;
        assert!(matches!(build(yaml), Err(ComposeError::StackFile(_))));
    }

    #[test]
    fn test_az013_bare_output_names_collide() {
        let yaml = r#"
version: "1.0"
name: demo
output_naming: bare
resource_groups:
  - { id: a, name: rg-a }
  - { id: b, name: rg-b }
"#;
        let stack = build(yaml).unwrap();
        assert_eq!(stack.outputs.naming(), OutputNaming::Bare);
        assert!(matches!(
            stack.synthesize(),
            Err(ComposeError::DuplicateOutput(lid)) if lid == "id"
        ));
    }

    #[test]
    fn test_az013_tags_value() {
        assert_eq!(tags_value(&IndexMap::new()), Value::Null);
        let mut tags = IndexMap::new();
        tags.insert("env".to_string(), "dev".to_string());
        assert_eq!(tags_value(&tags), Value::map([("env", "dev")]));
    }
}
