//! AZ-011: Stack file parsing and validation.
//!
//! Parses stack.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Unit ids must be valid identifiers and unique across the file
//! - `resource_group`, `network` and `peer_with` must name declared units
//! - Per-unit checks (role names, SKUs, API versions, child names)

use super::context::{RolePolicy, StackContext};
use super::error::ComposeResult;
use super::outputs::OutputNaming;
use super::tree::validate_segment;
use super::versions::{is_supported, resource_types};
use crate::constructs::network::PeerSettings;
use crate::constructs::rbac::is_known_role;
use crate::constructs::registry::GEOREPLICATION_SKU;
use crate::constructs::virtual_machine::OsType;
use crate::constructs::{
    AppInsightsProps, ContainerRegistryProps, NetworkProps, ResourceGroupProps,
    StorageAccountProps, VirtualMachineProps,
};
use indexmap::IndexSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Supported stack file schema version.
pub const STACK_FILE_VERSION: &str = "1.0";

/// Context values pinned by the stack file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContextConfig {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub role_policy: Option<RolePolicy>,
}

impl ContextConfig {
    /// Overlay the pinned values on `base`.
    pub fn apply(&self, base: StackContext) -> StackContext {
        let mut context = base;
        if let Some(tenant) = &self.tenant_id {
            context = context.with_tenant_id(tenant);
        }
        if let Some(subscription) = &self.subscription_id {
            context = context.with_subscription_id(subscription);
        }
        if let Some(policy) = self.role_policy {
            context = context.with_role_policy(policy);
        }
        context
    }

    /// Role policy in effect for validation.
    pub fn effective_role_policy(&self) -> RolePolicy {
        self.role_policy.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceGroupDecl {
    pub id: String,
    #[serde(flatten)]
    pub props: ResourceGroupProps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NetworkDecl {
    pub id: String,
    pub resource_group: String,
    /// Networks to peer with, in both directions
    #[serde(default)]
    pub peer_with: Vec<String>,
    #[serde(default)]
    pub peer_settings: PeerSettings,
    #[serde(flatten)]
    pub props: NetworkProps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StorageAccountDecl {
    pub id: String,
    pub resource_group: String,
    #[serde(flatten)]
    pub props: StorageAccountProps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContainerRegistryDecl {
    pub id: String,
    pub resource_group: String,
    #[serde(flatten)]
    pub props: ContainerRegistryProps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VirtualMachineDecl {
    pub id: String,
    pub resource_group: String,
    /// Network to attach to; a dedicated one is created when absent
    #[serde(default)]
    pub network: Option<String>,
    #[serde(flatten)]
    pub props: VirtualMachineProps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AppInsightsDecl {
    pub id: String,
    pub resource_group: String,
    #[serde(flatten)]
    pub props: AppInsightsProps,
}

/// Root of a stack.yaml file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StackFile {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub output_naming: OutputNaming,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub resource_groups: Vec<ResourceGroupDecl>,
    #[serde(default)]
    pub networks: Vec<NetworkDecl>,
    #[serde(default)]
    pub storage_accounts: Vec<StorageAccountDecl>,
    #[serde(default)]
    pub container_registries: Vec<ContainerRegistryDecl>,
    #[serde(default)]
    pub virtual_machines: Vec<VirtualMachineDecl>,
    #[serde(default)]
    pub app_insights: Vec<AppInsightsDecl>,
}

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a stack.yaml file from disk.
pub fn parse_stack_file(path: &Path) -> ComposeResult<StackFile> {
    let content = std::fs::read_to_string(path)?;
    parse_stack(&content)
}

/// Parse a stack.yaml from a string.
pub fn parse_stack(yaml: &str) -> ComposeResult<StackFile> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

/// JSON Schema of the stack file.
pub fn stack_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(StackFile)
}

struct Errors(Vec<ValidationError>);

impl Errors {
    fn push(&mut self, message: String) {
        self.0.push(ValidationError { message });
    }

    fn version(&mut self, unit: &str, resource_type: &str, requested: &str) {
        if !is_supported(resource_type, requested) {
            self.push(format!(
                "{} has unsupported api_version '{}' for {}",
                unit, requested, resource_type
            ));
        }
    }

    fn unique_names<'a, I>(&mut self, unit: &str, kind: &str, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        for name in names {
            if let Err(e) = validate_segment(unit, name) {
                self.push(format!("{} {}", kind, e));
            } else if !seen.insert(name) {
                self.push(format!("{} has duplicate {} '{}'", unit, kind, name));
            }
        }
    }
}

/// Validate a parsed stack file. Returns a list of errors (empty = valid).
pub fn validate_stack(file: &StackFile) -> Vec<ValidationError> {
    let mut errors = Errors(Vec::new());

    if file.version != STACK_FILE_VERSION {
        errors.push(format!(
            "version must be \"{}\", got \"{}\"",
            STACK_FILE_VERSION, file.version
        ));
    }
    if let Err(e) = validate_segment("", &file.name) {
        errors.push(format!("name: {}", e));
    }

    // Unit ids share one namespace under the stack root
    let mut ids = HashSet::new();
    let all_ids = file
        .resource_groups
        .iter()
        .map(|d| d.id.as_str())
        .chain(file.networks.iter().map(|d| d.id.as_str()))
        .chain(file.storage_accounts.iter().map(|d| d.id.as_str()))
        .chain(file.container_registries.iter().map(|d| d.id.as_str()))
        .chain(file.virtual_machines.iter().map(|d| d.id.as_str()))
        .chain(file.app_insights.iter().map(|d| d.id.as_str()));
    for id in all_ids {
        if let Err(e) = validate_segment(&file.name, id) {
            errors.push(e.to_string());
        } else if !ids.insert(id) {
            errors.push(format!("duplicate unit id '{}'", id));
        }
    }

    let groups: HashSet<&str> = file.resource_groups.iter().map(|d| d.id.as_str()).collect();
    let check_group = |errors: &mut Errors, unit: &str, rg: &str| {
        if !groups.contains(rg) {
            errors.push(format!("'{}' references unknown resource group '{}'", unit, rg));
        }
    };

    let policy = file.context.effective_role_policy();
    for rg in &file.resource_groups {
        let unit = format!("resource group '{}'", rg.id);
        if rg.props.name.is_empty() {
            errors.push(format!("{} has no name", unit));
        }
        errors.version(&unit, resource_types::RESOURCE_GROUP, &rg.props.api_version);
        if policy == RolePolicy::Strict {
            for (principal, role) in &rg.props.rbac {
                if !is_known_role(role) {
                    errors.push(format!(
                        "{} assigns unknown role '{}' to '{}'",
                        unit, role, principal
                    ));
                }
            }
        }
    }

    let networks: IndexSet<&str> = file.networks.iter().map(|d| d.id.as_str()).collect();
    let mut pairs = HashSet::new();
    for net in &file.networks {
        let unit = format!("network '{}'", net.id);
        check_group(&mut errors, &net.id, &net.resource_group);
        errors.version(&unit, resource_types::VIRTUAL_NETWORK, &net.props.api_version);
        if net.props.address_space.is_empty() {
            errors.push(format!("{} has an empty address_space", unit));
        }
        errors.unique_names(&unit, "subnet", net.props.subnets.iter().map(|s| s.name.as_str()));
        for peer in &net.peer_with {
            if peer == &net.id {
                errors.push(format!("{} peers with itself", unit));
            } else if !networks.contains(peer.as_str()) {
                errors.push(format!("{} peers with unknown network '{}'", unit, peer));
            } else {
                let pair = if net.id < *peer {
                    (net.id.as_str(), peer.as_str())
                } else {
                    (peer.as_str(), net.id.as_str())
                };
                if !pairs.insert(pair) {
                    errors.push(format!(
                        "peering between '{}' and '{}' is declared twice",
                        pair.0, pair.1
                    ));
                }
            }
        }
    }

    for sa in &file.storage_accounts {
        let unit = format!("storage account '{}'", sa.id);
        check_group(&mut errors, &sa.id, &sa.resource_group);
        errors.version(&unit, resource_types::STORAGE_ACCOUNT, &sa.props.api_version);
        let children = sa
            .props
            .containers
            .iter()
            .map(|c| c.name.as_str())
            .chain(sa.props.file_shares.iter().map(|f| f.name.as_str()))
            .chain(sa.props.queues.iter().map(|q| q.name.as_str()))
            .chain(sa.props.tables.iter().map(|t| t.name.as_str()));
        errors.unique_names(&unit, "child", children);
        if let Some(rules) = &sa.props.network_rules {
            if !["Allow", "Deny"].contains(&rules.default_action.as_str()) {
                errors.push(format!(
                    "{} has network_rules default_action '{}', expected Allow or Deny",
                    unit, rules.default_action
                ));
            }
        }
        for container in &sa.props.containers {
            let owner = format!("container '{}' of {}", container.name, unit);
            errors.unique_names(&owner, "blob", container.blobs.iter().map(|b| b.name.as_str()));
        }
    }

    for acr in &file.container_registries {
        let unit = format!("container registry '{}'", acr.id);
        check_group(&mut errors, &acr.id, &acr.resource_group);
        errors.version(&unit, resource_types::CONTAINER_REGISTRY, &acr.props.api_version);
        if !acr.props.georeplication_locations.is_empty() && acr.props.sku != GEOREPLICATION_SKU {
            errors.push(format!(
                "{} needs the {} SKU for georeplication_locations",
                unit, GEOREPLICATION_SKU
            ));
        }
    }

    for vm in &file.virtual_machines {
        let unit = format!("virtual machine '{}'", vm.id);
        check_group(&mut errors, &vm.id, &vm.resource_group);
        errors.version(&unit, resource_types::VIRTUAL_MACHINE, &vm.props.api_version);
        match vm.props.os_type {
            OsType::Linux => {
                if vm.props.ssh_public_key.is_none() && vm.props.admin_password.is_none() {
                    errors.push(format!("{} needs ssh_public_key or admin_password", unit));
                }
                if vm.props.bootstrap_custom_data.is_some() {
                    errors.push(format!("{} sets bootstrap_custom_data on a linux machine", unit));
                }
            }
            OsType::Windows => {
                if vm.props.admin_password.is_none() {
                    errors.push(format!("{} is a windows machine and needs admin_password", unit));
                }
                if vm.props.ssh_public_key.is_some() {
                    errors.push(format!("{} sets ssh_public_key on a windows machine", unit));
                }
            }
        }
        match (&vm.network, &vm.props.subnet) {
            (Some(net_id), subnet) => match file.networks.iter().find(|n| &n.id == net_id) {
                None => errors.push(format!("{} references unknown network '{}'", unit, net_id)),
                Some(net) => {
                    if let Some(subnet) = subnet {
                        if !net.props.subnets.iter().any(|s| &s.name == subnet) {
                            errors.push(format!(
                                "{} references unknown subnet '{}' of network '{}'",
                                unit, subnet, net_id
                            ));
                        }
                    }
                }
            },
            (None, Some(subnet)) => errors.push(format!(
                "{} names subnet '{}' without a network",
                unit, subnet
            )),
            (None, None) => {}
        }
    }

    for ai in &file.app_insights {
        let unit = format!("app insights '{}'", ai.id);
        check_group(&mut errors, &ai.id, &ai.resource_group);
        errors.version(&unit, resource_types::APP_INSIGHTS, &ai.props.api_version);
        if let Some(cap) = ai.props.daily_data_cap_in_gb {
            if !cap.is_finite() || cap < 0.0 {
                errors.push(format!(
                    "{} has daily_data_cap_in_gb {}, expected a finite non-negative number",
                    unit, cap
                ));
            }
        }
    }

    errors.0
}
