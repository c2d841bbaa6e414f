//! AZ-006: Versioned resource resolver.
//!
//! Static, newest-first registry of supported API versions per resource
//! type. `"latest"` pins to the first entry.

use super::error::{ComposeError, ComposeResult};
use super::types::VersionDescriptor;

/// Sentinel requesting the newest supported version.
pub const LATEST: &str = "latest";

/// Registered resource types.
pub mod resource_types {
    pub const RESOURCE_GROUP: &str = "Microsoft.Resources/resourceGroups";
    pub const VIRTUAL_NETWORK: &str = "Microsoft.Network/virtualNetworks";
    pub const SUBNET: &str = "Microsoft.Network/virtualNetworks/subnets";
    pub const STORAGE_ACCOUNT: &str = "Microsoft.Storage/storageAccounts";
    pub const CONTAINER_REGISTRY: &str = "Microsoft.ContainerRegistry/registries";
    pub const VIRTUAL_MACHINE: &str = "Microsoft.Compute/virtualMachines";
    pub const APP_INSIGHTS: &str = "Microsoft.Insights/components";
}

use resource_types::*;

static REGISTRY: &[(&str, &[&str])] = &[
    (RESOURCE_GROUP, &["2025-03-01", "2025-01-01", "2024-11-01"]),
    (VIRTUAL_NETWORK, &["2024-10-01", "2024-07-01"]),
    (SUBNET, &["2024-10-01", "2024-07-01"]),
    (STORAGE_ACCOUNT, &["2024-01-01", "2023-05-01", "2023-01-01"]),
    (CONTAINER_REGISTRY, &["2023-07-01"]),
    (VIRTUAL_MACHINE, &["2025-04-01", "2024-11-01", "2024-07-01"]),
    (APP_INSIGHTS, &["2020-02-02"]),
];

/// Supported versions of `resource_type`, newest first.
pub fn supported_versions(resource_type: &str) -> Option<&'static [&'static str]> {
    REGISTRY
        .iter()
        .find(|(t, _)| *t == resource_type)
        .map(|(_, versions)| *versions)
}

/// Newest supported version of `resource_type`.
pub fn latest_version(resource_type: &str) -> Option<&'static str> {
    supported_versions(resource_type).and_then(|v| v.first().copied())
}

/// True if `requested` is `"latest"` or a registered version.
pub fn is_supported(resource_type: &str, requested: &str) -> bool {
    supported_versions(resource_type)
        .is_some_and(|v| requested == LATEST || v.iter().any(|s| *s == requested))
}

/// Every registered resource type, in registry order.
pub fn registered_types() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(t, _)| *t)
}

/// Resolve a requested version to a concrete one.
pub fn resolve_version(resource_type: &str, requested: &str) -> ComposeResult<VersionDescriptor> {
    let unsupported = |supported: &[&str]| ComposeError::UnsupportedVersion {
        resource_type: resource_type.to_string(),
        requested: requested.to_string(),
        supported: supported.iter().map(|v| v.to_string()).collect(),
    };

    let versions = supported_versions(resource_type).ok_or_else(|| unsupported(&[]))?;
    let resolved = if requested == LATEST {
        versions.first()
    } else {
        versions.iter().find(|v| **v == requested)
    }
    .ok_or_else(|| unsupported(versions))?;

    Ok(VersionDescriptor {
        resource_type: resource_type.to_string(),
        requested: requested.to_string(),
        resolved: resolved.to_string(),
    })
}
