//! AZ-021: Role assignments fanned out from a principal → role map.

use crate::core::context::RolePolicy;
use crate::core::error::{ComposeError, ComposeResult};
use crate::core::fanout::bind_fan_out;
use crate::core::tree::ConstructTree;
use crate::core::types::*;
use indexmap::IndexMap;

/// Built-in role names accepted under the strict policy.
pub const KNOWN_ROLES: &[&str] = &[
    "Owner",
    "Contributor",
    "Reader",
    "User Access Administrator",
    "Role Based Access Control Administrator",
    "Network Contributor",
    "Virtual Machine Contributor",
    "Virtual Machine Administrator Login",
    "Virtual Machine User Login",
    "Storage Account Contributor",
    "Storage Blob Data Owner",
    "Storage Blob Data Contributor",
    "Storage Blob Data Reader",
    "AcrPull",
    "AcrPush",
    "AcrDelete",
    "Key Vault Administrator",
    "Key Vault Secrets User",
    "Key Vault Reader",
    "Monitoring Contributor",
    "Monitoring Reader",
    "Monitoring Metrics Publisher",
    "Log Analytics Contributor",
    "Log Analytics Reader",
    "Application Insights Component Contributor",
];

/// Role names are matched case-insensitively, as the platform does.
pub fn is_known_role(role: &str) -> bool {
    KNOWN_ROLES.iter().any(|r| r.eq_ignore_ascii_case(role))
}

/// Check `role` against `policy`.
pub fn check_role(policy: RolePolicy, principal: &str, role: &str) -> ComposeResult<()> {
    match policy {
        RolePolicy::Strict if !is_known_role(role) => Err(ComposeError::UnknownRole {
            principal: principal.to_string(),
            role: role.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Declare one role assignment of `role` to `principal` at `scope`.
pub fn assign_role(
    tree: &mut ConstructTree,
    parent: NodeId,
    segment: &str,
    scope: &Value,
    principal: &str,
    role: &str,
) -> ComposeResult<NodeId> {
    check_role(tree.context().role_policy(), principal, role)?;
    tree.create_node(
        parent,
        segment,
        NodeType::resource("azurerm_role_assignment"),
        Attributes::from([
            ("scope".to_string(), scope.clone()),
            ("principal_id".to_string(), Value::from(principal)),
            ("role_definition_name".to_string(), Value::from(role)),
        ]),
    )
}

/// One role assignment per map entry under `owner`, in principal order.
///
/// Every role is checked before any node is created.
pub fn bind_role_assignments(
    tree: &mut ConstructTree,
    owner: NodeId,
    scope: &Value,
    permissions: &IndexMap<String, String>,
) -> ComposeResult<Vec<NodeId>> {
    let mut entries: Vec<(&String, &String)> = permissions.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let policy = tree.context().role_policy();
    for (principal, role) in &entries {
        check_role(policy, principal, role)?;
    }

    bind_fan_out(
        tree,
        owner,
        &entries,
        |(principal, _)| principal.to_string(),
        |tree, owner, id, (principal, role)| assign_role(tree, owner, id, scope, principal, role),
    )
}
