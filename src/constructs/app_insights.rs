//! AZ-026: Application Insights component.

use super::resource_group::ResourceGroupRef;
use super::{default_api_version, export_all, pin_version, tags_value, Export};
use crate::core::error::{ComposeError, ComposeResult};
use crate::core::stack::Stack;
use crate::core::tree::ConstructTree;
use crate::core::types::*;
use crate::core::versions::resource_types::APP_INSIGHTS;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_application_type() -> String {
    "web".to_string()
}

fn default_retention() -> u32 {
    90
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AppInsightsProps {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_application_type")]
    pub application_type: String,
    #[serde(default = "default_retention")]
    pub retention_in_days: u32,
    #[serde(default)]
    pub daily_data_cap_in_gb: Option<f64>,
    #[serde(default)]
    pub daily_data_cap_notifications_disabled: Option<bool>,
    /// Log Analytics workspace backing a workspace-based component
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub tags: IndexMap<String, String>,
}

impl AppInsightsProps {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
            application_type: default_application_type(),
            retention_in_days: default_retention(),
            daily_data_cap_in_gb: None,
            daily_data_cap_notifications_disabled: None,
            workspace_id: None,
            api_version: default_api_version(),
            tags: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppInsights {
    pub scope: NodeId,
    pub node: NodeId,
}

impl AppInsights {
    pub fn new(
        stack: &mut Stack,
        parent: NodeId,
        id: &str,
        rg: &ResourceGroupRef,
        props: &AppInsightsProps,
    ) -> ComposeResult<Self> {
        if let Some(cap) = props.daily_data_cap_in_gb {
            if !cap.is_finite() || cap < 0.0 {
                return Err(ComposeError::InvalidProperty {
                    path: format!("{}/{}", stack.tree.path(parent), id),
                    property: "daily_data_cap_in_gb".to_string(),
                    reason: format!("must be a finite, non-negative number, got {}", cap),
                });
            }
        }
        let tree = &mut stack.tree;
        let scope = tree.create_scope(parent, id)?;
        let node = tree.create_node(
            scope,
            "appinsights",
            NodeType::resource("azurerm_application_insights"),
            Attributes::from([
                ("name".to_string(), Value::from(&props.name)),
                ("resource_group_name".to_string(), rg.name.clone()),
                ("location".to_string(), rg.location_or(props.location.as_ref())),
                ("application_type".to_string(), Value::from(&props.application_type)),
                ("retention_in_days".to_string(), Value::from(props.retention_in_days)),
                ("daily_data_cap_in_gb".to_string(), Value::from(props.daily_data_cap_in_gb)),
                (
                    "daily_data_cap_notifications_disabled".to_string(),
                    Value::from(props.daily_data_cap_notifications_disabled),
                ),
                ("workspace_id".to_string(), Value::from(props.workspace_id.as_ref())),
                ("tags".to_string(), tags_value(&props.tags)),
            ]),
        )?;
        pin_version(tree, node, APP_INSIGHTS, &props.api_version)?;

        let insights = Self { scope, node };
        let t = &stack.tree;
        let exports = vec![
            Export::new("id", t.reference(node, "id")),
            Export::new("name", t.reference(node, "name")),
            Export::new("app_id", t.reference(node, "app_id")),
            Export::sensitive("instrumentation_key", insights.instrumentation_key(t)),
            Export::sensitive("connection_string", t.reference(node, "connection_string")),
        ];
        export_all(stack, scope, exports)?;
        Ok(insights)
    }

    pub fn instrumentation_key(&self, tree: &ConstructTree) -> Value {
        tree.reference(self.node, "instrumentation_key")
    }

    /// Store the instrumentation key as a secret in an existing key vault.
    pub fn save_key_to_key_vault(
        &self,
        tree: &mut ConstructTree,
        key_vault_id: impl Into<Value>,
        secret_name: &str,
    ) -> ComposeResult<NodeId> {
        let value = self.instrumentation_key(tree);
        tree.create_node(
            self.scope,
            secret_name,
            NodeType::resource("azurerm_key_vault_secret"),
            Attributes::from([
                ("name".to_string(), Value::from(secret_name)),
                ("key_vault_id".to_string(), key_vault_id.into()),
                ("value".to_string(), value),
            ]),
        )
    }
}
