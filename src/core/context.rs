//! AZ-009: Stack context: ambient identity values passed into a stack.
//!
//! The tenant id is looked up once through the Azure CLI. A failed lookup is
//! the one tolerated failure in the crate: it is logged and replaced with a
//! fixed placeholder, and the context records that the value is a fallback.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Tenant id used when the ambient lookup fails.
pub const PLACEHOLDER_TENANT_ID: &str = "123e4567-e89b-12d3-a456-426614174000";

/// Environment variable consulted for the subscription id.
pub const SUBSCRIPTION_ENV: &str = "ARM_SUBSCRIPTION_ID";

/// Where a context value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    Explicit,
    Environment,
    AzureCli,
    Fallback,
}

/// How role names in RBAC fan-out are checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RolePolicy {
    /// Reject role names outside the recognized set
    #[default]
    Strict,
    /// Pass role names through to the provisioning engine
    Permissive,
}

/// Query facility for the signed-in account.
pub trait IdentityQuery {
    /// Return the value of an `az account show` field (e.g. `tenantId`, `id`).
    fn account_field(&self, field: &str) -> Result<String, String>;
}

/// `az account show --query <field> -o tsv`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureCli;

impl IdentityQuery for AzureCli {
    fn account_field(&self, field: &str) -> Result<String, String> {
        let output = Command::new("az")
            .args(["account", "show", "--query", field, "-o", "tsv"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| format!("failed to spawn az: {}", e))?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if value.is_empty() {
            return Err(format!("az returned an empty {}", field));
        }
        Ok(value)
    }
}

/// Ambient values carried by a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackContext {
    tenant_id: String,
    tenant_source: ContextSource,
    subscription_id: Option<String>,
    subscription_source: Option<ContextSource>,
    role_policy: RolePolicy,
}

impl StackContext {
    /// Context with an explicitly supplied tenant id.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            tenant_source: ContextSource::Explicit,
            subscription_id: None,
            subscription_source: None,
            role_policy: RolePolicy::default(),
        }
    }

    /// Context using the placeholder tenant, without any lookup.
    pub fn placeholder() -> Self {
        Self {
            tenant_id: PLACEHOLDER_TENANT_ID.to_string(),
            tenant_source: ContextSource::Fallback,
            subscription_id: None,
            subscription_source: None,
            role_policy: RolePolicy::default(),
        }
    }

    /// Detect tenant and subscription from the process environment and `query`.
    pub fn detect(query: &dyn IdentityQuery) -> Self {
        Self::detect_with(query, |key| std::env::var(key).ok())
    }

    /// Detection with an injectable environment lookup.
    pub fn detect_with<F>(query: &dyn IdentityQuery, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut context = match query.account_field("tenantId") {
            Ok(tenant_id) => {
                debug!("tenant id from az: {}", tenant_id);
                Self {
                    tenant_source: ContextSource::AzureCli,
                    ..Self::new(tenant_id)
                }
            }
            Err(e) => {
                warn!(
                    "Azure CLI is not logged in ({}); using placeholder tenant id {}",
                    e, PLACEHOLDER_TENANT_ID
                );
                Self::placeholder()
            }
        };

        if let Some(id) = env(SUBSCRIPTION_ENV).filter(|s| !s.is_empty()) {
            debug!("subscription id from {}", SUBSCRIPTION_ENV);
            context.subscription_id = Some(id);
            context.subscription_source = Some(ContextSource::Environment);
        } else if let Ok(id) = query.account_field("id") {
            debug!("subscription id from az: {}", id);
            context.subscription_id = Some(id);
            context.subscription_source = Some(ContextSource::AzureCli);
        }
        context
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self.tenant_source = ContextSource::Explicit;
        self
    }

    pub fn with_subscription_id(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self.subscription_source = Some(ContextSource::Explicit);
        self
    }

    pub fn with_role_policy(mut self, policy: RolePolicy) -> Self {
        self.role_policy = policy;
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn tenant_source(&self) -> ContextSource {
        self.tenant_source
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }

    /// Where the subscription id came from, if one is known.
    pub fn subscription_source(&self) -> Option<ContextSource> {
        self.subscription_source
    }

    pub fn role_policy(&self) -> RolePolicy {
        self.role_policy
    }

    /// True when the tenant id is the placeholder rather than a real lookup.
    pub fn is_fallback(&self) -> bool {
        self.tenant_source == ContextSource::Fallback
    }
}

impl Default for StackContext {
    fn default() -> Self {
        Self::placeholder()
    }
}
