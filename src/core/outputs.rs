//! AZ-005: Output registry: named values exported from a stack.

use super::error::{ComposeError, ComposeResult};
use super::hasher::short_hash;
use super::resolver::sanitize;
use super::types::{NodePath, Value};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How composition units name the outputs they export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputNaming {
    /// Logical id derived from the scoped export name (`group/id`)
    #[default]
    Scoped,
    /// Logical id overridden with the bare attribute name (`id`)
    Bare,
}

/// One exported value.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBinding {
    pub export_name: String,
    pub value: Value,
    pub logical_id_override: Option<String>,
    pub description: Option<String>,
    pub sensitive: bool,
}

impl OutputBinding {
    pub fn new(export_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            export_name: export_name.into(),
            value: value.into(),
            logical_id_override: None,
            description: None,
            sensitive: false,
        }
    }

    pub fn with_logical_id(mut self, logical_id: impl Into<String>) -> Self {
        self.logical_id_override = Some(logical_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Effective logical id: the override, else derived from the export name.
    pub fn logical_id(&self) -> String {
        self.logical_id_override
            .clone()
            .unwrap_or_else(|| output_logical_id(&self.export_name))
    }
}

/// Auto-generated logical id for an export name.
pub fn output_logical_id(export_name: &str) -> String {
    format!("{}_{}", sanitize(export_name), short_hash(export_name))
}

/// Write-once collection of output bindings, in registration order.
#[derive(Debug, Clone, Default)]
pub struct OutputRegistry {
    bindings: IndexMap<String, OutputBinding>,
    naming: OutputNaming,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_naming(naming: OutputNaming) -> Self {
        Self {
            naming,
            ..Self::default()
        }
    }

    pub fn naming(&self) -> OutputNaming {
        self.naming
    }

    /// Register a value under `export_name`.
    pub fn register_output(
        &mut self,
        export_name: &str,
        value: impl Into<Value>,
        logical_id_override: Option<&str>,
    ) -> ComposeResult<()> {
        let mut binding = OutputBinding::new(export_name, value);
        binding.logical_id_override = logical_id_override.map(str::to_string);
        self.register(binding)
    }

    /// Register a fully built binding.
    pub fn register(&mut self, binding: OutputBinding) -> ComposeResult<()> {
        if self.bindings.contains_key(&binding.export_name) {
            return Err(ComposeError::DuplicateOutput(binding.export_name));
        }
        self.bindings.insert(binding.export_name.clone(), binding);
        Ok(())
    }

    /// Export `attribute` of a composition unit at `scope`, named per the
    /// registry's naming policy.
    pub fn export(
        &mut self,
        scope: &NodePath,
        attribute: &str,
        value: Value,
        sensitive: bool,
    ) -> ComposeResult<()> {
        let mut binding = OutputBinding::new(format!("{}/{}", scope, attribute), value);
        binding.sensitive = sensitive;
        if self.naming == OutputNaming::Bare {
            binding.logical_id_override = Some(attribute.to_string());
        }
        self.register(binding)
    }

    pub fn get(&self, export_name: &str) -> Option<&OutputBinding> {
        self.bindings.get(export_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputBinding> {
        self.bindings.values()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
