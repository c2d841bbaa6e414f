//! AZ-007: Synthesizer. One pass from construct tree to document.
//!
//! Order of work: identifier re-check, cycle detection, token resolution,
//! pre-order node emission, then outputs in registration order. The same
//! tree always yields byte-identical JSON.

use super::error::{ComposeError, ComposeResult};
use super::hasher::hash_string;
use super::outputs::OutputRegistry;
use super::resolver::{dependency_key, detect_cycles, logical_id, Resolver};
use super::tree::ConstructTree;
use super::types::*;
use rustc_hash::FxHashSet;
use serde::Serialize;
use serde_json::{json, Map};
use tracing::{debug, info};

/// Generator tag written into every document.
pub const GENERATOR: &str = concat!("azcompose/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Document
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub generator: String,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockMode {
    Resource,
    Data,
}

/// One emitted resource or data-source declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceBlock {
    pub path: String,
    pub mode: BlockMode,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub logical_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<VersionDescriptor>,
    pub attributes: Map<String, serde_json::Value>,
    /// Sorted engine addresses of the blocks this one reads from
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// One emitted output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputBlock {
    pub logical_id: String,
    pub export_name: String,
    pub value: serde_json::Value,
    pub sensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Synthesized configuration document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub stack: String,
    pub metadata: Metadata,
    pub resources: Vec<ResourceBlock>,
    pub outputs: Vec<OutputBlock>,
}

impl Document {
    /// Canonical JSON rendering.
    pub fn to_json(&self) -> ComposeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rendering grouped the way the provisioning engine reads JSON
    /// configuration: `data.<type>.<id>`, `resource.<type>.<id>`,
    /// `output.<id>`.
    pub fn to_engine_json(&self) -> ComposeResult<String> {
        let mut data: Map<String, serde_json::Value> = Map::new();
        let mut resource: Map<String, serde_json::Value> = Map::new();

        for block in &self.resources {
            let mut body = Map::new();
            let mut meta = json!({ "path": block.path, "uniqueId": block.logical_id });
            if let Some(v) = &block.api_version {
                meta["apiVersion"] = json!(v.resolved);
            }
            body.insert("//".to_string(), json!({ "metadata": meta }));
            body.extend(block.attributes.clone());
            if !block.depends_on.is_empty() {
                body.insert("depends_on".to_string(), json!(block.depends_on));
            }

            let group = match block.mode {
                BlockMode::Resource => &mut resource,
                BlockMode::Data => &mut data,
            };
            let by_type = group
                .entry(block.resource_type.clone())
                .or_insert_with(|| serde_json::Value::Object(Map::new()));
            if let serde_json::Value::Object(entries) = by_type {
                entries.insert(block.logical_id.clone(), serde_json::Value::Object(body));
            }
        }

        let mut output: Map<String, serde_json::Value> = Map::new();
        for out in &self.outputs {
            let mut body = Map::new();
            body.insert("value".to_string(), out.value.clone());
            if out.sensitive {
                body.insert("sensitive".to_string(), json!(true));
            }
            if let Some(d) = &out.description {
                body.insert("description".to_string(), json!(d));
            }
            output.insert(out.logical_id.clone(), serde_json::Value::Object(body));
        }

        let mut root = Map::new();
        root.insert(
            "//".to_string(),
            json!({ "metadata": { "stackName": self.stack, "backend": "local", "generator": self.metadata.generator } }),
        );
        for (key, group) in [("data", data), ("resource", resource), ("output", output)] {
            if !group.is_empty() {
                root.insert(key.to_string(), serde_json::Value::Object(group));
            }
        }
        Ok(serde_json::to_string_pretty(&serde_json::Value::Object(root))?)
    }

    /// `blake3:<hex>` of the canonical JSON.
    pub fn fingerprint(&self) -> ComposeResult<String> {
        Ok(hash_string(&self.to_json()?))
    }

    /// Block emitted for the node at the rendered `path`.
    pub fn resource(&self, path: &str) -> Option<&ResourceBlock> {
        self.resources.iter().find(|r| r.path == path)
    }

    /// Output with the given logical id.
    pub fn output(&self, logical_id: &str) -> Option<&OutputBlock> {
        self.outputs.iter().find(|o| o.logical_id == logical_id)
    }
}

// ============================================================================
// Synthesis
// ============================================================================

/// Resolve every token in `tree` and `outputs` and emit the document.
pub fn synthesize(tree: &ConstructTree, outputs: &OutputRegistry) -> ComposeResult<Document> {
    let order = tree.walk();
    check_identifiers(tree, &order)?;
    detect_cycles(tree)?;

    let mut resolver = Resolver::new(tree);
    let mut resources = Vec::new();
    for &id in &order {
        let node = tree.node(id);
        let (mode, resource_type) = match node.node_type() {
            NodeType::Scope => continue,
            NodeType::Resource(t) => (BlockMode::Resource, t.clone()),
            NodeType::Data(t) => (BlockMode::Data, t.clone()),
        };
        resolver.take_dependencies();
        let mut attributes = Map::new();
        for (name, value) in node.attributes() {
            if matches!(value, Value::Null) {
                continue;
            }
            attributes.insert(name.clone(), resolver.resolve_value(value)?.into_json());
        }
        let mut depends_on = resolver.take_dependencies();
        if let Some(own) = dependency_key(node) {
            depends_on.remove(&own);
        }
        resources.push(ResourceBlock {
            path: node.path().to_string(),
            mode,
            resource_type,
            logical_id: logical_id(node.path()),
            api_version: node.api_version().cloned(),
            attributes,
            depends_on: depends_on.into_iter().collect(),
        });
    }

    let mut seen_ids = FxHashSet::default();
    let mut output_blocks = Vec::with_capacity(outputs.len());
    for binding in outputs.iter() {
        let lid = binding.logical_id();
        if !seen_ids.insert(lid.clone()) {
            return Err(ComposeError::DuplicateOutput(lid));
        }
        output_blocks.push(OutputBlock {
            logical_id: lid,
            export_name: binding.export_name.clone(),
            value: resolver.resolve_value(&binding.value)?.into_json(),
            sensitive: binding.sensitive,
            description: binding.description.clone(),
        });
    }

    debug!("resolved {} token(s)", resolver.resolved_count());
    info!(
        "synthesized stack {}: {} block(s), {} output(s)",
        tree.stack_name(),
        resources.len(),
        output_blocks.len()
    );

    let context = tree.context();
    Ok(Document {
        stack: tree.stack_name().to_string(),
        metadata: Metadata {
            generator: GENERATOR.to_string(),
            tenant_id: context.tenant_id().to_string(),
            subscription_id: context.subscription_id().map(str::to_string),
        },
        resources,
        outputs: output_blocks,
    })
}

/// Sibling identifiers must be unique under every parent.
fn check_identifiers(tree: &ConstructTree, order: &[NodeId]) -> ComposeResult<()> {
    for &id in order {
        let mut seen = FxHashSet::default();
        for &child in tree.children(id) {
            let segment = tree.path(child).leaf();
            if !seen.insert(segment) {
                return Err(ComposeError::DuplicateIdentifier {
                    parent: tree.path(id).to_string(),
                    segment: segment.to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::StackContext;
    use crate::core::fanout::bind_fan_out;
    use crate::core::outputs::OutputBinding;
    use crate::core::versions::{resolve_version, resource_types, LATEST};
    use proptest::prelude::*;

    fn tree() -> ConstructTree {
        ConstructTree::new("s", StackContext::new("tenant-x")).unwrap()
    }

    fn attrs<const N: usize>(entries: [(&str, Value); N]) -> Attributes {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn with_subnets(names: &[&str]) -> (ConstructTree, NodeId) {
        let mut t = tree();
        let root = t.root();
        let rg = t
            .create_node(
                root,
                "rg",
                NodeType::resource("azurerm_resource_group"),
                attrs([("name", "rg-demo".into()), ("location", "eastus".into())]),
            )
            .unwrap();
        let vnet = t
            .create_node(
                root,
                "vnet",
                NodeType::resource("azurerm_virtual_network"),
                attrs([
                    ("name", "vnet-demo".into()),
                    ("resource_group_name", t.reference(rg, "name")),
                ]),
            )
            .unwrap();
        let rg_name = t.reference(rg, "name");
        let vnet_name = t.reference(vnet, "name");
        let owned: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        bind_fan_out(&mut t, vnet, &owned, String::clone, |t, owner, id, _| {
            t.create_node(
                owner,
                id,
                NodeType::resource("azurerm_subnet"),
                attrs([
                    ("name", id.into()),
                    ("resource_group_name", rg_name.clone()),
                    ("virtual_network_name", vnet_name.clone()),
                ]),
            )
        })
        .unwrap();
        (t, vnet)
    }

    #[test]
    fn test_az007_emits_preorder_with_resolved_values() {
        let (t, _) = with_subnets(&["subnet1", "subnet2"]);
        let doc = synthesize(&t, &OutputRegistry::new()).unwrap();
        let paths: Vec<&str> = doc.resources.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["s/rg", "s/vnet", "s/vnet/subnet1", "s/vnet/subnet2"]
        );
        let subnet = doc.resource("s/vnet/subnet1").unwrap();
        assert_eq!(subnet.attributes["resource_group_name"], json!("rg-demo"));
        assert_eq!(subnet.attributes["virtual_network_name"], json!("vnet-demo"));
        assert_eq!(doc.metadata.tenant_id, "tenant-x");
    }

    // Scenario 1: reordering subnet declarations only changes child order.
    #[test]
    fn test_az007_subnet_reorder_keeps_identity() {
        let (t1, _) = with_subnets(&["subnet1", "subnet2"]);
        let (t2, _) = with_subnets(&["subnet2", "subnet1"]);
        let d1 = synthesize(&t1, &OutputRegistry::new()).unwrap();
        let d2 = synthesize(&t2, &OutputRegistry::new()).unwrap();

        for name in ["subnet1", "subnet2"] {
            let path = format!("s/vnet/{}", name);
            assert_eq!(d1.resource(&path), d2.resource(&path));
        }
        assert_eq!(d1.resources[2].path, "s/vnet/subnet1");
        assert_eq!(d2.resources[2].path, "s/vnet/subnet2");
    }

    // Scenario 2: two outputs with the same export name.
    #[test]
    fn test_az007_duplicate_output_export_name() {
        let mut outputs = OutputRegistry::new();
        outputs.register_output("vm_name", "vm-a", None).unwrap();
        assert!(matches!(
            outputs.register_output("vm_name", "vm-b", None),
            Err(ComposeError::DuplicateOutput(name)) if name == "vm_name"
        ));
    }

    #[test]
    fn test_az007_duplicate_effective_output_id() {
        let t = tree();
        let mut outputs = OutputRegistry::new();
        outputs.register_output("a/id", "1", Some("id")).unwrap();
        outputs.register_output("b/id", "2", Some("id")).unwrap();
        assert!(matches!(
            synthesize(&t, &outputs),
            Err(ComposeError::DuplicateOutput(lid)) if lid == "id"
        ));
    }

    // Scenario 3: A.id -> B.id -> A.id.
    #[test]
    fn test_az007_cycle_names_both_paths() {
        let mut t = tree();
        let root = t.root();
        let a = t
            .create_node(root, "a", NodeType::resource("azurerm_thing"), Attributes::new())
            .unwrap();
        let b = t
            .create_node(root, "b", NodeType::resource("azurerm_thing"), Attributes::new())
            .unwrap();
        let to_b = t.reference(b, "id");
        let to_a = t.reference(a, "id");
        t.set_attribute(a, "id", to_b);
        t.set_attribute(b, "id", to_a);

        let err = synthesize(&t, &OutputRegistry::new()).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, ComposeError::ReferenceCycle { .. }));
        assert!(msg.contains("s/a.id"));
        assert!(msg.contains("s/b.id"));
    }

    // Scenario 4: blobs a, b, a under one container.
    #[test]
    fn test_az007_duplicate_blob_names() {
        let mut t = tree();
        let root = t.root();
        let container = t
            .create_node(
                root,
                "container",
                NodeType::resource("azurerm_storage_container"),
                Attributes::new(),
            )
            .unwrap();
        let blobs: Vec<String> = ["a", "b", "a"].iter().map(|s| s.to_string()).collect();
        let err = bind_fan_out(&mut t, container, &blobs, String::clone, |t, o, id, _| {
            t.create_node(o, id, NodeType::resource("azurerm_storage_blob"), Attributes::new())
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ComposeError::DuplicateIdentifier { ref segment, .. } if segment == "a"
        ));
    }

    // Scenario 5: unsupported resource group version.
    #[test]
    fn test_az007_unsupported_version() {
        assert!(matches!(
            resolve_version(resource_types::RESOURCE_GROUP, "2099-01-01"),
            Err(ComposeError::UnsupportedVersion { .. })
        ));
        assert_eq!(
            resolve_version(resource_types::RESOURCE_GROUP, LATEST).unwrap().resolved,
            "2025-03-01"
        );
    }

    // Scenario 6: token whose source path does not exist.
    #[test]
    fn test_az007_missing_source_path() {
        let mut t = tree();
        let root = t.root();
        let ghost = Value::Ref(Reference::new(NodePath::parse("s/ghost"), "id"));
        t.create_node(root, "a", NodeType::resource("azurerm_thing"), attrs([("peer", ghost)]))
            .unwrap();
        match synthesize(&t, &OutputRegistry::new()).unwrap_err() {
            ComposeError::UnresolvedReference { path, .. } => assert_eq!(path, "s/ghost"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_az007_outputs_resolved_in_order() {
        let (t, vnet) = with_subnets(&["subnet1"]);
        let mut outputs = OutputRegistry::new();
        outputs
            .register_output("vnet/name", t.reference(vnet, "name"), None)
            .unwrap();
        outputs
            .register(
                OutputBinding::new("vnet/id", t.reference(vnet, "id"))
                    .with_description("virtual network id"),
            )
            .unwrap();
        let doc = synthesize(&t, &outputs).unwrap();
        assert_eq!(doc.outputs[0].value, json!("vnet-demo"));
        assert!(doc.outputs[1]
            .value
            .as_str()
            .unwrap()
            .starts_with("${azurerm_virtual_network.vnet_"));
        assert_eq!(doc.outputs[1].description.as_deref(), Some("virtual network id"));
    }

    #[test]
    fn test_az007_null_attributes_skipped() {
        let mut t = tree();
        let root = t.root();
        t.create_node(
            root,
            "a",
            NodeType::resource("azurerm_thing"),
            attrs([("name", "x".into()), ("tags", Value::Null)]),
        )
        .unwrap();
        let doc = synthesize(&t, &OutputRegistry::new()).unwrap();
        assert!(!doc.resources[0].attributes.contains_key("tags"));
    }

    #[test]
    fn test_az007_engine_json_groups_blocks() {
        let (mut t, _) = with_subnets(&["subnet1"]);
        let root = t.root();
        let cfg = t
            .create_node(root, "cfg", NodeType::data("azurerm_client_config"), Attributes::new())
            .unwrap();
        let mut outputs = OutputRegistry::new();
        outputs
            .register(OutputBinding::new("sub", t.reference(cfg, "subscription_id")).sensitive())
            .unwrap();
        let doc = synthesize(&t, &outputs).unwrap();
        let engine: serde_json::Value = serde_json::from_str(&doc.to_engine_json().unwrap()).unwrap();

        let subnets = engine["resource"]["azurerm_subnet"].as_object().unwrap();
        assert_eq!(subnets.len(), 1);
        let (lid, body) = subnets.iter().next().unwrap();
        assert_eq!(body["//"]["metadata"]["uniqueId"], json!(lid));
        assert_eq!(body["name"], json!("subnet1"));
        assert!(engine["data"]["azurerm_client_config"].is_object());
        let out = engine["output"].as_object().unwrap().values().next().unwrap();
        assert_eq!(out["sensitive"], json!(true));
        assert!(out["value"]
            .as_str()
            .unwrap()
            .starts_with("${data.azurerm_client_config."));
    }

    #[test]
    fn test_az007_substituted_references_become_depends_on() {
        let (t, vnet) = with_subnets(&["subnet1"]);
        let doc = synthesize(&t, &OutputRegistry::new()).unwrap();
        let rg_key = format!("azurerm_resource_group.{}", logical_id(&NodePath::parse("s/rg")));
        let vnet_key = format!("azurerm_virtual_network.{}", logical_id(t.path(vnet)));

        let subnet = doc.resource("s/vnet/subnet1").unwrap();
        assert_eq!(subnet.attributes["virtual_network_name"], json!("vnet-demo"));
        let mut expected = vec![rg_key.clone(), vnet_key.clone()];
        expected.sort();
        assert_eq!(subnet.depends_on, expected);
        assert_eq!(doc.resource("s/vnet").unwrap().depends_on, vec![rg_key]);
        assert!(doc.resource("s/rg").unwrap().depends_on.is_empty());

        let engine: serde_json::Value = serde_json::from_str(&doc.to_engine_json().unwrap()).unwrap();
        let body = engine["resource"]["azurerm_subnet"]
            .as_object()
            .unwrap()
            .values()
            .next()
            .unwrap();
        assert!(body["depends_on"]
            .as_array()
            .unwrap()
            .contains(&json!(vnet_key)));
        assert!(engine["resource"]["azurerm_resource_group"]
            .as_object()
            .unwrap()
            .values()
            .all(|b| b.get("depends_on").is_none()));
    }

    #[test]
    fn test_az007_self_reference_not_a_dependency() {
        let mut t = tree();
        let root = t.root();
        let a = t
            .create_node(root, "a", NodeType::resource("azurerm_thing"), attrs([("name", "x".into())]))
            .unwrap();
        let own_name = t.reference(a, "name");
        t.set_attribute(a, "label", Value::concat([own_name, Value::from("-label")]));
        let doc = synthesize(&t, &OutputRegistry::new()).unwrap();
        assert_eq!(doc.resources[0].attributes["label"], json!("x-label"));
        assert!(doc.resources[0].depends_on.is_empty());
    }

    #[test]
    fn test_az007_api_version_carried() {
        let mut t = tree();
        let root = t.root();
        let rg = t
            .create_node(root, "rg", NodeType::resource("azurerm_resource_group"), Attributes::new())
            .unwrap();
        t.set_api_version(rg, resolve_version(resource_types::RESOURCE_GROUP, LATEST).unwrap());
        let doc = synthesize(&t, &OutputRegistry::new()).unwrap();
        assert_eq!(
            doc.resources[0].api_version.as_ref().unwrap().resolved,
            "2025-03-01"
        );
        assert!(doc.to_json().unwrap().contains("\"api_version\""));
    }

    #[test]
    fn test_az007_idempotent() {
        let (t, vnet) = with_subnets(&["b", "a", "c"]);
        let mut outputs = OutputRegistry::new();
        outputs
            .register_output("vnet/id", t.reference(vnet, "id"), None)
            .unwrap();
        let first = synthesize(&t, &outputs).unwrap();
        let second = synthesize(&t, &outputs).unwrap();
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
        assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
        assert!(first.fingerprint().unwrap().starts_with("blake3:"));
    }

    proptest! {
        #[test]
        fn prop_az007_synthesis_idempotent(
            names in proptest::collection::hash_set("[a-z]{1,6}", 0..6),
        ) {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            let (t, _) = with_subnets(&names);
            let outputs = OutputRegistry::new();
            let a = synthesize(&t, &outputs).unwrap().to_json().unwrap();
            let b = synthesize(&t, &outputs).unwrap().to_json().unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
