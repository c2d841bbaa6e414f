//! AZ-023: Storage account with container, blob, file share, queue and
//! table fan-out, plus an optional network rule set.
//!
//! All children share the account's scope, so their names must be unique
//! across kinds.

use super::resource_group::ResourceGroupRef;
use super::{default_api_version, default_true, export_all, pin_version, tags_value, Export};
use crate::core::error::{ComposeError, ComposeResult};
use crate::core::fanout::bind_fan_out;
use crate::core::stack::Stack;
use crate::core::tree::ConstructTree;
use crate::core::types::*;
use crate::core::versions::resource_types::STORAGE_ACCOUNT;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_tier() -> String {
    "Standard".to_string()
}

fn default_replication() -> String {
    "LRS".to_string()
}

fn default_kind() -> String {
    "StorageV2".to_string()
}

fn default_access_tier() -> String {
    "Hot".to_string()
}

fn default_tls() -> String {
    "TLS1_2".to_string()
}

fn default_access_type() -> String {
    "private".to_string()
}

fn default_blob_type() -> String {
    "Block".to_string()
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

fn default_quota() -> u32 {
    1024
}

fn default_share_protocol() -> String {
    "SMB".to_string()
}

fn default_rules_action() -> String {
    "Deny".to_string()
}

/// Storage account properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StorageAccountProps {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_tier")]
    pub account_tier: String,
    #[serde(default = "default_replication")]
    pub account_replication_type: String,
    #[serde(default = "default_kind")]
    pub account_kind: String,
    #[serde(default = "default_access_tier")]
    pub access_tier: String,
    #[serde(default = "default_true")]
    pub enable_https_traffic_only: bool,
    #[serde(default = "default_true")]
    pub is_hns_enabled: bool,
    #[serde(default = "default_tls")]
    pub min_tls_version: String,
    #[serde(default)]
    pub public_network_access_enabled: bool,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub tags: IndexMap<String, String>,
    #[serde(default)]
    pub containers: Vec<ContainerProps>,
    #[serde(default)]
    pub file_shares: Vec<FileShareProps>,
    #[serde(default)]
    pub queues: Vec<QueueProps>,
    #[serde(default)]
    pub tables: Vec<TableProps>,
    #[serde(default)]
    pub network_rules: Option<NetworkRulesProps>,
}

impl StorageAccountProps {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
            account_tier: default_tier(),
            account_replication_type: default_replication(),
            account_kind: default_kind(),
            access_tier: default_access_tier(),
            enable_https_traffic_only: true,
            is_hns_enabled: true,
            min_tls_version: default_tls(),
            public_network_access_enabled: false,
            api_version: default_api_version(),
            tags: IndexMap::new(),
            containers: Vec::new(),
            file_shares: Vec::new(),
            queues: Vec::new(),
            tables: Vec::new(),
            network_rules: None,
        }
    }
}

/// Blob container properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContainerProps {
    pub name: String,
    #[serde(default = "default_access_type")]
    pub access_type: String,
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
    #[serde(default)]
    pub blobs: Vec<BlobProps>,
}

impl ContainerProps {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access_type: default_access_type(),
            metadata: IndexMap::new(),
            blobs: Vec::new(),
        }
    }
}

/// Blob properties. `source` is a local file uploaded by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BlobProps {
    pub name: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "type", default = "default_blob_type")]
    pub blob_type: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
}

impl BlobProps {
    pub fn new(name: impl Into<String>, source: Option<&str>) -> Self {
        Self {
            name: name.into(),
            source: source.map(str::to_string),
            blob_type: default_blob_type(),
            content_type: default_content_type(),
            metadata: IndexMap::new(),
        }
    }
}

/// Stored access policy entry shared by file shares and tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AclEntry {
    pub id: String,
    /// Permission letters, e.g. `rwdl`
    pub permissions: String,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
}

fn acl_value(acl: &[AclEntry]) -> Value {
    if acl.is_empty() {
        return Value::Null;
    }
    Value::list(acl.iter().map(|entry| {
        Value::map([
            ("id", Value::from(&entry.id)),
            (
                "access_policy",
                Value::list([Value::map([
                    ("permissions", Value::from(&entry.permissions)),
                    ("start", Value::from(entry.start.as_ref())),
                    ("expiry", Value::from(entry.expiry.as_ref())),
                ])]),
            ),
        ])
    }))
}

/// File share properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileShareProps {
    pub name: String,
    /// Size limit in GiB
    #[serde(default = "default_quota")]
    pub quota: u32,
    #[serde(default = "default_access_tier")]
    pub access_tier: String,
    #[serde(default = "default_share_protocol")]
    pub enabled_protocol: String,
    #[serde(default)]
    pub acl: Vec<AclEntry>,
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
}

impl FileShareProps {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quota: default_quota(),
            access_tier: default_access_tier(),
            enabled_protocol: default_share_protocol(),
            acl: Vec::new(),
            metadata: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueueProps {
    pub name: String,
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
}

impl QueueProps {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableProps {
    pub name: String,
    #[serde(default)]
    pub acl: Vec<AclEntry>,
}

impl TableProps {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            acl: Vec::new(),
        }
    }
}

/// Private endpoint allowed through the network rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PrivateLinkAccess {
    pub endpoint_resource_id: String,
    #[serde(default)]
    pub endpoint_tenant_id: Option<String>,
}

/// Network rule set of the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NetworkRulesProps {
    /// `Allow` or `Deny`
    #[serde(default = "default_rules_action")]
    pub default_action: String,
    /// Traffic that skips the rules: `AzureServices`, `Logging`, `Metrics` or `None`
    #[serde(default)]
    pub bypass: Vec<String>,
    /// CIDR ranges or addresses
    #[serde(default)]
    pub ip_rules: Vec<String>,
    #[serde(default)]
    pub virtual_network_subnet_ids: Vec<String>,
    #[serde(default)]
    pub private_link_access: Vec<PrivateLinkAccess>,
}

impl Default for NetworkRulesProps {
    fn default() -> Self {
        Self {
            default_action: default_rules_action(),
            bypass: Vec::new(),
            ip_rules: Vec::new(),
            virtual_network_subnet_ids: Vec::new(),
            private_link_access: Vec::new(),
        }
    }
}

fn list_or_null(items: &[String]) -> Value {
    if items.is_empty() {
        Value::Null
    } else {
        Value::list(items.iter().map(String::as_str))
    }
}

/// Handles to a declared container and its blobs.
#[derive(Debug, Clone)]
pub struct Container {
    pub node: NodeId,
    pub blobs: IndexMap<String, NodeId>,
}

/// Handles to a declared storage account.
#[derive(Debug, Clone)]
pub struct StorageAccount {
    pub scope: NodeId,
    pub account: NodeId,
    pub containers: IndexMap<String, Container>,
    pub file_shares: IndexMap<String, NodeId>,
    pub queues: IndexMap<String, NodeId>,
    pub tables: IndexMap<String, NodeId>,
    pub network_rules: Option<NodeId>,
}

impl StorageAccount {
    pub fn new(
        stack: &mut Stack,
        parent: NodeId,
        id: &str,
        rg: &ResourceGroupRef,
        props: &StorageAccountProps,
    ) -> ComposeResult<Self> {
        let tree = &mut stack.tree;
        let scope = tree.create_scope(parent, id)?;
        let account = tree.create_node(
            scope,
            "account",
            NodeType::resource("azurerm_storage_account"),
            Attributes::from([
                ("name".to_string(), Value::from(&props.name)),
                ("resource_group_name".to_string(), rg.name.clone()),
                ("location".to_string(), rg.location_or(props.location.as_ref())),
                ("account_tier".to_string(), Value::from(&props.account_tier)),
                (
                    "account_replication_type".to_string(),
                    Value::from(&props.account_replication_type),
                ),
                ("account_kind".to_string(), Value::from(&props.account_kind)),
                ("access_tier".to_string(), Value::from(&props.access_tier)),
                (
                    "enable_https_traffic_only".to_string(),
                    Value::from(props.enable_https_traffic_only),
                ),
                ("is_hns_enabled".to_string(), Value::from(props.is_hns_enabled)),
                ("min_tls_version".to_string(), Value::from(&props.min_tls_version)),
                (
                    "public_network_access_enabled".to_string(),
                    Value::from(props.public_network_access_enabled),
                ),
                ("tags".to_string(), tags_value(&props.tags)),
            ]),
        )?;
        pin_version(tree, account, STORAGE_ACCOUNT, &props.api_version)?;

        let mut storage = Self {
            scope,
            account,
            containers: IndexMap::new(),
            file_shares: IndexMap::new(),
            queues: IndexMap::new(),
            tables: IndexMap::new(),
            network_rules: None,
        };
        storage.add_containers(tree, &props.containers)?;
        storage.add_file_shares(tree, &props.file_shares)?;
        storage.add_queues(tree, &props.queues)?;
        storage.add_tables(tree, &props.tables)?;
        if let Some(rules) = &props.network_rules {
            storage.add_network_rules(tree, rules)?;
        }

        let exports = vec![
            Export::new("id", stack.tree.reference(account, "id")),
            Export::new("name", stack.tree.reference(account, "name")),
            Export::new(
                "primary_blob_endpoint",
                stack.tree.reference(account, "primary_blob_endpoint"),
            ),
            Export::new(
                "primary_file_endpoint",
                stack.tree.reference(account, "primary_file_endpoint"),
            ),
            Export::sensitive(
                "primary_access_key",
                stack.tree.reference(account, "primary_access_key"),
            ),
        ];
        export_all(stack, scope, exports)?;
        Ok(storage)
    }

    pub fn name(&self, tree: &ConstructTree) -> Value {
        tree.reference(self.account, "name")
    }

    pub fn id(&self, tree: &ConstructTree) -> Value {
        tree.reference(self.account, "id")
    }

    /// Declare containers (with their blobs) under this account.
    pub fn add_containers(
        &mut self,
        tree: &mut ConstructTree,
        containers: &[ContainerProps],
    ) -> ComposeResult<Vec<NodeId>> {
        let account_name = self.name(tree);
        let handles = bind_fan_out(
            tree,
            self.scope,
            containers,
            |c| c.name.clone(),
            |tree, owner, segment, c| {
                tree.create_node(
                    owner,
                    segment,
                    NodeType::resource("azurerm_storage_container"),
                    Attributes::from([
                        ("name".to_string(), Value::from(&c.name)),
                        ("storage_account_name".to_string(), account_name.clone()),
                        ("container_access_type".to_string(), Value::from(&c.access_type)),
                        ("metadata".to_string(), tags_value(&c.metadata)),
                    ]),
                )
            },
        )?;

        for (props, node) in containers.iter().zip(&handles) {
            self.containers.insert(
                props.name.clone(),
                Container {
                    node: *node,
                    blobs: IndexMap::new(),
                },
            );
            self.add_blobs(tree, &props.name, &props.blobs)?;
        }
        Ok(handles)
    }

    /// Declare blobs inside the container named `container`.
    pub fn add_blobs(
        &mut self,
        tree: &mut ConstructTree,
        container: &str,
        blobs: &[BlobProps],
    ) -> ComposeResult<Vec<NodeId>> {
        let account_name = self.name(tree);
        let entry = self.containers.get_mut(container).ok_or_else(|| {
            ComposeError::UnresolvedReference {
                path: format!("{}/{}", tree.path(self.scope), container),
                attribute: "name".to_string(),
            }
        })?;
        let container_name = tree.reference(entry.node, "name");

        let handles = bind_fan_out(
            tree,
            entry.node,
            blobs,
            |b| b.name.clone(),
            |tree, owner, segment, b| {
                tree.create_node(
                    owner,
                    segment,
                    NodeType::resource("azurerm_storage_blob"),
                    Attributes::from([
                        ("name".to_string(), Value::from(&b.name)),
                        ("storage_account_name".to_string(), account_name.clone()),
                        ("storage_container_name".to_string(), container_name.clone()),
                        ("type".to_string(), Value::from(&b.blob_type)),
                        ("source".to_string(), Value::from(b.source.as_ref())),
                        ("content_type".to_string(), Value::from(&b.content_type)),
                        ("metadata".to_string(), tags_value(&b.metadata)),
                    ]),
                )
            },
        )?;
        for (b, node) in blobs.iter().zip(&handles) {
            entry.blobs.insert(b.name.clone(), *node);
        }
        Ok(handles)
    }

    /// Declare file shares under this account.
    pub fn add_file_shares(
        &mut self,
        tree: &mut ConstructTree,
        shares: &[FileShareProps],
    ) -> ComposeResult<Vec<NodeId>> {
        let account_name = self.name(tree);
        let handles = bind_fan_out(
            tree,
            self.scope,
            shares,
            |share| share.name.clone(),
            |tree, owner, segment, share| {
                tree.create_node(
                    owner,
                    segment,
                    NodeType::resource("azurerm_storage_share"),
                    Attributes::from([
                        ("name".to_string(), Value::from(&share.name)),
                        ("storage_account_name".to_string(), account_name.clone()),
                        ("quota".to_string(), Value::from(share.quota)),
                        ("access_tier".to_string(), Value::from(&share.access_tier)),
                        (
                            "enabled_protocol".to_string(),
                            Value::from(&share.enabled_protocol),
                        ),
                        ("acl".to_string(), acl_value(&share.acl)),
                        ("metadata".to_string(), tags_value(&share.metadata)),
                    ]),
                )
            },
        )?;
        for (share, node) in shares.iter().zip(&handles) {
            self.file_shares.insert(share.name.clone(), *node);
        }
        Ok(handles)
    }

    /// Declare queues under this account.
    pub fn add_queues(
        &mut self,
        tree: &mut ConstructTree,
        queues: &[QueueProps],
    ) -> ComposeResult<Vec<NodeId>> {
        let account_name = self.name(tree);
        let handles = bind_fan_out(
            tree,
            self.scope,
            queues,
            |q| q.name.clone(),
            |tree, owner, segment, q| {
                tree.create_node(
                    owner,
                    segment,
                    NodeType::resource("azurerm_storage_queue"),
                    Attributes::from([
                        ("name".to_string(), Value::from(&q.name)),
                        ("storage_account_name".to_string(), account_name.clone()),
                        ("metadata".to_string(), tags_value(&q.metadata)),
                    ]),
                )
            },
        )?;
        for (q, node) in queues.iter().zip(&handles) {
            self.queues.insert(q.name.clone(), *node);
        }
        Ok(handles)
    }

    /// Declare tables under this account.
    pub fn add_tables(
        &mut self,
        tree: &mut ConstructTree,
        tables: &[TableProps],
    ) -> ComposeResult<Vec<NodeId>> {
        let account_name = self.name(tree);
        let handles = bind_fan_out(
            tree,
            self.scope,
            tables,
            |t| t.name.clone(),
            |tree, owner, segment, t| {
                tree.create_node(
                    owner,
                    segment,
                    NodeType::resource("azurerm_storage_table"),
                    Attributes::from([
                        ("name".to_string(), Value::from(&t.name)),
                        ("storage_account_name".to_string(), account_name.clone()),
                        ("acl".to_string(), acl_value(&t.acl)),
                    ]),
                )
            },
        )?;
        for (t, node) in tables.iter().zip(&handles) {
            self.tables.insert(t.name.clone(), *node);
        }
        Ok(handles)
    }

    /// Attach the network rule set. An account holds at most one.
    pub fn add_network_rules(
        &mut self,
        tree: &mut ConstructTree,
        rules: &NetworkRulesProps,
    ) -> ComposeResult<NodeId> {
        let private_links = if rules.private_link_access.is_empty() {
            Value::Null
        } else {
            Value::list(rules.private_link_access.iter().map(|link| {
                Value::map([
                    ("endpoint_resource_id", Value::from(&link.endpoint_resource_id)),
                    ("endpoint_tenant_id", Value::from(link.endpoint_tenant_id.as_ref())),
                ])
            }))
        };
        let account_id = self.id(tree);
        let node = tree.create_node(
            self.scope,
            "rules",
            NodeType::resource("azurerm_storage_account_network_rules"),
            Attributes::from([
                ("storage_account_id".to_string(), account_id),
                ("default_action".to_string(), Value::from(&rules.default_action)),
                ("bypass".to_string(), list_or_null(&rules.bypass)),
                ("ip_rules".to_string(), list_or_null(&rules.ip_rules)),
                (
                    "virtual_network_subnet_ids".to_string(),
                    list_or_null(&rules.virtual_network_subnet_ids),
                ),
                ("private_link_access".to_string(), private_links),
            ]),
        )?;
        self.network_rules = Some(node);
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::StackContext;
    use serde_json::json;

    fn setup() -> (Stack, StorageAccount) {
        let mut s = Stack::new("demo", StackContext::placeholder()).unwrap();
        let root = s.root();
        let rg = ResourceGroupRef::existing("rg-data", "eastus");
        let account = StorageAccount::new(&mut s, root, "data", &rg, &StorageAccountProps::new("stdemo"))
            .unwrap();
        (s, account)
    }

    #[test]
    fn test_az023_account_defaults() {
        let (s, _) = setup();
        let doc = s.synthesize().unwrap();
        let account = doc.resource("demo/data/account").unwrap();
        assert_eq!(account.attributes["account_tier"], json!("Standard"));
        assert_eq!(account.attributes["account_replication_type"], json!("LRS"));
        assert_eq!(account.attributes["min_tls_version"], json!("TLS1_2"));
        assert_eq!(account.attributes["enable_https_traffic_only"], json!(true));
        assert_eq!(account.attributes["is_hns_enabled"], json!(true));
        assert_eq!(account.attributes["public_network_access_enabled"], json!(false));
        assert_eq!(account.api_version.as_ref().unwrap().resolved, "2024-01-01");

        let key = doc
            .outputs
            .iter()
            .find(|o| o.export_name == "demo/data/primary_access_key")
            .unwrap();
        assert!(key.sensitive);
    }

    #[test]
    fn test_az023_container_and_blob_defaults() {
        let (mut s, mut account) = setup();
        let mut container = ContainerProps::new("assets");
        container.blobs.push(BlobProps::new("logo.png", Some("./logo.png")));
        account.add_containers(&mut s.tree, &[container]).unwrap();

        let doc = s.synthesize().unwrap();
        let c = doc.resource("demo/data/assets").unwrap();
        assert_eq!(c.attributes["container_access_type"], json!("private"));
        assert_eq!(c.attributes["storage_account_name"], json!("stdemo"));
        let b = doc.resource("demo/data/assets/logo.png").unwrap();
        assert_eq!(b.attributes["type"], json!("Block"));
        assert_eq!(b.attributes["content_type"], json!("application/octet-stream"));
        assert_eq!(b.attributes["storage_container_name"], json!("assets"));
        assert_eq!(b.attributes["source"], json!("./logo.png"));
        assert!(account.containers["assets"].blobs.contains_key("logo.png"));
    }

    #[test]
    fn test_az023_duplicate_blob_names() {
        let (mut s, mut account) = setup();
        account
            .add_containers(&mut s.tree, &[ContainerProps::new("c")])
            .unwrap();
        let blobs: Vec<BlobProps> = ["a", "b", "a"]
            .iter()
            .map(|n| BlobProps::new(*n, None))
            .collect();
        match account.add_blobs(&mut s.tree, "c", &blobs).unwrap_err() {
            ComposeError::DuplicateIdentifier { segment, parent } => {
                assert_eq!(segment, "a");
                assert_eq!(parent, "demo/data/c");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(account.containers["c"].blobs.is_empty());
    }

    #[test]
    fn test_az023_duplicate_container() {
        let (mut s, mut account) = setup();
        account
            .add_containers(&mut s.tree, &[ContainerProps::new("c")])
            .unwrap();
        assert!(matches!(
            account.add_containers(&mut s.tree, &[ContainerProps::new("c")]),
            Err(ComposeError::DuplicateIdentifier { .. })
        ));
    }

    #[test]
    fn test_az023_blobs_for_unknown_container() {
        let (mut s, mut account) = setup();
        assert!(matches!(
            account.add_blobs(&mut s.tree, "ghost", &[BlobProps::new("a", None)]),
            Err(ComposeError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn test_az023_shares_queues_tables() {
        let (mut s, mut account) = setup();
        let mut share = FileShareProps::new("docs");
        share.acl.push(AclEntry {
            id: "read-only".into(),
            permissions: "rl".into(),
            start: None,
            expiry: Some("2030-01-01T00:00:00Z".into()),
        });
        account.add_file_shares(&mut s.tree, &[share]).unwrap();
        account
            .add_queues(&mut s.tree, &[QueueProps::new("jobs")])
            .unwrap();
        account
            .add_tables(&mut s.tree, &[TableProps::new("events")])
            .unwrap();
        assert!(account.file_shares.contains_key("docs"));
        assert!(account.queues.contains_key("jobs"));
        assert!(account.tables.contains_key("events"));

        let doc = s.synthesize().unwrap();
        let share = doc.resource("demo/data/docs").unwrap();
        assert_eq!(share.resource_type, "azurerm_storage_share");
        assert_eq!(share.attributes["quota"], json!(1024));
        assert_eq!(share.attributes["enabled_protocol"], json!("SMB"));
        assert_eq!(
            share.attributes["acl"],
            json!([{ "id": "read-only", "access_policy": [{ "permissions": "rl", "expiry": "2030-01-01T00:00:00Z" }] }])
        );
        let queue = doc.resource("demo/data/jobs").unwrap();
        assert_eq!(queue.attributes["storage_account_name"], json!("stdemo"));
        let table = doc.resource("demo/data/events").unwrap();
        assert_eq!(table.resource_type, "azurerm_storage_table");
        assert!(!table.attributes.contains_key("acl"));
    }

    #[test]
    fn test_az023_child_names_shared_across_kinds() {
        let (mut s, mut account) = setup();
        account
            .add_containers(&mut s.tree, &[ContainerProps::new("logs")])
            .unwrap();
        assert!(matches!(
            account.add_queues(&mut s.tree, &[QueueProps::new("logs")]),
            Err(ComposeError::DuplicateIdentifier { ref segment, .. }) if segment == "logs"
        ));
        assert!(account.queues.is_empty());
    }

    #[test]
    fn test_az023_network_rules() {
        let (mut s, mut account) = setup();
        let rules = NetworkRulesProps {
            bypass: vec!["AzureServices".into()],
            ip_rules: vec!["1.2.3.4/32".into()],
            ..NetworkRulesProps::default()
        };
        account.add_network_rules(&mut s.tree, &rules).unwrap();
        assert!(matches!(
            account.add_network_rules(&mut s.tree, &rules),
            Err(ComposeError::DuplicateIdentifier { .. })
        ));

        let doc = s.synthesize().unwrap();
        let block = doc.resource("demo/data/rules").unwrap();
        assert_eq!(block.attributes["default_action"], json!("Deny"));
        assert_eq!(block.attributes["bypass"], json!(["AzureServices"]));
        assert_eq!(block.attributes["ip_rules"], json!(["1.2.3.4/32"]));
        assert!(!block.attributes.contains_key("virtual_network_subnet_ids"));
        assert!(block.attributes["storage_account_id"]
            .as_str()
            .unwrap()
            .starts_with("${azurerm_storage_account.data_account_"));
    }

    #[test]
    fn test_az023_children_depend_on_account() {
        let (mut s, mut account) = setup();
        account
            .add_containers(&mut s.tree, &[ContainerProps::new("assets")])
            .unwrap();
        let doc = s.synthesize().unwrap();
        let account_key = format!(
            "azurerm_storage_account.{}",
            doc.resource("demo/data/account").unwrap().logical_id
        );
        let container = doc.resource("demo/data/assets").unwrap();
        assert_eq!(container.attributes["storage_account_name"], json!("stdemo"));
        assert_eq!(container.depends_on, vec![account_key]);
    }
}
