//! AZ-025: Linux or Windows virtual machine with its network interface.
//!
//! When no network is passed, the machine gets its own `vnet-<name>` with
//! the default subnet, declared under the machine's scope. Windows machines
//! authenticate with a password only.

use super::network::{Network, NetworkProps};
use super::resource_group::ResourceGroupRef;
use super::{default_api_version, export_all, pin_version, tags_value, Export};
use crate::core::error::{ComposeError, ComposeResult};
use crate::core::stack::Stack;
use crate::core::tree::ConstructTree;
use crate::core::types::*;
use crate::core::versions::resource_types::VIRTUAL_MACHINE;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Extensions granting Entra ID login.
const AAD_SSH_EXTENSION: &str = "AADSSHLoginForLinux";
const AAD_WINDOWS_EXTENSION: &str = "AADLoginForWindows";

/// Renames the delivered custom data to a script and runs it.
const BOOTSTRAP_COMMAND: &str = r#"{"commandToExecute": "rename C:\\AzureData\\CustomData.bin postdeploy.ps1 & powershell -ExecutionPolicy Unrestricted -File C:\\AzureData\\postdeploy.ps1"}"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    #[default]
    Linux,
    Windows,
}

impl OsType {
    fn resource_type(self) -> &'static str {
        match self {
            Self::Linux => "azurerm_linux_virtual_machine",
            Self::Windows => "azurerm_windows_virtual_machine",
        }
    }

    fn login_extension(self) -> &'static str {
        match self {
            Self::Linux => AAD_SSH_EXTENSION,
            Self::Windows => AAD_WINDOWS_EXTENSION,
        }
    }
}

fn default_size() -> String {
    "Standard_B2s".to_string()
}

fn default_admin_username() -> String {
    "azureadmin".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OsDiskProps {
    #[serde(default = "default_caching")]
    pub caching: String,
    #[serde(default = "default_disk_type")]
    pub storage_account_type: String,
    #[serde(default)]
    pub disk_size_gb: Option<u32>,
}

fn default_caching() -> String {
    "ReadWrite".to_string()
}

fn default_disk_type() -> String {
    "Standard_LRS".to_string()
}

impl Default for OsDiskProps {
    fn default() -> Self {
        Self {
            caching: default_caching(),
            storage_account_type: default_disk_type(),
            disk_size_gb: None,
        }
    }
}

/// Marketplace image. Defaults to Ubuntu 22.04 LTS (gen2) on Linux and
/// Windows Server 2022 Datacenter Core on Windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    #[serde(default = "default_image_version")]
    pub version: String,
}

fn default_image_version() -> String {
    "latest".to_string()
}

impl ImageReference {
    pub fn ubuntu_22_04() -> Self {
        Self {
            publisher: "Canonical".to_string(),
            offer: "0001-com-ubuntu-server-jammy".to_string(),
            sku: "22_04-lts-gen2".to_string(),
            version: default_image_version(),
        }
    }

    pub fn windows_server_2022_datacenter_core() -> Self {
        Self {
            publisher: "MicrosoftWindowsServer".to_string(),
            offer: "WindowsServer".to_string(),
            sku: "2022-datacenter-core".to_string(),
            version: default_image_version(),
        }
    }

    pub fn default_for(os: OsType) -> Self {
        match os {
            OsType::Linux => Self::ubuntu_22_04(),
            OsType::Windows => Self::windows_server_2022_datacenter_core(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VirtualMachineProps {
    /// Defaults to the unit id
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub os_type: OsType,
    #[serde(default = "default_size")]
    pub size: String,
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    #[serde(default)]
    pub ssh_public_key: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
    /// Subnet of the attached network. Defaults to its first subnet.
    #[serde(default)]
    pub subnet: Option<String>,
    #[serde(default)]
    pub public_ip: bool,
    #[serde(default)]
    pub os_disk: OsDiskProps,
    /// Defaults to the image for `os_type`
    #[serde(default)]
    pub source_image: Option<ImageReference>,
    /// Plain text; emitted base64-encoded
    #[serde(default)]
    pub custom_data: Option<String>,
    /// Plain text; emitted base64-encoded
    #[serde(default)]
    pub user_data: Option<String>,
    /// Windows only: delivered as custom data and run by a script extension
    #[serde(default)]
    pub bootstrap_custom_data: Option<String>,
    /// Unset uses managed boot diagnostics storage
    #[serde(default)]
    pub boot_diagnostics_storage_uri: Option<String>,
    /// Install the Entra ID login extension for the OS
    #[serde(default)]
    pub aad_ssh_login: bool,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub tags: IndexMap<String, String>,
}

impl Default for VirtualMachineProps {
    fn default() -> Self {
        Self {
            name: None,
            location: None,
            os_type: OsType::default(),
            size: default_size(),
            admin_username: default_admin_username(),
            ssh_public_key: None,
            admin_password: None,
            subnet: None,
            public_ip: false,
            os_disk: OsDiskProps::default(),
            source_image: None,
            custom_data: None,
            user_data: None,
            bootstrap_custom_data: None,
            boot_diagnostics_storage_uri: None,
            aad_ssh_login: false,
            api_version: default_api_version(),
            tags: IndexMap::new(),
        }
    }
}

fn encoded(text: Option<&String>) -> Value {
    Value::from(text.map(|t| STANDARD.encode(t.as_bytes())))
}

#[derive(Debug, Clone)]
pub struct VirtualMachine {
    pub scope: NodeId,
    pub vm: NodeId,
    pub nic: NodeId,
    pub public_ip: Option<NodeId>,
    pub extension: Option<NodeId>,
    pub script_extension: Option<NodeId>,
    /// Network created for this machine when none was passed
    pub network: Option<Network>,
}

impl VirtualMachine {
    pub fn new(
        stack: &mut Stack,
        parent: NodeId,
        id: &str,
        rg: &ResourceGroupRef,
        network: Option<&Network>,
        props: &VirtualMachineProps,
    ) -> ComposeResult<Self> {
        let os = props.os_type;
        if os == OsType::Windows && props.admin_password.is_none() {
            return Err(ComposeError::InvalidProperty {
                path: format!("{}/{}", stack.tree.path(parent), id),
                property: "admin_password".to_string(),
                reason: "required for windows machines".to_string(),
            });
        }
        if os == OsType::Linux && props.bootstrap_custom_data.is_some() {
            return Err(ComposeError::InvalidProperty {
                path: format!("{}/{}", stack.tree.path(parent), id),
                property: "bootstrap_custom_data".to_string(),
                reason: "only supported on windows machines".to_string(),
            });
        }
        let scope = stack.tree.create_scope(parent, id)?;
        let name = props.name.clone().unwrap_or_else(|| id.to_string());
        let location = rg.location_or(props.location.as_ref());

        let own_network = match network {
            Some(_) => None,
            None => {
                let net_props = NetworkProps {
                    name: Some(format!("vnet-{}", name)),
                    location: props.location.clone(),
                    ..NetworkProps::default()
                };
                Some(Network::new(stack, scope, "network", rg, &net_props)?)
            }
        };
        let Some(net) = network.or(own_network.as_ref()) else {
            return Err(ComposeError::StackFile(format!("no network for '{}'", id)));
        };
        let subnet_id = match &props.subnet {
            Some(subnet) => net.subnet_id(&stack.tree, subnet),
            None => net.default_subnet().map(|s| stack.tree.reference(s, "id")),
        }
        .ok_or_else(|| ComposeError::UnresolvedReference {
            path: stack.tree.path(net.scope).to_string(),
            attribute: props.subnet.clone().unwrap_or_default(),
        })?;

        let tree = &mut stack.tree;
        let public_ip = if props.public_ip {
            Some(tree.create_node(
                scope,
                "public_ip",
                NodeType::resource("azurerm_public_ip"),
                Attributes::from([
                    ("name".to_string(), Value::from(format!("pip-{}", name))),
                    ("resource_group_name".to_string(), rg.name.clone()),
                    ("location".to_string(), location.clone()),
                    ("allocation_method".to_string(), Value::from("Static")),
                    ("sku".to_string(), Value::from("Standard")),
                ]),
            )?)
        } else {
            None
        };

        let mut ip_configuration = IndexMap::from([
            ("name".to_string(), Value::from("internal")),
            ("subnet_id".to_string(), subnet_id),
            (
                "private_ip_address_allocation".to_string(),
                Value::from("Dynamic"),
            ),
        ]);
        if let Some(pip) = public_ip {
            ip_configuration.insert("public_ip_address_id".to_string(), tree.reference(pip, "id"));
        }
        let nic = tree.create_node(
            scope,
            "nic",
            NodeType::resource("azurerm_network_interface"),
            Attributes::from([
                ("name".to_string(), Value::from(format!("nic-{}", name))),
                ("resource_group_name".to_string(), rg.name.clone()),
                ("location".to_string(), location.clone()),
                ("ip_configuration".to_string(), Value::Map(ip_configuration)),
            ]),
        )?;

        let (admin_ssh_key, disable_password_authentication) = match os {
            OsType::Linux => (
                props.ssh_public_key.as_ref().map_or(Value::Null, |key| {
                    Value::list([Value::map([
                        ("username", props.admin_username.as_str()),
                        ("public_key", key.as_str()),
                    ])])
                }),
                Value::from(props.admin_password.is_none()),
            ),
            OsType::Windows => (Value::Null, Value::Null),
        };
        let os_disk = Value::map([
            ("caching", Value::from(&props.os_disk.caching)),
            (
                "storage_account_type",
                Value::from(&props.os_disk.storage_account_type),
            ),
            ("disk_size_gb", Value::from(props.os_disk.disk_size_gb)),
        ]);
        let image = props
            .source_image
            .clone()
            .unwrap_or_else(|| ImageReference::default_for(os));
        let custom_data = props.custom_data.as_ref().or(props.bootstrap_custom_data.as_ref());
        let vm = tree.create_node(
            scope,
            "vm",
            NodeType::resource(os.resource_type()),
            Attributes::from([
                ("name".to_string(), Value::from(&name)),
                ("resource_group_name".to_string(), rg.name.clone()),
                ("location".to_string(), location),
                ("size".to_string(), Value::from(&props.size)),
                ("admin_username".to_string(), Value::from(&props.admin_username)),
                ("admin_password".to_string(), Value::from(props.admin_password.as_ref())),
                (
                    "disable_password_authentication".to_string(),
                    disable_password_authentication,
                ),
                (
                    "network_interface_ids".to_string(),
                    Value::list([tree.reference(nic, "id")]),
                ),
                ("admin_ssh_key".to_string(), admin_ssh_key),
                ("os_disk".to_string(), os_disk),
                (
                    "source_image_reference".to_string(),
                    Value::map([
                        ("publisher", image.publisher.as_str()),
                        ("offer", image.offer.as_str()),
                        ("sku", image.sku.as_str()),
                        ("version", image.version.as_str()),
                    ]),
                ),
                ("custom_data".to_string(), encoded(custom_data)),
                ("user_data".to_string(), encoded(props.user_data.as_ref())),
                (
                    "boot_diagnostics".to_string(),
                    Value::map([(
                        "storage_account_uri",
                        Value::from(props.boot_diagnostics_storage_uri.as_ref()),
                    )]),
                ),
                ("tags".to_string(), tags_value(&props.tags)),
            ]),
        )?;
        pin_version(tree, vm, VIRTUAL_MACHINE, &props.api_version)?;

        let extension = if props.aad_ssh_login {
            let extension = os.login_extension();
            Some(tree.create_node(
                scope,
                "aad_ssh_login",
                NodeType::resource("azurerm_virtual_machine_extension"),
                Attributes::from([
                    ("name".to_string(), Value::from(extension)),
                    ("virtual_machine_id".to_string(), tree.reference(vm, "id")),
                    (
                        "publisher".to_string(),
                        Value::from("Microsoft.Azure.ActiveDirectory"),
                    ),
                    ("type".to_string(), Value::from(extension)),
                    ("type_handler_version".to_string(), Value::from("1.0")),
                    ("tags".to_string(), tags_value(&props.tags)),
                ]),
            )?)
        } else {
            None
        };

        let script_extension = match &props.bootstrap_custom_data {
            Some(_) => Some(tree.create_node(
                scope,
                "script_ext",
                NodeType::resource("azurerm_virtual_machine_extension"),
                Attributes::from([
                    ("name".to_string(), Value::from(format!("{}-script-ext", name))),
                    ("virtual_machine_id".to_string(), tree.reference(vm, "id")),
                    ("publisher".to_string(), Value::from("Microsoft.Compute")),
                    ("type".to_string(), Value::from("CustomScriptExtension")),
                    ("type_handler_version".to_string(), Value::from("1.10")),
                    ("protected_settings".to_string(), Value::from(BOOTSTRAP_COMMAND)),
                ]),
            )?),
            None => None,
        };

        let machine = Self {
            scope,
            vm,
            nic,
            public_ip,
            extension,
            script_extension,
            network: own_network,
        };
        let t = &stack.tree;
        let mut exports = vec![
            Export::new("id", machine.id(t)),
            Export::new("name", t.reference(vm, "name")),
            Export::new("private_ip", machine.private_ip(t)),
        ];
        if let Some(pip) = public_ip {
            exports.push(Export::new("public_ip", t.reference(pip, "ip_address")));
        }
        export_all(stack, scope, exports)?;
        Ok(machine)
    }

    pub fn id(&self, tree: &ConstructTree) -> Value {
        tree.reference(self.vm, "id")
    }

    pub fn private_ip(&self, tree: &ConstructTree) -> Value {
        tree.reference(self.nic, "private_ip_address")
    }
}
