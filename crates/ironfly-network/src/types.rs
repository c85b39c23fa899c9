//! Wire types for the network controller's port API
//!
//! Bodies are wrapped in a `{"port": {...}}` envelope. Binding attributes
//! use the controller's colon-namespaced keys.

use ironfly_common::LocalLinkConnection;
use serde::{Deserialize, Serialize};

/// Device owner tag marking a port as bare-metal managed
pub const BAREMETAL_DEVICE_OWNER: &str = "baremetal:none";
/// NIC type marker for bare-metal port binding
pub const BAREMETAL_VNIC_TYPE: &str = "baremetal";

/// One DHCP option as pushed to the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpOption {
    pub opt_name: String,
    /// `None` serializes as null, which asks the controller to drop the option
    pub opt_value: Option<String>,
}

impl DhcpOption {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            opt_name: name.into(),
            opt_value: Some(value.into()),
        }
    }

    /// An entry that removes `name` from a port
    pub fn clear(name: impl Into<String>) -> Self {
        Self {
            opt_name: name.into(),
            opt_value: None,
        }
    }
}

/// Switch binding profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BindingProfile {
    pub local_link_information: Vec<LocalLinkConnection>,
}

/// Attributes of a port create or update request. Unset fields are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PortBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(rename = "binding:vnic_type", skip_serializing_if = "Option::is_none")]
    pub vnic_type: Option<String>,
    #[serde(rename = "binding:host_id", skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(rename = "binding:profile", skip_serializing_if = "Option::is_none")]
    pub binding_profile: Option<BindingProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_dhcp_opts: Option<Vec<DhcpOption>>,
}

impl PortBody {
    /// Bind a port to a bare-metal host through `llc`.
    pub fn with_binding(mut self, host_id: impl Into<String>, llc: Option<&LocalLinkConnection>) -> Self {
        self.vnic_type = Some(BAREMETAL_VNIC_TYPE.to_string());
        self.host_id = Some(host_id.into());
        self.binding_profile = Some(BindingProfile {
            local_link_information: llc.cloned().into_iter().collect(),
        });
        self
    }

    pub fn dhcp_opts(opts: Vec<DhcpOption>) -> Self {
        Self {
            extra_dhcp_opts: Some(opts),
            ..Default::default()
        }
    }

    pub fn mac_address(mac: impl Into<String>) -> Self {
        Self {
            mac_address: Some(mac.into()),
            ..Default::default()
        }
    }
}

/// `{"port": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortEnvelope<T> {
    pub port: T,
}

/// Optional `{"port": ...}` in a create response
#[derive(Debug, Clone, Deserialize)]
pub struct MaybePortEnvelope {
    #[serde(default)]
    pub port: Option<NetworkPort>,
}

/// `{"ports": [...]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortsEnvelope {
    #[serde(default)]
    pub ports: Vec<NetworkPort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    #[serde(default)]
    pub subnet_id: String,
    pub ip_address: String,
}

/// A port as reported by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NetworkPort {
    /// Empty when the controller omitted it
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub network_id: String,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub device_owner: String,
    #[serde(default)]
    pub admin_state_up: bool,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    #[serde(default)]
    pub extra_dhcp_opts: Vec<DhcpOption>,
    #[serde(rename = "binding:host_id", default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(rename = "binding:vnic_type", default, skip_serializing_if = "Option::is_none")]
    pub vnic_type: Option<String>,
    #[serde(rename = "binding:profile", default, skip_serializing_if = "Option::is_none")]
    pub binding_profile: Option<BindingProfile>,
}

/// Query for listing ports
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PortFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
}

impl PortFilter {
    pub fn network(network_id: impl Into<String>) -> Self {
        Self {
            network_id: Some(network_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, port: &NetworkPort) -> bool {
        self.network_id.as_deref().map_or(true, |n| port.network_id == n)
            && self.device_id.as_deref().map_or(true, |d| port.device_id == d)
            && self
                .mac_address
                .as_deref()
                .map_or(true, |m| port.mac_address.eq_ignore_ascii_case(m))
    }
}
