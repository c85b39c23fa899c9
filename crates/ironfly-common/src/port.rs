//! Ports and portgroups: the network interfaces of a node.
//!
//! Both reference their owning node by `node_id`; there are no back
//! references. The backend's interface id lives in `extra["vif_port_id"]`,
//! with `extra["tenant_vif_port_id"]` holding the saved tenant id while a
//! provisioning network is attached.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::node::{new_id, Extra};

/// Key of the active backend interface id in `extra`
pub const VIF_PORT_ID: &str = "vif_port_id";
/// Key of the saved tenant interface id in `extra`
pub const TENANT_VIF_PORT_ID: &str = "tenant_vif_port_id";

/// Normalize MAC address to lowercase with colons
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_lowercase().replace('-', ":")
}

/// Physical switch port a NIC is cabled to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalLinkConnection {
    pub switch_id: String,
    pub port_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_info: Option<String>,
}

impl LocalLinkConnection {
    pub fn new(switch_id: impl Into<String>, port_id: impl Into<String>) -> Self {
        Self {
            switch_id: switch_id.into(),
            port_id: port_id.into(),
            switch_info: None,
        }
    }

    pub fn with_switch_info(mut self, info: impl Into<String>) -> Self {
        self.switch_info = Some(info.into());
        self
    }
}

/// Accessors for the interface ids carried in an `extra` bag
pub trait VifCarrier {
    fn uuid(&self) -> Uuid;
    fn extra(&self) -> &Extra;
    fn extra_mut(&mut self) -> &mut Extra;

    fn vif_port_id(&self) -> Option<&str> {
        self.extra().get(VIF_PORT_ID).and_then(Value::as_str)
    }

    fn tenant_vif_port_id(&self) -> Option<&str> {
        self.extra().get(TENANT_VIF_PORT_ID).and_then(Value::as_str)
    }

    fn set_vif_port_id(&mut self, vif: impl Into<String>) {
        self.extra_mut()
            .insert(VIF_PORT_ID.to_string(), Value::String(vif.into()));
    }

    /// Move the active vif into the tenant backup slot, if there is one.
    fn backup_vif(&mut self) {
        if let Some(vif) = self.extra_mut().remove(VIF_PORT_ID) {
            if !vif.is_null() {
                self.extra_mut().insert(TENANT_VIF_PORT_ID.to_string(), vif);
            }
        }
    }

    /// Restore the backed-up tenant vif and clear the backup. Returns false if there was none.
    fn restore_vif(&mut self) -> bool {
        match self.extra_mut().remove(TENANT_VIF_PORT_ID) {
            Some(Value::String(vif)) if !vif.is_empty() => {
                self.set_vif_port_id(vif);
                true
            }
            _ => false,
        }
    }
}

/// A physical network interface of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub uuid: Uuid,
    pub node_id: Uuid,
    /// MAC address, unique across the fleet
    pub address: String,
    #[serde(default)]
    pub extra: Extra,
    pub local_link_connection: Option<LocalLinkConnection>,
    pub portgroup_id: Option<Uuid>,
    pub pxe_enabled: bool,
}

impl Port {
    pub fn new(node_id: Uuid, address: &str) -> Self {
        Self {
            uuid: new_id(),
            node_id,
            address: normalize_mac(address),
            extra: Extra::new(),
            local_link_connection: None,
            portgroup_id: None,
            pxe_enabled: true,
        }
    }

    pub fn with_local_link(mut self, llc: LocalLinkConnection) -> Self {
        self.local_link_connection = Some(llc);
        self
    }

    pub fn with_vif(mut self, vif: impl Into<String>) -> Self {
        self.set_vif_port_id(vif);
        self
    }

    pub fn with_portgroup(mut self, portgroup_id: Uuid) -> Self {
        self.portgroup_id = Some(portgroup_id);
        self
    }
}

impl VifCarrier for Port {
    fn uuid(&self) -> Uuid {
        self.uuid
    }
    fn extra(&self) -> &Extra {
        &self.extra
    }
    fn extra_mut(&mut self) -> &mut Extra {
        &mut self.extra
    }
}

/// A bonded group of ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portgroup {
    pub uuid: Uuid,
    pub node_id: Uuid,
    pub name: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    pub extra: Extra,
    pub standalone_ports_supported: bool,
}

impl Portgroup {
    pub fn new(node_id: Uuid) -> Self {
        Self {
            uuid: new_id(),
            node_id,
            name: None,
            address: None,
            extra: Extra::new(),
            standalone_ports_supported: true,
        }
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = Some(normalize_mac(address));
        self
    }

    pub fn with_vif(mut self, vif: impl Into<String>) -> Self {
        self.set_vif_port_id(vif);
        self
    }
}

impl VifCarrier for Portgroup {
    fn uuid(&self) -> Uuid {
        self.uuid
    }
    fn extra(&self) -> &Extra {
        &self.extra
    }
    fn extra_mut(&mut self) -> &mut Extra {
        &mut self.extra
    }
}
