//! VIF and switch-port mapping over a task's ports

use ironfly_common::{LocalLinkConnection, VifCarrier};
use ironfly_task::Task;
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

/// Port or portgroup uuid -> backend interface id
pub type VifMap = BTreeMap<Uuid, String>;

/// Port uuid -> switch port descriptor
pub type Portmap = BTreeMap<Uuid, LocalLinkConnection>;

/// Every VIF on the node: portgroups first, then ports.
pub fn get_node_vif_ids(task: &Task) -> VifMap {
    let mut vifs = VifMap::new();
    for group in task.portgroups() {
        if let Some(vif) = group.vif_port_id() {
            vifs.insert(group.uuid, vif.to_string());
        }
    }
    for port in task.ports() {
        if let Some(vif) = port.vif_port_id() {
            vifs.insert(port.uuid, vif.to_string());
        }
    }
    vifs
}

/// Switch port of every node port that has one. Ports without a local
/// link connection are left out.
pub fn get_node_portmap(task: &Task) -> Portmap {
    let mut portmap = Portmap::new();
    for port in task.ports() {
        match &port.local_link_connection {
            Some(llc) => {
                portmap.insert(port.uuid, llc.clone());
            }
            None => warn!(
                node = %task.node().uuid,
                port = %port.uuid,
                "Port has no local link connection"
            ),
        }
    }
    portmap
}
