//! Network-controller-backed provider
//!
//! Attach creates one controller port per node port, in port order, and
//! rolls back everything created so far if any request fails. Detach
//! deletes only the controller ports whose MAC belongs to the node.

use async_trait::async_trait;
use ironfly_common::{normalize_mac, Error, Result, VifCarrier};
use ironfly_task::Task;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

use crate::client::NetworkClient;
use crate::config::NetworkConfig;
use crate::provider::NetworkProvider;
use crate::types::{PortBody, PortFilter, BAREMETAL_DEVICE_OWNER};
use crate::vif::{get_node_portmap, VifMap};

/// Provider that drives ports on an external network controller.
///
/// With `binding` on, ports carry the bare-metal NIC type, the node as
/// binding host and a binding profile built from the port's local link
/// connection.
pub struct NeutronNetworkProvider {
    name: String,
    client: Arc<dyn NetworkClient>,
    provisioning_network: Option<String>,
    cleaning_network: Option<String>,
    binding: bool,
}

impl NeutronNetworkProvider {
    pub fn new(name: impl Into<String>, client: Arc<dyn NetworkClient>, config: &NetworkConfig, binding: bool) -> Self {
        Self {
            name: name.into(),
            client,
            provisioning_network: config.provisioning_network_uuid.clone(),
            cleaning_network: config.cleaning_network_uuid.clone(),
            binding,
        }
    }

    fn provisioning_network(&self) -> Result<&str> {
        self.provisioning_network.as_deref().ok_or_else(|| {
            Error::InvalidParameterValue(
                "Valid provisioning network UUID not provided (network.provisioning_network_uuid)".to_string(),
            )
        })
    }

    fn cleaning_network(&self) -> Result<&str> {
        self.cleaning_network.as_deref().ok_or_else(|| {
            Error::InvalidParameterValue(
                "Valid cleaning network UUID not provided (network.cleaning_network_uuid)".to_string(),
            )
        })
    }

    /// Create a controller port on `network_id` for every node port.
    async fn add_network(&self, task: &Task, network_id: &str) -> Result<VifMap> {
        let node = task.node();
        info!(provider = %self.name, node = %node.uuid, network = %network_id, "Attaching node to network");

        let base = PortBody {
            network_id: Some(network_id.to_string()),
            admin_state_up: Some(true),
            device_owner: Some(BAREMETAL_DEVICE_OWNER.to_string()),
            device_id: node.instance_uuid.map(|u| u.to_string()),
            ..Default::default()
        };

        let mut created = VifMap::new();
        for port in task.ports() {
            let mut body = base.clone();
            body.mac_address = Some(port.address.clone());
            if self.binding {
                body = body.with_binding(node.uuid.to_string(), port.local_link_connection.as_ref());
            }

            let reason = match self.client.create_port(&body).await {
                Ok(Some(created_port)) if !created_port.id.is_empty() => {
                    created.insert(port.uuid, created_port.id);
                    continue;
                }
                Ok(_) => format!(
                    "Failed to create port on given network {} from {}.",
                    network_id, node.uuid
                ),
                Err(e) => format!(
                    "Could not create port on given network {} from {}. {}",
                    network_id, node.uuid, e
                ),
            };

            error!(node = %node.uuid, network = %network_id, port = %port.uuid, "{}", reason);
            self.rollback(task, network_id).await;
            return Err(Error::Network(reason));
        }
        Ok(created)
    }

    /// Delete the node's ports from `network_id`, swallowing failures.
    async fn rollback(&self, task: &Task, network_id: &str) {
        if let Err(e) = self.remove_network(task, network_id).await {
            error!(
                node = %task.node().uuid,
                network = %network_id,
                error = %e,
                "Failed to roll back ports after attach failure"
            );
        }
    }

    /// Delete every controller port on `network_id` whose MAC belongs to the node.
    async fn remove_network(&self, task: &Task, network_id: &str) -> Result<()> {
        let node = task.node();
        let macs: HashSet<String> = task.ports().iter().map(|p| normalize_mac(&p.address)).collect();

        let ports = self
            .client
            .list_ports(&PortFilter::network(network_id))
            .await
            .map_err(|e| {
                Error::Network(format!(
                    "Could not get given network vif for {} from the network controller, possible network issue. {}",
                    node.uuid, e
                ))
            })?;

        for controller_port in ports {
            if !macs.contains(&normalize_mac(&controller_port.mac_address)) {
                continue;
            }
            self.client.delete_port(&controller_port.id).await.map_err(|e| {
                Error::Network(format!(
                    "Could not remove ports on given network {} from {}, possible network issue. {}",
                    network_id, node.uuid, e
                ))
            })?;
        }
        info!(provider = %self.name, node = %node.uuid, network = %network_id, "Detached node from network");
        Ok(())
    }
}

#[async_trait]
impl NetworkProvider for NeutronNetworkProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add_provisioning_network(&self, task: &mut Task) -> Result<()> {
        let network_id = self.provisioning_network()?.to_string();
        if task.is_shared() {
            return Err(Error::ExclusiveLockRequired(task.node().uuid.to_string()));
        }

        info!(node = %task.node().uuid, "Adding provisioning network to node");
        let prov_ports = self.add_network(task, &network_id).await?;

        if let Some(missing) = task.ports().iter().find(|p| !prov_ports.contains_key(&p.uuid)) {
            let reason = format!(
                "When creating provisioning ports, the network controller didn't return VIF port ID for {}",
                missing.uuid
            );
            error!(node = %task.node().uuid, "{}", reason);
            self.rollback(task, &network_id).await;
            return Err(Error::Network(reason));
        }

        for index in 0..task.ports().len() {
            let port = &mut task.ports_mut()?[index];
            port.backup_vif();
            if let Some(vif) = prov_ports.get(&port.uuid) {
                port.set_vif_port_id(vif.clone());
            }
            task.save_port(index).await?;
        }
        Ok(())
    }

    async fn remove_provisioning_network(&self, task: &mut Task) -> Result<()> {
        let network_id = self.provisioning_network()?.to_string();
        if task.is_shared() {
            return Err(Error::ExclusiveLockRequired(task.node().uuid.to_string()));
        }

        info!(node = %task.node().uuid, "Removing provisioning network from node");
        self.remove_network(task, &network_id).await?;

        for index in 0..task.ports().len() {
            if task.ports_mut()?[index].restore_vif() {
                task.save_port(index).await?;
            }
        }
        Ok(())
    }

    async fn configure_tenant_networks(&self, task: &mut Task) -> Result<()> {
        let node = task.node();
        info!(node = %node.uuid, "Mapping instance ports to node");

        let portmap = get_node_portmap(task);
        if portmap.is_empty() {
            return Err(Error::NoValidPortmaps(node.uuid.to_string()));
        }

        for port in task.ports() {
            let Some(vif) = port.vif_port_id() else {
                error!(node = %node.uuid, port = %port.uuid, "Port has no VIF; skipping tenant binding");
                continue;
            };
            let Some(llc) = portmap.get(&port.uuid) else {
                error!(node = %node.uuid, port = %port.uuid, vif = %vif, "Port has no switch mapping; skipping tenant binding");
                continue;
            };

            let mut body = PortBody {
                device_owner: Some(BAREMETAL_DEVICE_OWNER.to_string()),
                device_id: node.instance_uuid.map(|u| u.to_string()),
                admin_state_up: Some(true),
                ..Default::default()
            };
            if self.binding {
                body = body.with_binding(node.uuid.to_string(), Some(llc));
            }

            self.client.update_port(vif, &body).await.map_err(|e| {
                let msg = format!(
                    "Could not add public network VIF {} to node {}, possible network issue. {}",
                    vif, node.uuid, e
                );
                error!(node = %node.uuid, vif = %vif, "{}", msg);
                Error::Network(msg)
            })?;
        }
        Ok(())
    }

    async fn unconfigure_tenant_networks(&self, _task: &mut Task) -> Result<()> {
        // tenant ports are torn down by whoever created the instance
        Ok(())
    }

    async fn add_cleaning_network(&self, task: &mut Task) -> Result<VifMap> {
        let network_id = self.cleaning_network()?.to_string();
        info!(node = %task.node().uuid, "Adding cleaning network to node");
        self.add_network(task, &network_id).await
    }

    async fn remove_cleaning_network(&self, task: &mut Task) -> Result<()> {
        let network_id = self.cleaning_network()?.to_string();
        self.remove_network(task, &network_id).await
    }
}
