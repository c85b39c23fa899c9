//! The conductor action layer
//!
//! Composes the lock manager, network providers, DHCP coordinator and
//! power driver into the flows a conductor runs for a node:
//!
//! ```text
//! available ─"active"─► deploying ──prepare_deploy──► (boot ramdisk) ──finish_deploy──► active
//! active ─"deleted"─► deleting ──tear_down + clean_up──► cleaning ──prepare_cleaning──► clean-wait
//! clean-wait ─resume─► cleaning ──tear_down_cleaning──► available
//! ```
//!
//! Flow methods take a [`Task`] the caller already holds; the
//! `ident`-taking methods acquire and release their own lock.

use ironfly_common::{
    check_power_request, check_provision_request, Error, Event, NodeRecord, PowerState,
    ProvisionRequest, ProvisionState, Result, Transition,
};
use ironfly_dhcp::{pxe_boot_options, DhcpFactory, PxeConfig};
use ironfly_network::{NetworkClient, NetworkProvider, ProviderRegistry};
use ironfly_store::{SharedStore, Store};
use ironfly_task::{Task, TaskManager, WorkerPool};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::power::{node_power_action, PowerDriver};

/// Key under which a requested config drive is kept in `instance_info`
pub const CONFIGDRIVE_KEY: &str = "configdrive";

pub struct Conductor {
    tasks: TaskManager,
    networks: ProviderRegistry,
    dhcp: Arc<DhcpFactory>,
    power: Arc<dyn PowerDriver>,
    pxe: PxeConfig,
}

impl Conductor {
    pub fn new(
        tasks: TaskManager,
        networks: ProviderRegistry,
        dhcp: Arc<DhcpFactory>,
        power: Arc<dyn PowerDriver>,
    ) -> Self {
        Self {
            tasks,
            networks,
            dhcp,
            power,
            pxe: PxeConfig::default(),
        }
    }

    /// Wire a conductor from config around a store, a network controller and a power driver.
    pub fn from_config(
        config: &Config,
        store: SharedStore,
        client: Arc<dyn NetworkClient>,
        power: Arc<dyn PowerDriver>,
    ) -> Self {
        let tasks = TaskManager::new(store, config.conductor.host.clone())
            .with_worker_pool(WorkerPool::new(config.conductor.workers_pool_size))
            .with_retry_policy(config.conductor.retry_policy());
        let networks = ProviderRegistry::new(client.clone(), config.network.clone());
        let dhcp = Arc::new(DhcpFactory::new(config.dhcp.clone(), client));
        Self::new(tasks, networks, dhcp, power).with_pxe(config.pxe.clone())
    }

    pub fn with_pxe(mut self, pxe: PxeConfig) -> Self {
        self.pxe = pxe;
        self
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    pub fn networks(&self) -> &ProviderRegistry {
        &self.networks
    }

    pub fn dhcp(&self) -> &Arc<DhcpFactory> {
        &self.dhcp
    }

    pub fn power(&self) -> &Arc<dyn PowerDriver> {
        &self.power
    }

    fn network_provider(&self, task: &Task) -> Result<Arc<dyn NetworkProvider>> {
        self.networks.get_network_provider(task.node())
    }

    /// Validate a provisioning request, then apply it under an exclusive lock.
    ///
    /// The request is checked against the stored node first so that a busy
    /// node reports who holds it. Under the lock it is checked again, since
    /// the node may have moved while we waited. On success `last_error` is
    /// cleared and the new state and target are persisted.
    pub async fn do_provisioning_action(&self, ident: &str, request: &ProvisionRequest) -> Result<Transition> {
        let node = self.tasks.store().get_node(ident).await?;
        check_provision_request(&node, request)?;

        let mut task = self.tasks.acquire_with_retry(ident, &request.verb).await?;
        let result = self.apply_provision_request(&mut task, request).await;
        finish(task, result).await
    }

    async fn apply_provision_request(&self, task: &mut Task, request: &ProvisionRequest) -> Result<Transition> {
        // The reservation is ours now; judge the request on the node alone.
        let mut snapshot = task.node().clone();
        snapshot.reservation = None;
        let event = check_provision_request(&snapshot, request)?;

        let transition = task.process_event(event)?;
        let node = task.node_mut()?;
        node.last_error = None;
        match &request.configdrive {
            Some(configdrive) => {
                node.instance_info
                    .insert(CONFIGDRIVE_KEY.to_string(), Value::String(configdrive.clone()));
            }
            None if event == Event::Deploy => {
                node.instance_info.remove(CONFIGDRIVE_KEY);
            }
            None => {}
        }
        task.save_node().await?;

        info!(
            node = %task.node().uuid,
            verb = %request.verb,
            from = %transition.from,
            to = %transition.to,
            "Accepted provisioning request"
        );
        Ok(transition)
    }

    /// Get the node ready to boot the deploy ramdisk.
    ///
    /// Powers the node off, moves it onto the provisioning network and
    /// points its DHCP at the boot file. A node that is already `active`
    /// is being taken over and needs nothing. Failure moves the node to
    /// `deploy-failed`.
    pub async fn prepare_deploy(&self, task: &mut Task) -> Result<()> {
        if task.node().provision_state == ProvisionState::Active {
            debug!(node = %task.node().uuid, "Node already active, nothing to prepare");
            return Ok(());
        }

        let result = async {
            node_power_action(task, self.power.as_ref(), PowerState::Off).await?;
            self.network_provider(task)?.add_provisioning_network(task).await?;
            self.dhcp.update_dhcp(task, &pxe_boot_options(&self.pxe), None).await
        }
        .await;

        if let Err(e) = result {
            let msg = format!("Failed to prepare to deploy node {}. Error: {}", task.node().uuid, e);
            self.fail_provisioning(task, &msg).await;
            return Err(e);
        }
        info!(node = %task.node().uuid, "Prepared node for deployment");
        Ok(())
    }

    /// Boot the freshly written node into its tenant network.
    ///
    /// Powers off, swaps the provisioning network for the tenant
    /// networks, powers on and completes the deploy. A node still waiting
    /// for its ramdisk callback is resumed first. Failure moves the node to
    /// `deploy-failed`.
    pub async fn finish_deploy(&self, task: &mut Task) -> Result<Transition> {
        if task.node().provision_state == ProvisionState::WaitCallback {
            task.process_event(Event::Resume)?;
        }

        let result = async {
            node_power_action(task, self.power.as_ref(), PowerState::Off).await?;
            let provider = self.network_provider(task)?;
            provider.remove_provisioning_network(task).await?;
            provider.configure_tenant_networks(task).await?;
            node_power_action(task, self.power.as_ref(), PowerState::On).await
        }
        .await;

        if let Err(e) = result {
            let msg = format!("Error rebooting node {} after deploy. Error: {}", task.node().uuid, e);
            self.fail_provisioning(task, &msg).await;
            return Err(e);
        }

        let transition = task.process_event(Event::Done)?;
        task.save_node().await?;
        info!(node = %task.node().uuid, "Deployment finished");
        Ok(transition)
    }

    /// Power the node off and drop it from the provisioning network.
    ///
    /// An `active` node was never left on the provisioning network, so only
    /// the power change applies. Returns the state the deploy is now in.
    pub async fn tear_down(&self, task: &mut Task) -> Result<ProvisionState> {
        node_power_action(task, self.power.as_ref(), PowerState::Off).await?;
        if task.node().provision_state != ProvisionState::Active {
            self.network_provider(task)?.remove_provisioning_network(task).await?;
        }
        info!(node = %task.node().uuid, "Tore down deployment");
        Ok(ProvisionState::Deleted)
    }

    /// Remove the boot options the deploy pushed. Works under a shared lock.
    pub async fn clean_up(&self, task: &Task) -> Result<()> {
        self.dhcp.clean_dhcp(task).await
    }

    /// Put the node on the cleaning network and reboot it into the ramdisk.
    ///
    /// DHCP options go to the new cleaning ports rather than the VIFs
    /// recorded on the node. Returns `clean-wait`: the node now waits for
    /// its ramdisk to call back. Failure takes the node back off the
    /// cleaning network and moves it to `clean-failed`.
    pub async fn prepare_cleaning(&self, task: &mut Task) -> Result<ProvisionState> {
        let provider = match self.network_provider(task) {
            Ok(provider) => provider,
            Err(e) => return Err(self.fail_cleaning(task, e).await),
        };
        let vifs = match provider.add_cleaning_network(task).await {
            Ok(vifs) => vifs,
            Err(e) => return Err(self.fail_cleaning(task, e).await),
        };

        let result = async {
            self.dhcp
                .update_dhcp(task, &pxe_boot_options(&self.pxe), Some(vifs))
                .await?;
            node_power_action(task, self.power.as_ref(), PowerState::Rebooting).await
        }
        .await;

        if let Err(e) = result {
            // attach succeeded; don't leave its ports behind
            if let Err(cleanup) = provider.remove_cleaning_network(task).await {
                warn!(node = %task.node().uuid, error = %cleanup, "Failed to remove cleaning network after failure");
            }
            return Err(self.fail_cleaning(task, e).await);
        }
        info!(node = %task.node().uuid, "Prepared node for cleaning");
        Ok(ProvisionState::CleanWait)
    }

    async fn fail_cleaning(&self, task: &mut Task, e: Error) -> Error {
        let msg = format!("Failed to prepare node {} for cleaning. Error: {}", task.node().uuid, e);
        self.fail_provisioning(task, &msg).await;
        e
    }

    pub async fn tear_down_cleaning(&self, task: &mut Task) -> Result<()> {
        node_power_action(task, self.power.as_ref(), PowerState::Off).await?;
        self.network_provider(task)?.remove_cleaning_network(task).await?;
        info!(node = %task.node().uuid, "Tore down cleaning");
        Ok(())
    }

    /// Record `msg` as the node's last error and move it to its failed state.
    ///
    /// The node is powered off on the way. Problems doing any of this are
    /// logged; the caller is already reporting the original failure.
    pub async fn fail_provisioning(&self, task: &mut Task, msg: &str) {
        let uuid = task.node().uuid;
        error!(node = %uuid, state = %task.node().provision_state, "{}", msg);

        if let Err(e) = node_power_action(task, self.power.as_ref(), PowerState::Off).await {
            warn!(node = %uuid, error = %e, "Failed to power off node after failure");
        }
        if let Err(e) = task.process_event(Event::Fail) {
            error!(node = %uuid, error = %e, "Could not move node to a failed state");
        }
        match task.node_mut() {
            Ok(node) => node.last_error = Some(msg.to_string()),
            Err(e) => {
                error!(node = %uuid, error = %e, "Could not record failure on node");
                return;
            }
        }
        if let Err(e) = task.save_node().await {
            error!(node = %uuid, error = %e, "Failed to save failed node");
        }
    }

    /// Turn maintenance mode on or off. Turning it off clears the reason.
    pub async fn set_maintenance(&self, ident: &str, on: bool, reason: Option<&str>) -> Result<NodeRecord> {
        let mut task = self.tasks.acquire_with_retry(ident, "setting maintenance").await?;
        let result = async {
            let node = task.node_mut()?;
            node.maintenance = on;
            node.maintenance_reason = if on { reason.map(str::to_string) } else { None };
            task.save_node().await?;
            info!(node = %task.node().uuid, maintenance = on, "Updated maintenance mode");
            Ok::<_, Error>(task.node().clone())
        }
        .await;
        finish(task, result).await
    }

    /// Validate a power request and carry it out under an exclusive lock.
    pub async fn change_power_state(&self, ident: &str, target: &str) -> Result<NodeRecord> {
        let node = self.tasks.store().get_node(ident).await?;
        check_power_request(&node, target)?;

        let mut task = self.tasks.acquire_with_retry(ident, "changing node power state").await?;
        let result = async {
            let state = check_power_request(task.node(), target)?;
            node_power_action(&mut task, self.power.as_ref(), state).await?;
            Ok::<_, Error>(task.node().clone())
        }
        .await;
        finish(task, result).await
    }

    /// Delete the node record along with its ports and portgroups.
    ///
    /// Refused while an instance is associated, and outside the states
    /// that allow deletion unless the node is in maintenance.
    pub async fn destroy_node(&self, ident: &str) -> Result<()> {
        let task = self.tasks.acquire_with_retry(ident, "node deletion").await?;
        let node = task.node();

        let refusal = if let Some(instance) = node.instance_uuid {
            Some(Error::NodeAssociated {
                node: node.uuid.to_string(),
                instance: instance.to_string(),
            })
        } else if !node.provision_state.allows_record_deletion() && !node.maintenance {
            Some(Error::InvalidStateRequested {
                action: "delete".to_string(),
                node: node.uuid.to_string(),
                state: node.provision_state.to_string(),
            })
        } else {
            None
        };
        if let Some(e) = refusal {
            return finish(task, Err(e)).await;
        }

        let uuid = node.uuid;
        task.destroy_node().await?;
        info!(node = %uuid, "Deleted node");
        Ok(())
    }
}

/// Release `task`, reporting the operation's error ahead of a release error.
async fn finish<T>(task: Task, result: Result<T>) -> Result<T> {
    let released = task.release().await;
    let value = result?;
    released?;
    Ok(value)
}
