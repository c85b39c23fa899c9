//! DHCP coordinator
//!
//! One [`DhcpFactory`] is built at process start and shared. The backend
//! named in config is constructed on first use, exactly once, even when
//! many tasks race for it; a failed construction is reported as
//! `DhcpLoadError` and retried on the next call.

use ironfly_common::{Error, Result};
use ironfly_network::{get_node_vif_ids, DhcpOption, NetworkClient, VifMap};
use ironfly_task::Task;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::DhcpConfig;
use crate::provider::{DhcpProvider, NeutronDhcpApi, NoneDhcpApi, NEUTRON_DHCP, NONE_DHCP};

/// What a backend constructor gets to work with
#[derive(Clone)]
pub struct DhcpContext {
    pub client: Arc<dyn NetworkClient>,
}

pub type DhcpConstructor = fn(&DhcpContext) -> Result<Arc<dyn DhcpProvider>>;

fn neutron(ctx: &DhcpContext) -> Result<Arc<dyn DhcpProvider>> {
    Ok(Arc::new(NeutronDhcpApi::new(ctx.client.clone())))
}

fn none(_ctx: &DhcpContext) -> Result<Arc<dyn DhcpProvider>> {
    Ok(Arc::new(NoneDhcpApi))
}

pub struct DhcpFactory {
    config: DhcpConfig,
    context: DhcpContext,
    constructors: BTreeMap<String, DhcpConstructor>,
    provider: OnceCell<Arc<dyn DhcpProvider>>,
}

impl DhcpFactory {
    /// Factory with the built-in backends
    pub fn new(config: DhcpConfig, client: Arc<dyn NetworkClient>) -> Self {
        Self {
            config,
            context: DhcpContext { client },
            constructors: BTreeMap::new(),
            provider: OnceCell::new(),
        }
        .with_provider(NEUTRON_DHCP, neutron)
        .with_provider(NONE_DHCP, none)
    }

    pub fn with_provider(mut self, name: &str, constructor: DhcpConstructor) -> Self {
        self.constructors.insert(name.to_string(), constructor);
        self
    }

    pub fn config(&self) -> &DhcpConfig {
        &self.config
    }

    /// True once the backend has been constructed
    pub fn is_loaded(&self) -> bool {
        self.provider.initialized()
    }

    /// The process-wide backend, constructing it on first use.
    pub async fn provider(&self) -> Result<Arc<dyn DhcpProvider>> {
        self.provider
            .get_or_try_init(|| async {
                let name = self.config.dhcp_provider.as_str();
                let constructor = self.constructors.get(name).ok_or_else(|| Error::DhcpLoadError {
                    provider: name.to_string(),
                    reason: "no such DHCP provider is registered".to_string(),
                })?;
                let provider = constructor(&self.context).map_err(|e| Error::DhcpLoadError {
                    provider: name.to_string(),
                    reason: e.to_string(),
                })?;
                info!(provider = %name, "Loaded DHCP provider");
                Ok::<_, Error>(provider)
            })
            .await
            .cloned()
    }

    /// Push `options` to every VIF of the node.
    ///
    /// `vifs` defaults to the VIFs recorded on the node's portgroups and
    /// ports. Fails if there are none, or if every VIF fails; partial
    /// failure is logged and tolerated. Nodes whose driver is listed in
    /// `settle_drivers` wait `settle_delay_secs` afterwards.
    pub async fn update_dhcp(&self, task: &Task, options: &[DhcpOption], vifs: Option<VifMap>) -> Result<()> {
        let provider = self.provider().await?;
        if !provider.is_active() {
            return Ok(());
        }

        let node = task.node();
        let vifs = vifs.unwrap_or_else(|| get_node_vif_ids(task));
        if vifs.is_empty() {
            return Err(Error::FailedToUpdateDhcpOptOnPort(format!(
                "No VIFs found for node {} when attempting to update DHCP BOOT options.",
                node.uuid
            )));
        }

        let mut failures = Vec::new();
        for (port_uuid, vif) in &vifs {
            if let Err(e) = provider.update_port_dhcp_opts(vif, options).await {
                debug!(node = %node.uuid, port = %port_uuid, error = %e, "DHCP update failed on port");
                failures.push(*port_uuid);
            }
        }

        if failures.len() == vifs.len() {
            return Err(Error::FailedToUpdateDhcpOptOnPort(format!(
                "Failed to set DHCP BOOT options for any port on node {}.",
                node.uuid
            )));
        }
        if !failures.is_empty() {
            warn!(
                node = %node.uuid,
                ports = ?failures,
                "Some errors were encountered when updating the DHCP BOOT options"
            );
        }

        if let Some(delay) = self.config.settle_delay(&node.driver) {
            debug!(node = %node.uuid, driver = %node.driver, delay_secs = delay.as_secs(), "Waiting for DHCP backend to settle");
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Remove the options previously pushed for the node's VIFs.
    ///
    /// Fails with `FailedToCleanDhcpOpts` only if every VIF fails.
    pub async fn clean_dhcp(&self, task: &Task) -> Result<()> {
        let provider = self.provider().await?;
        if !provider.is_active() {
            return Ok(());
        }

        let node = task.node();
        let vifs = get_node_vif_ids(task);
        let mut failures = Vec::new();
        for (port_uuid, vif) in &vifs {
            if let Err(e) = provider.clear_port_dhcp_opts(vif).await {
                debug!(node = %node.uuid, port = %port_uuid, error = %e, "DHCP clean failed on port");
                failures.push(*port_uuid);
            }
        }

        if !vifs.is_empty() && failures.len() == vifs.len() {
            return Err(Error::FailedToCleanDhcpOpts(node.uuid.to_string()));
        }
        if !failures.is_empty() {
            warn!(node = %node.uuid, ports = ?failures, "Some DHCP options could not be cleaned");
        }
        Ok(())
    }

    /// First IPv4 address of each node port. Ports that fail are logged and left out.
    pub async fn get_ip_addresses(&self, task: &Task) -> Result<Vec<Ipv4Addr>> {
        let provider = self.provider().await?;
        if !provider.is_active() {
            return Ok(Vec::new());
        }

        let node = task.node();
        let vifs = get_node_vif_ids(task);
        let mut addresses = Vec::new();
        let mut failures = Vec::new();
        for port in task.ports() {
            let Some(vif) = vifs.get(&port.uuid) else {
                failures.push(port.uuid);
                continue;
            };
            match provider.get_port_ip_address(vif).await {
                Ok(ip) => addresses.push(ip),
                Err(_) => failures.push(port.uuid),
            }
        }
        if !failures.is_empty() {
            warn!(
                node = %node.uuid,
                ports = ?failures,
                "Some errors were encountered while retrieving IP addresses"
            );
        }
        Ok(addresses)
    }

    pub async fn update_port_address(&self, port_id: &str, address: &str) -> Result<()> {
        self.provider().await?.update_port_address(port_id, address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironfly_network::InMemoryNetworkController;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

    fn counting(ctx: &DhcpContext) -> Result<Arc<dyn DhcpProvider>> {
        CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(NeutronDhcpApi::new(ctx.client.clone())))
    }

    fn broken(_ctx: &DhcpContext) -> Result<Arc<dyn DhcpProvider>> {
        Err(Error::InvalidParameterValue("missing endpoint".to_string()))
    }

    fn client() -> Arc<dyn NetworkClient> {
        Arc::new(InMemoryNetworkController::new())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_provider_constructed_once_under_race() {
        let factory = Arc::new(
            DhcpFactory::new(DhcpConfig::default().with_provider("counting"), client())
                .with_provider("counting", counting),
        );
        assert!(!factory.is_loaded());

        let mut handles = Vec::new();
        for _ in 0..32 {
            let factory = factory.clone();
            handles.push(tokio::spawn(async move { factory.provider().await.map(|p| p.name().to_string()) }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "neutron");
        }
        assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 1);
        assert!(factory.is_loaded());
    }

    #[tokio::test]
    async fn test_unknown_provider_is_load_error() {
        let factory = DhcpFactory::new(DhcpConfig::default().with_provider("isc"), client());
        assert_eq!(
            factory.provider().await.err(),
            Some(Error::DhcpLoadError {
                provider: "isc".to_string(),
                reason: "no such DHCP provider is registered".to_string(),
            })
        );
        assert!(!factory.is_loaded());
    }

    #[tokio::test]
    async fn test_constructor_failure_is_load_error() {
        let factory = DhcpFactory::new(DhcpConfig::default().with_provider("broken"), client())
            .with_provider("broken", broken);
        match factory.provider().await {
            Err(Error::DhcpLoadError { provider, reason }) => {
                assert_eq!(provider, "broken");
                assert!(reason.contains("missing endpoint"));
            }
            other => panic!("unexpected {:?}", other.map(|p| p.name().to_string())),
        }
    }
}
