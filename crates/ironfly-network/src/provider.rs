//! The network provider contract

use async_trait::async_trait;
use ironfly_common::Result;
use ironfly_task::Task;
use tracing::debug;

use crate::vif::VifMap;

/// Moves a node's interfaces between provisioning, cleaning and tenant networks.
///
/// Providers are resolved per node by the
/// [`ProviderRegistry`](crate::registry::ProviderRegistry), which applies
/// the node's `network_provider` override before construction. Providers
/// never read that field themselves.
///
/// Operations that rewrite port VIFs need an exclusive task.
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// Registry name of this provider
    fn name(&self) -> &str;

    /// Attach the node's ports to the provisioning network and make the
    /// provisioning ports the active VIFs, saving tenant VIFs for later.
    async fn add_provisioning_network(&self, task: &mut Task) -> Result<()>;

    /// Detach from the provisioning network and restore saved tenant VIFs.
    async fn remove_provisioning_network(&self, task: &mut Task) -> Result<()>;

    /// Bind the node's VIFs to the instance on the tenant network.
    async fn configure_tenant_networks(&self, task: &mut Task) -> Result<()>;

    async fn unconfigure_tenant_networks(&self, task: &mut Task) -> Result<()>;

    /// Attach the node's ports to the cleaning network. Returns the new ports by node port.
    async fn add_cleaning_network(&self, task: &mut Task) -> Result<VifMap>;

    async fn remove_cleaning_network(&self, task: &mut Task) -> Result<()>;
}

/// Provider for deployments without network backend integration
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNetworkProvider;

#[async_trait]
impl NetworkProvider for NoopNetworkProvider {
    fn name(&self) -> &str {
        crate::registry::NONE_PROVIDER
    }

    async fn add_provisioning_network(&self, task: &mut Task) -> Result<()> {
        debug!(node = %task.node().uuid, "No-op add_provisioning_network");
        Ok(())
    }

    async fn remove_provisioning_network(&self, task: &mut Task) -> Result<()> {
        debug!(node = %task.node().uuid, "No-op remove_provisioning_network");
        Ok(())
    }

    async fn configure_tenant_networks(&self, task: &mut Task) -> Result<()> {
        debug!(node = %task.node().uuid, "No-op configure_tenant_networks");
        Ok(())
    }

    async fn unconfigure_tenant_networks(&self, _task: &mut Task) -> Result<()> {
        Ok(())
    }

    async fn add_cleaning_network(&self, task: &mut Task) -> Result<VifMap> {
        debug!(node = %task.node().uuid, "No-op add_cleaning_network");
        Ok(VifMap::new())
    }

    async fn remove_cleaning_network(&self, _task: &mut Task) -> Result<()> {
        Ok(())
    }
}
