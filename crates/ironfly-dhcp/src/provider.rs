//! DHCP backends
//!
//! Backends work on one controller port at a time. Fan-out over a node's
//! interfaces and failure aggregation live in [`DhcpFactory`](crate::DhcpFactory).

use async_trait::async_trait;
use ironfly_common::{Error, Result};
use ironfly_network::{DhcpOption, NetworkClient, PortBody};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, error};

/// Backend that pushes options through the network controller
pub const NEUTRON_DHCP: &str = "neutron";
/// Backend that does nothing
pub const NONE_DHCP: &str = "none";

#[async_trait]
pub trait DhcpProvider: Send + Sync {
    fn name(&self) -> &str;

    /// False for backends that push nothing; the coordinator then skips fan-out.
    fn is_active(&self) -> bool {
        true
    }

    /// Replace or add `options` on one port.
    async fn update_port_dhcp_opts(&self, port_id: &str, options: &[DhcpOption]) -> Result<()>;

    /// Remove every option previously pushed to one port.
    async fn clear_port_dhcp_opts(&self, port_id: &str) -> Result<()>;

    async fn update_port_address(&self, port_id: &str, address: &str) -> Result<()>;

    /// First fixed IPv4 address of one port.
    async fn get_port_ip_address(&self, port_id: &str) -> Result<Ipv4Addr>;
}

/// Pushes options as `extra_dhcp_opts` on controller ports
pub struct NeutronDhcpApi {
    client: Arc<dyn NetworkClient>,
}

impl NeutronDhcpApi {
    pub fn new(client: Arc<dyn NetworkClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DhcpProvider for NeutronDhcpApi {
    fn name(&self) -> &str {
        NEUTRON_DHCP
    }

    async fn update_port_dhcp_opts(&self, port_id: &str, options: &[DhcpOption]) -> Result<()> {
        self.client
            .update_port(port_id, &PortBody::dhcp_opts(options.to_vec()))
            .await
            .map_err(|e| {
                error!(port = %port_id, error = %e, "Failed to update network port");
                Error::FailedToUpdateDhcpOptOnPort(format!(
                    "Update DHCP options on port: {} failed.",
                    port_id
                ))
            })?;
        debug!(port = %port_id, options = options.len(), "Updated DHCP options");
        Ok(())
    }

    async fn clear_port_dhcp_opts(&self, port_id: &str) -> Result<()> {
        let port = self
            .client
            .show_port(port_id)
            .await
            .map_err(|e| Error::Network(format!("Could not read port {}: {}", port_id, e)))?;
        if port.extra_dhcp_opts.is_empty() {
            return Ok(());
        }
        let cleared: Vec<_> = port
            .extra_dhcp_opts
            .iter()
            .map(|opt| DhcpOption::clear(opt.opt_name.clone()))
            .collect();
        self.client
            .update_port(port_id, &PortBody::dhcp_opts(cleared))
            .await
            .map_err(|e| Error::Network(format!("Could not clear options on port {}: {}", port_id, e)))?;
        Ok(())
    }

    async fn update_port_address(&self, port_id: &str, address: &str) -> Result<()> {
        self.client
            .update_port(port_id, &PortBody::mac_address(address))
            .await
            .map_err(|e| {
                error!(port = %port_id, error = %e, "Failed to update MAC address on network port");
                Error::FailedToUpdateMacOnPort(port_id.to_string())
            })?;
        Ok(())
    }

    async fn get_port_ip_address(&self, port_id: &str) -> Result<Ipv4Addr> {
        let port = self.client.show_port(port_id).await.map_err(|e| {
            error!(port = %port_id, error = %e, "Failed to get IP address on network port");
            Error::FailedToGetIpAddressOnPort(port_id.to_string())
        })?;
        let Some(fixed) = port.fixed_ips.first() else {
            error!(port = %port_id, "No IP address assigned to network port");
            return Err(Error::FailedToGetIpAddressOnPort(port_id.to_string()));
        };
        fixed.ip_address.parse::<Ipv4Addr>().map_err(|_| {
            error!(port = %port_id, address = %fixed.ip_address, "Network controller returned invalid IPv4 address");
            Error::InvalidParameterValue(format!("Invalid IPv4 address {}.", fixed.ip_address))
        })
    }
}

/// No DHCP integration
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneDhcpApi;

#[async_trait]
impl DhcpProvider for NoneDhcpApi {
    fn name(&self) -> &str {
        NONE_DHCP
    }

    fn is_active(&self) -> bool {
        false
    }

    async fn update_port_dhcp_opts(&self, _port_id: &str, _options: &[DhcpOption]) -> Result<()> {
        Ok(())
    }

    async fn clear_port_dhcp_opts(&self, _port_id: &str) -> Result<()> {
        Ok(())
    }

    async fn update_port_address(&self, _port_id: &str, _address: &str) -> Result<()> {
        Ok(())
    }

    async fn get_port_ip_address(&self, port_id: &str) -> Result<Ipv4Addr> {
        Err(Error::FailedToGetIpAddressOnPort(port_id.to_string()))
    }
}
