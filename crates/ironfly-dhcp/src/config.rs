//! DHCP and PXE settings

use ironfly_network::DhcpOption;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::provider::NEUTRON_DHCP;

/// DHCP settings, the `dhcp:` section of the conductor config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DhcpConfig {
    /// Backend name, resolved once per process
    pub dhcp_provider: String,
    /// Wait after pushing options for nodes whose driver boots virtual machines
    pub settle_delay_secs: u64,
    /// Drivers that need the settle wait
    pub settle_drivers: Vec<String>,
}

impl Default for DhcpConfig {
    fn default() -> Self {
        Self {
            dhcp_provider: NEUTRON_DHCP.to_string(),
            settle_delay_secs: 15,
            settle_drivers: vec![
                "pxe_ssh".to_string(),
                "agent_ssh".to_string(),
                "fake_ssh".to_string(),
            ],
        }
    }
}

impl DhcpConfig {
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.dhcp_provider = provider.into();
        self
    }

    pub fn with_settle(mut self, delay_secs: u64, drivers: &[&str]) -> Self {
        self.settle_delay_secs = delay_secs;
        self.settle_drivers = drivers.iter().map(|d| d.to_string()).collect();
        self
    }

    /// The settle wait for a node using `driver`, if any.
    pub fn settle_delay(&self, driver: &str) -> Option<Duration> {
        (self.settle_delay_secs > 0 && self.settle_drivers.iter().any(|d| d == driver))
            .then(|| Duration::from_secs(self.settle_delay_secs))
    }
}

/// PXE boot settings, the `pxe:` section of the conductor config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PxeConfig {
    /// TFTP server IP (option 66)
    pub tftp_server: Option<Ipv4Addr>,
    /// Next-server address (siaddr)
    pub server_ip_address: Option<Ipv4Addr>,
    /// Boot filename (option 67)
    pub bootfile_name: String,
    pub uefi_bootfile_name: String,
    pub ipxe_enabled: bool,
    /// Script handed to clients already running iPXE
    pub ipxe_boot_script_url: Option<String>,
}

impl Default for PxeConfig {
    fn default() -> Self {
        Self {
            tftp_server: None,
            server_ip_address: None,
            bootfile_name: "pxelinux.0".to_string(),
            uefi_bootfile_name: "bootx64.efi".to_string(),
            ipxe_enabled: false,
            ipxe_boot_script_url: None,
        }
    }
}

impl PxeConfig {
    pub fn new(tftp_server: Ipv4Addr) -> Self {
        Self {
            tftp_server: Some(tftp_server),
            server_ip_address: Some(tftp_server),
            ..Default::default()
        }
    }

    pub fn with_ipxe(mut self, script_url: impl Into<String>) -> Self {
        self.ipxe_enabled = true;
        self.ipxe_boot_script_url = Some(script_url.into());
        self
    }

    pub fn with_bootfile(mut self, bootfile: impl Into<String>) -> Self {
        self.bootfile_name = bootfile.into();
        self
    }
}

/// PXE boot options for one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PxeOptions {
    pub boot_filename: Option<String>,
    pub server_ip_address: Option<Ipv4Addr>,
    pub tftp_server: Option<Ipv4Addr>,
    /// Boot script for clients that already run iPXE
    pub ipxe_script_url: Option<String>,
}

impl PxeOptions {
    /// Create PXE options from PXE config
    pub fn from_config(config: &PxeConfig, is_uefi: bool) -> Self {
        let boot_filename = if is_uefi {
            config.uefi_bootfile_name.clone()
        } else {
            config.bootfile_name.clone()
        };
        Self {
            boot_filename: Some(boot_filename),
            server_ip_address: config.server_ip_address,
            tftp_server: config.tftp_server,
            ipxe_script_url: config
                .ipxe_boot_script_url
                .clone()
                .filter(|_| config.ipxe_enabled),
        }
    }

    /// Check if any PXE options are set
    pub fn is_empty(&self) -> bool {
        self.boot_filename.is_none()
            && self.server_ip_address.is_none()
            && self.tftp_server.is_none()
            && self.ipxe_script_url.is_none()
    }

    /// The ordered option list pushed to the DHCP backend
    pub fn to_dhcp_options(&self) -> Vec<DhcpOption> {
        let mut opts = Vec::new();
        if let Some(url) = &self.ipxe_script_url {
            // iPXE clients fetch the script; everyone else chainloads iPXE first
            opts.push(DhcpOption::new("tag:!ipxe,bootfile-name", self.boot_filename.clone().unwrap_or_default()));
            opts.push(DhcpOption::new("tag:ipxe,bootfile-name", url.clone()));
        } else if let Some(bootfile) = &self.boot_filename {
            opts.push(DhcpOption::new("bootfile-name", bootfile.clone()));
        }
        if let Some(ip) = self.server_ip_address {
            opts.push(DhcpOption::new("server-ip-address", ip.to_string()));
        }
        if let Some(ip) = self.tftp_server {
            opts.push(DhcpOption::new("tftp-server", ip.to_string()));
        }
        opts
    }
}

/// Shorthand for `PxeOptions::from_config(config, false).to_dhcp_options()`
pub fn pxe_boot_options(config: &PxeConfig) -> Vec<DhcpOption> {
    PxeOptions::from_config(config, false).to_dhcp_options()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_delay_only_for_listed_drivers() {
        let config = DhcpConfig::default();
        assert_eq!(config.settle_delay("pxe_ssh"), Some(Duration::from_secs(15)));
        assert_eq!(config.settle_delay("pxe_ipmitool"), None);

        let config = DhcpConfig::default().with_settle(0, &["pxe_ssh"]);
        assert_eq!(config.settle_delay("pxe_ssh"), None);
    }

    #[test]
    fn test_pxe_options_order() {
        let config = PxeConfig::new(Ipv4Addr::new(10, 0, 0, 5));
        let opts = pxe_boot_options(&config);
        let names: Vec<_> = opts.iter().map(|o| o.opt_name.as_str()).collect();
        assert_eq!(names, vec!["bootfile-name", "server-ip-address", "tftp-server"]);
        assert_eq!(opts[0].opt_value.as_deref(), Some("pxelinux.0"));
        assert_eq!(opts[2].opt_value.as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn test_ipxe_options() {
        let config = PxeConfig::new(Ipv4Addr::new(10, 0, 0, 5))
            .with_bootfile("undionly.kpxe")
            .with_ipxe("http://10.0.0.5:8080/boot.ipxe");
        let opts = pxe_boot_options(&config);
        assert_eq!(opts[0], DhcpOption::new("tag:!ipxe,bootfile-name", "undionly.kpxe"));
        assert_eq!(opts[1], DhcpOption::new("tag:ipxe,bootfile-name", "http://10.0.0.5:8080/boot.ipxe"));
    }

    #[test]
    fn test_uefi_bootfile() {
        let config = PxeConfig::new(Ipv4Addr::new(10, 0, 0, 5));
        let pxe = PxeOptions::from_config(&config, true);
        assert_eq!(pxe.boot_filename.as_deref(), Some("bootx64.efi"));
        assert!(!pxe.is_empty());
        assert!(PxeOptions::default().is_empty());
    }
}
