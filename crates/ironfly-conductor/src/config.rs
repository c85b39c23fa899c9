//! Conductor configuration
//!
//! One YAML document with a section per concern. Every section and every
//! field has a default, so an empty file is a valid config.
//!
//! ```yaml
//! conductor:
//!   host: conductor-1
//!   workers_pool_size: 100
//! network:
//!   network_provider: neutron_plugin
//!   provisioning_network_uuid: 5d1d0f2a-...
//! dhcp:
//!   dhcp_provider: neutron
//! pxe:
//!   tftp_server: 10.0.0.5
//! ```

use ironfly_dhcp::{DhcpConfig, PxeConfig, NEUTRON_DHCP};
use ironfly_network::NetworkConfig;
use ironfly_task::pool::DEFAULT_POOL_SIZE;
use ironfly_task::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "IRONFLY_CONFIG";

/// The `conductor:` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    /// Written into `reservation` while this conductor holds a node
    pub host: String,
    pub workers_pool_size: usize,
    pub node_locked_retry_attempts: u32,
    pub node_locked_retry_interval_ms: u64,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            workers_pool_size: DEFAULT_POOL_SIZE,
            node_locked_retry_attempts: 3,
            node_locked_retry_interval_ms: 1000,
        }
    }
}

impl ConductorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.node_locked_retry_attempts,
            Duration::from_millis(self.node_locked_retry_interval_ms),
        )
    }
}

fn default_host() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub conductor: ConductorConfig,
    pub network: NetworkConfig,
    pub dhcp: DhcpConfig,
    pub pxe: PxeConfig,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // serde_yaml rejects an empty document; treat it as all defaults
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Load from `path`, else from `$IRONFLY_CONFIG`, else defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(path) => Self::load(path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject settings nothing can work with and list the ones that will
    /// only fail once an operation needs them.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.conductor.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                setting: "conductor.host".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.conductor.workers_pool_size == 0 {
            return Err(ConfigError::Invalid {
                setting: "conductor.workers_pool_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let mut warnings = self.network.warnings();
        if self.dhcp.dhcp_provider == NEUTRON_DHCP && self.pxe.tftp_server.is_none() {
            warnings.push("pxe.tftp_server is not set; nodes will not be told where to fetch their boot file".to_string());
        }
        if self.pxe.ipxe_enabled && self.pxe.ipxe_boot_script_url.is_none() {
            warnings.push("pxe.ipxe_boot_script_url is required when pxe.ipxe_enabled is true".to_string());
        }
        Ok(warnings)
    }
}
