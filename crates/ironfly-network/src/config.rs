//! Network orchestration settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::registry::NONE_PROVIDER;

/// How the HTTP client authenticates to the network controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthStrategy {
    #[default]
    Noauth,
    /// Static token sent as `X-Auth-Token`
    Token,
}

/// Network settings, the `network:` section of the conductor config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Process-wide provider; a node's `network_provider` overrides it
    pub network_provider: String,
    pub provisioning_network_uuid: Option<String>,
    pub cleaning_network_uuid: Option<String>,
    /// Network controller endpoint
    pub url: String,
    pub url_timeout_secs: u64,
    /// Retries for requests that fail to connect
    pub retries: u32,
    pub auth_strategy: AuthStrategy,
    pub auth_token: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            network_provider: NONE_PROVIDER.to_string(),
            provisioning_network_uuid: None,
            cleaning_network_uuid: None,
            url: "http://127.0.0.1:9696".to_string(),
            url_timeout_secs: 30,
            retries: 3,
            auth_strategy: AuthStrategy::Noauth,
            auth_token: None,
        }
    }
}

impl NetworkConfig {
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.network_provider = provider.into();
        self
    }

    pub fn with_provisioning_network(mut self, uuid: impl Into<String>) -> Self {
        self.provisioning_network_uuid = Some(uuid.into());
        self
    }

    pub fn with_cleaning_network(mut self, uuid: impl Into<String>) -> Self {
        self.cleaning_network_uuid = Some(uuid.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.url_timeout_secs)
    }

    /// Problems that will make operations fail later, named by setting.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.network_provider != NONE_PROVIDER {
            if self.provisioning_network_uuid.is_none() {
                warnings.push(format!(
                    "network.provisioning_network_uuid is not set; provider {} cannot attach the provisioning network",
                    self.network_provider
                ));
            }
            if self.cleaning_network_uuid.is_none() {
                warnings.push(format!(
                    "network.cleaning_network_uuid is not set; provider {} cannot attach the cleaning network",
                    self.network_provider
                ));
            }
        }
        if self.auth_strategy == AuthStrategy::Token && self.auth_token.is_none() {
            warnings.push("network.auth_token is required when auth_strategy is token".to_string());
        }
        warnings
    }
}
