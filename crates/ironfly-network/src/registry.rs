//! Provider registry: provider name -> constructor
//!
//! Populated at startup; resolution applies the node's `network_provider`
//! override before falling back to the configured default.

use ironfly_common::{Error, NodeRecord, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::client::NetworkClient;
use crate::config::NetworkConfig;
use crate::neutron::NeutronNetworkProvider;
use crate::provider::{NetworkProvider, NoopNetworkProvider};

/// Controller-backed provider with switch port binding
pub const NEUTRON_PLUGIN_PROVIDER: &str = "neutron_plugin";
/// Controller-backed provider without port binding
pub const FLAT_PROVIDER: &str = "flat";
/// No network integration
pub const NONE_PROVIDER: &str = "none";

/// What a provider constructor gets to work with
#[derive(Clone)]
pub struct ProviderContext {
    pub client: Arc<dyn NetworkClient>,
    pub config: NetworkConfig,
}

pub type ProviderConstructor = fn(&ProviderContext) -> Arc<dyn NetworkProvider>;

fn neutron_plugin(ctx: &ProviderContext) -> Arc<dyn NetworkProvider> {
    Arc::new(NeutronNetworkProvider::new(
        NEUTRON_PLUGIN_PROVIDER,
        ctx.client.clone(),
        &ctx.config,
        true,
    ))
}

fn flat(ctx: &ProviderContext) -> Arc<dyn NetworkProvider> {
    Arc::new(NeutronNetworkProvider::new(
        FLAT_PROVIDER,
        ctx.client.clone(),
        &ctx.config,
        false,
    ))
}

fn none(_ctx: &ProviderContext) -> Arc<dyn NetworkProvider> {
    Arc::new(NoopNetworkProvider)
}

pub struct ProviderRegistry {
    context: ProviderContext,
    constructors: BTreeMap<String, ProviderConstructor>,
}

impl ProviderRegistry {
    /// Registry with the built-in providers
    pub fn new(client: Arc<dyn NetworkClient>, config: NetworkConfig) -> Self {
        Self::empty(client, config)
            .with_provider(NEUTRON_PLUGIN_PROVIDER, neutron_plugin)
            .with_provider(FLAT_PROVIDER, flat)
            .with_provider(NONE_PROVIDER, none)
    }

    pub fn empty(client: Arc<dyn NetworkClient>, config: NetworkConfig) -> Self {
        Self {
            context: ProviderContext { client, config },
            constructors: BTreeMap::new(),
        }
    }

    pub fn with_provider(mut self, name: &str, constructor: ProviderConstructor) -> Self {
        self.constructors.insert(name.to_string(), constructor);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.context.config
    }

    pub fn client(&self) -> &Arc<dyn NetworkClient> {
        &self.context.client
    }

    /// Build the provider registered as `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn NetworkProvider>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| Error::NetworkProviderNotFound(name.to_string()))?;
        Ok(constructor(&self.context))
    }

    /// Provider for `node`: its own override, else the configured default.
    pub fn get_network_provider(&self, node: &NodeRecord) -> Result<Arc<dyn NetworkProvider>> {
        let name = node
            .network_provider
            .as_deref()
            .unwrap_or(&self.context.config.network_provider);
        debug!(node = %node.uuid, provider = %name, "Resolved network provider");
        self.resolve(name)
    }
}
