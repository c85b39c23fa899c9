//! Ironfly network orchestration
//!
//! Drives a node's interfaces through the provisioning, cleaning and
//! tenant networks via a pluggable [`NetworkProvider`].
//!
//! # Providers
//!
//! - **neutron_plugin**: controller ports with switch port binding
//! - **flat**: controller ports without binding
//! - **none**: every operation succeeds without doing anything
//!
//! # Example
//!
//! ```no_run
//! use ironfly_network::{HttpNetworkClient, NetworkConfig, ProviderRegistry};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = NetworkConfig::default()
//!     .with_provider("neutron_plugin")
//!     .with_provisioning_network("5d2f7c3e-prov")
//!     .with_url("http://10.0.0.2:9696");
//! let client = Arc::new(HttpNetworkClient::new(&config)?);
//! let registry = ProviderRegistry::new(client, config);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod neutron;
pub mod provider;
pub mod registry;
pub mod types;
pub mod vif;

pub use client::{HttpNetworkClient, NetworkClient};
pub use config::{AuthStrategy, NetworkConfig};
pub use error::NetworkClientError;
pub use memory::InMemoryNetworkController;
pub use neutron::NeutronNetworkProvider;
pub use provider::{NetworkProvider, NoopNetworkProvider};
pub use registry::{ProviderRegistry, FLAT_PROVIDER, NEUTRON_PLUGIN_PROVIDER, NONE_PROVIDER};
pub use types::{DhcpOption, NetworkPort, PortBody, PortFilter};
pub use vif::{get_node_portmap, get_node_vif_ids, Portmap, VifMap};
