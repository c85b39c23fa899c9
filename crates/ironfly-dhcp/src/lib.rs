//! Ironfly DHCP coordination
//!
//! Pushes PXE boot options to a node's network interfaces through a
//! pluggable DHCP backend, and clears them again when the node is done
//! booting.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                DhcpFactory                   │
//! │   OnceCell<Arc<dyn DhcpProvider>>            │
//! │   update_dhcp / clean_dhcp / get_ip_addresses│
//! └──────────────────────────────────────────────┘
//!                      │ per VIF
//!                      ▼
//! ┌──────────────────────────────────────────────┐
//! │   DhcpProvider:  neutron | none              │
//! └──────────────────────────────────────────────┘
//!                      │
//!                      ▼
//!            NetworkClient (port API)
//! ```

pub mod config;
pub mod factory;
pub mod provider;

pub use config::{pxe_boot_options, DhcpConfig, PxeConfig, PxeOptions};
pub use factory::{DhcpConstructor, DhcpContext, DhcpFactory};
pub use provider::{DhcpProvider, NeutronDhcpApi, NoneDhcpApi, NEUTRON_DHCP, NONE_DHCP};
pub use ironfly_network::DhcpOption;
