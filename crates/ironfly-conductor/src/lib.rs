//! Ironfly conductor
//!
//! The action layer that ties the other ironfly crates together.
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────────────────── Conductor ────────────────────────┐
//! request ───► │ check_provision_request ─► TaskManager ─► Task            │
//!              │                                            │               │
//!              │      ┌─────────────────┬───────────────────┼──────────┐    │
//!              │      ▼                 ▼                   ▼          │    │
//!              │ ProviderRegistry   DhcpFactory        PowerDriver     │    │
//!              │ (network_provider) (boot options)     (node power)    │    │
//!              └───────────────────────────────────────────────────────┴────┘
//! ```
//!
//! [`Config`] is the YAML document that wires all of it.

pub mod conductor;
pub mod config;
pub mod error;
pub mod power;

pub use conductor::{Conductor, CONFIGDRIVE_KEY};
pub use config::{ConductorConfig, Config, CONFIG_ENV};
pub use error::ConfigError;
pub use power::{node_power_action, FakePowerDriver, PowerDriver};
