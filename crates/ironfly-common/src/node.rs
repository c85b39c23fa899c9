//! The node record: one per physical machine.
//!
//! Everything a conductor reads or writes about a node lives here. The
//! `reservation` field is the lock token and is only ever written by the
//! store's reserve/release operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::states::ProvisionState;

/// Opaque key/value bag stored alongside a node or port
pub type Extra = BTreeMap<String, Value>;

/// Generate a new node or port identifier
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}

/// Power state of a node as reported by its power driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerState {
    #[serde(rename = "power on")]
    On,
    #[serde(rename = "power off")]
    Off,
    #[serde(rename = "rebooting")]
    Rebooting,
    #[serde(rename = "error")]
    Error,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::On => "power on",
            PowerState::Off => "power off",
            PowerState::Rebooting => "rebooting",
            PowerState::Error => "error",
        }
    }

    /// Parse a requested power target. Only on, off and reboot can be requested.
    pub fn parse_target(s: &str) -> Option<PowerState> {
        match s {
            "power on" | "on" => Some(PowerState::On),
            "power off" | "off" => Some(PowerState::Off),
            "rebooting" | "reboot" => Some(PowerState::Rebooting),
            _ => None,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical machine under management
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub uuid: Uuid,
    /// Optional logical name, unique across the fleet
    pub name: Option<String>,
    /// Hardware backend name, e.g. `pxe_ipmitool`
    pub driver: String,
    pub instance_uuid: Option<Uuid>,

    pub power_state: Option<PowerState>,
    pub target_power_state: Option<PowerState>,

    pub provision_state: ProvisionState,
    /// Non-null exactly while an asynchronous provisioning action runs
    pub target_provision_state: Option<ProvisionState>,
    pub provision_updated_at: Option<DateTime<Utc>>,

    pub last_error: Option<String>,

    /// Lock holder, or `None` when unlocked
    pub reservation: Option<String>,

    pub maintenance: bool,
    pub maintenance_reason: Option<String>,

    /// Per-node override of the process-wide network provider
    pub network_provider: Option<String>,

    #[serde(default)]
    pub driver_internal_info: Extra,
    #[serde(default)]
    pub instance_info: Extra,
    pub clean_step: Option<Extra>,
    pub target_raid_config: Option<Extra>,
    pub raid_config: Option<Extra>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NodeRecord {
    /// A freshly enrolled node
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            uuid: new_id(),
            name: None,
            driver: driver.into(),
            instance_uuid: None,
            power_state: None,
            target_power_state: None,
            provision_state: ProvisionState::Enroll,
            target_provision_state: None,
            provision_updated_at: None,
            last_error: None,
            reservation: None,
            maintenance: false,
            maintenance_reason: None,
            network_provider: None,
            driver_internal_info: Extra::new(),
            instance_info: Extra::new(),
            clean_step: None,
            target_raid_config: None,
            raid_config: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_provision_state(mut self, state: ProvisionState) -> Self {
        self.provision_state = state;
        self.target_provision_state = state.target();
        self
    }

    pub fn with_instance(mut self, instance_uuid: Uuid) -> Self {
        self.instance_uuid = Some(instance_uuid);
        self
    }

    pub fn with_network_provider(mut self, provider: impl Into<String>) -> Self {
        self.network_provider = Some(provider.into());
        self
    }

    pub fn with_maintenance(mut self, reason: impl Into<String>) -> Self {
        self.maintenance = true;
        self.maintenance_reason = Some(reason.into());
        self
    }

    /// True if `ident` names this node by uuid or logical name.
    pub fn matches(&self, ident: &str) -> bool {
        self.uuid.to_string() == ident || self.name.as_deref() == Some(ident)
    }

    /// Move to `state`, recording `target` and the time of the change.
    pub fn set_provision_state(&mut self, state: ProvisionState, target: Option<ProvisionState>) {
        self.provision_state = state;
        self.target_provision_state = target;
        self.provision_updated_at = Some(Utc::now());
    }
}

impl fmt::Display for NodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}
