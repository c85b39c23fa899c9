//! Request policy layered over the pure state machine
//!
//! The state machine answers "is there an edge". These checks add the
//! rules a request must also satisfy: protocol version gating, the
//! maintenance gate, configdrive placement and lock-conflict reporting.

use crate::error::Error;
use crate::node::{NodeRecord, PowerState};
use crate::states::{next_state, Event, ProvisionState};

/// Minimum API minor version at which each management verb is accepted
pub const MIN_VERB_VERSIONS: &[(&str, u32)] = &[
    ("manage", 4),
    ("provide", 4),
    ("inspect", 6),
    ("abort", 13),
];

/// Reject management verbs the negotiated API version does not know yet.
pub fn check_allow_management_verbs(verb: &str, api_minor: u32) -> Result<(), Error> {
    match MIN_VERB_VERSIONS.iter().find(|(name, _)| *name == verb) {
        Some((_, min)) if api_minor < *min => Err(Error::NotAcceptable(format!(
            "\"{}\" is not supported before API version 1.{}",
            verb, min
        ))),
        _ => Ok(()),
    }
}

/// A client request to move a node through the provisioning lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub verb: String,
    pub configdrive: Option<String>,
    /// Negotiated API minor version; `None` skips version gating
    pub api_minor: Option<u32>,
}

impl ProvisionRequest {
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            configdrive: None,
            api_minor: None,
        }
    }

    pub fn with_configdrive(mut self, configdrive: impl Into<String>) -> Self {
        self.configdrive = Some(configdrive.into());
        self
    }

    pub fn with_api_minor(mut self, minor: u32) -> Self {
        self.api_minor = Some(minor);
        self
    }
}

/// Validate a provisioning request against `node` and resolve it to an event.
///
/// Checks run in a fixed order: version gate, maintenance gate, state
/// machine (reported as a lock conflict if someone holds the node), then
/// configdrive placement.
pub fn check_provision_request(node: &NodeRecord, request: &ProvisionRequest) -> Result<Event, Error> {
    let verb = request.verb.as_str();

    if let Some(minor) = request.api_minor {
        check_allow_management_verbs(verb, minor)?;
    }

    let event = Event::from_verb(verb).ok_or_else(|| Error::InvalidStateRequested {
        action: verb.to_string(),
        node: node.uuid.to_string(),
        state: node.provision_state.to_string(),
    })?;

    if node.maintenance && matches!(event, Event::Deploy | Event::Rebuild) {
        return Err(Error::NodeInMaintenance {
            op: "provisioning".to_string(),
            node: node.uuid.to_string(),
        });
    }

    if next_state(node.provision_state, event).is_none() {
        return Err(match &node.reservation {
            Some(host) => Error::NodeLocked {
                node: node.uuid.to_string(),
                host: host.clone(),
            },
            None => Error::InvalidStateRequested {
                action: verb.to_string(),
                node: node.uuid.to_string(),
                state: node.provision_state.to_string(),
            },
        });
    }

    if request.configdrive.is_some() && event != Event::Deploy {
        return Err(Error::InvalidParameterValue(format!(
            "Adding a config drive is only supported when setting provision state to active, not {}",
            verb
        )));
    }

    Ok(event)
}

/// Validate a power change request and resolve the target.
pub fn check_power_request(node: &NodeRecord, target: &str) -> Result<PowerState, Error> {
    let state = PowerState::parse_target(target).ok_or_else(|| {
        Error::InvalidParameterValue(format!(
            "Supported power states are \"power on\", \"power off\" and \"rebooting\", not \"{}\"",
            target
        ))
    })?;

    if matches!(
        node.provision_state,
        ProvisionState::Cleaning | ProvisionState::CleanWait
    ) {
        return Err(Error::InvalidStateRequested {
            action: state.to_string(),
            node: node.uuid.to_string(),
            state: node.provision_state.to_string(),
        });
    }

    Ok(state)
}
