//! Error taxonomy shared by every ironfly crate
//!
//! One closed set of variants; callers match on the kind instead of
//! downcasting. `is_retryable` separates transient conflicts from client
//! and configuration errors.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Node {0} could not be found.")]
    NodeNotFound(String),

    #[error("Port {0} could not be found.")]
    PortNotFound(String),

    #[error("Portgroup {0} could not be found.")]
    PortgroupNotFound(String),

    #[error("A node with UUID {0} already exists.")]
    NodeAlreadyExists(String),

    #[error("A port with MAC address {0} already exists.")]
    MacAlreadyExists(String),

    #[error("Node {node} is locked by host {host}, please retry after the current operation is completed.")]
    NodeLocked { node: String, host: String },

    #[error("Node {0} found not to be locked on release")]
    NodeNotLocked(String),

    #[error("An exclusive lock is required, but the current context has a shared lock on node {0}.")]
    ExclusiveLockRequired(String),

    #[error("Requested action cannot be performed due to lack of free conductor workers.")]
    NoFreeConductorWorker,

    #[error("Unknown provision state \"{0}\".")]
    InvalidState(String),

    #[error("The requested action \"{action}\" can not be performed on node \"{node}\" while it is in state \"{state}\".")]
    InvalidStateRequested {
        action: String,
        node: String,
        state: String,
    },

    #[error("The {op} operation can't be performed on node {node} because it's in maintenance mode.")]
    NodeInMaintenance { op: String, node: String },

    #[error("Node {node} is associated with instance {instance}.")]
    NodeAssociated { node: String, instance: String },

    #[error("Not acceptable: {0}")]
    NotAcceptable(String),

    #[error("Invalid parameter value: {0}")]
    InvalidParameterValue(String),

    #[error("No valid port mapping found for node {0}.")]
    NoValidPortmaps(String),

    #[error("Failed to load DHCP provider {provider}, reason: {reason}")]
    DhcpLoadError { provider: String, reason: String },

    /// Carries the full message: per-port failures name the port, total failure names the node
    #[error("{0}")]
    FailedToUpdateDhcpOptOnPort(String),

    #[error("Update MAC address on port: {0} failed.")]
    FailedToUpdateMacOnPort(String),

    #[error("Clean up DHCP options on node: {0} failed.")]
    FailedToCleanDhcpOpts(String),

    #[error("Retrieve IP address on port: {0} failed.")]
    FailedToGetIpAddressOnPort(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Network provider {0} could not be found.")]
    NetworkProviderNotFound(String),

    #[error("Failed to change power state on node {node}: {reason}")]
    PowerStateFailure { node: String, reason: String },

    #[error("storage error: {0}")]
    Store(String),
}

impl Error {
    /// True for conflicts a caller should retry after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NodeLocked { .. } | Error::NoFreeConductorWorker)
    }

    /// True for errors caused by the request itself rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidStateRequested { .. }
                | Error::NodeInMaintenance { .. }
                | Error::NotAcceptable(_)
                | Error::InvalidParameterValue(_)
                | Error::InvalidState(_)
                | Error::NodeAssociated { .. }
        )
    }
}
