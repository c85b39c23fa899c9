//! Ironfly common types
//!
//! Shared by every ironfly crate:
//!
//! - [`NodeRecord`], [`Port`] and [`Portgroup`]: the persisted data model
//! - [`states`]: the provisioning state machine as a static table plus pure functions
//! - [`provision`]: request policy checks layered over the state machine
//! - [`Error`]: the closed error taxonomy

pub mod error;
pub mod node;
pub mod port;
pub mod provision;
pub mod states;

pub use error::Error;
pub use node::{new_id, Extra, NodeRecord, PowerState};
pub use port::{
    normalize_mac, LocalLinkConnection, Port, Portgroup, VifCarrier, TENANT_VIF_PORT_ID,
    VIF_PORT_ID,
};
pub use provision::{
    check_allow_management_verbs, check_power_request, check_provision_request, ProvisionRequest,
};
pub use states::{apply_verb, next_legal_events, Event, ProvisionState, StateMachine, Transition};

pub type Result<T> = std::result::Result<T, Error>;
