//! Provisioning state machine
//!
//! The machine is a static transition table plus pure functions over it.
//! There is no machine instance to copy or share: [`StateMachine::initialize`]
//! only binds a validated state to a cheap `Copy` value.
//!
//! ```text
//!  enroll --manage--> verifying --done--> manageable --provide--> cleaning --done--> available
//!                                          |    ^                                     |
//!                                     inspect  done                                 deploy
//!                                          v    |                                     v
//!                                        inspecting          active <--done-- deploying <--resume-- wait-callback
//!                                                              |
//!                                                            delete --> deleting --done--> deleted
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Provisioning state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionState {
    Enroll,
    Verifying,
    Manageable,
    Inspecting,
    InspectFailed,
    Available,
    Deploying,
    WaitCallback,
    DeployFailed,
    Active,
    Deleting,
    Deleted,
    Error,
    Cleaning,
    CleanWait,
    CleanFailed,
}

impl ProvisionState {
    /// Every declared state, in lifecycle order
    pub const ALL: [ProvisionState; 16] = [
        ProvisionState::Enroll,
        ProvisionState::Verifying,
        ProvisionState::Manageable,
        ProvisionState::Inspecting,
        ProvisionState::InspectFailed,
        ProvisionState::Available,
        ProvisionState::Deploying,
        ProvisionState::WaitCallback,
        ProvisionState::DeployFailed,
        ProvisionState::Active,
        ProvisionState::Deleting,
        ProvisionState::Deleted,
        ProvisionState::Error,
        ProvisionState::Cleaning,
        ProvisionState::CleanWait,
        ProvisionState::CleanFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionState::Enroll => "enroll",
            ProvisionState::Verifying => "verifying",
            ProvisionState::Manageable => "manageable",
            ProvisionState::Inspecting => "inspecting",
            ProvisionState::InspectFailed => "inspect-failed",
            ProvisionState::Available => "available",
            ProvisionState::Deploying => "deploying",
            ProvisionState::WaitCallback => "wait-callback",
            ProvisionState::DeployFailed => "deploy-failed",
            ProvisionState::Active => "active",
            ProvisionState::Deleting => "deleting",
            ProvisionState::Deleted => "deleted",
            ProvisionState::Error => "error",
            ProvisionState::Cleaning => "cleaning",
            ProvisionState::CleanWait => "clean-wait",
            ProvisionState::CleanFailed => "clean-failed",
        }
    }

    /// Target state while an asynchronous action runs; `None` for resting states.
    pub fn target(&self) -> Option<ProvisionState> {
        match self {
            ProvisionState::Verifying | ProvisionState::Inspecting => {
                Some(ProvisionState::Manageable)
            }
            ProvisionState::Deploying | ProvisionState::WaitCallback => {
                Some(ProvisionState::Active)
            }
            ProvisionState::Deleting | ProvisionState::Cleaning | ProvisionState::CleanWait => {
                Some(ProvisionState::Available)
            }
            _ => None,
        }
    }

    /// Resting states, in which no provisioning action is in flight.
    pub fn is_stable(&self) -> bool {
        self.target().is_none()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProvisionState::Deleted)
    }

    /// States in which the node may be associated with or released from an instance.
    pub fn allows_update(&self) -> bool {
        matches!(
            self,
            ProvisionState::Deploying
                | ProvisionState::Available
                | ProvisionState::Active
                | ProvisionState::Manageable
                | ProvisionState::Enroll
                | ProvisionState::DeployFailed
                | ProvisionState::Error
        )
    }

    /// States from which the node record itself may be destroyed.
    pub fn allows_record_deletion(&self) -> bool {
        matches!(
            self,
            ProvisionState::Deleted
                | ProvisionState::Enroll
                | ProvisionState::Manageable
                | ProvisionState::Available
        )
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProvisionState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| Error::InvalidState(s.to_string()))
    }
}

/// Events accepted by the state machine
///
/// User verbs map onto events; `active` and `deleted` are the provisioning
/// targets that stand for `deploy` and `delete`. The remaining events are
/// raised internally by the conductor as asynchronous work progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Deploy,
    Rebuild,
    Delete,
    Manage,
    Provide,
    Inspect,
    Abort,
    Clean,
    Done,
    Fail,
    Wait,
    Resume,
    Error,
}

impl Event {
    pub const ALL: [Event; 13] = [
        Event::Deploy,
        Event::Rebuild,
        Event::Delete,
        Event::Manage,
        Event::Provide,
        Event::Inspect,
        Event::Abort,
        Event::Clean,
        Event::Done,
        Event::Fail,
        Event::Wait,
        Event::Resume,
        Event::Error,
    ];

    /// Verbs a client may request
    pub const VERBS: [&'static str; 7] = [
        "active", "rebuild", "deleted", "manage", "provide", "inspect", "abort",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Deploy => "deploy",
            Event::Rebuild => "rebuild",
            Event::Delete => "delete",
            Event::Manage => "manage",
            Event::Provide => "provide",
            Event::Inspect => "inspect",
            Event::Abort => "abort",
            Event::Clean => "clean",
            Event::Done => "done",
            Event::Fail => "fail",
            Event::Wait => "wait",
            Event::Resume => "resume",
            Event::Error => "error",
        }
    }

    /// Resolve a client verb. Internal event names are not verbs and yield `None`.
    pub fn from_verb(verb: &str) -> Option<Event> {
        if !Event::VERBS.contains(&verb) {
            return None;
        }
        Event::parse(verb)
    }

    /// Resolve a client verb or an event name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Event> {
        match name {
            "active" => Some(Event::Deploy),
            "deleted" => Some(Event::Delete),
            other => Event::ALL.iter().copied().find(|e| e.as_str() == other),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use Event as E;
use ProvisionState as S;

/// The transition table: (from, event, to)
pub const TRANSITIONS: &[(ProvisionState, Event, ProvisionState)] = &[
    // enrollment and verification
    (S::Enroll, E::Manage, S::Verifying),
    (S::Verifying, E::Done, S::Manageable),
    (S::Verifying, E::Fail, S::Enroll),
    // inspection
    (S::Manageable, E::Inspect, S::Inspecting),
    (S::Inspecting, E::Done, S::Manageable),
    (S::Inspecting, E::Fail, S::InspectFailed),
    (S::InspectFailed, E::Manage, S::Manageable),
    (S::InspectFailed, E::Inspect, S::Inspecting),
    // cleaning
    (S::Manageable, E::Provide, S::Cleaning),
    (S::Manageable, E::Clean, S::Cleaning),
    (S::Cleaning, E::Done, S::Available),
    (S::Cleaning, E::Wait, S::CleanWait),
    (S::Cleaning, E::Fail, S::CleanFailed),
    (S::CleanWait, E::Resume, S::Cleaning),
    (S::CleanWait, E::Fail, S::CleanFailed),
    (S::CleanWait, E::Abort, S::CleanFailed),
    (S::CleanFailed, E::Manage, S::Manageable),
    // deployment
    (S::Available, E::Manage, S::Manageable),
    (S::Available, E::Deploy, S::Deploying),
    (S::Deploying, E::Wait, S::WaitCallback),
    (S::Deploying, E::Done, S::Active),
    (S::Deploying, E::Fail, S::DeployFailed),
    (S::WaitCallback, E::Resume, S::Deploying),
    (S::WaitCallback, E::Fail, S::DeployFailed),
    (S::WaitCallback, E::Delete, S::Deleting),
    (S::DeployFailed, E::Rebuild, S::Deploying),
    (S::DeployFailed, E::Deploy, S::Deploying),
    (S::DeployFailed, E::Delete, S::Deleting),
    (S::Active, E::Rebuild, S::Deploying),
    (S::Active, E::Delete, S::Deleting),
    // tear down
    (S::Deleting, E::Clean, S::Cleaning),
    (S::Deleting, E::Done, S::Deleted),
    (S::Deleting, E::Error, S::Error),
    (S::Error, E::Rebuild, S::Deploying),
    (S::Error, E::Delete, S::Deleting),
];

/// Destination of `event` from `state`, if the edge exists.
pub fn next_state(state: ProvisionState, event: Event) -> Option<ProvisionState> {
    TRANSITIONS
        .iter()
        .find(|(from, ev, _)| *from == state && *ev == event)
        .map(|(_, _, to)| *to)
}

/// Every event with an edge leaving `state`, in table order.
pub fn next_legal_events(state: ProvisionState) -> Vec<Event> {
    TRANSITIONS
        .iter()
        .filter(|(from, _, _)| *from == state)
        .map(|(_, ev, _)| *ev)
        .collect()
}

/// Outcome of applying an event: the new state and the target to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ProvisionState,
    pub event: Event,
    pub to: ProvisionState,
    pub target: Option<ProvisionState>,
}

/// Apply `event` to `state`, failing with `InvalidStateRequested` when no edge exists.
pub fn apply_verb(node: &str, state: ProvisionState, event: Event) -> Result<Transition, Error> {
    let to = next_state(state, event).ok_or_else(|| Error::InvalidStateRequested {
        action: event.as_str().to_string(),
        node: node.to_string(),
        state: state.as_str().to_string(),
    })?;
    Ok(Transition {
        from: state,
        event,
        to,
        target: to.target(),
    })
}

/// A state machine bound to one validated current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateMachine {
    current: ProvisionState,
}

impl StateMachine {
    /// Bind to `current_state`; unknown names fail with `InvalidState`.
    pub fn initialize(current_state: &str) -> Result<Self, Error> {
        Ok(Self {
            current: current_state.parse()?,
        })
    }

    pub fn from_state(current: ProvisionState) -> Self {
        Self { current }
    }

    pub fn current_state(&self) -> ProvisionState {
        self.current
    }

    /// True iff an edge leaves the current state under `verb`. Unknown verbs are never actionable.
    pub fn is_actionable_event(&self, verb: &str) -> bool {
        Event::parse(verb)
            .and_then(|event| next_state(self.current, event))
            .is_some()
    }

    pub fn legal_events(&self) -> Vec<Event> {
        next_legal_events(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::{Event as E, ProvisionState as S};

    #[test]
    fn test_state_names_parse_back() {
        for state in ProvisionState::ALL {
            assert_eq!(state.as_str().parse::<ProvisionState>().unwrap(), state);
        }
        assert_eq!(
            "bogus".parse::<ProvisionState>(),
            Err(Error::InvalidState("bogus".to_string()))
        );
    }

    #[test]
    fn test_initialize_rejects_unknown_state() {
        assert!(StateMachine::initialize("available").is_ok());
        assert!(matches!(
            StateMachine::initialize("provisioned"),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_every_state_and_verb_is_decidable() {
        for state in ProvisionState::ALL {
            let machine = StateMachine::initialize(state.as_str()).unwrap();
            for verb in Event::VERBS {
                let _ = machine.is_actionable_event(verb);
            }
            for event in Event::ALL {
                let _ = machine.is_actionable_event(event.as_str());
            }
            assert!(!machine.is_actionable_event("frobnicate"));
        }
    }

    #[test]
    fn test_verb_aliases() {
        assert_eq!(Event::parse("active"), Some(Event::Deploy));
        assert_eq!(Event::parse("deleted"), Some(Event::Delete));
        assert_eq!(Event::parse("deploy"), Some(Event::Deploy));
        assert_eq!(Event::parse("nope"), None);
    }

    #[test]
    fn test_from_verb_only_knows_client_verbs() {
        assert_eq!(Event::from_verb("active"), Some(Event::Deploy));
        assert_eq!(Event::from_verb("deleted"), Some(Event::Delete));
        assert_eq!(Event::from_verb("abort"), Some(Event::Abort));
        for internal in ["deploy", "delete", "clean", "done", "fail", "wait", "resume", "error"] {
            assert_eq!(Event::from_verb(internal), None, "{} is not a client verb", internal);
        }
    }

    #[test]
    fn test_provide_from_available_is_rejected() {
        let machine = StateMachine::initialize("available").unwrap();
        assert!(!machine.is_actionable_event("provide"));
        assert!(machine.is_actionable_event("active"));
        assert!(machine.is_actionable_event("manage"));

        let err = apply_verb("n1", ProvisionState::Available, Event::Provide).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidStateRequested {
                action: "provide".to_string(),
                node: "n1".to_string(),
                state: "available".to_string(),
            }
        );
    }

    #[test]
    fn test_deploy_lifecycle() {
        let t = apply_verb("n", S::Available, E::Deploy).unwrap();
        assert_eq!(t.to, S::Deploying);
        assert_eq!(t.target, Some(S::Active));

        let t = apply_verb("n", t.to, E::Wait).unwrap();
        assert_eq!(t.to, S::WaitCallback);
        let t = apply_verb("n", t.to, E::Resume).unwrap();
        let t = apply_verb("n", t.to, E::Done).unwrap();
        assert_eq!(t.to, S::Active);
        assert_eq!(t.target, None);

        let t = apply_verb("n", t.to, E::Delete).unwrap();
        assert_eq!(t.to, S::Deleting);
        let t = apply_verb("n", t.to, E::Done).unwrap();
        assert!(t.to.is_terminal());
        assert!(next_legal_events(t.to).is_empty());
    }

    #[test]
    fn test_failure_states_are_stable() {
        let t = apply_verb("n", S::Deploying, E::Fail).unwrap();
        assert_eq!(t.to, S::DeployFailed);
        assert_eq!(t.target, None);
        assert!(S::CleanFailed.is_stable());
        assert!(S::InspectFailed.is_stable());
        assert!(!S::CleanWait.is_stable());
    }

    #[test]
    fn test_no_duplicate_edges() {
        for (i, (from, ev, _)) in TRANSITIONS.iter().enumerate() {
            for (other_from, other_ev, _) in &TRANSITIONS[i + 1..] {
                assert!(
                    !(from == other_from && ev == other_ev),
                    "duplicate edge {} --{}-->",
                    from,
                    ev
                );
            }
        }
    }

    #[test]
    fn test_record_deletion_states() {
        assert!(S::Deleted.allows_record_deletion());
        assert!(S::Available.allows_record_deletion());
        assert!(!S::Active.allows_record_deletion());
        assert!(!S::Deploying.allows_record_deletion());
    }
}
