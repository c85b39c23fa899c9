//! Power driver seam and the bookkeeping around power changes

use async_trait::async_trait;
use ironfly_common::{Error, NodeRecord, PowerState, Result};
use ironfly_task::Task;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Talks to a node's management controller.
#[async_trait]
pub trait PowerDriver: Send + Sync {
    /// Current power state as reported by the hardware
    async fn get_power_state(&self, node: &NodeRecord) -> Result<PowerState>;

    /// Switch to `On` or `Off`
    async fn set_power_state(&self, node: &NodeRecord, state: PowerState) -> Result<()>;

    /// Power cycle; the node ends up on
    async fn reboot(&self, node: &NodeRecord) -> Result<()>;
}

/// In-memory driver: every node starts powered off.
#[derive(Default)]
pub struct FakePowerDriver {
    states: Mutex<HashMap<Uuid, PowerState>>,
    failing: Mutex<HashSet<Uuid>>,
    calls: Mutex<Vec<(Uuid, PowerState)>>,
}

impl FakePowerDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call for `node` fail.
    pub fn fail_for(&self, node: Uuid) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(node);
        }
    }

    pub fn recover(&self, node: Uuid) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(&node);
        }
    }

    pub fn state_of(&self, node: Uuid) -> PowerState {
        self.states
            .lock()
            .ok()
            .and_then(|s| s.get(&node).copied())
            .unwrap_or(PowerState::Off)
    }

    /// Every accepted change as (node, requested state), in order
    pub fn calls(&self) -> Vec<(Uuid, PowerState)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn check(&self, node: &NodeRecord) -> Result<()> {
        let failing = self
            .failing
            .lock()
            .map_err(|e| Error::PowerStateFailure {
                node: node.uuid.to_string(),
                reason: e.to_string(),
            })?;
        if failing.contains(&node.uuid) {
            return Err(Error::PowerStateFailure {
                node: node.uuid.to_string(),
                reason: "management controller unreachable".to_string(),
            });
        }
        Ok(())
    }

    fn record(&self, node: &NodeRecord, requested: PowerState, result: PowerState) {
        if let Ok(mut states) = self.states.lock() {
            states.insert(node.uuid, result);
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((node.uuid, requested));
        }
    }
}

#[async_trait]
impl PowerDriver for FakePowerDriver {
    async fn get_power_state(&self, node: &NodeRecord) -> Result<PowerState> {
        self.check(node)?;
        Ok(self.state_of(node.uuid))
    }

    async fn set_power_state(&self, node: &NodeRecord, state: PowerState) -> Result<()> {
        self.check(node)?;
        if !matches!(state, PowerState::On | PowerState::Off) {
            return Err(Error::InvalidParameterValue(format!(
                "set_power_state called with invalid power state {}",
                state
            )));
        }
        self.record(node, state, state);
        Ok(())
    }

    async fn reboot(&self, node: &NodeRecord) -> Result<()> {
        self.check(node)?;
        self.record(node, PowerState::Rebooting, PowerState::On);
        Ok(())
    }
}

/// Change a node's power state and keep its power fields in step.
///
/// While the driver works, `target_power_state` names where the node is
/// heading. Afterwards it is cleared and `power_state` holds the result.
/// A failure is recorded in `last_error` and returned as
/// `PowerStateFailure`. Asking for the state the node is already in only
/// refreshes the record.
pub async fn node_power_action(task: &mut Task, driver: &dyn PowerDriver, state: PowerState) -> Result<()> {
    let uuid = task.node().uuid;
    let target = match state {
        PowerState::Rebooting => PowerState::On,
        other => other,
    };

    if state != PowerState::Rebooting {
        let current = match driver.get_power_state(task.node()).await {
            Ok(current) => current,
            Err(e) => {
                let node = task.node_mut()?;
                node.last_error = Some(format!(
                    "Failed to change power state to '{}'. Error: {}",
                    target, e
                ));
                task.save_node().await?;
                return Err(power_failure(uuid, e));
            }
        };
        if current == target {
            warn!(node = %uuid, state = %target, "Not going to change node power state because current state equals requested state");
            let node = task.node_mut()?;
            node.power_state = Some(current);
            node.target_power_state = None;
            node.last_error = None;
            task.save_node().await?;
            return Ok(());
        }
    }

    {
        let node = task.node_mut()?;
        node.target_power_state = Some(target);
        node.last_error = None;
    }
    task.save_node().await?;

    let result = match state {
        PowerState::Rebooting => driver.reboot(task.node()).await,
        _ => driver.set_power_state(task.node(), target).await,
    };

    let node = task.node_mut()?;
    node.target_power_state = None;
    match result {
        Ok(()) => {
            node.power_state = Some(target);
            task.save_node().await?;
            info!(node = %uuid, state = %target, "Successfully set node power state");
            Ok(())
        }
        Err(e) => {
            node.last_error = Some(format!(
                "Failed to change power state to '{}'. Error: {}",
                target, e
            ));
            task.save_node().await?;
            error!(node = %uuid, state = %target, error = %e, "Failed to change node power state");
            Err(power_failure(uuid, e))
        }
    }
}

fn power_failure(node: Uuid, cause: Error) -> Error {
    match cause {
        Error::PowerStateFailure { .. } => cause,
        other => Error::PowerStateFailure {
            node: node.to_string(),
            reason: other.to_string(),
        },
    }
}
