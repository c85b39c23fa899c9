//! The scoped handle returned by [`TaskManager::acquire`](crate::TaskManager::acquire)

use ironfly_common::{apply_verb, Error, Event, NodeRecord, Port, Portgroup, Result, Transition};
use ironfly_store::SharedStore;
use tracing::{debug, warn};

use crate::pool::WorkerPermit;

/// A node together with its ports and portgroups, held under a lock.
///
/// Exclusive tasks own the node's reservation until [`Task::release`] is
/// awaited. Dropping an unreleased exclusive task spawns a best-effort
/// release; prefer calling `release()` explicitly.
pub struct Task {
    store: SharedStore,
    host: String,
    node: NodeRecord,
    ports: Vec<Port>,
    portgroups: Vec<Portgroup>,
    shared: bool,
    purpose: String,
    released: bool,
    _permit: WorkerPermit,
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: SharedStore,
        host: String,
        node: NodeRecord,
        ports: Vec<Port>,
        portgroups: Vec<Portgroup>,
        shared: bool,
        purpose: String,
        permit: WorkerPermit,
    ) -> Self {
        Self {
            store,
            host,
            node,
            ports,
            portgroups,
            shared,
            purpose,
            released: false,
            _permit: permit,
        }
    }

    pub fn node(&self) -> &NodeRecord {
        &self.node
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn portgroups(&self) -> &[Portgroup] {
        &self.portgroups
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    /// Identity recorded in the node's reservation
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    fn require_exclusive(&self) -> Result<()> {
        if self.shared {
            return Err(Error::ExclusiveLockRequired(self.node.uuid.to_string()));
        }
        Ok(())
    }

    pub fn node_mut(&mut self) -> Result<&mut NodeRecord> {
        self.require_exclusive()?;
        Ok(&mut self.node)
    }

    pub fn ports_mut(&mut self) -> Result<&mut [Port]> {
        self.require_exclusive()?;
        Ok(&mut self.ports)
    }

    pub fn portgroups_mut(&mut self) -> Result<&mut [Portgroup]> {
        self.require_exclusive()?;
        Ok(&mut self.portgroups)
    }

    /// Persist the node. The stored reservation is left untouched.
    pub async fn save_node(&mut self) -> Result<()> {
        self.require_exclusive()?;
        self.node = self.store.update_node(&self.node).await?;
        Ok(())
    }

    /// Persist the port at `index` in [`Task::ports`].
    pub async fn save_port(&mut self, index: usize) -> Result<()> {
        self.require_exclusive()?;
        let port = self
            .ports
            .get(index)
            .ok_or_else(|| Error::PortNotFound(format!("index {}", index)))?;
        let saved = self.store.update_port(port).await?;
        self.ports[index] = saved;
        Ok(())
    }

    pub async fn save_ports(&mut self) -> Result<()> {
        for index in 0..self.ports.len() {
            self.save_port(index).await?;
        }
        Ok(())
    }

    pub async fn save_portgroups(&mut self) -> Result<()> {
        self.require_exclusive()?;
        for index in 0..self.portgroups.len() {
            let saved = self.store.update_portgroup(&self.portgroups[index]).await?;
            self.portgroups[index] = saved;
        }
        Ok(())
    }

    /// Drive the state machine with `event` and record the new state and target.
    ///
    /// The change is applied to the in-memory node only; call
    /// [`Task::save_node`] to persist it.
    pub fn process_event(&mut self, event: Event) -> Result<Transition> {
        self.require_exclusive()?;
        let transition = apply_verb(
            &self.node.uuid.to_string(),
            self.node.provision_state,
            event,
        )?;
        self.node.set_provision_state(transition.to, transition.target);
        debug!(
            node = %self.node.uuid,
            event = %event,
            from = %transition.from,
            to = %transition.to,
            "Processed provisioning event"
        );
        Ok(transition)
    }

    /// Re-read ports and portgroups from the store.
    pub async fn refresh(&mut self) -> Result<()> {
        self.ports = self.store.list_ports_by_node(self.node.uuid).await?;
        self.portgroups = self.store.list_portgroups_by_node(self.node.uuid).await?;
        Ok(())
    }

    /// Release the lock.
    ///
    /// A shared task has nothing to release. For an exclusive task a
    /// `NodeNotLocked` result is logged and returned; the task is
    /// considered released either way.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        if self.shared {
            return Ok(());
        }
        match self.store.release_node(self.node.uuid, &self.host).await {
            Ok(()) => {
                debug!(node = %self.node.uuid, host = %self.host, purpose = %self.purpose, "Released node lock");
                Ok(())
            }
            Err(e) => {
                warn!(node = %self.node.uuid, host = %self.host, error = %e, "Failed to release node lock");
                Err(e)
            }
        }
    }

    /// Delete the node record while holding its reservation. Consumes the task.
    pub async fn destroy_node(mut self) -> Result<()> {
        self.require_exclusive()?;
        self.store.destroy_node(self.node.uuid, &self.host).await?;
        self.released = true;
        Ok(())
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if self.released || self.shared {
            return;
        }
        let store = self.store.clone();
        let uuid = self.node.uuid;
        let host = self.host.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.release_node(uuid, &host).await {
                        warn!(node = %uuid, host = %host, error = %e, "Best-effort release on drop failed");
                    }
                });
            }
            Err(_) => {
                warn!(node = %uuid, host = %host, "Task dropped outside a runtime; reservation left in place");
            }
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("node", &self.node.uuid)
            .field("host", &self.host)
            .field("shared", &self.shared)
            .field("purpose", &self.purpose)
            .field("ports", &self.ports.len())
            .finish()
    }
}
