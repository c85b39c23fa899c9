//! Ironfly storage
//!
//! Backend-agnostic persistence for nodes, ports and portgroups.
//!
//! The only cross-process shared state is a node's `reservation`. It is
//! never written by [`Store::update_node`]; [`Store::reserve_node`] and
//! [`Store::release_node`] change it as a compare-and-set against the
//! persisted value, so two exclusive holders can never overlap.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use ironfly_common::{NodeRecord, Port, Portgroup, Result};
use std::sync::Arc;
use uuid::Uuid;

/// Shared handle to a store backend
pub type SharedStore = Arc<dyn Store>;

/// Persistence interface consumed by the lock manager and the conductor.
///
/// All methods are async for compatibility with network-based backends.
/// Node identifiers accept either the uuid or the logical name.
#[async_trait]
pub trait Store: Send + Sync {
    // === Node Operations ===

    /// Insert a new node. Fails if the uuid or name is taken.
    async fn create_node(&self, node: NodeRecord) -> Result<NodeRecord>;

    /// Look up a node by uuid or name
    async fn get_node(&self, ident: &str) -> Result<NodeRecord>;

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>>;

    /// Persist every field except `reservation`, which keeps its stored value.
    async fn update_node(&self, node: &NodeRecord) -> Result<NodeRecord>;

    /// Delete a node and its ports and portgroups. The caller must hold the reservation.
    async fn destroy_node(&self, uuid: Uuid, tag: &str) -> Result<()>;

    /// Set `reservation` to `tag` iff it is currently unset.
    ///
    /// Returns the node as read in the same atomic step. Fails with
    /// `NodeLocked` naming the current holder otherwise, including when
    /// the holder is `tag` itself.
    async fn reserve_node(&self, ident: &str, tag: &str) -> Result<NodeRecord>;

    /// Clear `reservation` iff it equals `tag`; `NodeNotLocked` otherwise.
    async fn release_node(&self, uuid: Uuid, tag: &str) -> Result<()>;

    // === Port Operations ===

    /// Insert a port. The owning node must exist and the MAC must be unused.
    async fn create_port(&self, port: Port) -> Result<Port>;

    /// Look up a port by uuid or MAC address
    async fn get_port(&self, ident: &str) -> Result<Port>;

    /// Ports of a node in creation order
    async fn list_ports_by_node(&self, node_id: Uuid) -> Result<Vec<Port>>;

    async fn update_port(&self, port: &Port) -> Result<Port>;

    async fn destroy_port(&self, uuid: Uuid) -> Result<()>;

    // === Portgroup Operations ===

    async fn create_portgroup(&self, portgroup: Portgroup) -> Result<Portgroup>;

    async fn get_portgroup(&self, uuid: Uuid) -> Result<Portgroup>;

    /// Portgroups of a node in creation order
    async fn list_portgroups_by_node(&self, node_id: Uuid) -> Result<Vec<Portgroup>>;

    async fn update_portgroup(&self, portgroup: &Portgroup) -> Result<Portgroup>;

    async fn destroy_portgroup(&self, uuid: Uuid) -> Result<()>;
}
