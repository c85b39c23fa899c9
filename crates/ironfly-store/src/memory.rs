//! In-memory storage backend
//!
//! Simple storage for tests, the demo and single-process deployments.
//! All tables sit behind one RwLock so that reserve/release read and
//! write the node in a single critical section.

use async_trait::async_trait;
use chrono::Utc;
use ironfly_common::{normalize_mac, Error, NodeRecord, Port, Portgroup, Result};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use uuid::Uuid;

use crate::Store;

#[derive(Default)]
struct Tables {
    nodes: HashMap<Uuid, NodeRecord>,
    /// node name -> node UUID
    name_index: HashMap<String, Uuid>,

    ports: HashMap<Uuid, Port>,
    /// creation order of ports
    port_order: Vec<Uuid>,
    /// MAC address (normalized) -> port UUID
    mac_index: HashMap<String, Uuid>,

    portgroups: HashMap<Uuid, Portgroup>,
    portgroup_order: Vec<Uuid>,
}

impl Tables {
    fn resolve_node(&self, ident: &str) -> Result<Uuid> {
        if let Ok(uuid) = Uuid::parse_str(ident) {
            if self.nodes.contains_key(&uuid) {
                return Ok(uuid);
            }
        }
        self.name_index
            .get(ident)
            .copied()
            .ok_or_else(|| Error::NodeNotFound(ident.to_string()))
    }

    fn node_mut(&mut self, uuid: Uuid) -> Result<&mut NodeRecord> {
        self.nodes
            .get_mut(&uuid)
            .ok_or_else(|| Error::NodeNotFound(uuid.to_string()))
    }

    fn check_mac_free(&self, mac: &str, port: Uuid) -> Result<()> {
        match self.mac_index.get(mac) {
            Some(owner) if *owner != port => Err(Error::MacAlreadyExists(mac.to_string())),
            _ => Ok(()),
        }
    }
}

/// Nodes, ports and portgroups keyed by UUID.
///
/// Nodes also resolve by name and ports by normalized MAC. Port and
/// portgroup listings come back in creation order.
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// A poisoned lock surfaces as `Error::Store`.
    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|e| Error::Store(format!("write lock poisoned: {}", e)))
    }

    fn read_lock(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|e| Error::Store(format!("read lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_node(&self, node: NodeRecord) -> Result<NodeRecord> {
        let mut tables = self.write_lock()?;
        if tables.nodes.contains_key(&node.uuid) {
            return Err(Error::NodeAlreadyExists(node.uuid.to_string()));
        }
        if let Some(name) = &node.name {
            if tables.name_index.contains_key(name) {
                return Err(Error::NodeAlreadyExists(name.clone()));
            }
            tables.name_index.insert(name.clone(), node.uuid);
        }
        tables.nodes.insert(node.uuid, node.clone());
        Ok(node)
    }

    async fn get_node(&self, ident: &str) -> Result<NodeRecord> {
        let tables = self.read_lock()?;
        let uuid = tables.resolve_node(ident)?;
        tables
            .nodes
            .get(&uuid)
            .cloned()
            .ok_or_else(|| Error::NodeNotFound(ident.to_string()))
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        let tables = self.read_lock()?;
        let mut nodes: Vec<_> = tables.nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.created_at);
        Ok(nodes)
    }

    async fn update_node(&self, node: &NodeRecord) -> Result<NodeRecord> {
        let mut tables = self.write_lock()?;
        let stored = tables
            .nodes
            .get(&node.uuid)
            .ok_or_else(|| Error::NodeNotFound(node.uuid.to_string()))?;
        let old_name = stored.name.clone();
        let reservation = stored.reservation.clone();

        if node.name != old_name {
            if let Some(name) = &node.name {
                if tables.name_index.contains_key(name) {
                    return Err(Error::NodeAlreadyExists(name.clone()));
                }
                tables.name_index.insert(name.clone(), node.uuid);
            }
            if let Some(old) = old_name {
                tables.name_index.remove(&old);
            }
        }

        let mut updated = node.clone();
        updated.reservation = reservation;
        updated.updated_at = Some(Utc::now());
        tables.nodes.insert(updated.uuid, updated.clone());
        Ok(updated)
    }

    async fn destroy_node(&self, uuid: Uuid, tag: &str) -> Result<()> {
        let mut tables = self.write_lock()?;
        let node = tables
            .nodes
            .get(&uuid)
            .ok_or_else(|| Error::NodeNotFound(uuid.to_string()))?;
        match node.reservation.as_deref() {
            Some(holder) if holder == tag => {}
            Some(holder) => {
                return Err(Error::NodeLocked {
                    node: uuid.to_string(),
                    host: holder.to_string(),
                })
            }
            None => return Err(Error::NodeNotLocked(uuid.to_string())),
        }

        if let Some(node) = tables.nodes.remove(&uuid) {
            if let Some(name) = node.name {
                tables.name_index.remove(&name);
            }
        }

        let port_ids: Vec<Uuid> = tables
            .ports
            .values()
            .filter(|p| p.node_id == uuid)
            .map(|p| p.uuid)
            .collect();
        for id in &port_ids {
            if let Some(port) = tables.ports.remove(id) {
                tables.mac_index.remove(&port.address);
            }
        }
        tables.port_order.retain(|id| !port_ids.contains(id));

        tables.portgroups.retain(|_, pg| pg.node_id != uuid);
        let Tables {
            portgroups,
            portgroup_order,
            ..
        } = &mut *tables;
        portgroup_order.retain(|id| portgroups.contains_key(id));

        debug!(node = %uuid, ports = port_ids.len(), "Destroyed node");
        Ok(())
    }

    async fn reserve_node(&self, ident: &str, tag: &str) -> Result<NodeRecord> {
        let mut tables = self.write_lock()?;
        let uuid = tables.resolve_node(ident)?;
        let node = tables.node_mut(uuid)?;
        if let Some(holder) = &node.reservation {
            return Err(Error::NodeLocked {
                node: uuid.to_string(),
                host: holder.clone(),
            });
        }
        node.reservation = Some(tag.to_string());
        Ok(node.clone())
    }

    async fn release_node(&self, uuid: Uuid, tag: &str) -> Result<()> {
        let mut tables = self.write_lock()?;
        let node = tables.node_mut(uuid)?;
        if node.reservation.as_deref() != Some(tag) {
            return Err(Error::NodeNotLocked(uuid.to_string()));
        }
        node.reservation = None;
        Ok(())
    }

    async fn create_port(&self, mut port: Port) -> Result<Port> {
        let mut tables = self.write_lock()?;
        if !tables.nodes.contains_key(&port.node_id) {
            return Err(Error::NodeNotFound(port.node_id.to_string()));
        }
        port.address = normalize_mac(&port.address);
        tables.check_mac_free(&port.address, port.uuid)?;

        tables.mac_index.insert(port.address.clone(), port.uuid);
        tables.port_order.push(port.uuid);
        tables.ports.insert(port.uuid, port.clone());
        Ok(port)
    }

    async fn get_port(&self, ident: &str) -> Result<Port> {
        let tables = self.read_lock()?;
        let uuid = match Uuid::parse_str(ident) {
            Ok(uuid) => Some(uuid),
            Err(_) => tables.mac_index.get(&normalize_mac(ident)).copied(),
        };
        uuid.and_then(|id| tables.ports.get(&id).cloned())
            .ok_or_else(|| Error::PortNotFound(ident.to_string()))
    }

    async fn list_ports_by_node(&self, node_id: Uuid) -> Result<Vec<Port>> {
        let tables = self.read_lock()?;
        Ok(tables
            .port_order
            .iter()
            .filter_map(|id| tables.ports.get(id))
            .filter(|p| p.node_id == node_id)
            .cloned()
            .collect())
    }

    async fn update_port(&self, port: &Port) -> Result<Port> {
        let mut tables = self.write_lock()?;
        let old_address = tables
            .ports
            .get(&port.uuid)
            .map(|p| p.address.clone())
            .ok_or_else(|| Error::PortNotFound(port.uuid.to_string()))?;

        let mut updated = port.clone();
        updated.address = normalize_mac(&port.address);
        if updated.address != old_address {
            tables.check_mac_free(&updated.address, updated.uuid)?;
            tables.mac_index.remove(&old_address);
            tables
                .mac_index
                .insert(updated.address.clone(), updated.uuid);
        }
        tables.ports.insert(updated.uuid, updated.clone());
        Ok(updated)
    }

    async fn destroy_port(&self, uuid: Uuid) -> Result<()> {
        let mut tables = self.write_lock()?;
        let port = tables
            .ports
            .remove(&uuid)
            .ok_or_else(|| Error::PortNotFound(uuid.to_string()))?;
        tables.mac_index.remove(&port.address);
        tables.port_order.retain(|id| *id != uuid);
        Ok(())
    }

    async fn create_portgroup(&self, portgroup: Portgroup) -> Result<Portgroup> {
        let mut tables = self.write_lock()?;
        if !tables.nodes.contains_key(&portgroup.node_id) {
            return Err(Error::NodeNotFound(portgroup.node_id.to_string()));
        }
        tables.portgroup_order.push(portgroup.uuid);
        tables.portgroups.insert(portgroup.uuid, portgroup.clone());
        Ok(portgroup)
    }

    async fn get_portgroup(&self, uuid: Uuid) -> Result<Portgroup> {
        let tables = self.read_lock()?;
        tables
            .portgroups
            .get(&uuid)
            .cloned()
            .ok_or_else(|| Error::PortgroupNotFound(uuid.to_string()))
    }

    async fn list_portgroups_by_node(&self, node_id: Uuid) -> Result<Vec<Portgroup>> {
        let tables = self.read_lock()?;
        Ok(tables
            .portgroup_order
            .iter()
            .filter_map(|id| tables.portgroups.get(id))
            .filter(|pg| pg.node_id == node_id)
            .cloned()
            .collect())
    }

    async fn update_portgroup(&self, portgroup: &Portgroup) -> Result<Portgroup> {
        let mut tables = self.write_lock()?;
        if !tables.portgroups.contains_key(&portgroup.uuid) {
            return Err(Error::PortgroupNotFound(portgroup.uuid.to_string()));
        }
        tables.portgroups.insert(portgroup.uuid, portgroup.clone());
        Ok(portgroup.clone())
    }

    async fn destroy_portgroup(&self, uuid: Uuid) -> Result<()> {
        let mut tables = self.write_lock()?;
        tables
            .portgroups
            .remove(&uuid)
            .ok_or_else(|| Error::PortgroupNotFound(uuid.to_string()))?;
        tables.portgroup_order.retain(|id| *id != uuid);
        for port in tables.ports.values_mut() {
            if port.portgroup_id == Some(uuid) {
                port.portgroup_id = None;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironfly_common::VifCarrier;
    use std::sync::Arc;

    async fn store_with_node() -> (MemoryStore, NodeRecord) {
        let store = MemoryStore::new();
        let node = store
            .create_node(NodeRecord::new("fake").with_name("node-1"))
            .await
            .unwrap();
        (store, node)
    }

    #[tokio::test]
    async fn test_get_node_by_uuid_or_name() {
        let (store, node) = store_with_node().await;
        assert_eq!(store.get_node("node-1").await.unwrap().uuid, node.uuid);
        assert_eq!(
            store.get_node(&node.uuid.to_string()).await.unwrap().uuid,
            node.uuid
        );
        assert_eq!(
            store.get_node("node-2").await.unwrap_err(),
            Error::NodeNotFound("node-2".to_string())
        );
    }

    #[tokio::test]
    async fn test_reserve_is_compare_and_set() {
        let (store, node) = store_with_node().await;

        let reserved = store.reserve_node("node-1", "host-a").await.unwrap();
        assert_eq!(reserved.reservation.as_deref(), Some("host-a"));

        let err = store.reserve_node("node-1", "host-b").await.unwrap_err();
        assert_eq!(
            err,
            Error::NodeLocked {
                node: node.uuid.to_string(),
                host: "host-a".to_string(),
            }
        );

        // Same holder cannot re-enter either
        assert!(matches!(
            store.reserve_node("node-1", "host-a").await,
            Err(Error::NodeLocked { .. })
        ));
    }

    #[tokio::test]
    async fn test_release_requires_matching_holder() {
        let (store, node) = store_with_node().await;
        store.reserve_node("node-1", "host-a").await.unwrap();

        assert_eq!(
            store.release_node(node.uuid, "host-b").await.unwrap_err(),
            Error::NodeNotLocked(node.uuid.to_string())
        );
        // wrong release did not disturb the holder
        let current = store.get_node("node-1").await.unwrap();
        assert_eq!(current.reservation.as_deref(), Some("host-a"));

        store.release_node(node.uuid, "host-a").await.unwrap();
        assert!(matches!(
            store.release_node(node.uuid, "host-a").await,
            Err(Error::NodeNotLocked(_))
        ));
    }

    #[tokio::test]
    async fn test_update_node_preserves_reservation() {
        let (store, node) = store_with_node().await;
        store.reserve_node("node-1", "host-a").await.unwrap();

        let mut stale = node.clone();
        stale.reservation = None;
        stale.last_error = Some("boom".to_string());
        let updated = store.update_node(&stale).await.unwrap();

        assert_eq!(updated.reservation.as_deref(), Some("host-a"));
        assert_eq!(updated.last_error.as_deref(), Some("boom"));
        assert!(updated.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_update_node_renames() {
        let (store, node) = store_with_node().await;
        let renamed = node.clone().with_name("node-renamed");
        store.update_node(&renamed).await.unwrap();
        assert!(store.get_node("node-1").await.is_err());
        assert!(store.get_node("node-renamed").await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_reserve_has_one_winner() {
        let (store, _) = store_with_node().await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.reserve_node("node-1", &format!("host-{}", i)).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(e) => assert!(matches!(e, Error::NodeLocked { .. })),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_port_mac_uniqueness_and_lookup() {
        let (store, node) = store_with_node().await;
        let port = store
            .create_port(Port::new(node.uuid, "52:54:00:AA:BB:01"))
            .await
            .unwrap();

        let dup = Port::new(node.uuid, "52-54-00-aa-bb-01");
        assert_eq!(
            store.create_port(dup).await.unwrap_err(),
            Error::MacAlreadyExists("52:54:00:aa:bb:01".to_string())
        );

        assert_eq!(
            store.get_port("52:54:00:aa:bb:01").await.unwrap().uuid,
            port.uuid
        );
        assert!(matches!(
            store.get_port("52:54:00:aa:bb:99").await,
            Err(Error::PortNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ports_listed_in_creation_order() {
        let (store, node) = store_with_node().await;
        let mut expected = Vec::new();
        for i in 0..5 {
            let port = store
                .create_port(Port::new(node.uuid, &format!("52:54:00:00:00:0{}", i)))
                .await
                .unwrap();
            expected.push(port.uuid);
        }
        let listed: Vec<_> = store
            .list_ports_by_node(node.uuid)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.uuid)
            .collect();
        assert_eq!(listed, expected);
    }

    #[tokio::test]
    async fn test_update_port_extra() {
        let (store, node) = store_with_node().await;
        let mut port = store
            .create_port(Port::new(node.uuid, "52:54:00:00:00:01"))
            .await
            .unwrap();
        port.set_vif_port_id("vif-1");
        store.update_port(&port).await.unwrap();
        let stored = store.get_port(&port.uuid.to_string()).await.unwrap();
        assert_eq!(stored.vif_port_id(), Some("vif-1"));
    }

    #[tokio::test]
    async fn test_destroy_node_requires_reservation_and_cascades() {
        let (store, node) = store_with_node().await;
        store
            .create_port(Port::new(node.uuid, "52:54:00:00:00:01"))
            .await
            .unwrap();
        store
            .create_portgroup(Portgroup::new(node.uuid))
            .await
            .unwrap();

        assert!(matches!(
            store.destroy_node(node.uuid, "host-a").await,
            Err(Error::NodeNotLocked(_))
        ));

        store.reserve_node("node-1", "host-a").await.unwrap();
        store.destroy_node(node.uuid, "host-a").await.unwrap();

        assert!(store.get_node("node-1").await.is_err());
        assert!(store.list_ports_by_node(node.uuid).await.unwrap().is_empty());
        assert!(store
            .list_portgroups_by_node(node.uuid)
            .await
            .unwrap()
            .is_empty());
        // MAC is free again
        let other = store.create_node(NodeRecord::new("fake")).await.unwrap();
        assert!(store
            .create_port(Port::new(other.uuid, "52:54:00:00:00:01"))
            .await
            .is_ok());
    }
}
