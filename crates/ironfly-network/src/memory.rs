//! In-process network controller
//!
//! Holds ports in memory and supports injecting failures per call. Used by
//! tests and by the demo walkthrough.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::client::NetworkClient;
use crate::error::{NetworkClientError, Result};
use crate::types::{FixedIp, NetworkPort, PortBody, PortFilter};

#[derive(Default)]
struct ControllerState {
    ports: Vec<NetworkPort>,
    next_id: u64,
    create_calls: usize,
    created_bodies: Vec<PortBody>,
    updates: Vec<(String, PortBody)>,

    /// 1-based create calls that fail to connect
    fail_create_calls: HashSet<usize>,
    /// 1-based create calls answered without a port id
    omit_id_calls: HashSet<usize>,
    /// port ids whose updates fail to connect
    fail_update_ports: HashSet<String>,
    /// port ids whose show fails
    fail_show_ports: HashSet<String>,
    fail_list: bool,
    fail_delete: bool,
    /// subnet addresses handed out by create, in order
    next_ip: u8,
}

/// A network controller living in this process
#[derive(Default)]
pub struct InMemoryNetworkController {
    state: Mutex<ControllerState>,
}

impl InMemoryNetworkController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ControllerState>> {
        self.state
            .lock()
            .map_err(|e| NetworkClientError::ConnectionFailed(format!("controller state poisoned: {}", e)))
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ControllerState) -> R) -> R {
        match self.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Make the `n`th create call (1-based) fail with a connection error.
    pub fn fail_create_on_call(&self, n: usize) {
        self.with_state(|s| s.fail_create_calls.insert(n));
    }

    /// Make the `n`th create call (1-based) return a port without an id.
    pub fn omit_id_on_call(&self, n: usize) {
        self.with_state(|s| s.omit_id_calls.insert(n));
    }

    pub fn fail_updates_for(&self, port_id: &str) {
        self.with_state(|s| s.fail_update_ports.insert(port_id.to_string()));
    }

    pub fn fail_show_for(&self, port_id: &str) {
        self.with_state(|s| s.fail_show_ports.insert(port_id.to_string()));
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.with_state(|s| s.fail_list = fail);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.with_state(|s| s.fail_delete = fail);
    }

    /// Insert a port directly, e.g. one owned by another tenant.
    pub fn seed_port(&self, port: NetworkPort) {
        self.with_state(|s| s.ports.push(port));
    }

    pub fn ports(&self) -> Vec<NetworkPort> {
        self.with_state(|s| s.ports.clone())
    }

    pub fn ports_on(&self, network_id: &str) -> Vec<NetworkPort> {
        self.with_state(|s| {
            s.ports
                .iter()
                .filter(|p| p.network_id == network_id)
                .cloned()
                .collect()
        })
    }

    pub fn port(&self, port_id: &str) -> Option<NetworkPort> {
        self.with_state(|s| s.ports.iter().find(|p| p.id == port_id).cloned())
    }

    pub fn create_calls(&self) -> usize {
        self.with_state(|s| s.create_calls)
    }

    /// Bodies of every accepted create request, in order
    pub fn created_bodies(&self) -> Vec<PortBody> {
        self.with_state(|s| s.created_bodies.clone())
    }

    /// Every update request as (port id, body), in order
    pub fn updates(&self) -> Vec<(String, PortBody)> {
        self.with_state(|s| s.updates.clone())
    }
}

fn apply_body(port: &mut NetworkPort, body: &PortBody) {
    if let Some(v) = &body.network_id {
        port.network_id = v.clone();
    }
    if let Some(v) = body.admin_state_up {
        port.admin_state_up = v;
    }
    if let Some(v) = &body.device_owner {
        port.device_owner = v.clone();
    }
    if let Some(v) = &body.device_id {
        port.device_id = v.clone();
    }
    if let Some(v) = &body.mac_address {
        port.mac_address = v.clone();
    }
    if body.vnic_type.is_some() {
        port.vnic_type = body.vnic_type.clone();
    }
    if body.host_id.is_some() {
        port.host_id = body.host_id.clone();
    }
    if body.binding_profile.is_some() {
        port.binding_profile = body.binding_profile.clone();
    }
    if let Some(opts) = &body.extra_dhcp_opts {
        for opt in opts {
            port.extra_dhcp_opts.retain(|o| o.opt_name != opt.opt_name);
            if opt.opt_value.is_some() {
                port.extra_dhcp_opts.push(opt.clone());
            }
        }
    }
}

#[async_trait]
impl NetworkClient for InMemoryNetworkController {
    async fn create_port(&self, body: &PortBody) -> Result<Option<NetworkPort>> {
        let mut state = self.lock()?;
        state.create_calls += 1;
        let call = state.create_calls;

        if state.fail_create_calls.contains(&call) {
            return Err(NetworkClientError::ConnectionFailed(format!(
                "create call {} refused",
                call
            )));
        }
        if state.omit_id_calls.contains(&call) {
            return Ok(Some(NetworkPort::default()));
        }

        if let Some(mac) = &body.mac_address {
            let network = body.network_id.clone().unwrap_or_default();
            if state
                .ports
                .iter()
                .any(|p| p.network_id == network && p.mac_address.eq_ignore_ascii_case(mac))
            {
                return Err(NetworkClientError::Api {
                    status: 409,
                    message: format!("MAC address {} is already in use on network {}", mac, network),
                });
            }
        }

        state.next_id += 1;
        state.next_ip = state.next_ip.wrapping_add(1);
        let mut port = NetworkPort {
            id: format!("port-{}", state.next_id),
            fixed_ips: vec![FixedIp {
                subnet_id: "subnet-1".to_string(),
                ip_address: format!("10.0.0.{}", state.next_ip),
            }],
            ..Default::default()
        };
        apply_body(&mut port, body);
        state.created_bodies.push(body.clone());
        state.ports.push(port.clone());
        Ok(Some(port))
    }

    async fn delete_port(&self, port_id: &str) -> Result<()> {
        let mut state = self.lock()?;
        if state.fail_delete {
            return Err(NetworkClientError::ConnectionFailed("delete refused".to_string()));
        }
        let before = state.ports.len();
        state.ports.retain(|p| p.id != port_id);
        if state.ports.len() == before {
            return Err(NetworkClientError::NotFound(port_id.to_string()));
        }
        Ok(())
    }

    async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<NetworkPort>> {
        let state = self.lock()?;
        if state.fail_list {
            return Err(NetworkClientError::ConnectionFailed("list refused".to_string()));
        }
        Ok(state.ports.iter().filter(|p| filter.matches(p)).cloned().collect())
    }

    async fn update_port(&self, port_id: &str, body: &PortBody) -> Result<NetworkPort> {
        let mut state = self.lock()?;
        state.updates.push((port_id.to_string(), body.clone()));
        if state.fail_update_ports.contains(port_id) {
            return Err(NetworkClientError::ConnectionFailed(format!(
                "update of {} refused",
                port_id
            )));
        }
        let port = state
            .ports
            .iter_mut()
            .find(|p| p.id == port_id)
            .ok_or_else(|| NetworkClientError::NotFound(port_id.to_string()))?;
        apply_body(port, body);
        Ok(port.clone())
    }

    async fn show_port(&self, port_id: &str) -> Result<NetworkPort> {
        let state = self.lock()?;
        if state.fail_show_ports.contains(port_id) {
            return Err(NetworkClientError::ConnectionFailed(format!(
                "show of {} refused",
                port_id
            )));
        }
        state
            .ports
            .iter()
            .find(|p| p.id == port_id)
            .cloned()
            .ok_or_else(|| NetworkClientError::NotFound(port_id.to_string()))
    }
}
