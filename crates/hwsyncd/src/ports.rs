//! Mapping between software port/interface ids and hardware objects.
//!
//! Front-panel ports exist in hardware before the agent starts; router
//! interfaces are created by the agent. Both are fixed for the lifetime of
//! the process once startup completes.

use sonic_orch_common::{OrchError, OrchResult};
use sonic_sai::{PortOid, RouterInterfaceOid};
use sonic_types::{InterfaceId, PortId};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct PortTable {
    ports: BTreeMap<PortId, PortOid>,
    by_oid: HashMap<PortOid, PortId>,
    interfaces: BTreeMap<InterfaceId, RouterInterfaceOid>,
}

impl PortTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_port(&mut self, id: PortId, oid: PortOid) {
        if let Some(old) = self.ports.insert(id, oid) {
            self.by_oid.remove(&old);
        }
        self.by_oid.insert(oid, id);
    }

    pub fn port_oid(&self, id: PortId) -> OrchResult<PortOid> {
        self.ports
            .get(&id)
            .copied()
            .ok_or_else(|| OrchError::unknown(format!("port {id}")))
    }

    pub fn port_id(&self, oid: PortOid) -> Option<PortId> {
        self.by_oid.get(&oid).copied()
    }

    pub fn add_interface(&mut self, id: InterfaceId, oid: RouterInterfaceOid) {
        self.interfaces.insert(id, oid);
    }

    pub fn interface_oid(&self, id: InterfaceId) -> OrchResult<RouterInterfaceOid> {
        self.interfaces
            .get(&id)
            .copied()
            .ok_or_else(|| OrchError::unknown(format!("interface {id}")))
    }

    /// Snapshot of the port map, for the link-event path.
    pub fn port_map(&self) -> HashMap<PortId, PortOid> {
        self.ports.iter().map(|(id, oid)| (*id, *oid)).collect()
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }
}
