//! Desired state and incremental updates.

use crate::fdb::{FdbKey, MacEntry};
use crate::lag::AggregatePort;
use crate::neigh::NeighborUpdate;
use crate::route::RouteNextHopEntry;
use serde::{Deserialize, Serialize};
use sonic_orch_common::{OrchError, OrchResult};
use sonic_types::{AggregatePortId, ClientId, InterfaceId, IpPrefix, PortId, RouterId};
use std::path::Path;

/// A front-panel port, matched to hardware by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub id: PortId,
    pub name: String,
}

/// A layer-3 interface on a port, in the default router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSpec {
    pub id: InterfaceId,
    pub port: PortId,
}

fn default_router() -> RouterId {
    RouterId::DEFAULT
}

fn default_client() -> ClientId {
    ClientId(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    #[serde(default = "default_router")]
    pub router: RouterId,
    #[serde(default = "default_client")]
    pub client: ClientId,
    pub prefix: IpPrefix,
    pub entry: RouteNextHopEntry,
}

/// Everything the agent should program at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DesiredState {
    pub ports: Vec<PortSpec>,
    pub interfaces: Vec<InterfaceSpec>,
    pub aggregate_ports: Vec<AggregatePort>,
    pub neighbors: Vec<NeighborUpdate>,
    pub routes: Vec<RouteSpec>,
    pub mac_entries: Vec<MacEntry>,
}

impl DesiredState {
    pub fn load(path: impl AsRef<Path>) -> OrchResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            OrchError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> OrchResult<Self> {
        serde_json::from_str(text).map_err(|e| OrchError::InvalidConfig(e.to_string()))
    }
}

/// One control-plane delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlPlaneUpdate {
    AggregatePortAdded {
        port: AggregatePort,
    },
    AggregatePortChanged {
        old: AggregatePort,
        new: AggregatePort,
    },
    AggregatePortRemoved {
        id: AggregatePortId,
    },
    Neighbor {
        update: NeighborUpdate,
    },
    RouteAdd {
        #[serde(default = "default_router")]
        router: RouterId,
        #[serde(default = "default_client")]
        client: ClientId,
        prefix: IpPrefix,
        entry: RouteNextHopEntry,
    },
    RouteDelete {
        #[serde(default = "default_router")]
        router: RouterId,
        #[serde(default = "default_client")]
        client: ClientId,
        prefix: IpPrefix,
    },
    /// Programs every queued route change.
    FlushRoutes,
    /// Withdraws every route a client holds in a router, queued or programmed.
    FlushClient {
        #[serde(default = "default_router")]
        router: RouterId,
        client: ClientId,
    },
    MacAdd {
        entry: MacEntry,
    },
    MacUpdate {
        key: FdbKey,
        #[serde(default)]
        port: Option<PortId>,
        #[serde(default)]
        metadata: Option<u32>,
    },
    MacRemove {
        key: FdbKey,
    },
}

impl ControlPlaneUpdate {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlPlaneUpdate::AggregatePortAdded { .. } => "aggregate_port_added",
            ControlPlaneUpdate::AggregatePortChanged { .. } => "aggregate_port_changed",
            ControlPlaneUpdate::AggregatePortRemoved { .. } => "aggregate_port_removed",
            ControlPlaneUpdate::Neighbor { .. } => "neighbor",
            ControlPlaneUpdate::RouteAdd { .. } => "route_add",
            ControlPlaneUpdate::RouteDelete { .. } => "route_delete",
            ControlPlaneUpdate::FlushRoutes => "flush_routes",
            ControlPlaneUpdate::FlushClient { .. } => "flush_client",
            ControlPlaneUpdate::MacAdd { .. } => "mac_add",
            ControlPlaneUpdate::MacUpdate { .. } => "mac_update",
            ControlPlaneUpdate::MacRemove { .. } => "mac_remove",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lag::ForwardingState;
    use pretty_assertions::assert_eq;

    const DESIRED: &str = r#"{
        "ports": [{"id": 1, "name": "Ethernet0"}, {"id": 2, "name": "Ethernet4"}],
        "interfaces": [{"id": 1, "port": 1}],
        "aggregate_ports": [
            {"id": 1, "name": "PortChannel1", "subports": [{"port": 2, "state": "enabled"}]}
        ],
        "neighbors": [
            {"key": {"ip": "10.0.0.1", "interface": 1}, "mac": "02:00:00:00:00:01"}
        ],
        "routes": [
            {"prefix": "192.168.0.0/16", "entry": {"next_hops": [{"ip": "10.0.0.1", "interface": 1}]}},
            {"router": 3, "client": 2, "prefix": "0.0.0.0/0", "entry": "drop"}
        ],
        "mac_entries": [{"vlan": 10, "mac": "02:00:00:00:00:99", "port": 1}]
    }"#;

    #[test]
    fn test_parse_desired_state() {
        let desired = DesiredState::from_json(DESIRED).unwrap();
        assert_eq!(desired.ports.len(), 2);
        assert_eq!(
            desired.aggregate_ports[0].subports[0].state,
            ForwardingState::Enabled
        );
        assert_eq!(desired.routes[0].router, RouterId::DEFAULT);
        assert_eq!(desired.routes[1].client, ClientId(2));
        assert_eq!(desired.routes[1].entry, RouteNextHopEntry::Drop);
        assert!(desired.neighbors[0].mac.is_some());
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(DesiredState::from_json(r#"{"vlans": []}"#).is_err());
        assert_eq!(DesiredState::from_json("{}").unwrap(), DesiredState::default());
    }

    #[test]
    fn test_update_json_shape() {
        let update: ControlPlaneUpdate = serde_json::from_str(
            r#"{"op": "route_delete", "prefix": "10.0.0.0/8"}"#,
        )
        .unwrap();
        assert_eq!(
            update,
            ControlPlaneUpdate::RouteDelete {
                router: RouterId::DEFAULT,
                client: ClientId(0),
                prefix: "10.0.0.0/8".parse().unwrap(),
            }
        );
        assert_eq!(update.kind(), "route_delete");

        let flush: ControlPlaneUpdate = serde_json::from_str(r#"{"op": "flush_routes"}"#).unwrap();
        assert_eq!(flush, ControlPlaneUpdate::FlushRoutes);

        let flush: ControlPlaneUpdate =
            serde_json::from_str(r#"{"op": "flush_client", "client": 3}"#).unwrap();
        assert_eq!(
            flush,
            ControlPlaneUpdate::FlushClient {
                router: RouterId::DEFAULT,
                client: ClientId(3),
            }
        );
        assert_eq!(flush.kind(), "flush_client");
    }
}
