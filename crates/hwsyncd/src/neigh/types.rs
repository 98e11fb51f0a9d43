//! Neighbor types.

use serde::{Deserialize, Serialize};
use sonic_orch_common::RegistryKey;
use sonic_sai::MatchKey;
use sonic_types::{InterfaceId, IpAddress, MacAddress};
use std::fmt;

/// A neighbor: an IP address reached through a layer-3 interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NeighborKey {
    pub ip: IpAddress,
    pub interface: InterfaceId,
}

impl NeighborKey {
    pub fn new(ip: IpAddress, interface: InterfaceId) -> Self {
        Self { ip, interface }
    }
}

impl fmt::Display for NeighborKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ip, self.interface)
    }
}

/// Plain IP next hops are shared per neighbor.
impl RegistryKey for NeighborKey {
    fn match_key(&self) -> MatchKey {
        MatchKey::new(format!("nh:{self}"))
    }
}

/// A resolution report for one neighbor. `mac: None` means unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborUpdate {
    pub key: NeighborKey,
    #[serde(default)]
    pub mac: Option<MacAddress>,
}

impl NeighborUpdate {
    pub fn resolved(key: NeighborKey, mac: MacAddress) -> Self {
        Self {
            key,
            mac: Some(mac),
        }
    }

    pub fn unresolved(key: NeighborKey) -> Self {
        Self { key, mac: None }
    }
}

/// A dependency state flip delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyEvent {
    Resolved(NeighborKey),
    Unresolved(NeighborKey),
}

impl DependencyEvent {
    pub fn key(&self) -> NeighborKey {
        match self {
            DependencyEvent::Resolved(key) | DependencyEvent::Unresolved(key) => *key,
        }
    }
}
