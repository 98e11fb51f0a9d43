//! FDB types.

use serde::{Deserialize, Serialize};
use sonic_sai::MatchKey;
use sonic_types::{MacAddress, PortId, VlanId};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FdbKey {
    pub vlan: VlanId,
    pub mac: MacAddress,
}

impl FdbKey {
    pub fn new(vlan: VlanId, mac: MacAddress) -> Self {
        Self { vlan, mac }
    }

    pub(crate) fn match_key(&self) -> MatchKey {
        MatchKey::new(format!("fdb:{self}"))
    }
}

impl fmt::Display for FdbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.vlan, self.mac)
    }
}

/// A static MAC entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacEntry {
    #[serde(flatten)]
    pub key: FdbKey,
    pub port: PortId,
    /// Class id used by ACLs; 0 when unset.
    #[serde(default)]
    pub metadata: u32,
}

impl MacEntry {
    pub fn new(key: FdbKey, port: PortId) -> Self {
        Self {
            key,
            port,
            metadata: 0,
        }
    }

    pub fn with_metadata(mut self, metadata: u32) -> Self {
        self.metadata = metadata;
        self
    }
}
