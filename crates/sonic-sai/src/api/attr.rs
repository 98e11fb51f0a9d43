//! Attribute model passed across the driver boundary.

use crate::types::RawSaiObjectId;
use sonic_types::{IpAddress, IpPrefix, MacAddress, VlanId};
use std::fmt;
use std::ops::BitOr;

/// Forwarding action of a route entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PacketAction {
    #[default]
    Forward,
    Drop,
    /// Punt to the CPU port.
    Trap,
}

/// Flood classes blocked between two members of the same aggregate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FloodBlockMask(u8);

impl FloodBlockMask {
    pub const NONE: FloodBlockMask = FloodBlockMask(0);
    pub const BROADCAST: FloodBlockMask = FloodBlockMask(1);
    pub const UNKNOWN_UNICAST: FloodBlockMask = FloodBlockMask(1 << 1);
    pub const UNKNOWN_MULTICAST: FloodBlockMask = FloodBlockMask(1 << 2);

    /// The mask applied between members of one trunk.
    pub const ALL_FLOOD: FloodBlockMask =
        FloodBlockMask(Self::BROADCAST.0 | Self::UNKNOWN_UNICAST.0 | Self::UNKNOWN_MULTICAST.0);

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: FloodBlockMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FloodBlockMask {
    type Output = FloodBlockMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        FloodBlockMask(self.0 | rhs.0)
    }
}

/// Driver-assigned key used to match surviving objects at warm boot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchKey(String);

impl MatchKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MatchKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MatchKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An object attribute together with its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaiAttribute {
    /// Free-form label stored with the object; the warm-boot match key.
    Label(String),
    NextHopIp(IpAddress),
    RouterInterfaceId(RawSaiObjectId),
    /// MPLS labels pushed by a next hop, outermost first.
    LabelStack(Vec<u32>),
    NextHopGroupId(RawSaiObjectId),
    /// Next hop (or next-hop group) a member or route forwards to.
    NextHopId(RawSaiObjectId),
    Weight(u32),
    LagId(RawSaiObjectId),
    PortId(RawSaiObjectId),
    /// Read-only: the current members of a LAG.
    LagMemberList(Vec<RawSaiObjectId>),
    /// Blocks the given flood classes from this port towards `egress_port`.
    FloodBlock {
        egress_port: RawSaiObjectId,
        mask: FloodBlockMask,
    },
    VirtualRouterId(RawSaiObjectId),
    Destination(IpPrefix),
    PacketAction(PacketAction),
    BridgePortId(RawSaiObjectId),
    /// FDB entry class id.
    Metadata(u32),
    Vlan(VlanId),
    MacAddress(MacAddress),
}

/// Attribute identifiers, used to read an attribute back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaiAttrId {
    Label,
    NextHopIp,
    RouterInterfaceId,
    LabelStack,
    NextHopGroupId,
    NextHopId,
    Weight,
    LagId,
    PortId,
    LagMemberList,
    FloodBlock,
    VirtualRouterId,
    Destination,
    PacketAction,
    BridgePortId,
    Metadata,
    Vlan,
    MacAddress,
}

impl SaiAttribute {
    pub fn id(&self) -> SaiAttrId {
        match self {
            SaiAttribute::Label(_) => SaiAttrId::Label,
            SaiAttribute::NextHopIp(_) => SaiAttrId::NextHopIp,
            SaiAttribute::RouterInterfaceId(_) => SaiAttrId::RouterInterfaceId,
            SaiAttribute::LabelStack(_) => SaiAttrId::LabelStack,
            SaiAttribute::NextHopGroupId(_) => SaiAttrId::NextHopGroupId,
            SaiAttribute::NextHopId(_) => SaiAttrId::NextHopId,
            SaiAttribute::Weight(_) => SaiAttrId::Weight,
            SaiAttribute::LagId(_) => SaiAttrId::LagId,
            SaiAttribute::PortId(_) => SaiAttrId::PortId,
            SaiAttribute::LagMemberList(_) => SaiAttrId::LagMemberList,
            SaiAttribute::FloodBlock { .. } => SaiAttrId::FloodBlock,
            SaiAttribute::VirtualRouterId(_) => SaiAttrId::VirtualRouterId,
            SaiAttribute::Destination(_) => SaiAttrId::Destination,
            SaiAttribute::PacketAction(_) => SaiAttrId::PacketAction,
            SaiAttribute::BridgePortId(_) => SaiAttrId::BridgePortId,
            SaiAttribute::Metadata(_) => SaiAttrId::Metadata,
            SaiAttribute::Vlan(_) => SaiAttrId::Vlan,
            SaiAttribute::MacAddress(_) => SaiAttrId::MacAddress,
        }
    }
}

impl fmt::Display for SaiAttrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
