//! Software identifiers.
//!
//! These are the ids the switch state hands out for ports, aggregate ports,
//! routing instances and route clients. They carry no hardware meaning; the
//! agent maps them onto SAI object ids.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $inner:ty, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            pub const fn new(id: $inner) -> Self {
                $name(id)
            }

            pub const fn get(&self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(id: $inner) -> Self {
                $name(id)
            }
        }
    };
}

define_id!(
    /// Front-panel port.
    PortId, u32, "port"
);
define_id!(
    /// Aggregate (LAG) port.
    AggregatePortId, u32, "aggport"
);
define_id!(
    /// Routing instance (VRF). `RouterId(0)` is the default instance.
    RouterId, u32, "vrf"
);
define_id!(
    /// Producer of routes (BGP, static config, ...).
    ClientId, u32, "client"
);
define_id!(
    /// Layer-3 interface.
    InterfaceId, u32, "intf"
);

impl RouterId {
    pub const DEFAULT: RouterId = RouterId(0);

    pub const fn is_default(&self) -> bool {
        self.0 == 0
    }
}

/// IEEE 802.1Q VLAN identifier (1-4094).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    pub const MIN: u16 = 1;
    pub const MAX: u16 = 4094;

    pub const fn new(id: u16) -> Result<Self, ParseError> {
        if id >= Self::MIN && id <= Self::MAX {
            Ok(VlanId(id))
        } else {
            Err(ParseError::InvalidVlanId(id))
        }
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vlan{}", self.0)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = ParseError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        VlanId::new(id)
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> u16 {
        vlan.0
    }
}
