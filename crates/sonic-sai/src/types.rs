//! Type-safe SAI object ID wrappers.
//!
//! Managers hold strongly-typed ids so a next-hop id can never be passed where
//! a group id is expected. The driver boundary itself speaks raw ids plus a
//! runtime [`SaiObjectType`], which is what the vendor API does.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Raw SAI object ID type (matches sai_object_id_t in C).
pub type RawSaiObjectId = u64;

/// Runtime object type, passed to [`crate::SaiDriver::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SaiObjectType {
    Port,
    VirtualRouter,
    RouterInterface,
    NextHop,
    NextHopGroup,
    NextHopGroupMember,
    Lag,
    LagMember,
    BridgePort,
    FdbEntry,
    RouteEntry,
}

impl SaiObjectType {
    pub const fn name(&self) -> &'static str {
        match self {
            SaiObjectType::Port => "Port",
            SaiObjectType::VirtualRouter => "VirtualRouter",
            SaiObjectType::RouterInterface => "RouterInterface",
            SaiObjectType::NextHop => "NextHop",
            SaiObjectType::NextHopGroup => "NextHopGroup",
            SaiObjectType::NextHopGroupMember => "NextHopGroupMember",
            SaiObjectType::Lag => "Lag",
            SaiObjectType::LagMember => "LagMember",
            SaiObjectType::BridgePort => "BridgePort",
            SaiObjectType::FdbEntry => "FdbEntry",
            SaiObjectType::RouteEntry => "RouteEntry",
        }
    }
}

impl fmt::Display for SaiObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Marker trait for SAI object kinds.
///
/// Each SAI object type implements this trait to enable compile-time
/// type checking of object IDs.
pub trait SaiObjectKind: Send + Sync + 'static {
    const OBJECT_TYPE: SaiObjectType;
}

/// A type-safe SAI object ID.
///
/// ```
/// use sonic_sai::{LagOid, NextHopOid};
///
/// let lag = LagOid::from_raw(0x2000).unwrap();
/// assert_eq!(lag.as_raw(), 0x2000);
/// assert!(NextHopOid::from_raw(0).is_none());
///
/// // This would fail to compile:
/// // fn takes_lag(l: LagOid) {}
/// // takes_lag(NextHopOid::from_raw(1).unwrap());
/// ```
pub struct SaiObjectId<T: SaiObjectKind> {
    raw: RawSaiObjectId,
    _marker: PhantomData<T>,
}

impl<T: SaiObjectKind> SaiObjectId<T> {
    /// The null object ID (SAI_NULL_OBJECT_ID).
    pub const NULL: Self = Self {
        raw: 0,
        _marker: PhantomData,
    };

    /// Creates an object ID from a raw value; `None` for the null id.
    pub fn from_raw(raw: RawSaiObjectId) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self {
                raw,
                _marker: PhantomData,
            })
        }
    }

    pub const fn as_raw(&self) -> RawSaiObjectId {
        self.raw
    }

    pub const fn is_null(&self) -> bool {
        self.raw == 0
    }

    pub const fn object_type() -> SaiObjectType {
        T::OBJECT_TYPE
    }
}

// Manual impls: derives would put bounds on T, which is only a marker.
impl<T: SaiObjectKind> Clone for SaiObjectId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: SaiObjectKind> Copy for SaiObjectId<T> {}

impl<T: SaiObjectKind> fmt::Debug for SaiObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:x})", T::OBJECT_TYPE, self.raw)
    }
}

impl<T: SaiObjectKind> fmt::Display for SaiObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.raw)
    }
}

impl<T: SaiObjectKind> PartialEq for SaiObjectId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: SaiObjectKind> Eq for SaiObjectId<T> {}

impl<T: SaiObjectKind> PartialOrd for SaiObjectId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: SaiObjectKind> Ord for SaiObjectId<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T: SaiObjectKind> Hash for SaiObjectId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: SaiObjectKind> Default for SaiObjectId<T> {
    fn default() -> Self {
        Self::NULL
    }
}

// ============================================================================
// Object Kind Markers
// ============================================================================

macro_rules! define_object_kind {
    ($name:ident, $object_type:ident, $oid_alias:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name;

        impl SaiObjectKind for $name {
            const OBJECT_TYPE: SaiObjectType = SaiObjectType::$object_type;
        }

        pub type $oid_alias = SaiObjectId<$name>;
    };
}

define_object_kind!(PortKind, Port, PortOid);
define_object_kind!(VirtualRouterKind, VirtualRouter, VirtualRouterOid);
define_object_kind!(RouterInterfaceKind, RouterInterface, RouterInterfaceOid);
define_object_kind!(NextHopKind, NextHop, NextHopOid);
define_object_kind!(NextHopGroupKind, NextHopGroup, NextHopGroupOid);
define_object_kind!(NextHopGroupMemberKind, NextHopGroupMember, NextHopGroupMemberOid);
define_object_kind!(LagKind, Lag, LagOid);
define_object_kind!(LagMemberKind, LagMember, LagMemberOid);
define_object_kind!(BridgePortKind, BridgePort, BridgePortOid);
define_object_kind!(FdbEntryKind, FdbEntry, FdbEntryOid);
define_object_kind!(RouteEntryKind, RouteEntry, RouteEntryOid);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_oid() {
        assert!(LagOid::from_raw(0).is_none());
        assert!(LagOid::NULL.is_null());
        assert!(LagOid::default().is_null());
    }

    #[test]
    fn test_oid_debug_names_kind() {
        let nhg = NextHopGroupOid::from_raw(0x5001).unwrap();
        assert_eq!(format!("{:?}", nhg), "NextHopGroup(0x5001)");
        assert_eq!(nhg.to_string(), "0x5001");
    }

    #[test]
    fn test_object_type_link() {
        assert_eq!(LagMemberOid::object_type(), SaiObjectType::LagMember);
        assert_eq!(RouteEntryOid::object_type(), SaiObjectType::RouteEntry);
    }

    #[test]
    fn test_oid_ordering() {
        let a = PortOid::from_raw(1).unwrap();
        let b = PortOid::from_raw(2).unwrap();
        assert!(a < b);
        assert_eq!(a, PortOid::from_raw(1).unwrap());
    }
}
