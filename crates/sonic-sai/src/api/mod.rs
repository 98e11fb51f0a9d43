//! The driver capability the agent programs hardware through.
//!
//! Callers only distinguish success, not-found and any other failure. See
//! [`crate::SaiError::is_not_found`].

mod attr;

pub use attr::{FloodBlockMask, MatchKey, PacketAction, SaiAttrId, SaiAttribute};

use crate::error::{SaiError, SaiResult, SaiStatus};
use crate::types::{
    LagMemberOid, LagOid, PortOid, RawSaiObjectId, SaiObjectId, SaiObjectKind, SaiObjectType,
};

/// The LAG that currently holds a port, and the member object linking them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMembership {
    pub group: LagOid,
    pub member: LagMemberOid,
}

/// An object found in hardware at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingObject {
    pub oid: RawSaiObjectId,
    pub match_key: MatchKey,
}

/// Synchronous ASIC driver.
///
/// Calls are assumed bounded-latency. Implementations must be callable from
/// the control-plane task and the link-event task at once.
pub trait SaiDriver: Send + Sync {
    /// Creates an object and returns its id.
    fn create(
        &self,
        object_type: SaiObjectType,
        attrs: &[SaiAttribute],
    ) -> SaiResult<RawSaiObjectId>;

    /// Removes an object. An absent object yields a not-found error.
    fn remove(&self, oid: RawSaiObjectId) -> SaiResult<()>;

    fn get_attribute(&self, oid: RawSaiObjectId, attr: SaiAttrId) -> SaiResult<SaiAttribute>;

    fn set_attribute(&self, oid: RawSaiObjectId, attr: SaiAttribute) -> SaiResult<()>;

    /// Reverse lookup from a physical port to the LAG containing it.
    fn find_containing_group(&self, port: PortOid) -> SaiResult<Option<GroupMembership>>;

    /// Objects of a type already programmed, with their match keys.
    fn list_existing_objects(&self, object_type: SaiObjectType)
        -> SaiResult<Vec<ExistingObject>>;
}

/// Typed helpers layered over any [`SaiDriver`].
pub trait SaiDriverExt: SaiDriver {
    fn create_object<T: SaiObjectKind>(
        &self,
        attrs: &[SaiAttribute],
    ) -> SaiResult<SaiObjectId<T>> {
        let raw = self.create(T::OBJECT_TYPE, attrs)?;
        SaiObjectId::from_raw(raw).ok_or_else(|| {
            SaiError::from_status("create", T::OBJECT_TYPE, SaiStatus::InvalidObjectId)
        })
    }

    fn remove_object<T: SaiObjectKind>(&self, oid: SaiObjectId<T>) -> SaiResult<()> {
        self.remove(oid.as_raw())
    }

    /// Current members of a LAG as read from hardware.
    fn lag_members(&self, lag: LagOid) -> SaiResult<Vec<LagMemberOid>> {
        match self.get_attribute(lag.as_raw(), SaiAttrId::LagMemberList)? {
            SaiAttribute::LagMemberList(members) => Ok(members
                .into_iter()
                .filter_map(LagMemberOid::from_raw)
                .collect()),
            _ => Err(missing(lag.as_raw(), SaiAttrId::LagMemberList)),
        }
    }

    /// The port a LAG member binds.
    fn lag_member_port(&self, member: LagMemberOid) -> SaiResult<PortOid> {
        match self.get_attribute(member.as_raw(), SaiAttrId::PortId)? {
            SaiAttribute::PortId(raw) => {
                PortOid::from_raw(raw).ok_or_else(|| missing(member.as_raw(), SaiAttrId::PortId))
            }
            _ => Err(missing(member.as_raw(), SaiAttrId::PortId)),
        }
    }
}

impl<D: SaiDriver + ?Sized> SaiDriverExt for D {}

fn missing(oid: RawSaiObjectId, attr: SaiAttrId) -> SaiError {
    SaiError::MissingAttribute {
        oid,
        attr: attr.to_string(),
    }
}
