//! In-memory driver.
//!
//! `FakeSai` behaves like a switch ASIC that never loses state: objects
//! stay programmed for as long as the value lives, so an agent restarted on
//! the same instance sees them as a warm-boot inventory. It is used by the
//! unit and integration tests and by the daemon's simulation mode.

use crate::api::{ExistingObject, GroupMembership, MatchKey, SaiAttrId, SaiAttribute, SaiDriver};
use crate::error::{SaiError, SaiResult, SaiStatus};
use crate::types::{LagMemberOid, LagOid, PortOid, RawSaiObjectId, SaiObjectType};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// A successful driver call, as recorded in the call log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaiCall {
    Create {
        object_type: SaiObjectType,
        oid: RawSaiObjectId,
    },
    Remove {
        object_type: SaiObjectType,
        oid: RawSaiObjectId,
    },
    Set {
        oid: RawSaiObjectId,
        attr: SaiAttrId,
    },
}

#[derive(Debug, Clone)]
struct FakeObject {
    object_type: SaiObjectType,
    attrs: Vec<SaiAttribute>,
}

impl FakeObject {
    fn attr(&self, id: SaiAttrId) -> Option<&SaiAttribute> {
        self.attrs.iter().find(|a| a.id() == id)
    }

    fn raw_ref(&self, id: SaiAttrId) -> Option<RawSaiObjectId> {
        match self.attr(id)? {
            SaiAttribute::LagId(oid)
            | SaiAttribute::PortId(oid)
            | SaiAttribute::NextHopGroupId(oid)
            | SaiAttribute::NextHopId(oid) => Some(*oid),
            _ => None,
        }
    }

    fn label(&self) -> &str {
        match self.attr(SaiAttrId::Label) {
            Some(SaiAttribute::Label(label)) => label,
            _ => "",
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_index: u64,
    objects: BTreeMap<RawSaiObjectId, FakeObject>,
    creates: HashMap<SaiObjectType, usize>,
    removes: HashMap<SaiObjectType, usize>,
    calls: Vec<SaiCall>,
    fail_create: HashMap<SaiObjectType, SaiStatus>,
    fail_remove: HashMap<SaiObjectType, SaiStatus>,
    fail_set: HashMap<SaiObjectType, SaiStatus>,
}

impl Inner {
    fn allocate(&mut self, object_type: SaiObjectType) -> RawSaiObjectId {
        self.next_index += 1;
        // Type tag in the high bits keeps ids readable in logs.
        ((object_type as u64 + 1) << 48) | self.next_index
    }

    fn members_of(&self, parent_type: SaiObjectType, parent: RawSaiObjectId) -> Vec<RawSaiObjectId> {
        let (member_type, link) = match parent_type {
            SaiObjectType::Lag => (SaiObjectType::LagMember, SaiAttrId::LagId),
            SaiObjectType::NextHopGroup => {
                (SaiObjectType::NextHopGroupMember, SaiAttrId::NextHopGroupId)
            }
            _ => return Vec::new(),
        };
        self.objects
            .iter()
            .filter(|(_, obj)| obj.object_type == member_type && obj.raw_ref(link) == Some(parent))
            .map(|(oid, _)| *oid)
            .collect()
    }

    fn require(
        &self,
        op: &'static str,
        object_type: SaiObjectType,
        attrs: &[SaiAttribute],
        link: SaiAttrId,
        parent_type: SaiObjectType,
    ) -> SaiResult<RawSaiObjectId> {
        let parent = attrs.iter().find_map(|a| match a {
            SaiAttribute::LagId(oid)
            | SaiAttribute::PortId(oid)
            | SaiAttribute::NextHopGroupId(oid)
            | SaiAttribute::NextHopId(oid)
                if a.id() == link =>
            {
                Some(*oid)
            }
            _ => None,
        });
        match parent.and_then(|oid| self.objects.get(&oid).map(|obj| (oid, obj))) {
            Some((oid, obj)) if obj.object_type == parent_type => Ok(oid),
            _ => Err(SaiError::from_status(op, object_type, SaiStatus::InvalidParameter)),
        }
    }

    fn validate_create(&self, object_type: SaiObjectType, attrs: &[SaiAttribute]) -> SaiResult<()> {
        match object_type {
            SaiObjectType::LagMember => {
                self.require("create", object_type, attrs, SaiAttrId::LagId, SaiObjectType::Lag)?;
                let port =
                    self.require("create", object_type, attrs, SaiAttrId::PortId, SaiObjectType::Port)?;
                // A port belongs to at most one LAG.
                let taken = self.objects.values().any(|obj| {
                    obj.object_type == SaiObjectType::LagMember
                        && obj.raw_ref(SaiAttrId::PortId) == Some(port)
                });
                if taken {
                    return Err(SaiError::from_status(
                        "create",
                        object_type,
                        SaiStatus::ItemAlreadyExists,
                    ));
                }
            }
            SaiObjectType::NextHopGroupMember => {
                self.require(
                    "create",
                    object_type,
                    attrs,
                    SaiAttrId::NextHopGroupId,
                    SaiObjectType::NextHopGroup,
                )?;
                self.require(
                    "create",
                    object_type,
                    attrs,
                    SaiAttrId::NextHopId,
                    SaiObjectType::NextHop,
                )?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Thread-safe in-memory [`SaiDriver`].
#[derive(Debug, Default)]
pub struct FakeSai {
    inner: Mutex<Inner>,
}

impl FakeSai {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a front-panel port, which exists before the agent starts.
    pub fn add_port(&self, name: &str) -> PortOid {
        let mut inner = self.lock();
        let oid = inner.allocate(SaiObjectType::Port);
        inner.objects.insert(
            oid,
            FakeObject {
                object_type: SaiObjectType::Port,
                attrs: vec![SaiAttribute::Label(name.to_string())],
            },
        );
        PortOid::from_raw(oid).unwrap_or(PortOid::NULL)
    }

    /// Number of live objects of a type.
    pub fn object_count(&self, object_type: SaiObjectType) -> usize {
        self.lock()
            .objects
            .values()
            .filter(|obj| obj.object_type == object_type)
            .count()
    }

    /// Ids of live objects of a type, in creation order.
    pub fn objects(&self, object_type: SaiObjectType) -> Vec<RawSaiObjectId> {
        self.lock()
            .objects
            .iter()
            .filter(|(_, obj)| obj.object_type == object_type)
            .map(|(oid, _)| *oid)
            .collect()
    }

    pub fn exists(&self, oid: RawSaiObjectId) -> bool {
        self.lock().objects.contains_key(&oid)
    }

    /// Attributes of a live object.
    pub fn attributes(&self, oid: RawSaiObjectId) -> Option<Vec<SaiAttribute>> {
        self.lock().objects.get(&oid).map(|obj| obj.attrs.clone())
    }

    /// Successful creates of a type since construction.
    pub fn create_count(&self, object_type: SaiObjectType) -> usize {
        self.lock().creates.get(&object_type).copied().unwrap_or(0)
    }

    /// Successful removes of a type since construction.
    pub fn remove_count(&self, object_type: SaiObjectType) -> usize {
        self.lock().removes.get(&object_type).copied().unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<SaiCall> {
        self.lock().calls.clone()
    }

    /// Clears the call log and the create/remove counters.
    pub fn reset_counters(&self) {
        let mut inner = self.lock();
        inner.calls.clear();
        inner.creates.clear();
        inner.removes.clear();
    }

    /// Makes the next create of `object_type` fail with `status`.
    pub fn fail_next_create(&self, object_type: SaiObjectType, status: SaiStatus) {
        self.lock().fail_create.insert(object_type, status);
    }

    /// Makes the next remove of an object of `object_type` fail with `status`.
    pub fn fail_next_remove(&self, object_type: SaiObjectType, status: SaiStatus) {
        self.lock().fail_remove.insert(object_type, status);
    }

    /// Makes the next attribute set on an object of `object_type` fail.
    pub fn fail_next_set(&self, object_type: SaiObjectType, status: SaiStatus) {
        self.lock().fail_set.insert(object_type, status);
    }
}

fn same_slot(a: &SaiAttribute, b: &SaiAttribute) -> bool {
    match (a, b) {
        // Flood blocks are per egress port.
        (
            SaiAttribute::FloodBlock { egress_port: x, .. },
            SaiAttribute::FloodBlock { egress_port: y, .. },
        ) => x == y,
        _ => a.id() == b.id(),
    }
}

impl SaiDriver for FakeSai {
    fn create(
        &self,
        object_type: SaiObjectType,
        attrs: &[SaiAttribute],
    ) -> SaiResult<RawSaiObjectId> {
        let mut inner = self.lock();
        if let Some(status) = inner.fail_create.remove(&object_type) {
            return Err(SaiError::from_status("create", object_type, status));
        }
        inner.validate_create(object_type, attrs)?;

        let oid = inner.allocate(object_type);
        inner.objects.insert(
            oid,
            FakeObject {
                object_type,
                attrs: attrs.to_vec(),
            },
        );
        *inner.creates.entry(object_type).or_default() += 1;
        inner.calls.push(SaiCall::Create { object_type, oid });
        Ok(oid)
    }

    fn remove(&self, oid: RawSaiObjectId) -> SaiResult<()> {
        let mut inner = self.lock();
        let object_type = match inner.objects.get(&oid) {
            Some(obj) => obj.object_type,
            None => return Err(SaiError::not_found(oid)),
        };
        if let Some(status) = inner.fail_remove.remove(&object_type) {
            return Err(SaiError::from_status("remove", object_type, status));
        }
        if !inner.members_of(object_type, oid).is_empty() {
            return Err(SaiError::from_status("remove", object_type, SaiStatus::ObjectInUse));
        }

        inner.objects.remove(&oid);
        *inner.removes.entry(object_type).or_default() += 1;
        inner.calls.push(SaiCall::Remove { object_type, oid });
        Ok(())
    }

    fn get_attribute(&self, oid: RawSaiObjectId, attr: SaiAttrId) -> SaiResult<SaiAttribute> {
        let inner = self.lock();
        let obj = inner.objects.get(&oid).ok_or(SaiError::not_found(oid))?;
        if attr == SaiAttrId::LagMemberList && obj.object_type == SaiObjectType::Lag {
            return Ok(SaiAttribute::LagMemberList(
                inner.members_of(SaiObjectType::Lag, oid),
            ));
        }
        obj.attr(attr).cloned().ok_or(SaiError::MissingAttribute {
            oid,
            attr: attr.to_string(),
        })
    }

    fn set_attribute(&self, oid: RawSaiObjectId, attr: SaiAttribute) -> SaiResult<()> {
        let mut inner = self.lock();
        let object_type = match inner.objects.get(&oid) {
            Some(obj) => obj.object_type,
            None => return Err(SaiError::not_found(oid)),
        };
        if let Some(status) = inner.fail_set.remove(&object_type) {
            return Err(SaiError::from_status("set", object_type, status));
        }

        let id = attr.id();
        if let Some(obj) = inner.objects.get_mut(&oid) {
            match obj.attrs.iter_mut().find(|a| same_slot(a, &attr)) {
                Some(slot) => *slot = attr,
                None => obj.attrs.push(attr),
            }
        }
        inner.calls.push(SaiCall::Set { oid, attr: id });
        Ok(())
    }

    fn find_containing_group(&self, port: PortOid) -> SaiResult<Option<GroupMembership>> {
        let inner = self.lock();
        let found = inner.objects.iter().find_map(|(oid, obj)| {
            if obj.object_type != SaiObjectType::LagMember
                || obj.raw_ref(SaiAttrId::PortId) != Some(port.as_raw())
            {
                return None;
            }
            Some(GroupMembership {
                group: LagOid::from_raw(obj.raw_ref(SaiAttrId::LagId)?)?,
                member: LagMemberOid::from_raw(*oid)?,
            })
        });
        Ok(found)
    }

    fn list_existing_objects(
        &self,
        object_type: SaiObjectType,
    ) -> SaiResult<Vec<ExistingObject>> {
        Ok(self
            .lock()
            .objects
            .iter()
            .filter(|(_, obj)| obj.object_type == object_type)
            .map(|(oid, obj)| ExistingObject {
                oid: *oid,
                match_key: MatchKey::new(obj.label()),
            })
            .collect())
    }
}
