//! Per-next-hop group memberships.
//!
//! A membership follows one neighbor. While the neighbor is resolved it holds
//! a reference on the shared next-hop object and owns a group member object;
//! while unresolved it holds nothing. Both transitions are idempotent.

use super::types::{MplsNextHopKey, ResolvedNextHop};
use crate::neigh::{NeighborKey, NeighborTable};
use crate::ports::PortTable;
use crate::{debug_log, warn_log};
use sonic_orch_common::{
    classify_remove, ObjectRegistry, OrchError, OrchResult, RegistryKey, WarmBootCache,
};
use sonic_sai::types::{NextHopGroupMemberKind, NextHopKind};
use sonic_sai::{
    MatchKey, NextHopGroupMemberOid, NextHopGroupOid, NextHopOid, RouterInterfaceOid,
    SaiAttribute, SaiDriver, SaiDriverExt, SaiObjectId, SaiObjectType,
};
use std::marker::PhantomData;
use std::sync::Arc;

/// Shared next-hop objects, one registry per flavor.
#[derive(Debug)]
pub struct NextHopRegistries {
    pub(crate) ip: ObjectRegistry<NeighborKey, NextHopKind>,
    pub(crate) mpls: ObjectRegistry<MplsNextHopKey, NextHopKind>,
}

impl NextHopRegistries {
    pub fn new(driver: Arc<dyn SaiDriver>, warm_boot: Arc<WarmBootCache>) -> Self {
        Self {
            ip: ObjectRegistry::new("next_hop", driver.clone()).with_warm_boot(warm_boot.clone()),
            mpls: ObjectRegistry::new("mpls_next_hop", driver).with_warm_boot(warm_boot),
        }
    }

    /// Live next-hop objects of both flavors.
    pub fn len(&self) -> usize {
        self.ip.len() + self.mpls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What distinguishes one kind of next hop from another: how it is keyed,
/// which attributes create it, and where it is shared.
pub trait NextHopFlavor: Send + 'static {
    type Key: RegistryKey;

    const NAME: &'static str;

    fn key(next_hop: &ResolvedNextHop) -> Self::Key;

    fn attributes(next_hop: &ResolvedNextHop, rif: RouterInterfaceOid) -> Vec<SaiAttribute>;

    fn registry(registries: &mut NextHopRegistries) -> &mut ObjectRegistry<Self::Key, NextHopKind>;
}

/// Plain IP next hop.
#[derive(Debug)]
pub struct IpNextHop;

impl NextHopFlavor for IpNextHop {
    type Key = NeighborKey;

    const NAME: &'static str = "ip";

    fn key(next_hop: &ResolvedNextHop) -> NeighborKey {
        next_hop.neighbor()
    }

    fn attributes(next_hop: &ResolvedNextHop, rif: RouterInterfaceOid) -> Vec<SaiAttribute> {
        vec![
            SaiAttribute::NextHopIp(next_hop.ip),
            SaiAttribute::RouterInterfaceId(rif.as_raw()),
        ]
    }

    fn registry(registries: &mut NextHopRegistries) -> &mut ObjectRegistry<NeighborKey, NextHopKind> {
        &mut registries.ip
    }
}

/// Labeled next hop.
#[derive(Debug)]
pub struct MplsNextHop;

impl NextHopFlavor for MplsNextHop {
    type Key = MplsNextHopKey;

    const NAME: &'static str = "mpls";

    fn key(next_hop: &ResolvedNextHop) -> MplsNextHopKey {
        MplsNextHopKey {
            neighbor: next_hop.neighbor(),
            labels: next_hop.labels.clone(),
        }
    }

    fn attributes(next_hop: &ResolvedNextHop, rif: RouterInterfaceOid) -> Vec<SaiAttribute> {
        vec![
            SaiAttribute::NextHopIp(next_hop.ip),
            SaiAttribute::RouterInterfaceId(rif.as_raw()),
            SaiAttribute::LabelStack(next_hop.labels.clone()),
        ]
    }

    fn registry(
        registries: &mut NextHopRegistries,
    ) -> &mut ObjectRegistry<MplsNextHopKey, NextHopKind> {
        &mut registries.mpls
    }
}

/// Everything a membership needs to come alive.
pub(crate) struct MemberContext<'a> {
    pub driver: &'a dyn SaiDriver,
    pub next_hops: &'a mut NextHopRegistries,
    pub neighbors: &'a NeighborTable,
    pub ports: &'a PortTable,
    pub warm_boot: &'a WarmBootCache,
}

#[derive(Debug, Clone, Copy)]
struct LiveMember {
    next_hop: NextHopOid,
    member: NextHopGroupMemberOid,
}

/// One next hop of one group.
#[derive(Debug)]
pub struct NextHopMembership<F: NextHopFlavor> {
    group: NextHopGroupOid,
    next_hop: ResolvedNextHop,
    match_key: MatchKey,
    live: Option<LiveMember>,
    /// Next hop whose member is gone but whose reference is still held.
    pending_release: Option<NextHopOid>,
    _flavor: PhantomData<fn() -> F>,
}

impl<F: NextHopFlavor> NextHopMembership<F> {
    pub fn new(group: NextHopGroupOid, next_hop: ResolvedNextHop, match_key: MatchKey) -> Self {
        Self {
            group,
            next_hop,
            match_key,
            live: None,
            pending_release: None,
            _flavor: PhantomData,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.live.is_some()
    }

    /// True while a next hop reference is held, alive or not.
    pub fn holds_next_hop(&self) -> bool {
        self.live.is_some() || self.pending_release.is_some()
    }

    pub fn member_oid(&self) -> Option<NextHopGroupMemberOid> {
        self.live.map(|live| live.member)
    }

    pub fn next_hop(&self) -> &ResolvedNextHop {
        &self.next_hop
    }

    /// Brings the member into hardware. No-op when already alive.
    ///
    /// Being called while the neighbor is unresolved means the dispatch
    /// table and the neighbor table disagree, which is fatal.
    pub(crate) fn on_resolved(&mut self, ctx: &mut MemberContext<'_>) -> OrchResult<()> {
        if self.live.is_some() {
            return Ok(());
        }
        let neighbor = self.next_hop.neighbor();
        if !ctx.neighbors.is_resolved(&neighbor) {
            return Err(OrchError::precondition(format!(
                "{} member of {} activated while {neighbor} is unresolved",
                F::NAME,
                self.group
            )));
        }

        let rif = ctx.ports.interface_oid(self.next_hop.interface)?;
        let next_hop = match self.pending_release.take() {
            Some(held) => held,
            None => {
                let key = F::key(&self.next_hop);
                F::registry(ctx.next_hops)
                    .acquire(&key, &F::attributes(&self.next_hop, rif))?
                    .oid
            }
        };

        let claimed = ctx
            .warm_boot
            .claim(SaiObjectType::NextHopGroupMember, &self.match_key)
            .and_then(SaiObjectId::from_raw);
        let member = match claimed {
            Some(member) => member,
            None => match self.create_member(ctx.driver, next_hop) {
                Ok(member) => member,
                Err(e) => {
                    if let Err(undo) = F::registry(ctx.next_hops).release(next_hop) {
                        warn_log!("NextHopMembership", error = %undo, "failed to release next hop after member create failure");
                        self.pending_release = Some(next_hop);
                    }
                    return Err(e);
                }
            },
        };

        self.live = Some(LiveMember { next_hop, member });
        debug_log!(
            "NextHopMembership",
            group = %self.group,
            next_hop = %self.next_hop,
            member = %member,
            "member added"
        );
        Ok(())
    }

    fn create_member(
        &self,
        driver: &dyn SaiDriver,
        next_hop: NextHopOid,
    ) -> OrchResult<NextHopGroupMemberOid> {
        let mut attrs = vec![
            SaiAttribute::NextHopGroupId(self.group.as_raw()),
            SaiAttribute::NextHopId(next_hop.as_raw()),
        ];
        if self.next_hop.weight > 0 {
            attrs.push(SaiAttribute::Weight(self.next_hop.weight));
        }
        attrs.push(SaiAttribute::Label(self.match_key.as_str().to_string()));
        driver
            .create_object::<NextHopGroupMemberKind>(&attrs)
            .map_err(|e| {
                OrchError::resource(format!("add {} to {}", self.next_hop, self.group), e)
            })
    }

    /// Takes the member out of hardware and drops the next hop reference.
    ///
    /// If the member remove fails the membership stays alive. If the next
    /// hop release fails the reference is kept and retried on the next call.
    pub(crate) fn on_unresolved(
        &mut self,
        driver: &dyn SaiDriver,
        next_hops: &mut NextHopRegistries,
    ) -> OrchResult<()> {
        if let Some(live) = self.live {
            classify_remove(driver.remove_object(live.member), || {
                format!("remove {} from {}", self.next_hop, self.group)
            })?;
            self.live = None;
            self.pending_release = Some(live.next_hop);
            debug_log!(
                "NextHopMembership",
                group = %self.group,
                next_hop = %self.next_hop,
                "member removed"
            );
        }
        let Some(next_hop) = self.pending_release else {
            return Ok(());
        };
        F::registry(next_hops).release(next_hop)?;
        self.pending_release = None;
        Ok(())
    }
}

/// A membership of either flavor.
#[derive(Debug)]
pub enum MemberSubscriber {
    Ip(NextHopMembership<IpNextHop>),
    Mpls(NextHopMembership<MplsNextHop>),
}

impl MemberSubscriber {
    pub fn new(group: NextHopGroupOid, next_hop: ResolvedNextHop, match_key: MatchKey) -> Self {
        if next_hop.is_mpls() {
            MemberSubscriber::Mpls(NextHopMembership::new(group, next_hop, match_key))
        } else {
            MemberSubscriber::Ip(NextHopMembership::new(group, next_hop, match_key))
        }
    }

    pub fn is_alive(&self) -> bool {
        match self {
            MemberSubscriber::Ip(m) => m.is_alive(),
            MemberSubscriber::Mpls(m) => m.is_alive(),
        }
    }

    pub fn holds_next_hop(&self) -> bool {
        match self {
            MemberSubscriber::Ip(m) => m.holds_next_hop(),
            MemberSubscriber::Mpls(m) => m.holds_next_hop(),
        }
    }

    pub fn member_oid(&self) -> Option<NextHopGroupMemberOid> {
        match self {
            MemberSubscriber::Ip(m) => m.member_oid(),
            MemberSubscriber::Mpls(m) => m.member_oid(),
        }
    }

    pub fn next_hop(&self) -> &ResolvedNextHop {
        match self {
            MemberSubscriber::Ip(m) => m.next_hop(),
            MemberSubscriber::Mpls(m) => m.next_hop(),
        }
    }

    pub(crate) fn on_resolved(&mut self, ctx: &mut MemberContext<'_>) -> OrchResult<()> {
        match self {
            MemberSubscriber::Ip(m) => m.on_resolved(ctx),
            MemberSubscriber::Mpls(m) => m.on_resolved(ctx),
        }
    }

    pub(crate) fn on_unresolved(
        &mut self,
        driver: &dyn SaiDriver,
        next_hops: &mut NextHopRegistries,
    ) -> OrchResult<()> {
        match self {
            MemberSubscriber::Ip(m) => m.on_unresolved(driver, next_hops),
            MemberSubscriber::Mpls(m) => m.on_unresolved(driver, next_hops),
        }
    }
}
