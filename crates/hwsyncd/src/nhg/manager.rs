//! Next-hop group manager.
//!
//! Owns the group registry, the shared next-hop registries and every
//! membership. Neighbor state flips are routed to the memberships that
//! depend on them through a dispatch table keyed by neighbor.

use super::subscriber::{MemberContext, MemberSubscriber, NextHopRegistries};
use super::types::{MemberKey, NextHopSet};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::neigh::{DependencyEvent, NeighborKey, NeighborTable};
use crate::ports::PortTable;
use crate::{audit_log, debug_log, warn_log};
use serde::Serialize;
use sonic_orch_common::{
    ObjectRegistry, Origin, OrchError, OrchResult, RefMap, RegistryKey, ReleaseOutcome, Released,
    WarmBootCache,
};
use sonic_sai::types::NextHopGroupKind;
use sonic_sai::{MatchKey, NextHopGroupOid, SaiDriver};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Read-only state a membership consults when it comes alive.
#[derive(Debug, Clone, Copy)]
pub struct NextHopEnv<'a> {
    pub neighbors: &'a NeighborTable,
    pub ports: &'a PortTable,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NhgManagerStats {
    pub groups_created: u64,
    pub groups_adopted: u64,
    pub groups_removed: u64,
    pub members_added: u64,
    pub members_removed: u64,
}

pub struct NextHopGroupManager {
    driver: Arc<dyn SaiDriver>,
    warm_boot: Arc<WarmBootCache>,
    groups: ObjectRegistry<NextHopSet, NextHopGroupKind>,
    next_hops: NextHopRegistries,
    members: RefMap<MemberKey, MemberSubscriber>,
    by_neighbor: HashMap<NeighborKey, BTreeSet<MemberKey>>,
    stats: NhgManagerStats,
}

impl NextHopGroupManager {
    pub fn new(driver: Arc<dyn SaiDriver>, warm_boot: Arc<WarmBootCache>) -> Self {
        Self {
            groups: ObjectRegistry::new("next_hop_group", driver.clone())
                .with_warm_boot(warm_boot.clone()),
            next_hops: NextHopRegistries::new(driver.clone(), warm_boot.clone()),
            driver,
            warm_boot,
            members: RefMap::new(),
            by_neighbor: HashMap::new(),
            stats: NhgManagerStats::default(),
        }
    }

    /// Takes a reference on the group for `set`.
    ///
    /// The first acquire creates (or adopts) the group, subscribes one
    /// membership per next hop and activates those whose neighbor is
    /// already resolved. If that fails the group is torn down again.
    pub fn acquire(&mut self, set: &NextHopSet, env: NextHopEnv<'_>) -> OrchResult<NextHopGroupOid> {
        if set.is_empty() {
            return Err(OrchError::InvalidConfig(
                "next-hop group needs at least one next hop".to_string(),
            ));
        }
        let acquired = self.groups.acquire(set, &[])?;
        if !acquired.is_first() {
            return Ok(acquired.oid);
        }

        match acquired.origin {
            Origin::Adopted => self.stats.groups_adopted += 1,
            _ => self.stats.groups_created += 1,
        }
        if let Err(e) = self.subscribe_all(acquired.oid, set, env) {
            if let Err(undo) = self.release(acquired.oid) {
                warn_log!("NextHopGroupManager", group = %acquired.oid, error = %undo, "rollback of partially built group failed");
            }
            return Err(e);
        }

        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "NextHopGroupManager",
            if acquired.origin == Origin::Adopted { "adopt_group" } else { "create_group" }
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(acquired.oid.to_string())
        .with_object_type("next_hop_group")
        .with_details(serde_json::json!({
            "next_hops": set.len(),
            "live_members": self.live_members_of(acquired.oid),
        })));
        Ok(acquired.oid)
    }

    fn subscribe_all(
        &mut self,
        group: NextHopGroupOid,
        set: &NextHopSet,
        env: NextHopEnv<'_>,
    ) -> OrchResult<()> {
        let group_key = set.match_key();
        for next_hop in set.iter() {
            let key: MemberKey = (group, next_hop.clone());
            if self.members.contains_key(&key) {
                self.members
                    .increment_ref(&key)
                    .map_err(|e| OrchError::precondition(format!("member {next_hop}: {e}")))?;
                continue;
            }

            let match_key = MatchKey::new(format!("{}|{next_hop}", group_key));
            let subscriber = MemberSubscriber::new(group, next_hop.clone(), match_key);
            self.members
                .insert_new(key.clone(), subscriber)
                .map_err(|e| OrchError::precondition(format!("member {next_hop}: {e}")))?;
            self.by_neighbor
                .entry(next_hop.neighbor())
                .or_default()
                .insert(key.clone());

            if env.neighbors.is_resolved(&next_hop.neighbor()) {
                self.activate(&key, env)?;
            }
        }
        Ok(())
    }

    fn activate(&mut self, key: &MemberKey, env: NextHopEnv<'_>) -> OrchResult<()> {
        let Some(subscriber) = self.members.get_mut(key) else {
            return Err(OrchError::precondition(format!(
                "dispatch entry for {} without membership",
                key.1
            )));
        };
        if subscriber.is_alive() {
            return Ok(());
        }
        let mut ctx = MemberContext {
            driver: self.driver.as_ref(),
            next_hops: &mut self.next_hops,
            neighbors: env.neighbors,
            ports: env.ports,
            warm_boot: &self.warm_boot,
        };
        subscriber.on_resolved(&mut ctx)?;
        self.stats.members_added += 1;
        Ok(())
    }

    fn deactivate(&mut self, key: &MemberKey) -> OrchResult<()> {
        let Some(subscriber) = self.members.get_mut(key) else {
            return Err(OrchError::precondition(format!(
                "dispatch entry for {} without membership",
                key.1
            )));
        };
        if !subscriber.holds_next_hop() {
            return Ok(());
        }
        subscriber.on_unresolved(self.driver.as_ref(), &mut self.next_hops)?;
        self.stats.members_removed += 1;
        Ok(())
    }

    /// Drops a reference on a group; the last one removes its members and
    /// then the group itself.
    pub fn release(&mut self, group: NextHopGroupOid) -> OrchResult<ReleaseOutcome<NextHopSet>> {
        let Self {
            driver,
            groups,
            next_hops,
            members,
            by_neighbor,
            stats,
            ..
        } = self;

        let outcome = groups.release_with(group, |set, oid| {
            for next_hop in set.iter() {
                let key: MemberKey = (oid, next_hop.clone());
                let Some(subscriber) = members.get_mut(&key) else {
                    continue;
                };
                if subscriber.holds_next_hop() {
                    subscriber.on_unresolved(driver.as_ref(), next_hops)?;
                    stats.members_removed += 1;
                }
                if let Ok(Released::Last(_)) = members.decrement_ref(&key) {
                    let neighbor = next_hop.neighbor();
                    if let Some(keys) = by_neighbor.get_mut(&neighbor) {
                        keys.remove(&key);
                        if keys.is_empty() {
                            by_neighbor.remove(&neighbor);
                        }
                    }
                }
            }
            Ok(())
        })?;

        if let ReleaseOutcome::Destroyed(set) = &outcome {
            self.stats.groups_removed += 1;
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceDelete,
                "NextHopGroupManager",
                "remove_group"
            )
            .with_outcome(AuditOutcome::Success)
            .with_object_id(group.to_string())
            .with_object_type("next_hop_group")
            .with_details(serde_json::json!({ "next_hops": set.len() })));
        }
        Ok(outcome)
    }

    /// Routes a neighbor state flip to every dependent membership.
    pub fn on_dependency_event(
        &mut self,
        event: DependencyEvent,
        env: NextHopEnv<'_>,
    ) -> OrchResult<()> {
        let Some(keys) = self.by_neighbor.get(&event.key()) else {
            debug_log!("NextHopGroupManager", neighbor = %event.key(), "no dependent members");
            return Ok(());
        };
        let keys: Vec<MemberKey> = keys.iter().cloned().collect();
        debug_log!(
            "NextHopGroupManager",
            neighbor = %event.key(),
            members = keys.len(),
            event = ?event,
            "dispatching dependency event"
        );
        for key in &keys {
            match event {
                DependencyEvent::Resolved(_) => self.activate(key, env)?,
                DependencyEvent::Unresolved(_) => self.deactivate(key)?,
            }
        }
        Ok(())
    }

    pub fn handle_of(&self, set: &NextHopSet) -> Option<NextHopGroupOid> {
        self.groups.handle_of(set)
    }

    pub fn ref_count(&self, set: &NextHopSet) -> u32 {
        self.groups.ref_count(set)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn next_hop_count(&self) -> usize {
        self.next_hops.len()
    }

    pub fn membership_count(&self) -> usize {
        self.members.len()
    }

    /// Memberships of `group` currently programmed in hardware.
    pub fn live_members_of(&self, group: NextHopGroupOid) -> usize {
        self.members
            .iter()
            .filter(|((g, _), sub)| *g == group && sub.is_alive())
            .count()
    }

    pub fn is_member_alive(&self, key: &MemberKey) -> bool {
        self.members.get(key).is_some_and(MemberSubscriber::is_alive)
    }

    /// Number of memberships waiting on `neighbor`.
    pub fn dependents_of(&self, neighbor: &NeighborKey) -> usize {
        self.by_neighbor.get(neighbor).map_or(0, BTreeSet::len)
    }

    pub fn stats(&self) -> &NhgManagerStats {
        &self.stats
    }
}
