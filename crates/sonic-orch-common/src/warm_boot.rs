//! Inventory of hardware objects left behind by a previous agent instance.
//!
//! At startup the agent loads the driver's inventory for every object type
//! it manages. Software constructs then claim their counterparts by match
//! key instead of creating them; whatever nobody claimed is removed by
//! [`WarmBootCache::finish`], after which the cache is inert.

use crate::error::{classify_remove, OrchError, OrchResult, RemoveOutcome};
use sonic_sai::{
    LagOid, MatchKey, RawSaiObjectId, SaiDriver, SaiDriverExt, SaiObjectType,
};
use sonic_types::{AggregatePortId, PortId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Unclaimed objects are removed dependents first.
const REMOVAL_ORDER: [SaiObjectType; 10] = [
    SaiObjectType::RouteEntry,
    SaiObjectType::FdbEntry,
    SaiObjectType::NextHopGroupMember,
    SaiObjectType::NextHopGroup,
    SaiObjectType::NextHop,
    SaiObjectType::LagMember,
    SaiObjectType::Lag,
    SaiObjectType::BridgePort,
    SaiObjectType::RouterInterface,
    SaiObjectType::VirtualRouter,
];

/// How hardware membership differed from intent at adoption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscrepancyKind {
    /// Enabled in software, not in the hardware group.
    MissingInHardware,
    /// In the hardware group, not enabled in software.
    UnexpectedInHardware,
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscrepancyKind::MissingInHardware => f.write_str("missing-in-hardware"),
            DiscrepancyKind::UnexpectedInHardware => f.write_str("unexpected-in-hardware"),
        }
    }
}

/// A member whose adopted hardware state disagrees with software intent.
///
/// Recorded and logged, never raised. Software intent stays authoritative
/// and the next `program()` of the group heals the member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Discrepancy {
    pub group: AggregatePortId,
    pub port: PortId,
    pub kind: DiscrepancyKind,
}

#[derive(Debug, Clone, Copy)]
struct CachedObject {
    oid: RawSaiObjectId,
    claimed: bool,
}

#[derive(Debug, Default)]
struct CacheState {
    active: bool,
    entries: HashMap<(SaiObjectType, MatchKey), CachedObject>,
    /// Never claimable: unkeyed objects and losers of a duplicate key.
    stale: Vec<(SaiObjectType, RawSaiObjectId)>,
}

impl CacheState {
    fn insert(&mut self, object_type: SaiObjectType, key: MatchKey, oid: RawSaiObjectId) {
        if key.as_str().is_empty() {
            self.stale.push((object_type, oid));
            return;
        }
        match self.entries.entry((object_type, key)) {
            Entry::Vacant(slot) => {
                slot.insert(CachedObject {
                    oid,
                    claimed: false,
                });
            }
            Entry::Occupied(mut slot) => {
                // The lowest oid stays claimable.
                let existing = slot.get().oid;
                let loser = if oid < existing {
                    slot.get_mut().oid = oid;
                    existing
                } else {
                    oid
                };
                tracing::warn!(
                    object_type = %object_type,
                    key = %slot.key().1,
                    kept = format_args!("0x{:x}", slot.get().oid),
                    stale = format_args!("0x{loser:x}"),
                    "duplicate match key in warm boot inventory"
                );
                self.stale.push((object_type, loser));
            }
        }
    }
}

/// Claimable snapshot of surviving hardware objects.
#[derive(Debug, Default)]
pub struct WarmBootCache {
    state: Mutex<CacheState>,
}

impl WarmBootCache {
    /// An inert cache: nothing to claim, nothing to clean up.
    pub fn cold() -> Self {
        Self::default()
    }

    /// Loads the inventory of each listed type.
    ///
    /// Objects without a match key cannot be claimed. When several objects
    /// share a key only the lowest oid can be claimed. Both kinds are cleaned
    /// up by [`WarmBootCache::finish`] like any other unclaimed object.
    pub fn load(driver: &dyn SaiDriver, object_types: &[SaiObjectType]) -> OrchResult<Self> {
        let mut state = CacheState {
            active: true,
            ..CacheState::default()
        };
        for &object_type in object_types {
            let existing = driver
                .list_existing_objects(object_type)
                .map_err(|e| OrchError::resource(format!("list {object_type} inventory"), e))?;
            for object in existing {
                state.insert(object_type, object.match_key, object.oid);
            }
        }
        tracing::info!(
            objects = state.entries.len(),
            stale = state.stale.len(),
            "loaded warm boot inventory"
        );
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True until [`WarmBootCache::finish`] runs.
    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Claims the surviving object with this key.
    ///
    /// Claiming an already claimed key returns the same object, so a second
    /// reconciliation pass observes exactly what the first one did.
    pub fn claim(&self, object_type: SaiObjectType, key: &MatchKey) -> Option<RawSaiObjectId> {
        let mut state = self.lock();
        if !state.active {
            return None;
        }
        let entry = state.entries.get_mut(&(object_type, key.clone()))?;
        entry.claimed = true;
        Some(entry.oid)
    }

    pub fn len(&self) -> usize {
        let state = self.lock();
        state.entries.len() + state.stale.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Objects of a type nobody has claimed yet.
    pub fn unclaimed(&self, object_type: SaiObjectType) -> Vec<RawSaiObjectId> {
        let state = self.lock();
        let mut oids: Vec<_> = state
            .entries
            .iter()
            .filter(|((t, _), e)| *t == object_type && !e.claimed)
            .map(|(_, e)| e.oid)
            .chain(
                state
                    .stale
                    .iter()
                    .filter(|(t, _)| *t == object_type)
                    .map(|(_, oid)| *oid),
            )
            .collect();
        oids.sort_unstable();
        oids
    }

    /// Ends warm boot: removes every unclaimed object and deactivates.
    ///
    /// Returns the number of objects removed. Not-found is tolerated.
    pub fn finish(&self, driver: &dyn SaiDriver) -> OrchResult<usize> {
        let mut state = self.lock();
        if !state.active {
            return Ok(0);
        }

        let mut stale: Vec<(SaiObjectType, RawSaiObjectId)> = state
            .entries
            .iter()
            .filter(|(_, e)| !e.claimed)
            .map(|((t, _), e)| (*t, e.oid))
            .chain(state.stale.iter().copied())
            .collect();
        stale.sort_by_key(|(t, oid)| {
            let rank = REMOVAL_ORDER
                .iter()
                .position(|r| r == t)
                .unwrap_or(REMOVAL_ORDER.len());
            (rank, *oid)
        });

        let mut removed = 0;
        for (object_type, oid) in stale {
            if object_type == SaiObjectType::Lag {
                removed += remove_lag_members(driver, oid)?;
            }
            let outcome = classify_remove(driver.remove(oid), || {
                format!("remove stale {object_type} 0x{oid:x}")
            })?;
            if outcome == RemoveOutcome::Removed {
                removed += 1;
            }
        }

        state.active = false;
        state.entries.clear();
        state.stale.clear();
        tracing::info!(removed, "warm boot finished");
        Ok(removed)
    }
}

fn remove_lag_members(driver: &dyn SaiDriver, lag: RawSaiObjectId) -> OrchResult<usize> {
    let Some(lag) = LagOid::from_raw(lag) else {
        return Ok(0);
    };
    let members = match driver.lag_members(lag) {
        Ok(members) => members,
        Err(e) if e.is_not_found() => return Ok(0),
        Err(e) => return Err(OrchError::resource(format!("read members of {lag:?}"), e)),
    };
    let mut removed = 0;
    for member in members {
        let outcome = classify_remove(driver.remove_object(member), || {
            format!("remove stale member {member:?}")
        })?;
        if outcome == RemoveOutcome::Removed {
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_sai::{FakeSai, SaiAttribute};

    fn label(key: &str) -> Vec<SaiAttribute> {
        vec![SaiAttribute::Label(key.to_string())]
    }

    #[test]
    fn test_claim_is_idempotent() {
        let sai = FakeSai::new();
        let lag = sai.create(SaiObjectType::Lag, &label("aggport1")).unwrap();

        let cache = WarmBootCache::load(&sai, &[SaiObjectType::Lag]).unwrap();
        assert!(cache.is_active());
        assert_eq!(cache.len(), 1);

        let key = MatchKey::from("aggport1");
        assert_eq!(cache.claim(SaiObjectType::Lag, &key), Some(lag));
        assert_eq!(cache.claim(SaiObjectType::Lag, &key), Some(lag));
        assert_eq!(cache.claim(SaiObjectType::NextHopGroup, &key), None);
        assert!(cache.unclaimed(SaiObjectType::Lag).is_empty());
    }

    #[test]
    fn test_finish_removes_unclaimed_dependents_first() {
        let sai = FakeSai::new();
        let port = sai.add_port("Ethernet0");
        let kept = sai.create(SaiObjectType::Lag, &label("aggport1")).unwrap();
        let stale = sai.create(SaiObjectType::Lag, &label("aggport2")).unwrap();
        sai.create(
            SaiObjectType::LagMember,
            &[SaiAttribute::LagId(stale), SaiAttribute::PortId(port.as_raw())],
        )
        .unwrap();

        let cache = WarmBootCache::load(&sai, &[SaiObjectType::Lag]).unwrap();
        cache.claim(SaiObjectType::Lag, &MatchKey::from("aggport1"));

        // The stale LAG and its member.
        assert_eq!(cache.finish(&sai).unwrap(), 2);
        assert!(sai.exists(kept));
        assert!(!sai.exists(stale));
        assert_eq!(sai.object_count(SaiObjectType::LagMember), 0);

        assert!(!cache.is_active());
        assert_eq!(cache.claim(SaiObjectType::Lag, &MatchKey::from("aggport1")), None);
        assert_eq!(cache.finish(&sai).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_key_keeps_lowest_oid_claimable() {
        let sai = FakeSai::new();
        let first = sai.create(SaiObjectType::Lag, &label("aggport1")).unwrap();
        let second = sai.create(SaiObjectType::Lag, &label("aggport1")).unwrap();
        let (low, high) = (first.min(second), first.max(second));

        let cache = WarmBootCache::load(&sai, &[SaiObjectType::Lag]).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.unclaimed(SaiObjectType::Lag), vec![low, high]);

        let key = MatchKey::from("aggport1");
        assert_eq!(cache.claim(SaiObjectType::Lag, &key), Some(low));
        assert_eq!(cache.unclaimed(SaiObjectType::Lag), vec![high]);

        assert_eq!(cache.finish(&sai).unwrap(), 1);
        assert_eq!(sai.object_count(SaiObjectType::Lag), 1);
        assert!(sai.exists(low));
        assert!(!sai.exists(high));
    }

    #[test]
    fn test_unkeyed_objects_are_never_claimable() {
        let sai = FakeSai::new();
        let port = sai.add_port("Ethernet0");
        let unkeyed = sai.create(SaiObjectType::Lag, &[]).unwrap();
        sai.create(
            SaiObjectType::LagMember,
            &[SaiAttribute::LagId(unkeyed), SaiAttribute::PortId(port.as_raw())],
        )
        .unwrap();
        let keyed = sai.create(SaiObjectType::Lag, &label("aggport1")).unwrap();

        let cache = WarmBootCache::load(&sai, &[SaiObjectType::Lag]).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.claim(SaiObjectType::Lag, &MatchKey::from("")), None);
        assert_eq!(cache.claim(SaiObjectType::Lag, &MatchKey::from("aggport1")), Some(keyed));
        assert_eq!(cache.unclaimed(SaiObjectType::Lag), vec![unkeyed]);

        // The unkeyed LAG and its member.
        assert_eq!(cache.finish(&sai).unwrap(), 2);
        assert!(!sai.exists(unkeyed));
        assert!(sai.exists(keyed));
        assert_eq!(sai.object_count(SaiObjectType::LagMember), 0);
    }

    #[test]
    fn test_finish_tolerates_already_removed() {
        let sai = FakeSai::new();
        let stale = sai.create(SaiObjectType::NextHopGroup, &label("nhg")).unwrap();
        let cache = WarmBootCache::load(&sai, &[SaiObjectType::NextHopGroup]).unwrap();

        sai.remove(stale).unwrap();
        assert_eq!(cache.finish(&sai).unwrap(), 0);
    }

    #[test]
    fn test_cold_cache_is_inert() {
        let cache = WarmBootCache::cold();
        assert!(!cache.is_active());
        assert!(cache.is_empty());
        assert_eq!(cache.claim(SaiObjectType::Lag, &MatchKey::from("aggport1")), None);
    }
}
