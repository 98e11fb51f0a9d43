//! Member grant/revoke bookkeeping shared with the link-event path.

use dashmap::DashMap;
use serde::Serialize;
use sonic_sai::LagOid;
use sonic_types::PortId;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Counters of one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupCounters {
    pub name: String,
    /// Ports currently granted membership.
    pub members: BTreeSet<PortId>,
    pub grants: u64,
    pub revokes: u64,
}

/// Per-group statistics, keyed by the group's hardware id.
///
/// Cloning shares the underlying map; the control-plane task and the
/// link-event task each hold a clone and update it without further
/// coordination. Grants and revokes are idempotent so a member removed by
/// both sides is only counted once.
#[derive(Debug, Clone, Default)]
pub struct LagStats {
    groups: Arc<DashMap<LagOid, GroupCounters>>,
}

impl LagStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts counting for `lag` under `name`, resetting the counters.
    ///
    /// The granted member set is kept; it mirrors hardware, not the name.
    pub fn initialize(&self, lag: LagOid, name: &str) {
        let mut entry = self.groups.entry(lag).or_default();
        entry.name = name.to_string();
        entry.grants = 0;
        entry.revokes = 0;
    }

    /// Records `port` joining `lag`. Returns false if it already had.
    pub fn grant(&self, lag: LagOid, port: PortId) -> bool {
        let mut entry = self.groups.entry(lag).or_default();
        let fresh = entry.members.insert(port);
        if fresh {
            entry.grants += 1;
        }
        fresh
    }

    /// Records `port` leaving `lag`. Returns false if it was not a member.
    pub fn revoke(&self, lag: LagOid, port: PortId) -> bool {
        let Some(mut entry) = self.groups.get_mut(&lag) else {
            return false;
        };
        let removed = entry.members.remove(&port);
        if removed {
            entry.revokes += 1;
        }
        removed
    }

    pub fn remove(&self, lag: LagOid) -> Option<GroupCounters> {
        self.groups.remove(&lag).map(|(_, counters)| counters)
    }

    pub fn snapshot(&self, lag: LagOid) -> Option<GroupCounters> {
        self.groups.get(&lag).map(|entry| entry.clone())
    }

    pub fn is_granted(&self, lag: LagOid, port: PortId) -> bool {
        self.groups
            .get(&lag)
            .is_some_and(|entry| entry.members.contains(&port))
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    fn lag(n: u64) -> LagOid {
        LagOid::from_raw(0x7000_0000_0000 | n).unwrap()
    }

    #[test]
    fn test_grant_revoke_idempotent() {
        let stats = LagStats::new();
        stats.initialize(lag(1), "PortChannel1");

        assert!(stats.grant(lag(1), PortId(1)));
        assert!(!stats.grant(lag(1), PortId(1)));
        assert!(stats.revoke(lag(1), PortId(1)));
        assert!(!stats.revoke(lag(1), PortId(1)));
        assert!(!stats.revoke(lag(9), PortId(1)));

        let counters = stats.snapshot(lag(1)).unwrap();
        assert_eq!(counters.grants, 1);
        assert_eq!(counters.revokes, 1);
        assert!(counters.members.is_empty());
    }

    #[test]
    fn test_reinitialize_keeps_members() {
        let stats = LagStats::new();
        stats.initialize(lag(1), "PortChannel1");
        stats.grant(lag(1), PortId(1));
        stats.initialize(lag(1), "PortChannel01");

        let counters = stats.snapshot(lag(1)).unwrap();
        assert_eq!(counters.name, "PortChannel01");
        assert_eq!(counters.grants, 0);
        assert!(stats.is_granted(lag(1), PortId(1)));
    }

    #[test]
    fn test_concurrent_revoke_counts_once() {
        let stats = LagStats::new();
        stats.initialize(lag(1), "PortChannel1");
        stats.grant(lag(1), PortId(4));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                thread::spawn(move || stats.revoke(lag(1), PortId(4)))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(wins, 1);
        assert_eq!(stats.snapshot(lag(1)).unwrap().revokes, 1);
    }
}
