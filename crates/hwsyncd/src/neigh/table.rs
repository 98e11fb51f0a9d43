//! Neighbor table.

use super::types::{DependencyEvent, NeighborKey, NeighborUpdate};
use crate::debug_log;
use sonic_types::MacAddress;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct NeighborTableStats {
    pub updates: u64,
    pub duplicates: u64,
    pub resolved_events: u64,
    pub unresolved_events: u64,
}

/// Current resolution state of every known neighbor.
#[derive(Debug, Default)]
pub struct NeighborTable {
    resolved: HashMap<NeighborKey, MacAddress>,
    stats: NeighborTableStats,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one update. Returns an event only on a state flip.
    ///
    /// A MAC change on an already resolved neighbor is recorded without an
    /// event; next hops do not depend on the MAC.
    pub fn apply(&mut self, update: NeighborUpdate) -> Option<DependencyEvent> {
        self.stats.updates += 1;
        let was_resolved = self.resolved.contains_key(&update.key);

        let event = match update.mac {
            Some(mac) => {
                self.resolved.insert(update.key, mac);
                (!was_resolved).then_some(DependencyEvent::Resolved(update.key))
            }
            None => self
                .resolved
                .remove(&update.key)
                .map(|_| DependencyEvent::Unresolved(update.key)),
        };

        match event {
            Some(DependencyEvent::Resolved(_)) => self.stats.resolved_events += 1,
            Some(DependencyEvent::Unresolved(_)) => self.stats.unresolved_events += 1,
            None => {
                self.stats.duplicates += 1;
                debug_log!("NeighborTable", neighbor = %update.key, "no state change");
            }
        }
        event
    }

    pub fn is_resolved(&self, key: &NeighborKey) -> bool {
        self.resolved.contains_key(key)
    }

    pub fn mac_of(&self, key: &NeighborKey) -> Option<MacAddress> {
        self.resolved.get(key).copied()
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    pub fn stats(&self) -> &NeighborTableStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_types::InterfaceId;

    fn key(last: u8) -> NeighborKey {
        NeighborKey::new(format!("10.0.0.{last}").parse().unwrap(), InterfaceId(1))
    }

    const MAC: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 1]);

    #[test]
    fn test_events_only_on_flip() {
        let mut table = NeighborTable::new();

        assert_eq!(
            table.apply(NeighborUpdate::resolved(key(1), MAC)),
            Some(DependencyEvent::Resolved(key(1)))
        );
        assert_eq!(table.apply(NeighborUpdate::resolved(key(1), MAC)), None);
        assert!(table.is_resolved(&key(1)));

        assert_eq!(
            table.apply(NeighborUpdate::unresolved(key(1))),
            Some(DependencyEvent::Unresolved(key(1)))
        );
        assert_eq!(table.apply(NeighborUpdate::unresolved(key(1))), None);
        assert!(!table.is_resolved(&key(1)));

        assert_eq!(table.stats().updates, 4);
        assert_eq!(table.stats().duplicates, 2);
    }

    #[test]
    fn test_unknown_neighbor_unresolved_is_silent() {
        let mut table = NeighborTable::new();
        assert_eq!(table.apply(NeighborUpdate::unresolved(key(9))), None);
        assert_eq!(table.resolved_count(), 0);
    }

    #[test]
    fn test_mac_change_keeps_resolution() {
        let mut table = NeighborTable::new();
        table.apply(NeighborUpdate::resolved(key(2), MAC));

        let moved = MacAddress::new([0x02, 0, 0, 0, 0, 2]);
        assert_eq!(table.apply(NeighborUpdate::resolved(key(2), moved)), None);
        assert_eq!(table.mac_of(&key(2)), Some(moved));
    }
}
