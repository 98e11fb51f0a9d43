//! Aggregate port manager.

use super::controller::LagController;
use super::link_event::LinkEventHandler;
use super::stats::LagStats;
use super::types::AggregatePort;
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::ports::PortTable;
use crate::{audit_log, info_log, warn_log};
use sonic_orch_common::{Discrepancy, ObjectRegistry, Origin, OrchError, OrchResult, WarmBootCache};
use sonic_sai::types::LagKind;
use sonic_sai::{LagOid, SaiDriver};
use sonic_types::AggregatePortId;
use std::collections::BTreeMap;
use std::sync::Arc;

struct Group {
    state: AggregatePort,
    controller: LagController,
}

/// Owns every aggregate port's hardware group and controller.
pub struct LagManager {
    driver: Arc<dyn SaiDriver>,
    registry: ObjectRegistry<AggregatePortId, LagKind>,
    groups: BTreeMap<AggregatePortId, Group>,
    stats: LagStats,
}

impl LagManager {
    pub fn new(driver: Arc<dyn SaiDriver>, warm_boot: Arc<WarmBootCache>) -> Self {
        Self {
            registry: ObjectRegistry::new("lag", driver.clone()).with_warm_boot(warm_boot),
            driver,
            groups: BTreeMap::new(),
            stats: LagStats::new(),
        }
    }

    /// Brings up a new aggregate port, adopting a surviving group if there
    /// is one.
    pub fn add(&mut self, desired: AggregatePort, ports: &PortTable) -> OrchResult<LagOid> {
        if self.groups.contains_key(&desired.id) {
            return Err(OrchError::precondition(format!(
                "{} added twice",
                desired.id
            )));
        }

        let acquired = self.registry.acquire(&desired.id, &[])?;
        let built = match acquired.origin {
            Origin::Adopted => LagController::adopt(
                self.driver.clone(),
                acquired.oid,
                &desired,
                ports,
                self.stats.clone(),
            ),
            _ => LagController::create(
                self.driver.clone(),
                acquired.oid,
                &desired,
                ports,
                self.stats.clone(),
            ),
        };
        let controller = match built {
            Ok(controller) => controller,
            Err(e) => {
                if let Err(undo) = self.registry.release(acquired.oid) {
                    warn_log!("LagManager", group = %desired.id, error = %undo, "failed to delete group after setup failure");
                }
                audit_log!(AuditRecord::new(
                    AuditCategory::ResourceCreate,
                    "LagManager",
                    "create_lag"
                )
                .with_object_id(desired.id.to_string())
                .with_object_type("lag")
                .with_error(e.to_string()));
                return Err(e);
            }
        };

        let (category, action) = if acquired.origin == Origin::Adopted {
            (AuditCategory::WarmRestart, "adopt_lag")
        } else {
            (AuditCategory::ResourceCreate, "create_lag")
        };
        audit_log!(AuditRecord::new(category, "LagManager", action)
            .with_outcome(AuditOutcome::Success)
            .with_object_id(acquired.oid.to_string())
            .with_object_type("lag")
            .with_details(serde_json::json!({
                "group": desired.id.to_string(),
                "name": desired.name,
                "members": controller.present_count(),
                "discrepancies": controller.discrepancies().len(),
            })));

        self.groups.insert(
            desired.id,
            Group {
                state: desired,
                controller,
            },
        );
        Ok(acquired.oid)
    }

    /// Applies an `(old, new)` delta.
    ///
    /// State transitions are programmed in place; a different member list
    /// rebuilds the group.
    pub fn change(
        &mut self,
        old: &AggregatePort,
        new: AggregatePort,
        ports: &PortTable,
    ) -> OrchResult<LagOid> {
        if old.id != new.id {
            return Err(OrchError::InvalidConfig(format!(
                "cannot change {} into {}",
                old.id, new.id
            )));
        }
        let Some(group) = self.groups.get_mut(&new.id) else {
            return Err(OrchError::unknown(format!("aggregate port {}", new.id)));
        };

        if !old.same_members(&new) {
            info_log!("LagManager", group = %new.id, "member list changed, recreating group");
            self.remove(new.id)?;
            return self.add(new, ports);
        }

        group.controller.program(old, &new, ports)?;
        group.state = new;
        Ok(group.controller.lag_oid())
    }

    /// Adds or reprograms `desired` against the current state. Replaying
    /// the same state makes no driver calls.
    pub fn apply(&mut self, desired: AggregatePort, ports: &PortTable) -> OrchResult<LagOid> {
        match self.groups.get(&desired.id) {
            Some(group) => {
                let old = group.state.clone();
                self.change(&old, desired, ports)
            }
            None => self.add(desired, ports),
        }
    }

    /// Removes the members, then the group.
    pub fn remove(&mut self, id: AggregatePortId) -> OrchResult<()> {
        let Some(mut group) = self.groups.remove(&id) else {
            return Err(OrchError::unknown(format!("aggregate port {id}")));
        };
        let lag = group.controller.lag_oid();
        let controller = &mut group.controller;
        if let Err(e) = self.registry.release_with(lag, |_, _| controller.destroy()) {
            self.groups.insert(id, group);
            return Err(e);
        }
        audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, "LagManager", "remove_lag")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(lag.to_string())
            .with_object_type("lag")
            .with_details(serde_json::json!({ "group": id.to_string() })));
        Ok(())
    }

    /// Runs one program pass over every group with members flagged at
    /// adoption. Returns the number of groups touched.
    pub fn heal(&mut self, ports: &PortTable) -> OrchResult<usize> {
        let mut healed = 0;
        for group in self.groups.values_mut() {
            if !group.controller.has_pending_heals() {
                continue;
            }
            group.controller.program(&group.state, &group.state, ports)?;
            healed += 1;
        }
        Ok(healed)
    }

    /// A fast-path handler sharing this manager's stats.
    pub fn link_event_handler(&self, ports: &PortTable) -> LinkEventHandler {
        LinkEventHandler::new(self.driver.clone(), self.stats.clone(), ports.port_map())
    }

    pub fn stats(&self) -> &LagStats {
        &self.stats
    }

    pub fn lag_oid(&self, id: AggregatePortId) -> Option<LagOid> {
        self.groups.get(&id).map(|g| g.controller.lag_oid())
    }

    pub fn controller(&self, id: AggregatePortId) -> Option<&LagController> {
        self.groups.get(&id).map(|g| &g.controller)
    }

    pub fn state(&self, id: AggregatePortId) -> Option<&AggregatePort> {
        self.groups.get(&id).map(|g| &g.state)
    }

    pub fn discrepancies(&self) -> Vec<Discrepancy> {
        self.groups
            .values()
            .flat_map(|g| g.controller.discrepancies().iter().copied())
            .collect()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lag::{ForwardingState, MemberState, Subport};
    use pretty_assertions::assert_eq;
    use sonic_sai::{FakeSai, SaiObjectType};
    use sonic_types::PortId;

    fn setup(port_count: u32) -> (Arc<FakeSai>, PortTable, LagManager) {
        let sai = Arc::new(FakeSai::new());
        let mut ports = PortTable::new();
        for n in 1..=port_count {
            ports.add_port(PortId(n), sai.add_port(&format!("Ethernet{n}")));
        }
        let manager = LagManager::new(sai.clone(), Arc::new(WarmBootCache::cold()));
        (sai, ports, manager)
    }

    fn channel(subports: Vec<Subport>) -> AggregatePort {
        AggregatePort::new(AggregatePortId(1), "PortChannel1", subports)
    }

    #[test]
    fn test_add_and_remove() {
        let (sai, ports, mut manager) = setup(2);
        let lag = manager
            .add(
                channel(vec![Subport::enabled(PortId(1)), Subport::enabled(PortId(2))]),
                &ports,
            )
            .unwrap();

        assert_eq!(manager.lag_oid(AggregatePortId(1)), Some(lag));
        assert_eq!(sai.object_count(SaiObjectType::LagMember), 2);
        assert_eq!(manager.stats().snapshot(lag).unwrap().members.len(), 2);

        manager.remove(AggregatePortId(1)).unwrap();
        assert_eq!(sai.object_count(SaiObjectType::Lag), 0);
        assert_eq!(sai.object_count(SaiObjectType::LagMember), 0);
        assert_eq!(manager.stats().group_count(), 0);
        assert!(matches!(
            manager.remove(AggregatePortId(1)),
            Err(OrchError::UnknownHandle(_))
        ));
    }

    #[test]
    fn test_duplicate_add_is_fatal() {
        let (_sai, ports, mut manager) = setup(1);
        manager.add(channel(vec![]), &ports).unwrap();
        assert!(manager.add(channel(vec![]), &ports).unwrap_err().is_fatal());
    }

    #[test]
    fn test_apply_replay_is_silent() {
        let (sai, ports, mut manager) = setup(2);
        let desired = channel(vec![Subport::enabled(PortId(1)), Subport::disabled(PortId(2))]);
        manager.apply(desired.clone(), &ports).unwrap();
        sai.reset_counters();

        manager.apply(desired.clone(), &ports).unwrap();
        assert!(sai.calls().is_empty());

        let flipped = desired.with_state(PortId(2), ForwardingState::Enabled);
        manager.apply(flipped, &ports).unwrap();
        assert_eq!(sai.create_count(SaiObjectType::LagMember), 1);
    }

    #[test]
    fn test_member_list_change_recreates_group() {
        let (sai, ports, mut manager) = setup(3);
        let old = channel(vec![Subport::enabled(PortId(1))]);
        let first = manager.add(old.clone(), &ports).unwrap();

        let new = channel(vec![Subport::enabled(PortId(1)), Subport::enabled(PortId(3))]);
        let second = manager.change(&old, new, &ports).unwrap();

        assert_ne!(first, second);
        assert_eq!(sai.object_count(SaiObjectType::Lag), 1);
        assert_eq!(sai.object_count(SaiObjectType::LagMember), 2);
        let controller = manager.controller(AggregatePortId(1)).unwrap();
        assert_eq!(controller.member_state(PortId(3)), MemberState::Present);
    }

    #[test]
    fn test_failed_create_leaves_nothing() {
        let (sai, ports, mut manager) = setup(1);
        // Port 2 is unknown, so blocking flooding fails.
        let err = manager
            .add(
                channel(vec![Subport::enabled(PortId(1)), Subport::disabled(PortId(2))]),
                &ports,
            )
            .unwrap_err();
        assert!(matches!(err, OrchError::UnknownHandle(_)));
        assert_eq!(sai.object_count(SaiObjectType::Lag), 0);
        assert_eq!(sai.object_count(SaiObjectType::LagMember), 0);
        assert_eq!(manager.group_count(), 0);
    }
}
