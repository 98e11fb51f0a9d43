//! Per-group member controller.

use super::stats::LagStats;
use super::types::{AggregatePort, ForwardingState, MemberState};
use crate::ports::PortTable;
use crate::{debug_log, info_log, warn_log};
use sonic_orch_common::{
    classify_remove, Discrepancy, DiscrepancyKind, OrchError, OrchResult, RemoveOutcome,
};
use sonic_sai::types::LagMemberKind;
use sonic_sai::{
    FloodBlockMask, LagMemberOid, LagOid, SaiAttribute, SaiDriver, SaiDriverExt,
};
use sonic_types::{AggregatePortId, PortId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
struct MemberEntry {
    state: MemberState,
    member: Option<LagMemberOid>,
}

/// Keeps one hardware group's members in line with software intent.
///
/// Reacts only to forwarding-state transitions between two snapshots of the
/// same member list; a changed member list is handled by recreating the
/// group.
pub struct LagController {
    driver: Arc<dyn SaiDriver>,
    lag: LagOid,
    id: AggregatePortId,
    name: String,
    members: BTreeMap<PortId, MemberEntry>,
    pending_heals: BTreeSet<PortId>,
    discrepancies: Vec<Discrepancy>,
    stats: LagStats,
}

impl LagController {
    fn empty(driver: Arc<dyn SaiDriver>, lag: LagOid, desired: &AggregatePort, stats: LagStats) -> Self {
        stats.initialize(lag, &desired.name);
        Self {
            driver,
            lag,
            id: desired.id,
            name: desired.name.clone(),
            members: BTreeMap::new(),
            pending_heals: BTreeSet::new(),
            discrepancies: Vec::new(),
            stats,
        }
    }

    /// Populates a freshly created group: every enabled subport becomes a
    /// member, then flooding between subports is blocked.
    ///
    /// On failure the members added so far are removed again.
    pub fn create(
        driver: Arc<dyn SaiDriver>,
        lag: LagOid,
        desired: &AggregatePort,
        ports: &PortTable,
        stats: LagStats,
    ) -> OrchResult<Self> {
        let mut controller = Self::empty(driver, lag, desired, stats);
        if let Err(e) = controller.populate(desired, ports) {
            if let Err(undo) = controller.destroy() {
                warn_log!("LagController", lag = %lag, error = %undo, "cleanup after failed create failed");
            }
            return Err(e);
        }
        debug_log!(
            "LagController",
            lag = %lag,
            name = %controller.name,
            members = controller.present_count(),
            "group populated"
        );
        Ok(controller)
    }

    fn populate(&mut self, desired: &AggregatePort, ports: &PortTable) -> OrchResult<()> {
        for port in desired.enabled_ports() {
            self.add_member(port, ports)?;
        }
        self.block_flooding(desired, ports)
    }

    /// Blocks broadcast and unknown-destination flooding between every
    /// ordered pair of distinct subports.
    fn block_flooding(&self, desired: &AggregatePort, ports: &PortTable) -> OrchResult<()> {
        let oids = desired
            .subports
            .iter()
            .map(|s| ports.port_oid(s.port).map(|oid| (s.port, oid)))
            .collect::<OrchResult<Vec<_>>>()?;
        for &(ingress, ingress_oid) in &oids {
            for &(egress, egress_oid) in &oids {
                if ingress == egress {
                    continue;
                }
                self.driver
                    .set_attribute(
                        ingress_oid.as_raw(),
                        SaiAttribute::FloodBlock {
                            egress_port: egress_oid.as_raw(),
                            mask: FloodBlockMask::ALL_FLOOD,
                        },
                    )
                    .map_err(|e| {
                        OrchError::resource(format!("block flooding {ingress} -> {egress}"), e)
                    })?;
            }
        }
        Ok(())
    }

    /// Takes over a group that survived a restart.
    ///
    /// Hardware members matching an enabled subport are marked present and
    /// granted. Any disagreement with intent is recorded as a discrepancy
    /// and left for the next [`LagController::program`] to heal.
    pub fn adopt(
        driver: Arc<dyn SaiDriver>,
        lag: LagOid,
        desired: &AggregatePort,
        ports: &PortTable,
        stats: LagStats,
    ) -> OrchResult<Self> {
        let mut controller = Self::empty(driver, lag, desired, stats);
        let hardware = controller
            .driver
            .lag_members(lag)
            .map_err(|e| OrchError::resource(format!("read members of {lag}"), e))?;

        for member in hardware {
            let port_oid = controller
                .driver
                .lag_member_port(member)
                .map_err(|e| OrchError::resource(format!("read port of {member}"), e))?;
            let Some(port) = ports.port_id(port_oid) else {
                warn_log!("LagController", lag = %lag, port = %port_oid, "adopted member on an unknown port");
                continue;
            };
            controller.members.insert(
                port,
                MemberEntry {
                    state: MemberState::Present,
                    member: Some(member),
                },
            );
            match desired.subport(port).map(|s| s.state) {
                Some(ForwardingState::Enabled) => {
                    controller.stats.grant(lag, port);
                }
                Some(ForwardingState::Disabled) => {
                    controller.record(port, DiscrepancyKind::UnexpectedInHardware);
                    controller.pending_heals.insert(port);
                }
                None => controller.record(port, DiscrepancyKind::UnexpectedInHardware),
            }
        }

        for port in desired.enabled_ports() {
            if controller.member_state(port) == MemberState::Absent {
                controller.record(port, DiscrepancyKind::MissingInHardware);
                controller.pending_heals.insert(port);
            }
        }

        info_log!(
            "LagController",
            lag = %lag,
            name = %controller.name,
            present = controller.present_count(),
            discrepancies = controller.discrepancies.len(),
            "group adopted"
        );
        Ok(controller)
    }

    fn record(&mut self, port: PortId, kind: DiscrepancyKind) {
        warn_log!("LagController", group = %self.id, port = %port, kind = %kind, "warm boot discrepancy");
        self.discrepancies.push(Discrepancy {
            group: self.id,
            port,
            kind,
        });
    }

    /// Applies the forwarding-state transitions between `old` and `new`.
    ///
    /// Each changed subport costs exactly one driver call. Subports not in
    /// `old` are left alone. A subport flagged at adoption is instead
    /// compared against the hardware bookkeeping.
    pub fn program(
        &mut self,
        old: &AggregatePort,
        new: &AggregatePort,
        ports: &PortTable,
    ) -> OrchResult<()> {
        if new.name != self.name {
            info_log!("LagController", lag = %self.lag, old = %self.name, new = %new.name, "group renamed");
            self.stats.initialize(self.lag, &new.name);
            self.name = new.name.clone();
        }

        for subport in &new.subports {
            let port = subport.port;
            if self.pending_heals.contains(&port) {
                let present = self.member_state(port) == MemberState::Present;
                match (subport.state, present) {
                    (ForwardingState::Enabled, false) => self.add_member(port, ports)?,
                    (ForwardingState::Disabled, true) => self.remove_member(port)?,
                    _ => {}
                }
                self.pending_heals.remove(&port);
                continue;
            }

            match (old.subport(port).map(|s| s.state), subport.state) {
                (Some(ForwardingState::Disabled), ForwardingState::Enabled) => {
                    self.add_member(port, ports)?
                }
                (Some(ForwardingState::Enabled), ForwardingState::Disabled) => {
                    self.remove_member(port)?
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn add_member(&mut self, port: PortId, ports: &PortTable) -> OrchResult<()> {
        if self.member_state(port) == MemberState::Present {
            debug_log!("LagController", lag = %self.lag, port = %port, "already a member");
            return Ok(());
        }
        let port_oid = ports.port_oid(port)?;
        let member = self
            .driver
            .create_object::<LagMemberKind>(&[
                SaiAttribute::LagId(self.lag.as_raw()),
                SaiAttribute::PortId(port_oid.as_raw()),
            ])
            .map_err(|e| OrchError::resource(format!("add {port} to {}", self.name), e))?;
        self.members.insert(
            port,
            MemberEntry {
                state: MemberState::Present,
                member: Some(member),
            },
        );
        self.stats.grant(self.lag, port);
        debug_log!("LagController", lag = %self.lag, port = %port, member = %member, "member added");
        Ok(())
    }

    fn remove_member(&mut self, port: PortId) -> OrchResult<()> {
        let entry = self.members.get(&port).copied().unwrap_or_default();
        let Some(member) = entry.member else {
            debug_log!("LagController", lag = %self.lag, port = %port, "not a member");
            return Ok(());
        };
        let outcome = classify_remove(self.driver.remove_object(member), || {
            format!("remove {port} from {}", self.name)
        })?;
        self.members.insert(port, MemberEntry::default());
        if outcome == RemoveOutcome::Removed {
            self.stats.revoke(self.lag, port);
        }
        debug_log!("LagController", lag = %self.lag, port = %port, outcome = ?outcome, "member removed");
        Ok(())
    }

    /// Removes every member, tracked or not, ahead of deleting the group.
    pub fn destroy(&mut self) -> OrchResult<()> {
        let tracked: Vec<PortId> = self
            .members
            .iter()
            .filter(|(_, e)| e.state == MemberState::Present)
            .map(|(port, _)| *port)
            .collect();
        for port in tracked {
            self.remove_member(port)?;
        }

        let leftovers = match self.driver.lag_members(self.lag) {
            Ok(members) => members,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(OrchError::resource(format!("read members of {}", self.lag), e)),
        };
        for member in leftovers {
            classify_remove(self.driver.remove_object(member), || {
                format!("remove untracked {member} from {}", self.name)
            })?;
        }

        self.pending_heals.clear();
        self.stats.remove(self.lag);
        Ok(())
    }

    pub fn lag_oid(&self) -> LagOid {
        self.lag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member_state(&self, port: PortId) -> MemberState {
        self.members
            .get(&port)
            .map_or(MemberState::Absent, |e| e.state)
    }

    pub fn present_count(&self) -> usize {
        self.members
            .values()
            .filter(|e| e.state == MemberState::Present)
            .count()
    }

    pub fn discrepancies(&self) -> &[Discrepancy] {
        &self.discrepancies
    }

    pub fn pending_heals(&self) -> impl Iterator<Item = PortId> + '_ {
        self.pending_heals.iter().copied()
    }

    pub fn has_pending_heals(&self) -> bool {
        !self.pending_heals.is_empty()
    }
}

impl std::fmt::Debug for LagController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LagController")
            .field("lag", &self.lag)
            .field("name", &self.name)
            .field("present", &self.present_count())
            .field("pending_heals", &self.pending_heals)
            .finish()
    }
}
