//! Link-down fast path.
//!
//! Runs on the link-event task, concurrently with the control plane. It
//! finds the group containing the port by asking the hardware, removes the
//! member directly and records the revoke. Controller bookkeeping catches up
//! when the control plane later programs the same member down and gets a
//! tolerated not-found.

use super::stats::LagStats;
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::{audit_log, debug_log};
use sonic_orch_common::{classify_remove, OrchError, OrchResult, RemoveOutcome};
use sonic_sai::{LagOid, PortOid, SaiDriver, SaiDriverExt};
use sonic_types::PortId;
use std::collections::HashMap;
use std::sync::Arc;

/// A link state notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Down(PortId),
    Up(PortId),
}

/// What the fast path did for one link-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDownOutcome {
    /// The member was removed from `group`.
    Shrunk { group: LagOid, port: PortId },
    /// The member was gone by the time the remove landed.
    AlreadyGone { group: LagOid },
    /// The port belongs to no group.
    NotInGroup,
}

#[derive(Clone)]
pub struct LinkEventHandler {
    driver: Arc<dyn SaiDriver>,
    stats: LagStats,
    ports: Arc<HashMap<PortId, PortOid>>,
}

impl LinkEventHandler {
    pub fn new(
        driver: Arc<dyn SaiDriver>,
        stats: LagStats,
        ports: HashMap<PortId, PortOid>,
    ) -> Self {
        Self {
            driver,
            stats,
            ports: Arc::new(ports),
        }
    }

    pub fn handle(&self, event: LinkEvent) -> OrchResult<Option<LinkDownOutcome>> {
        match event {
            LinkEvent::Down(port) => self.on_link_down(port).map(Some),
            LinkEvent::Up(port) => {
                // Re-enabling is a control-plane decision.
                debug_log!("LinkEventHandler", port = %port, "link up ignored");
                Ok(None)
            }
        }
    }

    /// Removes `port` from whichever group currently contains it.
    pub fn on_link_down(&self, port: PortId) -> OrchResult<LinkDownOutcome> {
        let port_oid = self
            .ports
            .get(&port)
            .copied()
            .ok_or_else(|| OrchError::unknown(format!("port {port}")))?;

        let membership = match self.driver.find_containing_group(port_oid) {
            Ok(Some(membership)) => membership,
            Ok(None) => return Ok(LinkDownOutcome::NotInGroup),
            Err(e) if e.is_not_found() => return Ok(LinkDownOutcome::NotInGroup),
            Err(e) => {
                return Err(OrchError::resource(
                    format!("find group containing {port}"),
                    e,
                ))
            }
        };

        let group = membership.group;
        let outcome = classify_remove(self.driver.remove_object(membership.member), || {
            format!("link-down remove of {port} from {group}")
        })?;
        match outcome {
            RemoveOutcome::Removed => {
                self.stats.revoke(group, port);
                audit_log!(AuditRecord::new(
                    AuditCategory::HardwareEvent,
                    "LinkEventHandler",
                    "shrink_on_link_down"
                )
                .with_outcome(AuditOutcome::Success)
                .with_object_id(group.to_string())
                .with_object_type("lag_member")
                .with_details(serde_json::json!({ "port": port.to_string() })));
                Ok(LinkDownOutcome::Shrunk { group, port })
            }
            RemoveOutcome::AlreadyGone => Ok(LinkDownOutcome::AlreadyGone { group }),
        }
    }

    /// Members of `group` as the hardware reports them right now.
    pub fn enabled_member_count(&self, group: LagOid) -> OrchResult<usize> {
        self.driver
            .lag_members(group)
            .map(|members| members.len())
            .map_err(|e| OrchError::resource(format!("read members of {group}"), e))
    }
}

impl std::fmt::Debug for LinkEventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkEventHandler")
            .field("ports", &self.ports.len())
            .finish()
    }
}
