//! The switch agent: every manager wired around one driver.

use super::state::{ControlPlaneUpdate, DesiredState};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::config::AgentConfig;
use crate::fdb::{FdbManager, FdbStats};
use crate::lag::{LagManager, LinkEventHandler};
use crate::neigh::NeighborTable;
use crate::nhg::{NextHopEnv, NextHopGroupManager, NhgManagerStats};
use crate::ports::PortTable;
use crate::route::{ProgramReport, RibBackend, RouteContext, RouteStats, RouteTable, RouteUpdater};
use crate::{audit_log, debug_log, info_log, warn_log};
use serde::Serialize;
use sonic_orch_common::{ObjectRegistry, OrchError, OrchResult, WarmBootCache};
use sonic_sai::types::RouterInterfaceKind;
use sonic_sai::{PortOid, SaiAttribute, SaiDriver, SaiObjectType};
use sonic_types::InterfaceId;
use std::collections::HashMap;
use std::sync::Arc;

/// Object types a warm start loads from the driver.
///
/// LAG members are not listed: they are reconciled by walking each adopted
/// LAG, and a stale LAG takes its members with it.
pub const WARM_BOOT_OBJECT_TYPES: [SaiObjectType; 9] = [
    SaiObjectType::VirtualRouter,
    SaiObjectType::RouterInterface,
    SaiObjectType::NextHop,
    SaiObjectType::NextHopGroup,
    SaiObjectType::NextHopGroupMember,
    SaiObjectType::Lag,
    SaiObjectType::RouteEntry,
    SaiObjectType::BridgePort,
    SaiObjectType::FdbEntry,
];

/// Update counters kept by the agent itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgentStats {
    pub updates_applied: u64,
    pub updates_failed: u64,
    pub route_failures: u64,
    pub link_events_handled: u64,
}

/// Result of [`SwitchAgent::start`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartReport {
    pub warm_boot: bool,
    pub routes: ProgramReport,
    pub groups_healed: usize,
    pub stale_removed: usize,
    pub discrepancies: Vec<String>,
}

/// Point-in-time view of the agent, printed by the daemon on exit.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub backend: String,
    pub ports: usize,
    pub interfaces: usize,
    pub resolved_neighbors: usize,
    pub aggregate_ports: usize,
    pub next_hops: usize,
    pub next_hop_groups: usize,
    pub routers: usize,
    pub routes: usize,
    pub pending_routes: usize,
    pub fdb_entries: usize,
    pub bridge_ports: usize,
    pub discrepancies: Vec<String>,
    pub agent: AgentStats,
    pub next_hop_group_stats: NhgManagerStats,
    pub route_stats: RouteStats,
    pub fdb_stats: FdbStats,
}

pub struct SwitchAgent {
    config: AgentConfig,
    driver: Arc<dyn SaiDriver>,
    warm_boot: Arc<WarmBootCache>,
    ports: PortTable,
    interfaces: ObjectRegistry<InterfaceId, RouterInterfaceKind>,
    neighbors: NeighborTable,
    nhgs: NextHopGroupManager,
    lags: LagManager,
    routes: RouteTable,
    updater: RouteUpdater,
    fdb: FdbManager,
    pub(crate) stats: AgentStats,
}

impl SwitchAgent {
    /// Builds the agent. With `warm_boot` set, the driver's inventory is
    /// loaded so managers adopt instead of create.
    pub fn new(config: AgentConfig, driver: Arc<dyn SaiDriver>) -> OrchResult<Self> {
        if let Err(e) = config.validate() {
            audit_log!(config.audit_record().with_error(e.to_string()));
            return Err(e);
        }
        audit_log!(config.audit_record());

        let warm_boot = if config.warm_boot {
            let cache = WarmBootCache::load(&*driver, &WARM_BOOT_OBJECT_TYPES)?;
            audit_log!(
                AuditRecord::new(AuditCategory::WarmRestart, "SwitchAgent", "load_inventory")
                    .with_outcome(AuditOutcome::Success)
                    .with_details(serde_json::json!({ "objects": cache.len() }))
            );
            Arc::new(cache)
        } else {
            Arc::new(WarmBootCache::cold())
        };

        let backend = RibBackend::from_flag(config.standalone_rib);
        info_log!("SwitchAgent", backend = %backend, warm_boot = config.warm_boot, "agent created");

        Ok(Self {
            interfaces: ObjectRegistry::new("router_interface", driver.clone())
                .with_warm_boot(warm_boot.clone()),
            nhgs: NextHopGroupManager::new(driver.clone(), warm_boot.clone()),
            lags: LagManager::new(driver.clone(), warm_boot.clone()),
            routes: RouteTable::new(driver.clone(), warm_boot.clone()),
            fdb: FdbManager::new(driver.clone(), warm_boot.clone()),
            updater: RouteUpdater::new(backend),
            ports: PortTable::new(),
            neighbors: NeighborTable::new(),
            stats: AgentStats::default(),
            config,
            driver,
            warm_boot,
        })
    }

    /// Programs the full desired state, then ends warm boot.
    ///
    /// Order matters: ports and interfaces first, neighbors before anything
    /// that resolves next hops, LAGs before the heal pass, and stale objects
    /// are only removed once every manager has claimed what it needs.
    pub fn start(&mut self, desired: &DesiredState) -> OrchResult<StartReport> {
        audit_log!(
            AuditRecord::new(AuditCategory::SystemLifecycle, "SwitchAgent", "start")
                .with_outcome(AuditOutcome::InProgress)
                .with_details(serde_json::json!({
                    "ports": desired.ports.len(),
                    "aggregate_ports": desired.aggregate_ports.len(),
                    "routes": desired.routes.len(),
                    "mac_entries": desired.mac_entries.len(),
                }))
        );

        let hardware_ports = self.hardware_ports()?;
        for spec in &desired.ports {
            let oid = hardware_ports
                .get(spec.name.as_str())
                .copied()
                .ok_or_else(|| OrchError::unknown(format!("hardware port {}", spec.name)))?;
            self.ports.add_port(spec.id, oid);
        }

        let vrf = self.routes.default_router()?;
        for spec in &desired.interfaces {
            let port = self.ports.port_oid(spec.port)?;
            let acquired = self.interfaces.acquire(
                &spec.id,
                &[
                    SaiAttribute::PortId(port.as_raw()),
                    SaiAttribute::VirtualRouterId(vrf.as_raw()),
                ],
            )?;
            self.ports.add_interface(spec.id, acquired.oid);
        }

        for update in &desired.neighbors {
            self.neighbors.apply(*update);
        }

        for port in &desired.aggregate_ports {
            self.lags.apply(port.clone(), &self.ports)?;
        }

        for spec in &desired.routes {
            self.updater
                .add_route(spec.router, spec.client, spec.prefix, spec.entry.clone());
        }
        let routes = self.flush_routes()?;

        for entry in &desired.mac_entries {
            self.fdb.add(*entry, &self.ports)?;
        }

        let groups_healed = self.lags.heal(&self.ports)?;
        let warm_boot = self.warm_boot.is_active();
        let stale_removed = self.warm_boot.finish(&*self.driver)?;
        let discrepancies = self.discrepancy_strings();
        for discrepancy in &discrepancies {
            warn_log!("SwitchAgent", discrepancy = %discrepancy, "adopted state differed from intent");
        }

        if warm_boot {
            audit_log!(
                AuditRecord::new(AuditCategory::WarmRestart, "SwitchAgent", "reconcile")
                    .with_outcome(AuditOutcome::Success)
                    .with_details(serde_json::json!({
                        "stale_removed": stale_removed,
                        "groups_healed": groups_healed,
                        "discrepancies": discrepancies.len(),
                    }))
            );
        }
        audit_log!(
            AuditRecord::new(AuditCategory::SystemLifecycle, "SwitchAgent", "start")
                .with_outcome(AuditOutcome::Success)
        );

        Ok(StartReport {
            warm_boot,
            routes,
            groups_healed,
            stale_removed,
            discrepancies,
        })
    }

    fn hardware_ports(&self) -> OrchResult<HashMap<String, PortOid>> {
        let existing = self
            .driver
            .list_existing_objects(SaiObjectType::Port)
            .map_err(|e| OrchError::resource("list hardware ports", e))?;
        Ok(existing
            .into_iter()
            .filter_map(|object| {
                let oid = PortOid::from_raw(object.oid)?;
                Some((object.match_key.as_str().to_string(), oid))
            })
            .collect())
    }

    /// Applies one control-plane update.
    ///
    /// Route adds and deletes are queued until the next
    /// [`ControlPlaneUpdate::FlushRoutes`].
    pub fn apply(&mut self, update: ControlPlaneUpdate) -> OrchResult<()> {
        debug_log!("SwitchAgent", kind = update.kind(), "applying update");
        match update {
            ControlPlaneUpdate::AggregatePortAdded { port } => {
                self.lags.add(port, &self.ports)?;
            }
            ControlPlaneUpdate::AggregatePortChanged { old, new } => {
                self.lags.change(&old, new, &self.ports)?;
            }
            ControlPlaneUpdate::AggregatePortRemoved { id } => {
                self.lags.remove(id)?;
            }
            ControlPlaneUpdate::Neighbor { update } => {
                if let Some(event) = self.neighbors.apply(update) {
                    let env = NextHopEnv {
                        neighbors: &self.neighbors,
                        ports: &self.ports,
                    };
                    self.nhgs.on_dependency_event(event, env)?;
                }
            }
            ControlPlaneUpdate::RouteAdd {
                router,
                client,
                prefix,
                entry,
            } => self.updater.add_route(router, client, prefix, entry),
            ControlPlaneUpdate::RouteDelete {
                router,
                client,
                prefix,
            } => self.updater.del_route(router, client, prefix),
            ControlPlaneUpdate::FlushRoutes => {
                let report = self.flush_routes()?;
                if !report.is_complete() {
                    warn_log!(
                        "SwitchAgent",
                        applied = report.applied,
                        failed = report.failed.len(),
                        "route program partially failed"
                    );
                }
            }
            ControlPlaneUpdate::FlushClient { router, client } => {
                let discarded = self.updater.discard(router, client);
                let mut ctx = RouteContext {
                    nhgs: &mut self.nhgs,
                    env: NextHopEnv {
                        neighbors: &self.neighbors,
                        ports: &self.ports,
                    },
                };
                let removed = self.routes.flush_client(router, client, &mut ctx)?;
                info_log!(
                    "SwitchAgent",
                    router = %router,
                    client = %client,
                    removed,
                    discarded,
                    "client routes flushed"
                );
            }
            ControlPlaneUpdate::MacAdd { entry } => {
                self.fdb.add(entry, &self.ports)?;
            }
            ControlPlaneUpdate::MacUpdate {
                key,
                port,
                metadata,
            } => {
                self.fdb.update(key, port, metadata, &self.ports)?;
            }
            ControlPlaneUpdate::MacRemove { key } => {
                self.fdb.remove(key)?;
            }
        }
        Ok(())
    }

    fn flush_routes(&mut self) -> OrchResult<ProgramReport> {
        let mut ctx = RouteContext {
            nhgs: &mut self.nhgs,
            env: NextHopEnv {
                neighbors: &self.neighbors,
                ports: &self.ports,
            },
        };
        let report = self.updater.program(&mut self.routes, &mut ctx)?;
        self.stats.route_failures += report.failed.len() as u64;
        Ok(report)
    }

    /// A fast-path handler over the current port map.
    pub fn link_event_handler(&self) -> LinkEventHandler {
        self.lags.link_event_handler(&self.ports)
    }

    fn discrepancy_strings(&self) -> Vec<String> {
        self.lags
            .discrepancies()
            .iter()
            .map(|d| format!("{} {} {}", d.group, d.port, d.kind))
            .collect()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    pub fn ports(&self) -> &PortTable {
        &self.ports
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn next_hop_groups(&self) -> &NextHopGroupManager {
        &self.nhgs
    }

    pub fn lags(&self) -> &LagManager {
        &self.lags
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn updater(&self) -> &RouteUpdater {
        &self.updater
    }

    pub fn fdb(&self) -> &FdbManager {
        &self.fdb
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            backend: self.updater.backend().to_string(),
            ports: self.ports.port_count(),
            interfaces: self.ports.interface_count(),
            resolved_neighbors: self.neighbors.resolved_count(),
            aggregate_ports: self.lags.group_count(),
            next_hops: self.nhgs.next_hop_count(),
            next_hop_groups: self.nhgs.group_count(),
            routers: self.routes.router_count(),
            routes: self.routes.route_count(),
            pending_routes: self.updater.pending_count(),
            fdb_entries: self.fdb.len(),
            bridge_ports: self.fdb.bridge_port_count(),
            discrepancies: self.discrepancy_strings(),
            agent: self.stats,
            next_hop_group_stats: self.nhgs.stats().clone(),
            route_stats: self.routes.stats().clone(),
            fdb_stats: self.fdb.stats().clone(),
        }
    }
}
