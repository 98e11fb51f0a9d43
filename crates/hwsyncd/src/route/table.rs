//! Programmed routes.
//!
//! One hardware route entry per `(router, prefix)`. Several clients may
//! install the same prefix; the entry of the lowest client id is the one in
//! hardware. Routes with next hops hold a reference on a shared next-hop
//! group, and routes in a non-default router hold a reference on that
//! router's virtual router object.

use super::types::RouteNextHopEntry;
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::nhg::{NextHopEnv, NextHopGroupManager};
use crate::{audit_log, debug_log, warn_log};
use serde::Serialize;
use sonic_orch_common::{classify_remove, ObjectRegistry, OrchError, OrchResult, WarmBootCache};
use sonic_sai::types::{RouteEntryKind, VirtualRouterKind};
use sonic_sai::{
    MatchKey, NextHopGroupOid, RouteEntryOid, SaiAttribute, SaiDriver, SaiDriverExt, SaiObjectId,
    SaiObjectType, VirtualRouterOid,
};
use sonic_types::{ClientId, IpPrefix, RouterId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What route programming borrows from the next-hop side.
pub struct RouteContext<'a> {
    pub nhgs: &'a mut NextHopGroupManager,
    pub env: NextHopEnv<'a>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteStats {
    pub created: u64,
    pub adopted: u64,
    pub updated: u64,
    pub removed: u64,
}

#[derive(Debug, Clone)]
struct RouteState {
    oid: RouteEntryOid,
    router: VirtualRouterOid,
    clients: BTreeMap<ClientId, RouteNextHopEntry>,
    programmed: RouteNextHopEntry,
    group: Option<NextHopGroupOid>,
}

impl RouteState {
    fn effective(&self) -> Option<&RouteNextHopEntry> {
        self.clients.values().next()
    }
}

fn route_match_key(router: RouterId, prefix: IpPrefix) -> MatchKey {
    MatchKey::new(format!("{router}|{prefix}"))
}

pub struct RouteTable {
    driver: Arc<dyn SaiDriver>,
    warm_boot: Arc<WarmBootCache>,
    routers: ObjectRegistry<RouterId, VirtualRouterKind>,
    default_router: Option<VirtualRouterOid>,
    routes: BTreeMap<(RouterId, IpPrefix), RouteState>,
    stats: RouteStats,
}

impl RouteTable {
    pub fn new(driver: Arc<dyn SaiDriver>, warm_boot: Arc<WarmBootCache>) -> Self {
        Self {
            routers: ObjectRegistry::new("virtual_router", driver.clone())
                .with_warm_boot(warm_boot.clone()),
            driver,
            warm_boot,
            default_router: None,
            routes: BTreeMap::new(),
            stats: RouteStats::default(),
        }
    }

    /// The default router, acquired on first use and held from then on.
    pub fn default_router(&mut self) -> OrchResult<VirtualRouterOid> {
        if let Some(oid) = self.default_router {
            return Ok(oid);
        }
        let oid = self.routers.acquire(&RouterId::DEFAULT, &[])?.oid;
        self.default_router = Some(oid);
        Ok(oid)
    }

    fn acquire_router(&mut self, router: RouterId) -> OrchResult<VirtualRouterOid> {
        if router == RouterId::DEFAULT {
            self.default_router()
        } else {
            Ok(self.routers.acquire(&router, &[])?.oid)
        }
    }

    fn release_router(&mut self, router: RouterId, oid: VirtualRouterOid) -> OrchResult<()> {
        if router != RouterId::DEFAULT {
            self.routers.release(oid)?;
        }
        Ok(())
    }

    fn acquire_group(
        entry: &RouteNextHopEntry,
        ctx: &mut RouteContext<'_>,
    ) -> OrchResult<Option<NextHopGroupOid>> {
        match entry.next_hops() {
            Some(set) => Ok(Some(ctx.nhgs.acquire(set, ctx.env)?)),
            None => Ok(None),
        }
    }

    fn release_group(group: Option<NextHopGroupOid>, ctx: &mut RouteContext<'_>) -> OrchResult<()> {
        if let Some(group) = group {
            ctx.nhgs.release(group)?;
        }
        Ok(())
    }

    fn set_attributes(&self, oid: RouteEntryOid, attrs: Vec<SaiAttribute>) -> OrchResult<()> {
        for attr in attrs {
            self.driver
                .set_attribute(oid.as_raw(), attr)
                .map_err(|e| OrchError::resource(format!("update route {oid}"), e))?;
        }
        Ok(())
    }

    /// Installs `client`'s entry for `prefix`.
    ///
    /// Re-adding the entry already in hardware makes no driver call. On
    /// failure the client's previous entry is restored.
    pub fn add(
        &mut self,
        router: RouterId,
        client: ClientId,
        prefix: IpPrefix,
        entry: RouteNextHopEntry,
        ctx: &mut RouteContext<'_>,
    ) -> OrchResult<()> {
        let key = (router, prefix);
        let Some(state) = self.routes.get_mut(&key) else {
            return self.install(router, client, prefix, entry, ctx);
        };
        let previous = state.clients.insert(client, entry);
        if let Err(e) = self.reprogram(key, ctx) {
            if let Some(state) = self.routes.get_mut(&key) {
                match previous {
                    Some(previous) => state.clients.insert(client, previous),
                    None => state.clients.remove(&client),
                };
            }
            return Err(e);
        }
        Ok(())
    }

    fn install(
        &mut self,
        router: RouterId,
        client: ClientId,
        prefix: IpPrefix,
        entry: RouteNextHopEntry,
        ctx: &mut RouteContext<'_>,
    ) -> OrchResult<()> {
        let vrf = self.acquire_router(router)?;
        let group = match Self::acquire_group(&entry, ctx) {
            Ok(group) => group,
            Err(e) => {
                self.undo_router(router, vrf);
                return Err(e);
            }
        };

        let match_key = route_match_key(router, prefix);
        let attrs = entry.attributes(group.map(|g| g.as_raw()));
        let claimed = self
            .warm_boot
            .claim(SaiObjectType::RouteEntry, &match_key)
            .and_then(SaiObjectId::from_raw);
        let result = match claimed {
            Some(oid) => self.set_attributes(oid, attrs).map(|()| (oid, true)),
            None => {
                let mut create = vec![
                    SaiAttribute::VirtualRouterId(vrf.as_raw()),
                    SaiAttribute::Destination(prefix),
                ];
                create.extend(attrs);
                create.push(SaiAttribute::Label(match_key.as_str().to_string()));
                self.driver
                    .create_object::<RouteEntryKind>(&create)
                    .map(|oid| (oid, false))
                    .map_err(|e| OrchError::resource(format!("create route {router} {prefix}"), e))
            }
        };

        let (oid, adopted) = match result {
            Ok(created) => created,
            Err(e) => {
                if let Err(undo) = Self::release_group(group, ctx) {
                    warn_log!("RouteTable", prefix = %prefix, error = %undo, "failed to release group after route create failure");
                }
                self.undo_router(router, vrf);
                return Err(e);
            }
        };

        if adopted {
            self.stats.adopted += 1;
        } else {
            self.stats.created += 1;
        }
        debug_log!("RouteTable", router = %router, prefix = %prefix, entry = %entry, adopted, "route installed");
        self.routes.insert(
            (router, prefix),
            RouteState {
                oid,
                router: vrf,
                clients: BTreeMap::from([(client, entry.clone())]),
                programmed: entry,
                group,
            },
        );
        Ok(())
    }

    fn undo_router(&mut self, router: RouterId, vrf: VirtualRouterOid) {
        if let Err(undo) = self.release_router(router, vrf) {
            warn_log!("RouteTable", router = %router, error = %undo, "failed to release router after route failure");
        }
    }

    /// Brings hardware in line with the lowest client's entry.
    fn reprogram(&mut self, key: (RouterId, IpPrefix), ctx: &mut RouteContext<'_>) -> OrchResult<()> {
        let Some(state) = self.routes.get(&key) else {
            return Err(OrchError::precondition(format!(
                "reprogram of unknown route {} {}",
                key.0, key.1
            )));
        };
        let Some(effective) = state.effective().cloned() else {
            return Err(OrchError::precondition(format!(
                "route {} {} has no clients",
                key.0, key.1
            )));
        };
        if effective == state.programmed {
            debug_log!("RouteTable", router = %key.0, prefix = %key.1, "route unchanged");
            return Ok(());
        }
        let oid = state.oid;

        // The new group is taken before the old one is let go.
        let group = Self::acquire_group(&effective, ctx)?;
        if let Err(e) = self.set_attributes(oid, effective.attributes(group.map(|g| g.as_raw()))) {
            if let Err(undo) = Self::release_group(group, ctx) {
                warn_log!("RouteTable", prefix = %key.1, error = %undo, "failed to release group after route update failure");
            }
            return Err(e);
        }

        let Some(state) = self.routes.get_mut(&key) else {
            return Err(OrchError::precondition("route vanished during update"));
        };
        let old = std::mem::replace(&mut state.group, group);
        let previous = std::mem::replace(&mut state.programmed, effective);
        self.stats.updated += 1;
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceModify,
            "RouteTable",
            "update_route"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(format!("{} {}", key.0, key.1))
        .with_object_type("route")
        .with_details(serde_json::json!({
            "from": previous.to_string(),
            "to": state.programmed.to_string(),
        })));
        Self::release_group(old, ctx)
    }

    /// Withdraws `client`'s entry for `prefix`. Returns false if the client
    /// had none.
    pub fn delete(
        &mut self,
        router: RouterId,
        client: ClientId,
        prefix: IpPrefix,
        ctx: &mut RouteContext<'_>,
    ) -> OrchResult<bool> {
        let key = (router, prefix);
        let Some(state) = self.routes.get_mut(&key) else {
            debug_log!("RouteTable", router = %router, prefix = %prefix, "delete of absent route");
            return Ok(false);
        };
        let Some(previous) = state.clients.remove(&client) else {
            return Ok(false);
        };

        if !state.clients.is_empty() {
            if let Err(e) = self.reprogram(key, ctx) {
                if let Some(state) = self.routes.get_mut(&key) {
                    state.clients.insert(client, previous);
                }
                return Err(e);
            }
            return Ok(true);
        }

        let oid = state.oid;
        if let Err(e) = classify_remove(self.driver.remove_object(oid), || {
            format!("remove route {router} {prefix}")
        }) {
            if let Some(state) = self.routes.get_mut(&key) {
                state.clients.insert(client, previous);
            }
            return Err(e);
        }

        if let Some(state) = self.routes.remove(&key) {
            self.stats.removed += 1;
            let group = Self::release_group(state.group, ctx);
            let vrf = self.release_router(router, state.router);
            group.and(vrf)?;
        }
        debug_log!("RouteTable", router = %router, prefix = %prefix, "route removed");
        Ok(true)
    }

    /// Withdraws every entry `client` installed in `router`.
    pub fn flush_client(
        &mut self,
        router: RouterId,
        client: ClientId,
        ctx: &mut RouteContext<'_>,
    ) -> OrchResult<usize> {
        let prefixes: Vec<IpPrefix> = self
            .routes
            .iter()
            .filter(|((r, _), state)| *r == router && state.clients.contains_key(&client))
            .map(|((_, prefix), _)| *prefix)
            .collect();
        let mut removed = 0;
        for prefix in prefixes {
            if self.delete(router, client, prefix, ctx)? {
                removed += 1;
            }
        }
        if removed > 0 {
            audit_log!(AuditRecord::new(
                AuditCategory::ResourceDelete,
                "RouteTable",
                "flush_client_routes"
            )
            .with_outcome(AuditOutcome::Success)
            .with_object_id(router.to_string())
            .with_object_type("route")
            .with_details(serde_json::json!({
                "client": client.to_string(),
                "removed": removed,
            })));
        }
        Ok(removed)
    }

    pub fn client_entry(
        &self,
        router: RouterId,
        client: ClientId,
        prefix: IpPrefix,
    ) -> Option<&RouteNextHopEntry> {
        self.routes.get(&(router, prefix))?.clients.get(&client)
    }

    /// The entry currently in hardware for `prefix`.
    pub fn programmed(&self, router: RouterId, prefix: IpPrefix) -> Option<&RouteNextHopEntry> {
        self.routes.get(&(router, prefix)).map(|s| &s.programmed)
    }

    pub fn route_oid(&self, router: RouterId, prefix: IpPrefix) -> Option<RouteEntryOid> {
        self.routes.get(&(router, prefix)).map(|s| s.oid)
    }

    pub fn group_of(&self, router: RouterId, prefix: IpPrefix) -> Option<NextHopGroupOid> {
        self.routes.get(&(router, prefix)).and_then(|s| s.group)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Virtual routers currently held, the default one included.
    pub fn router_count(&self) -> usize {
        self.routers.len()
    }

    pub fn router_oid(&self, router: RouterId) -> Option<VirtualRouterOid> {
        self.routers.handle_of(&router)
    }

    pub fn stats(&self) -> &RouteStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neigh::{NeighborTable, NeighborUpdate};
    use crate::nhg::{NextHopSet, ResolvedNextHop};
    use crate::ports::PortTable;
    use pretty_assertions::assert_eq;
    use sonic_sai::types::RouterInterfaceKind;
    use sonic_sai::{FakeSai, PacketAction, SaiStatus};
    use sonic_types::{InterfaceId, MacAddress};

    struct Fixture {
        sai: Arc<FakeSai>,
        table: RouteTable,
        nhgs: NextHopGroupManager,
        neighbors: NeighborTable,
        ports: PortTable,
    }

    impl Fixture {
        fn new() -> Self {
            let sai = Arc::new(FakeSai::new());
            let cache = Arc::new(WarmBootCache::cold());
            let rif = sai.create_object::<RouterInterfaceKind>(&[]).unwrap();
            let mut ports = PortTable::new();
            ports.add_interface(InterfaceId(1), rif);
            let mut neighbors = NeighborTable::new();
            for last in 1..=3u8 {
                neighbors.apply(NeighborUpdate::resolved(
                    nh(&format!("10.0.0.{last}")).neighbor(),
                    MacAddress::new([2, 0, 0, 0, 0, last]),
                ));
            }
            Self {
                table: RouteTable::new(sai.clone(), cache.clone()),
                nhgs: NextHopGroupManager::new(sai.clone(), cache),
                sai,
                neighbors,
                ports,
            }
        }

        fn add(&mut self, router: u32, client: u32, prefix: &str, entry: RouteNextHopEntry) -> OrchResult<()> {
            let mut ctx = RouteContext {
                nhgs: &mut self.nhgs,
                env: NextHopEnv {
                    neighbors: &self.neighbors,
                    ports: &self.ports,
                },
            };
            self.table
                .add(RouterId(router), ClientId(client), prefix.parse().unwrap(), entry, &mut ctx)
        }

        fn delete(&mut self, router: u32, client: u32, prefix: &str) -> OrchResult<bool> {
            let mut ctx = RouteContext {
                nhgs: &mut self.nhgs,
                env: NextHopEnv {
                    neighbors: &self.neighbors,
                    ports: &self.ports,
                },
            };
            self.table
                .delete(RouterId(router), ClientId(client), prefix.parse().unwrap(), &mut ctx)
        }
    }

    fn nh(ip: &str) -> ResolvedNextHop {
        ResolvedNextHop::new(ip.parse().unwrap(), InterfaceId(1))
    }

    fn via(ips: &[&str]) -> RouteNextHopEntry {
        RouteNextHopEntry::NextHops(ips.iter().map(|ip| nh(ip)).collect::<NextHopSet>())
    }

    fn prefix(s: &str) -> IpPrefix {
        s.parse().unwrap()
    }

    // ------------------------------------------------------------------------
    // 1. Lifecycle
    // ------------------------------------------------------------------------

    #[test]
    fn test_add_and_delete_route() {
        let mut fx = Fixture::new();
        fx.add(0, 1, "10.1.0.0/16", via(&["10.0.0.1", "10.0.0.2"])).unwrap();

        assert_eq!(fx.sai.object_count(SaiObjectType::RouteEntry), 1);
        assert_eq!(fx.sai.object_count(SaiObjectType::NextHopGroup), 1);
        assert_eq!(fx.sai.object_count(SaiObjectType::NextHopGroupMember), 2);

        let oid = fx.table.route_oid(RouterId(0), prefix("10.1.0.0/16")).unwrap();
        let attrs = fx.sai.attributes(oid.as_raw()).unwrap();
        assert!(attrs.contains(&SaiAttribute::PacketAction(PacketAction::Forward)));

        assert!(fx.delete(0, 1, "10.1.0.0/16").unwrap());
        assert!(!fx.delete(0, 1, "10.1.0.0/16").unwrap());
        assert_eq!(fx.sai.object_count(SaiObjectType::RouteEntry), 0);
        assert_eq!(fx.sai.object_count(SaiObjectType::NextHopGroup), 0);
        // The default router stays.
        assert_eq!(fx.sai.object_count(SaiObjectType::VirtualRouter), 1);
    }

    #[test]
    fn test_routes_share_group() {
        let mut fx = Fixture::new();
        fx.add(0, 1, "10.1.0.0/16", via(&["10.0.0.1", "10.0.0.2"])).unwrap();
        fx.add(0, 1, "10.2.0.0/16", via(&["10.0.0.2", "10.0.0.1"])).unwrap();

        assert_eq!(fx.sai.object_count(SaiObjectType::NextHopGroup), 1);
        assert_eq!(
            fx.table.group_of(RouterId(0), prefix("10.1.0.0/16")),
            fx.table.group_of(RouterId(0), prefix("10.2.0.0/16"))
        );
    }

    #[test]
    fn test_readding_same_entry_is_silent() {
        let mut fx = Fixture::new();
        fx.add(0, 1, "10.1.0.0/16", RouteNextHopEntry::Drop).unwrap();
        fx.sai.reset_counters();

        fx.add(0, 1, "10.1.0.0/16", RouteNextHopEntry::Drop).unwrap();
        assert!(fx.sai.calls().is_empty());
    }

    #[test]
    fn test_replace_takes_new_group_before_dropping_old() {
        let mut fx = Fixture::new();
        fx.add(0, 1, "10.1.0.0/16", via(&["10.0.0.1"])).unwrap();
        let old = fx.table.group_of(RouterId(0), prefix("10.1.0.0/16")).unwrap();

        fx.add(0, 1, "10.1.0.0/16", via(&["10.0.0.2"])).unwrap();
        let new = fx.table.group_of(RouterId(0), prefix("10.1.0.0/16")).unwrap();

        assert_ne!(old, new);
        assert!(!fx.sai.exists(old.as_raw()));
        assert_eq!(fx.sai.object_count(SaiObjectType::NextHopGroup), 1);
        assert_eq!(fx.sai.object_count(SaiObjectType::RouteEntry), 1);
        assert_eq!(fx.table.stats().updated, 1);
    }

    // ------------------------------------------------------------------------
    // 2. Multiple clients and routers
    // ------------------------------------------------------------------------

    #[test]
    fn test_lowest_client_wins() {
        let mut fx = Fixture::new();
        fx.add(0, 5, "10.1.0.0/16", RouteNextHopEntry::Drop).unwrap();
        fx.add(0, 2, "10.1.0.0/16", RouteNextHopEntry::ToCpu).unwrap();
        assert_eq!(
            fx.table.programmed(RouterId(0), prefix("10.1.0.0/16")),
            Some(&RouteNextHopEntry::ToCpu)
        );

        assert!(fx.delete(0, 2, "10.1.0.0/16").unwrap());
        assert_eq!(
            fx.table.programmed(RouterId(0), prefix("10.1.0.0/16")),
            Some(&RouteNextHopEntry::Drop)
        );
        assert_eq!(fx.sai.object_count(SaiObjectType::RouteEntry), 1);
    }

    #[test]
    fn test_non_default_router_follows_its_routes() {
        let mut fx = Fixture::new();
        fx.table.default_router().unwrap();
        fx.add(7, 1, "10.1.0.0/16", RouteNextHopEntry::Drop).unwrap();
        fx.add(7, 1, "10.2.0.0/16", RouteNextHopEntry::Drop).unwrap();
        assert_eq!(fx.table.router_count(), 2);

        fx.delete(7, 1, "10.1.0.0/16").unwrap();
        assert!(fx.table.router_oid(RouterId(7)).is_some());
        fx.delete(7, 1, "10.2.0.0/16").unwrap();
        assert_eq!(fx.table.router_oid(RouterId(7)), None);
        assert_eq!(fx.sai.object_count(SaiObjectType::VirtualRouter), 1);
    }

    // ------------------------------------------------------------------------
    // 3. Failures
    // ------------------------------------------------------------------------

    #[test]
    fn test_failed_create_releases_everything() {
        let mut fx = Fixture::new();
        fx.sai
            .fail_next_create(SaiObjectType::RouteEntry, SaiStatus::TableFull);

        let err = fx.add(7, 1, "10.1.0.0/16", via(&["10.0.0.1"])).unwrap_err();
        assert!(matches!(err, OrchError::ResourceFault { .. }));
        assert_eq!(fx.table.route_count(), 0);
        assert_eq!(fx.sai.object_count(SaiObjectType::NextHopGroup), 0);
        assert_eq!(fx.table.router_oid(RouterId(7)), None);
    }

    #[test]
    fn test_failed_update_keeps_previous_entry() {
        let mut fx = Fixture::new();
        fx.add(0, 1, "10.1.0.0/16", via(&["10.0.0.1"])).unwrap();
        let group = fx.table.group_of(RouterId(0), prefix("10.1.0.0/16"));

        fx.sai
            .fail_next_set(SaiObjectType::RouteEntry, SaiStatus::Failure);
        assert!(fx.add(0, 1, "10.1.0.0/16", RouteNextHopEntry::Drop).is_err());

        assert_eq!(fx.table.group_of(RouterId(0), prefix("10.1.0.0/16")), group);
        assert_eq!(
            fx.table.client_entry(RouterId(0), ClientId(1), prefix("10.1.0.0/16")),
            Some(&via(&["10.0.0.1"]))
        );
    }

    #[test]
    fn test_failed_group_release_still_releases_router() {
        let mut fx = Fixture::new();
        fx.table.default_router().unwrap();
        fx.add(7, 1, "10.1.0.0/16", via(&["10.0.0.1"])).unwrap();
        assert_eq!(fx.table.router_count(), 2);

        fx.sai
            .fail_next_remove(SaiObjectType::NextHopGroup, SaiStatus::Failure);
        let err = fx.delete(7, 1, "10.1.0.0/16").unwrap_err();
        assert!(matches!(err, OrchError::ResourceFault { .. }));

        assert_eq!(fx.table.route_count(), 0);
        assert_eq!(fx.table.router_oid(RouterId(7)), None);
        assert_eq!(fx.sai.object_count(SaiObjectType::VirtualRouter), 1);
    }
}
