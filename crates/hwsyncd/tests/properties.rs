//! End-to-end properties of the object lifecycle, checked against FakeSai.

use pretty_assertions::assert_eq;
use sonic_hwsyncd::lag::{AggregatePort, ForwardingState, LagManager, LinkDownOutcome, Subport};
use sonic_hwsyncd::neigh::{NeighborKey, NeighborTable, NeighborUpdate};
use sonic_hwsyncd::nhg::{NextHopEnv, NextHopGroupManager, NextHopSet, ResolvedNextHop};
use sonic_hwsyncd::ports::PortTable;
use sonic_orch_common::{DiscrepancyKind, ObjectRegistry, ReleaseOutcome, WarmBootCache};
use sonic_sai::types::LagKind;
use sonic_sai::{FakeSai, MatchKey, SaiAttribute, SaiDriver, SaiObjectType};
use sonic_types::{AggregatePortId, InterfaceId, MacAddress, PortId};
use std::sync::{Arc, Mutex};

fn ports(sai: &FakeSai, count: u32) -> PortTable {
    let mut table = PortTable::new();
    for n in 1..=count {
        table.add_port(PortId(n), sai.add_port(&format!("Ethernet{}", (n - 1) * 4)));
    }
    table
}

fn neighbor(last: u8) -> NeighborKey {
    NeighborKey::new(format!("10.0.0.{last}").parse().unwrap(), InterfaceId(1))
}

fn mac(last: u8) -> MacAddress {
    MacAddress::new([0x02, 0, 0, 0, 0, last])
}

fn next_hop_set(last: u8) -> NextHopSet {
    [ResolvedNextHop::new(neighbor(last).ip, InterfaceId(1))]
        .into_iter()
        .collect()
}

/// One port, one interface on it.
fn routed(sai: &Arc<FakeSai>) -> PortTable {
    let mut table = ports(sai, 1);
    let rif = sai
        .create(
            SaiObjectType::RouterInterface,
            &[SaiAttribute::Label("intf1".into())],
        )
        .unwrap();
    table.add_interface(InterfaceId(1), sonic_sai::RouterInterfaceOid::from_raw(rif).unwrap());
    table
}

// ==================== Reference counting ====================

#[test]
fn test_n_acquires_n_releases_one_create_one_delete() {
    let sai = Arc::new(FakeSai::new());
    let mut lags: ObjectRegistry<AggregatePortId, LagKind> = ObjectRegistry::new("lag", sai.clone());
    let (a, b) = (AggregatePortId(1), AggregatePortId(2));

    // Interleaved acquires and releases over two identities.
    let a1 = lags.acquire(&a, &[]).unwrap().oid;
    let b1 = lags.acquire(&b, &[]).unwrap().oid;
    let a2 = lags.acquire(&a, &[]).unwrap().oid;
    assert!(matches!(lags.release(a1).unwrap(), ReleaseOutcome::Retained(1)));
    let a3 = lags.acquire(&a, &[]).unwrap().oid;
    let b2 = lags.acquire(&b, &[]).unwrap().oid;
    assert_eq!(lags.ref_count(&a), 2);
    assert_eq!(lags.ref_count(&b), 2);
    assert_eq!(a1, a2);
    assert_eq!(a2, a3);
    assert_eq!(b1, b2);

    lags.release(b2).unwrap();
    lags.release(a3).unwrap();
    assert!(matches!(lags.release(b1).unwrap(), ReleaseOutcome::Destroyed(id) if id == b));
    assert!(matches!(lags.release(a2).unwrap(), ReleaseOutcome::Destroyed(id) if id == a));

    assert_eq!(sai.create_count(SaiObjectType::Lag), 2);
    assert_eq!(sai.remove_count(SaiObjectType::Lag), 2);
    assert!(lags.is_empty());
}

#[test]
fn test_concurrent_acquire_of_same_set_shares_one_group() {
    let sai = Arc::new(FakeSai::new());
    let ports = routed(&sai);
    let mut neighbors = NeighborTable::new();
    neighbors.apply(NeighborUpdate::resolved(neighbor(1), mac(1)));
    let manager = Mutex::new(NextHopGroupManager::new(
        sai.clone(),
        Arc::new(WarmBootCache::cold()),
    ));
    let set = next_hop_set(1);
    let env = NextHopEnv {
        neighbors: &neighbors,
        ports: &ports,
    };

    let (first, second) = std::thread::scope(|s| {
        let acquire = || {
            let mut guard = manager.lock().unwrap();
            guard.acquire(&set, env).unwrap()
        };
        let one = s.spawn(acquire);
        let two = s.spawn(acquire);
        (one.join().unwrap(), two.join().unwrap())
    });

    assert_eq!(first, second);
    let manager = manager.into_inner().unwrap();
    assert_eq!(manager.ref_count(&set), 2);
    assert_eq!(manager.handle_of(&set), Some(first));
    assert_eq!(sai.create_count(SaiObjectType::NextHopGroup), 1);
    assert_eq!(sai.create_count(SaiObjectType::NextHopGroupMember), 1);
}

// ==================== Reactive membership ====================

#[test]
fn test_member_adds_and_removes_track_transitions() {
    let sai = Arc::new(FakeSai::new());
    let ports = routed(&sai);
    let mut neighbors = NeighborTable::new();
    let mut manager = NextHopGroupManager::new(sai.clone(), Arc::new(WarmBootCache::cold()));
    let set = next_hop_set(1);

    let group = manager
        .acquire(&set, NextHopEnv { neighbors: &neighbors, ports: &ports })
        .unwrap();
    assert_eq!(manager.live_members_of(group), 0);

    // Duplicate deliveries must not reach the group.
    let updates = [
        NeighborUpdate::resolved(neighbor(1), mac(1)),
        NeighborUpdate::resolved(neighbor(1), mac(1)),
        NeighborUpdate::unresolved(neighbor(1)),
        NeighborUpdate::unresolved(neighbor(1)),
        NeighborUpdate::resolved(neighbor(1), mac(1)),
    ];
    for update in updates {
        if let Some(event) = neighbors.apply(update) {
            manager
                .on_dependency_event(event, NextHopEnv { neighbors: &neighbors, ports: &ports })
                .unwrap();
        }
    }

    assert_eq!(sai.create_count(SaiObjectType::NextHopGroupMember), 2);
    assert_eq!(sai.remove_count(SaiObjectType::NextHopGroupMember), 1);
    assert_eq!(manager.live_members_of(group), 1);

    assert!(matches!(
        manager.release(group).unwrap(),
        ReleaseOutcome::Destroyed(_)
    ));
    assert_eq!(sai.object_count(SaiObjectType::NextHopGroupMember), 0);
    assert_eq!(sai.object_count(SaiObjectType::NextHop), 0);
    assert_eq!(sai.object_count(SaiObjectType::NextHopGroup), 0);
}

// ==================== Aggregate groups ====================

fn channel(subports: Vec<Subport>) -> AggregatePort {
    AggregatePort::new(AggregatePortId(1), "PortChannel1", subports)
}

#[test]
fn test_swap_enabled_members() {
    let sai = Arc::new(FakeSai::new());
    let ports = ports(&sai, 2);
    let (a, b) = (PortId(1), PortId(2));
    let mut manager = LagManager::new(sai.clone(), Arc::new(WarmBootCache::cold()));

    let old = channel(vec![Subport::enabled(a), Subport::disabled(b)]);
    let lag = manager.add(old.clone(), &ports).unwrap();
    sai.reset_counters();

    let new = old
        .with_state(a, ForwardingState::Disabled)
        .with_state(b, ForwardingState::Enabled);
    manager.change(&old, new, &ports).unwrap();

    assert_eq!(sai.remove_count(SaiObjectType::LagMember), 1);
    assert_eq!(sai.create_count(SaiObjectType::LagMember), 1);
    let stats = manager.stats();
    assert!(!stats.is_granted(lag, a));
    assert!(stats.is_granted(lag, b));
    let counters = stats.snapshot(lag).unwrap();
    assert_eq!(counters.revokes, 1);
    assert_eq!(counters.grants, 2);
}

#[test]
fn test_link_down_races_control_plane_remove() {
    for _ in 0..32 {
        let sai = Arc::new(FakeSai::new());
        let ports = ports(&sai, 2);
        let (a, b) = (PortId(1), PortId(2));
        let mut manager = LagManager::new(sai.clone(), Arc::new(WarmBootCache::cold()));
        let old = channel(vec![Subport::enabled(a), Subport::enabled(b)]);
        let lag = manager.add(old.clone(), &ports).unwrap();
        let handler = manager.link_event_handler(&ports);

        let (fast, slow) = std::thread::scope(|s| {
            let fast = s.spawn(|| handler.on_link_down(a));
            let new = old.with_state(a, ForwardingState::Disabled);
            let slow = manager.change(&old, new, &ports);
            (fast.join().unwrap(), slow)
        });

        let fast = fast.unwrap();
        slow.unwrap();
        assert!(matches!(
            fast,
            LinkDownOutcome::Shrunk { .. } | LinkDownOutcome::AlreadyGone { .. } | LinkDownOutcome::NotInGroup
        ));
        assert_eq!(sai.object_count(SaiObjectType::LagMember), 1);
        assert_eq!(sai.remove_count(SaiObjectType::LagMember), 1);
        assert_eq!(handler.enabled_member_count(lag).unwrap(), 1);
        let counters = manager.stats().snapshot(lag).unwrap();
        assert_eq!(counters.revokes, 1);
        assert!(!counters.members.contains(&a));
    }
}

// ==================== Warm boot ====================

#[test]
fn test_adopted_group_heals_missing_member() {
    let sai = Arc::new(FakeSai::new());
    let ports = ports(&sai, 2);
    let (a, b) = (PortId(1), PortId(2));

    // Left behind by the previous instance: the group with only A.
    let lag = sai
        .create(SaiObjectType::Lag, &[SaiAttribute::Label("aggport1".into())])
        .unwrap();
    sai.create(
        SaiObjectType::LagMember,
        &[
            SaiAttribute::LagId(lag),
            SaiAttribute::PortId(ports.port_oid(a).unwrap().as_raw()),
        ],
    )
    .unwrap();
    sai.reset_counters();

    let cache = Arc::new(WarmBootCache::load(&*sai, &[SaiObjectType::Lag]).unwrap());
    let mut manager = LagManager::new(sai.clone(), cache.clone());
    let adopted = manager
        .add(channel(vec![Subport::enabled(a), Subport::enabled(b)]), &ports)
        .unwrap();
    assert_eq!(adopted.as_raw(), lag);
    assert_eq!(sai.create_count(SaiObjectType::Lag), 0);
    assert_eq!(sai.create_count(SaiObjectType::LagMember), 0);

    // Only B disagrees; it is recorded, not raised.
    let kinds: Vec<_> = manager
        .discrepancies()
        .iter()
        .map(|d| (d.port, d.kind))
        .collect();
    assert_eq!(kinds, vec![(b, DiscrepancyKind::MissingInHardware)]);

    assert_eq!(manager.heal(&ports).unwrap(), 1);
    assert_eq!(sai.create_count(SaiObjectType::LagMember), 1);
    assert_eq!(manager.heal(&ports).unwrap(), 0);
    assert_eq!(sai.create_count(SaiObjectType::LagMember), 1);

    assert_eq!(cache.finish(&*sai).unwrap(), 0);
    assert_eq!(sai.object_count(SaiObjectType::LagMember), 2);
}

#[test]
fn test_claim_twice_observes_first_pass() {
    let sai = Arc::new(FakeSai::new());
    let ports = ports(&sai, 1);
    let mut cold = LagManager::new(sai.clone(), Arc::new(WarmBootCache::cold()));
    let desired = channel(vec![Subport::enabled(PortId(1))]);
    let lag = cold.add(desired.clone(), &ports).unwrap();
    drop(cold);

    let cache = Arc::new(WarmBootCache::load(&*sai, &[SaiObjectType::Lag]).unwrap());
    let key = MatchKey::from("aggport1");
    let first = cache.claim(SaiObjectType::Lag, &key);
    let second = cache.claim(SaiObjectType::Lag, &key);
    assert_eq!(first, Some(lag.as_raw()));
    assert_eq!(first, second);
    assert!(cache.unclaimed(SaiObjectType::Lag).is_empty());
}
