//! The agent driven through its run loop, and across restarts.

use pretty_assertions::assert_eq;
use sonic_hwsyncd::daemon::{run, ControlPlaneUpdate, DesiredState, SwitchAgent};
use sonic_hwsyncd::lag::LinkEvent;
use sonic_hwsyncd::AgentConfig;
use sonic_sai::{FakeSai, SaiCall, SaiObjectType};
use sonic_types::{AggregatePortId, PortId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DESIRED: &str = r#"{
    "ports": [
        {"id": 1, "name": "Ethernet0"},
        {"id": 2, "name": "Ethernet4"},
        {"id": 3, "name": "Ethernet8"},
        {"id": 4, "name": "Ethernet12"}
    ],
    "interfaces": [{"id": 1, "port": 1}],
    "aggregate_ports": [
        {"id": 1, "name": "PortChannel1", "subports": [
            {"port": 2, "state": "enabled"},
            {"port": 3, "state": "enabled"},
            {"port": 4, "state": "disabled"}
        ]}
    ],
    "neighbors": [
        {"key": {"ip": "10.0.0.1", "interface": 1}, "mac": "02:00:00:00:00:01"},
        {"key": {"ip": "10.0.0.2", "interface": 1}}
    ],
    "routes": [
        {"prefix": "192.168.0.0/16", "entry": {"next_hops": [
            {"ip": "10.0.0.1", "interface": 1},
            {"ip": "10.0.0.2", "interface": 1}
        ]}},
        {"prefix": "172.16.0.0/12", "entry": {"next_hops": [
            {"ip": "10.0.0.1", "interface": 1},
            {"ip": "10.0.0.2", "interface": 1}
        ]}},
        {"router": 7, "prefix": "0.0.0.0/0", "entry": "drop"}
    ],
    "mac_entries": [{"vlan": 10, "mac": "02:00:00:00:00:99", "port": 1}]
}"#;

fn hardware(desired: &DesiredState) -> Arc<FakeSai> {
    let sai = Arc::new(FakeSai::new());
    for port in &desired.ports {
        sai.add_port(&port.name);
    }
    sai
}

fn warm() -> AgentConfig {
    AgentConfig {
        warm_boot: true,
        ..AgentConfig::default()
    }
}

#[test]
fn test_start_shares_groups_between_routes() {
    let desired = DesiredState::from_json(DESIRED).unwrap();
    let sai = hardware(&desired);
    let mut agent = SwitchAgent::new(AgentConfig::default(), sai.clone()).unwrap();
    let report = agent.start(&desired).unwrap();

    assert_eq!(report.routes.applied, 3);
    assert_eq!(sai.object_count(SaiObjectType::NextHopGroup), 1);
    // Only the resolved neighbor has a member.
    assert_eq!(sai.object_count(SaiObjectType::NextHopGroupMember), 1);
    assert_eq!(sai.object_count(SaiObjectType::VirtualRouter), 2);
    assert_eq!(sai.object_count(SaiObjectType::LagMember), 2);

    let summary = agent.summary();
    assert_eq!(summary.next_hop_groups, 1);
    assert_eq!(summary.routers, 2);
    assert_eq!(summary.resolved_neighbors, 1);
}

#[test]
fn test_reconciliation_twice_is_a_no_op() {
    let desired = DesiredState::from_json(DESIRED).unwrap();
    let sai = hardware(&desired);
    SwitchAgent::new(AgentConfig::default(), sai.clone())
        .unwrap()
        .start(&desired)
        .unwrap();

    let mut second = SwitchAgent::new(warm(), sai.clone()).unwrap();
    let first_pass = second.start(&desired).unwrap();
    let after_first = serde_json::to_value(second.summary()).unwrap();
    drop(second);
    sai.reset_counters();

    let mut third = SwitchAgent::new(warm(), sai.clone()).unwrap();
    let second_pass = third.start(&desired).unwrap();
    let after_second = serde_json::to_value(third.summary()).unwrap();

    assert_eq!(first_pass, second_pass);
    assert_eq!(after_first, after_second);
    let churn: Vec<_> = sai
        .calls()
        .into_iter()
        .filter(|c| !matches!(c, SaiCall::Set { .. }))
        .collect();
    assert!(churn.is_empty(), "second pass touched hardware: {churn:?}");
}

#[tokio::test]
async fn test_run_loop_applies_updates_and_link_events() {
    let desired = DesiredState::from_json(DESIRED).unwrap();
    let sai = hardware(&desired);
    let mut agent = SwitchAgent::new(AgentConfig::default(), sai.clone()).unwrap();
    agent.start(&desired).unwrap();
    let lag = agent.lags().lag_oid(AggregatePortId(1)).unwrap();

    let updates: Vec<ControlPlaneUpdate> = serde_json::from_str(
        r#"[
            {"op": "neighbor", "update": {"key": {"ip": "10.0.0.2", "interface": 1}, "mac": "02:00:00:00:00:02"}},
            {"op": "route_delete", "prefix": "172.16.0.0/12"},
            {"op": "route_delete", "router": 7, "prefix": "0.0.0.0/0"},
            {"op": "flush_routes"},
            {"op": "mac_remove", "key": {"vlan": 10, "mac": "02:00:00:00:00:99"}},
            {"op": "mac_remove", "key": {"vlan": 10, "mac": "02:00:00:00:00:99"}}
        ]"#,
    )
    .unwrap();

    let (update_tx, update_rx) = mpsc::channel(4);
    let (link_tx, link_rx) = mpsc::channel(4);
    let feeder = tokio::spawn(async move {
        link_tx.send(LinkEvent::Down(PortId(2))).await.unwrap();
        link_tx.send(LinkEvent::Down(PortId(1))).await.unwrap();
        for update in updates {
            update_tx.send(update).await.unwrap();
        }
    });

    let agent = run(agent, update_rx, link_rx, CancellationToken::new())
        .await
        .unwrap();
    feeder.await.unwrap();

    let stats = agent.stats();
    assert_eq!(stats.updates_applied, 5);
    // The second MAC removal finds nothing.
    assert_eq!(stats.updates_failed, 1);
    assert_eq!(stats.link_events_handled, 2);

    assert_eq!(sai.object_count(SaiObjectType::NextHopGroupMember), 2);
    assert_eq!(sai.object_count(SaiObjectType::RouteEntry), 1);
    assert_eq!(sai.object_count(SaiObjectType::VirtualRouter), 1);
    assert_eq!(sai.object_count(SaiObjectType::FdbEntry), 0);
    assert_eq!(sai.object_count(SaiObjectType::LagMember), 1);
    assert!(!agent.lags().stats().is_granted(lag, PortId(2)));
}

#[tokio::test]
async fn test_restart_after_link_down_heals_nothing_unexpected() {
    let desired = DesiredState::from_json(DESIRED).unwrap();
    let sai = hardware(&desired);
    let mut agent = SwitchAgent::new(AgentConfig::default(), sai.clone()).unwrap();
    agent.start(&desired).unwrap();

    let (update_tx, update_rx) = mpsc::channel::<ControlPlaneUpdate>(1);
    let (link_tx, link_rx) = mpsc::channel(1);
    link_tx.send(LinkEvent::Down(PortId(3))).await.unwrap();
    drop(link_tx);
    drop(update_tx);
    run(agent, update_rx, link_rx, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(sai.object_count(SaiObjectType::LagMember), 1);

    // Intent still has port 3 enabled; the restart puts it back once.
    sai.reset_counters();
    let mut restarted = SwitchAgent::new(warm(), sai.clone()).unwrap();
    let report = restarted.start(&desired).unwrap();
    assert_eq!(report.groups_healed, 1);
    assert_eq!(report.discrepancies.len(), 1);
    assert_eq!(sai.create_count(SaiObjectType::LagMember), 1);
    assert_eq!(sai.object_count(SaiObjectType::LagMember), 2);
}
