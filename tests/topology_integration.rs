//! Integration tests for topology tracking
//!
//! Neighbour reports flow from the link through the dispatcher into the
//! tracker, and every change is published as a cumulative snapshot.

mod common;

use common::builders::NeighbourReportBuilder;
use common::mock_helpers::{mock_monitor, mock_monitor_with_retention};
use common::wait_for;
use predvis_rs::topology::edge_key;
use predvis_rs::{NodeId, TopologyHistory, WsnEvent};
use std::sync::Arc;

fn node(s: &str) -> NodeId {
    s.parse().unwrap()
}

fn next_topology(events: &crossbeam_channel::Receiver<WsnEvent>) -> Arc<TopologyHistory> {
    match wait_for(events, |e| matches!(e, WsnEvent::TopologyUpdated(_))) {
        WsnEvent::TopologyUpdated(history) => history,
        _ => unreachable!(),
    }
}

#[test]
fn test_reports_build_per_round_graphs() {
    let (monitor, peer) = mock_monitor();
    monitor.connect().unwrap();
    let events = monitor.events();

    peer.push_line("R=3|1.2,1.3~1.3,4.5");
    let history = next_topology(&events);
    let round = history.round(3).unwrap();
    assert_eq!(round.vertex_count(), 3);
    assert_eq!(round.edge_count(), 2);
    assert!(round.contains_edge(&node("1.3"), &node("1.2")));

    // Same links reported again in the same round change nothing
    peer.push_line("R=3|1.3,1.2~4.5,1.3");
    assert_eq!(next_topology(&events), history);

    peer.push_line(&NeighbourReportBuilder::new(4).link("4.5", "6").build());
    let history = next_topology(&events);
    assert_eq!(history.round_numbers().collect::<Vec<_>>(), vec![3, 4]);
    assert_eq!(history.round(3).unwrap().edge_count(), 2);
    assert_eq!(history.round(4).unwrap().edge_count(), 1);
}

#[test]
fn test_malformed_report_leaves_topology_untouched() {
    let (monitor, peer) = mock_monitor();
    monitor.connect().unwrap();
    let events = monitor.events();

    peer.push_line("R=1|1,2");
    let before = next_topology(&events);

    peer.push_line("R=1 2,3");
    peer.push_line("R=one|2,3");
    peer.push_line("R=1|2..3,4");
    peer.push_line("R=2|5,6");

    let after = next_topology(&events);
    assert_eq!(after.round(1), before.round(1));
    assert_eq!(after.len(), 2);
    assert!(monitor.is_connected());
}

#[test]
fn test_self_loops_are_skipped() {
    let (monitor, peer) = mock_monitor();
    monitor.connect().unwrap();
    let events = monitor.events();

    peer.push_line("R=0|7,7~7,8");
    let round = next_topology(&events).round(0).cloned().unwrap();
    assert_eq!(round.edge_count(), 1);
    assert_eq!(
        round.edges().map(|e| e.key()).collect::<Vec<_>>(),
        vec![edge_key(&node("7"), &node("8"))]
    );
}

#[test]
fn test_retention_keeps_latest_rounds() {
    let (monitor, peer) = mock_monitor_with_retention(Some(2));
    monitor.connect().unwrap();
    let events = monitor.events();

    for round in 1..=4 {
        peer.push_line(&NeighbourReportBuilder::new(round).link("1", "2").build());
        next_topology(&events);
    }
    assert_eq!(
        monitor.topology().round_numbers().collect::<Vec<_>>(),
        vec![3, 4]
    );
}

#[test]
fn test_explicit_edge_removal_is_published() {
    let (monitor, peer) = mock_monitor();
    monitor.connect().unwrap();
    let events = monitor.events();

    peer.push_line("R=5|1,2~2,3");
    next_topology(&events);

    let tracker = monitor.dispatcher().tracker();
    assert!(tracker.remove_edge(5, &node("2"), &node("1")));
    let history = next_topology(&events);
    let round = history.round(5).unwrap();
    assert_eq!(round.edge_count(), 1);
    assert_eq!(round.vertex_count(), 3);
}
