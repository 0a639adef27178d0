//! Reference scenarios and checks against in-process fake nodes.

use std::sync::Arc;
use std::time::Duration;

use takeoff_client::{NewFlight, Seats};
use takeoff_cluster::{Cluster, NodeHandle, ProcessSupervisor};
use takeoff_scenarios::{
    Outcome, Scenario, ScenarioError, ScenarioOptions, assert_propagated,
    check_coordinator_failover, run, run_contention,
};
use takeoff_test_harness::{
    FakeTakeOff, InProcessSupervisor, Request, Response, fake_cluster, fast_prober, free_base_port,
};
use test_case::test_case;

fn options() -> ScenarioOptions {
    ScenarioOptions::default().without_settling()
}

#[test]
fn test_booking_lifecycle() {
    let (mut cluster, supervisor) = fake_cluster(FakeTakeOff::new(), 3).unwrap();

    let outcome = run(Scenario::Lifecycle, &mut cluster, &options()).unwrap();

    assert_eq!(outcome, Outcome::Lifecycle);
    assert_eq!(cluster.len(), 2);
    assert_eq!(supervisor.spawned(), Scenario::Lifecycle.node_count(&options()));
    assert_eq!(supervisor.service().booking_count(), 2);
}

#[test]
fn test_coordinator_failover() {
    let (mut cluster, _supervisor) = fake_cluster(FakeTakeOff::new(), 2).unwrap();

    let Outcome::Failover(report) = run(Scenario::Failover, &mut cluster, &options()).unwrap()
    else {
        panic!("expected a failover report");
    };

    assert_ne!(report.previous.node, report.current.node);
    assert_eq!(report.stopped.name, report.previous.node);
    assert_eq!(cluster.node_names(), vec![report.current.node.clone()]);
}

#[test_case(10, 30; "ten nodes thirty bookings")]
#[test_case(3, 8; "three nodes eight bookings")]
fn test_concurrent_bookings(nodes: usize, attempts: usize) {
    let (mut cluster, supervisor) = fake_cluster(FakeTakeOff::new(), 10).unwrap();
    let options = ScenarioOptions {
        nodes,
        attempts,
        ..options()
    };

    let Outcome::Contention(report) = run(Scenario::Contention, &mut cluster, &options).unwrap()
    else {
        panic!("expected a contention report");
    };

    assert_eq!(report.attempts, attempts);
    assert_eq!(report.accepted, 2);
    assert_eq!(report.refused(), attempts - 2);
    assert!(report.errors.is_empty());
    assert_eq!(cluster.len(), nodes);
    assert_eq!(supervisor.service().booking_count(), 2);
}

#[test]
fn test_failover_without_survivors() {
    let (mut cluster, _supervisor) = fake_cluster(FakeTakeOff::new(), 1).unwrap();
    cluster.start_node().unwrap();
    let flight = cluster
        .some_client()
        .unwrap()
        .create_flight(&NewFlight::default())
        .unwrap()
        .value
        .unwrap();

    let err = check_coordinator_failover(&mut cluster, &flight.id, Duration::ZERO).unwrap_err();
    assert!(matches!(
        err,
        ScenarioError::Cluster(takeoff_cluster::Error::EmptyCluster)
    ));
    assert!(cluster.is_empty());
}

/// Serves even and odd ports from two unrelated backends, a split brain.
struct SplitSupervisor {
    even: InProcessSupervisor,
    odd: InProcessSupervisor,
}

impl SplitSupervisor {
    fn side(&self, port: u16) -> &InProcessSupervisor {
        if port % 2 == 0 { &self.even } else { &self.odd }
    }
}

impl ProcessSupervisor for SplitSupervisor {
    fn spawn(&self, port: u16, name: &str) -> takeoff_cluster::Result<NodeHandle> {
        self.side(port).spawn(port, name)
    }

    fn terminate(&self, handle: &mut NodeHandle) -> takeoff_cluster::Result<()> {
        self.side(handle.port()).terminate(handle)
    }

    fn is_alive(&self, handle: &mut NodeHandle) -> bool {
        self.side(handle.port()).is_alive(handle)
    }

    fn host(&self) -> &str {
        "127.0.0.1"
    }
}

fn split_cluster() -> Cluster {
    let supervisor = SplitSupervisor {
        even: InProcessSupervisor::new(FakeTakeOff::new()),
        odd: InProcessSupervisor::new(FakeTakeOff::new()),
    };
    Cluster::new(free_base_port(4).unwrap(), Box::new(supervisor), fast_prober())
}

#[test]
fn test_propagation_reports_diverging_node() {
    let mut cluster = split_cluster();
    let names = cluster.start_nodes(2).unwrap();
    let flight = cluster
        .client(&names[0])
        .unwrap()
        .create_flight(&NewFlight::default())
        .unwrap()
        .value
        .unwrap();

    let err = assert_propagated(&cluster, "flight", &true, |client| {
        Ok(client.list_flights()?.contains_key(&flight.id))
    })
    .unwrap_err();

    assert!(matches!(
        err,
        ScenarioError::Diverged { ref node, ref what, .. } if *node == names[1] && what == "flight"
    ));
}

#[test]
fn test_contention_reports_failed_requests() {
    let mut cluster = split_cluster();
    let names = cluster.start_nodes(2).unwrap();

    let flight = cluster
        .client(&names[0])
        .unwrap()
        .create_flight(&NewFlight::with_seats(Seats::window(2)))
        .unwrap()
        .value
        .unwrap();

    let report = run_contention(&cluster, &flight.id, "user", 20).unwrap();

    // Bookings routed to the second backend hit an unknown flight.
    assert!(!report.errors.is_empty());
    assert!(matches!(
        report.verify(2),
        Err(ScenarioError::Admission { expected_accepted: 2, .. })
    ));
}

#[test]
fn test_lifecycle_detects_diverging_flight_route() {
    let base = free_base_port(3).unwrap();
    let liar = base + 1;
    let supervisor = InProcessSupervisor::new(FakeTakeOff::new()).with_filter(Arc::new(
        move |port: u16, request: &Request, mut response: Response| {
            if port == liar && request.method == "GET" && request.path == "/flights" {
                response.body = response.body.replace("Buenos Aires", "Nowhere");
            }
            response
        },
    ));
    let mut cluster = Cluster::new(base, Box::new(supervisor), fast_prober());

    let err = run(Scenario::Lifecycle, &mut cluster, &options()).unwrap_err();

    assert!(matches!(
        err,
        ScenarioError::Diverged { ref node, ref what, ref actual, .. }
            if *node == format!("node-{liar}") && what == "flight route" && actual.contains("Nowhere")
    ));
}
