//! Reference scenarios.
//!
//! Each scenario starts the nodes it needs on the cluster it is handed and
//! leaves them running; the caller owns teardown.

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use takeoff_client::{
    ApiClient, BookingOutcome, ClientResult, NewAlert, NewBooking, NewFlight, Seats,
};
use takeoff_cluster::Cluster;
use takeoff_config::ScenarioSettings;
use tracing::info;

use crate::checks::{
    ContentionReport, FailoverReport, assert_propagated, check_coordinator_failover,
    expect_outcome, run_contention,
};
use crate::{Result, ScenarioError};

/// Knobs shared by the reference scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOptions {
    /// Node count of the contention scenario.
    pub nodes: usize,
    /// Concurrent bookings of the contention scenario.
    pub attempts: usize,
    pub settle_after_create: Duration,
    pub settle_after_stop: Duration,
}

impl From<&ScenarioSettings> for ScenarioOptions {
    fn from(settings: &ScenarioSettings) -> Self {
        Self {
            nodes: settings.nodes,
            attempts: settings.attempts,
            settle_after_create: Duration::from_millis(settings.settle_after_create_ms),
            settle_after_stop: Duration::from_millis(settings.settle_after_stop_ms),
        }
    }
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self::from(&ScenarioSettings::default())
    }
}

impl ScenarioOptions {
    /// No settle delays, for services that are consistent immediately.
    #[must_use]
    pub fn without_settling(mut self) -> Self {
        self.settle_after_create = Duration::ZERO;
        self.settle_after_stop = Duration::ZERO;
        self
    }
}

/// The reference scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    Lifecycle,
    Failover,
    Contention,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Scenario::Lifecycle, Scenario::Failover, Scenario::Contention];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::Lifecycle => "lifecycle",
            Scenario::Failover => "failover",
            Scenario::Contention => "contention",
        }
    }

    /// Nodes the scenario starts, including late joiners.
    pub fn node_count(self, options: &ScenarioOptions) -> usize {
        match self {
            Scenario::Lifecycle => 3,
            Scenario::Failover => 2,
            Scenario::Contention => options.nodes,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.name() == s)
            .ok_or_else(|| format!("unknown scenario '{s}'"))
    }
}

/// What a scenario run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Lifecycle,
    Failover(FailoverReport),
    Contention(ContentionReport),
}

/// Runs `scenario` on `cluster`.
pub fn run(scenario: Scenario, cluster: &mut Cluster, options: &ScenarioOptions) -> Result<Outcome> {
    info!(
        %scenario,
        nodes = scenario.node_count(options),
        base_port = cluster.base_port(),
        "running scenario"
    );
    match scenario {
        Scenario::Lifecycle => booking_lifecycle(cluster, options).map(|()| Outcome::Lifecycle),
        Scenario::Failover => coordinator_failover(cluster, options).map(Outcome::Failover),
        Scenario::Contention => concurrent_bookings(cluster, options).map(Outcome::Contention),
    }
}

fn create_flight(client: &ApiClient, flight: &NewFlight) -> Result<String> {
    let created = client.create_flight(flight)?;
    if !created.is_ok() {
        return Err(ScenarioError::UnexpectedStatus {
            operation: "create flight".to_string(),
            expected: "ok".to_string(),
            actual: created.status,
        });
    }
    created
        .value
        .map(|flight| flight.id)
        .ok_or_else(|| ScenarioError::EmptyResult("create flight".to_string()))
}

fn book(client: &ApiClient, user: &str, flight_id: &str, seats: Seats) -> Result<BookingOutcome> {
    Ok(client
        .create_booking(&NewBooking::new(user, flight_id, seats))?
        .outcome())
}

fn expect_ok(operation: &str, status: &str) -> Result<()> {
    if status == "ok" {
        return Ok(());
    }
    Err(ScenarioError::UnexpectedStatus {
        operation: operation.to_string(),
        expected: "ok".to_string(),
        actual: status.to_string(),
    })
}

fn subscribers(client: &ApiClient, flight_id: &str) -> ClientResult<Vec<String>> {
    let mut users: Vec<String> = client
        .list_subscriptions(flight_id)?
        .into_iter()
        .map(|subscription| subscription.user)
        .collect();
    users.sort();
    Ok(users)
}

/// Route of a flight as a node reports it, if the node knows the flight.
fn route_of(client: &ApiClient, flight_id: &str) -> ClientResult<Option<(String, String)>> {
    Ok(client
        .list_flights()?
        .remove(flight_id)
        .map(|flight| (flight.origin, flight.destination)))
}

/// Alerts, flight creation, subscriptions and bookings until the flight
/// closes, with one node stopped half way.
pub fn booking_lifecycle(cluster: &mut Cluster, options: &ScenarioOptions) -> Result<()> {
    let names = cluster.start_nodes(2)?;
    let first = cluster.client(&names[0])?;

    let alert = NewAlert::default();
    let created = first.create_alert(&alert)?;
    expect_ok("create alert", &created.status)?;
    let alert_route = Some((Some(alert.origin.clone()), Some(alert.destination.clone())));
    assert_propagated(cluster, "alert route", &alert_route, |client| {
        Ok(client
            .list_alerts()?
            .into_iter()
            .find(|a| a.user == alert.user)
            .map(|a| (a.origin, a.destination)))
    })?;

    let flight = NewFlight::with_seats(Seats::new(25, 25, 25));
    let flight_id = create_flight(&first, &flight)?;
    thread::sleep(options.settle_after_create);
    let route = Some((flight.origin.clone(), flight.destination.clone()));
    assert_propagated(cluster, "flight route", &route, |client| {
        route_of(client, &flight_id)
    })?;

    let late = cluster.start_node()?;
    let late_route = route_of(&cluster.client(&late)?, &flight_id)?;
    if late_route != route {
        return Err(ScenarioError::Diverged {
            node: late,
            what: "flight route".to_string(),
            expected: format!("{route:?}"),
            actual: format!("{late_route:?}"),
        });
    }

    let subscribed = cluster.some_client()?.subscribe_to_flight(&flight_id, "user")?;
    expect_ok("subscribe", &subscribed.status)?;
    assert_propagated(cluster, "subscriptions", &vec!["user".to_string()], |client| {
        subscribers(client, &flight_id)
    })?;

    cluster.stop_node(&names[0])?;
    thread::sleep(options.settle_after_stop);

    let seats = Seats::window(1);
    let response = cluster
        .some_client()?
        .create_booking(&NewBooking::new("user", &flight_id, seats))?;
    expect_outcome("first booking", &response, BookingOutcome::Accepted)?;
    assert_propagated(cluster, "booked seats", &Some(seats), |client| {
        Ok(client
            .list_bookings()?
            .into_iter()
            .find(|b| b.user == "user" && b.flight_id.as_deref() == Some(flight_id.as_str()))
            .and_then(|b| b.seats))
    })?;
    assert_propagated(cluster, "subscriptions", &Vec::<String>::new(), |client| {
        subscribers(client, &flight_id)
    })?;

    let subscribed = cluster
        .some_client()?
        .subscribe_to_flight(&flight_id, "other_user")?;
    expect_ok("subscribe", &subscribed.status)?;

    let response = cluster
        .some_client()?
        .create_booking(&NewBooking::new("user", &flight_id, Seats::new(24, 25, 25)))?;
    expect_outcome("closing booking", &response, BookingOutcome::Accepted)?;

    assert_propagated(cluster, "flight closed", &true, |client| {
        Ok(client
            .list_flights()?
            .get(&flight_id)
            .is_some_and(takeoff_client::Flight::is_closed))
    })?;
    assert_propagated(cluster, "subscriptions", &Vec::<String>::new(), |client| {
        subscribers(client, &flight_id)
    })?;

    info!(flight = %flight_id, "booking lifecycle passed");
    Ok(())
}

/// Books a two-seat flight across a coordinator failure.
pub fn coordinator_failover(
    cluster: &mut Cluster,
    options: &ScenarioOptions,
) -> Result<FailoverReport> {
    cluster.start_nodes(2)?;

    let flight = NewFlight::with_seats(Seats::window(2));
    let flight_id = create_flight(&cluster.some_client()?, &flight)?;
    thread::sleep(options.settle_after_create);

    let outcome = book(&cluster.some_client()?, "user", &flight_id, Seats::window(1))?;
    expect_booking("booking before failover", outcome, BookingOutcome::Accepted)?;

    let coordinator = cluster.some_client()?.get_coordinator(&flight_id)?;
    if !coordinator.node.contains("node") {
        return Err(ScenarioError::UnexpectedStatus {
            operation: "get coordinator".to_string(),
            expected: "a node name".to_string(),
            actual: coordinator.node,
        });
    }

    let report = check_coordinator_failover(cluster, &flight_id, options.settle_after_stop)?;

    let outcome = book(&cluster.some_client()?, "user", &flight_id, Seats::window(1))?;
    expect_booking("booking after failover", outcome, BookingOutcome::Accepted)?;

    let outcome = book(&cluster.some_client()?, "user", &flight_id, Seats::window(1))?;
    expect_booking("booking on full flight", outcome, BookingOutcome::FlightClosed)?;

    Ok(report)
}

fn expect_booking(operation: &str, actual: BookingOutcome, expected: BookingOutcome) -> Result<()> {
    if actual == expected {
        return Ok(());
    }
    Err(ScenarioError::UnexpectedStatus {
        operation: operation.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

/// Races `options.attempts` single-seat bookings for a two-seat flight
/// across `options.nodes` nodes.
pub fn concurrent_bookings(
    cluster: &mut Cluster,
    options: &ScenarioOptions,
) -> Result<ContentionReport> {
    let capacity = Seats::window(2);
    cluster.start_nodes(options.nodes)?;

    let flight_id = create_flight(&cluster.some_client()?, &NewFlight::with_seats(capacity))?;
    thread::sleep(options.settle_after_create);

    let report = run_contention(cluster, &flight_id, "user", options.attempts)?;
    report.verify(capacity.total() as usize)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_names_round_trip() {
        for scenario in Scenario::ALL {
            assert_eq!(scenario.name().parse::<Scenario>(), Ok(scenario));
        }
        assert!("everything".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_default_options() {
        let options = ScenarioOptions::default();
        assert_eq!(options.nodes, 10);
        assert_eq!(options.attempts, 30);
        assert_eq!(options.settle_after_create, Duration::from_secs(2));
        assert_eq!(options.settle_after_stop, Duration::from_secs(1));

        let fast = options.without_settling();
        assert_eq!(fast.settle_after_create, Duration::ZERO);
        assert_eq!(Scenario::Contention.node_count(&fast), 10);
    }
}
