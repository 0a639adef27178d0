//! Cluster-wide invariant checks.

use std::fmt::Debug;
use std::thread;
use std::time::Duration;

use takeoff_client::{
    ApiClient, BookingOutcome, BookingResponse, ClientResult, Coordinator, NewBooking, Seats,
};
use takeoff_cluster::{Cluster, NodeInfo};
use tracing::{debug, info, warn};

use crate::fanout::fan_out;
use crate::{Result, ScenarioError};

/// Reads `what` from every live node through `read` and compares it with
/// `expected`. The first diverging node is reported.
pub fn assert_propagated<T, F>(cluster: &Cluster, what: &str, expected: &T, read: F) -> Result<()>
where
    T: PartialEq + Debug,
    F: Fn(&ApiClient) -> ClientResult<T>,
{
    for (node, client) in cluster.named_clients() {
        let actual = read(&client)?;
        if actual != *expected {
            return Err(ScenarioError::Diverged {
                node,
                what: what.to_string(),
                expected: format!("{expected:?}"),
                actual: format!("{actual:?}"),
            });
        }
        debug!(%node, what, "value propagated");
    }
    Ok(())
}

/// Fails unless `response` carries `expected`.
pub fn expect_outcome(
    operation: &str,
    response: &BookingResponse,
    expected: BookingOutcome,
) -> Result<()> {
    if response.outcome() == expected {
        return Ok(());
    }
    Err(ScenarioError::UnexpectedStatus {
        operation: operation.to_string(),
        expected: expected.to_string(),
        actual: response.status.clone(),
    })
}

/// Coordinator before and after its node was stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverReport {
    pub previous: Coordinator,
    pub current: Coordinator,
    pub stopped: NodeInfo,
}

/// Stops the node coordinating `flight_id` and checks that another live node
/// takes over.
pub fn check_coordinator_failover(
    cluster: &mut Cluster,
    flight_id: &str,
    settle: Duration,
) -> Result<FailoverReport> {
    let previous = cluster.some_client()?.get_coordinator(flight_id)?;
    let stopped = cluster.stop_node(&previous.node)?;
    info!(flight = flight_id, node = %stopped.name, "stopped coordinator");

    thread::sleep(settle);

    let current = cluster.some_client()?.get_coordinator(flight_id)?;
    if current.node == previous.node {
        return Err(ScenarioError::CoordinatorUnchanged {
            flight: flight_id.to_string(),
            node: current.node,
        });
    }

    info!(
        flight = flight_id,
        from = %previous.node,
        to = %current.node,
        "coordinator moved"
    );
    Ok(FailoverReport {
        previous,
        current,
        stopped,
    })
}

/// Tally of a contention run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentionReport {
    pub attempts: usize,
    pub accepted: usize,
    pub denied: usize,
    pub closed: usize,
    /// Status strings outside the known outcomes.
    pub other: Vec<String>,
    /// Requests that failed outright.
    pub errors: Vec<String>,
}

impl ContentionReport {
    pub fn from_results(results: Vec<ClientResult<BookingResponse>>) -> Self {
        let mut report = Self {
            attempts: results.len(),
            ..Self::default()
        };

        for result in results {
            match result {
                Ok(response) => match response.outcome() {
                    BookingOutcome::Accepted => report.accepted += 1,
                    BookingOutcome::Denied => report.denied += 1,
                    BookingOutcome::FlightClosed => report.closed += 1,
                    BookingOutcome::Other => report.other.push(response.status),
                },
                Err(e) => report.errors.push(e.to_string()),
            }
        }
        report
    }

    /// Denied plus closed.
    pub fn refused(&self) -> usize {
        self.denied + self.closed
    }

    /// Exactly `capacity` accepted, every other attempt refused, nothing
    /// else.
    pub fn verify(&self, capacity: usize) -> Result<()> {
        let expected_accepted = capacity.min(self.attempts);
        let expected_refused = self.attempts - expected_accepted;

        if self.accepted == expected_accepted
            && self.refused() == expected_refused
            && self.other.is_empty()
            && self.errors.is_empty()
        {
            return Ok(());
        }

        for error in &self.errors {
            warn!(%error, "booking request failed");
        }
        Err(ScenarioError::Admission {
            expected_accepted,
            expected_refused,
            accepted: self.accepted,
            refused: self.refused(),
            other: self.other.len(),
            errors: self.errors.len(),
        })
    }
}

/// Issues `attempts` identical one-window-seat bookings for `flight_id` at
/// the same time, each against a randomly chosen live node.
pub fn run_contention(
    cluster: &Cluster,
    flight_id: &str,
    user: &str,
    attempts: usize,
) -> Result<ContentionReport> {
    let targets = (0..attempts)
        .map(|_| cluster.some_client())
        .collect::<takeoff_cluster::Result<Vec<_>>>()?;
    let booking = NewBooking::new(user, flight_id, Seats::window(1));

    let results = fan_out(attempts, targets, |client| client.create_booking(&booking))?;
    let report = ContentionReport::from_results(results);

    info!(
        flight = flight_id,
        attempts,
        accepted = report.accepted,
        denied = report.denied,
        closed = report.closed,
        errors = report.errors.len(),
        "contention run finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use test_case::test_case;

    fn response(status: &str) -> ClientResult<BookingResponse> {
        Ok(BookingResponse {
            status: status.to_string(),
            extra: Map::new(),
        })
    }

    fn report(accepted: usize, denied: usize, closed: usize) -> ContentionReport {
        let mut results = Vec::new();
        results.extend((0..accepted).map(|_| response("booking_accepted")));
        results.extend((0..denied).map(|_| response("booking_denied")));
        results.extend((0..closed).map(|_| response("flight_closed")));
        ContentionReport::from_results(results)
    }

    #[test]
    fn test_report_tally() {
        let mut results = vec![
            response("booking_accepted"),
            response("booking_denied"),
            response("flight_closed"),
            response("overbooked"),
        ];
        results.push(Err(takeoff_client::ClientError::Status {
            code: 500,
            body: String::new(),
        }));

        let report = ContentionReport::from_results(results);
        assert_eq!(report.attempts, 5);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.refused(), 2);
        assert_eq!(report.other, vec!["overbooked".to_string()]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.verify(1).is_err());
    }

    #[test_case(2, 28, 0; "all refusals denied")]
    #[test_case(2, 0, 28; "all refusals closed")]
    #[test_case(2, 10, 18; "mixed refusals")]
    fn test_exact_admission_passes(accepted: usize, denied: usize, closed: usize) {
        assert!(report(accepted, denied, closed).verify(2).is_ok());
    }

    #[test_case(3, 27, 0; "overbooked")]
    #[test_case(1, 29, 0; "underbooked")]
    fn test_wrong_admission_fails(accepted: usize, denied: usize, closed: usize) {
        let err = report(accepted, denied, closed).verify(2).unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::Admission {
                expected_accepted: 2,
                expected_refused: 28,
                ..
            }
        ));
    }

    #[test]
    fn test_capacity_above_attempts() {
        assert!(report(3, 0, 0).verify(5).is_ok());
    }

    #[test]
    fn test_expect_outcome() {
        let accepted = response("booking_accepted").unwrap();
        assert!(expect_outcome("book", &accepted, BookingOutcome::Accepted).is_ok());

        let err = expect_outcome("book", &accepted, BookingOutcome::FlightClosed).unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::UnexpectedStatus { ref expected, ref actual, .. }
                if expected == "flight_closed" && actual == "booking_accepted"
        ));
    }
}
