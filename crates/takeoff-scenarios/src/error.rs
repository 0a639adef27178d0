//! Error types for scenario runs.

use takeoff_client::ClientError;
use thiserror::Error;

/// Scenario failures. A failed invariant is an error like any other.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// Cluster management failed.
    #[error("Cluster error: {0}")]
    Cluster(#[from] takeoff_cluster::Error),

    /// A node request failed.
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// A node disagrees with the value written elsewhere.
    #[error("Node {node} diverged on {what}: expected {expected}, got {actual}")]
    Diverged {
        node: String,
        what: String,
        expected: String,
        actual: String,
    },

    /// A response carried a status other than the expected one.
    #[error("{operation}: expected status {expected}, got {actual}")]
    UnexpectedStatus {
        operation: String,
        expected: String,
        actual: String,
    },

    /// Stopping the coordinator did not move coordination elsewhere.
    #[error("Coordinator of flight {flight} is still {node} after it was stopped")]
    CoordinatorUnchanged { flight: String, node: String },

    /// Contention outcome does not match capacity.
    #[error(
        "Admission violated: expected {expected_accepted} accepted and {expected_refused} refused, \
         got {accepted} accepted, {refused} refused, {other} unknown, {errors} errors"
    )]
    Admission {
        expected_accepted: usize,
        expected_refused: usize,
        accepted: usize,
        refused: usize,
        other: usize,
        errors: usize,
    },

    /// A write succeeded but returned no value.
    #[error("{0} returned no value")]
    EmptyResult(String),

    /// The fan-out thread pool could not be built.
    #[error("Thread pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for scenario operations.
pub type Result<T> = std::result::Result<T, ScenarioError>;
