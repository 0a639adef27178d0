//! Error types for cluster management.

use takeoff_client::ClientError;
use thiserror::Error;

/// Cluster management errors.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] takeoff_config::ConfigError),

    /// Health probing gave up on a node.
    #[error("Node {node} failed to start after {attempts} health probe(s): {reason}")]
    StartupFailed {
        node: String,
        attempts: u32,
        reason: String,
    },

    /// Node not found in the registry.
    #[error("Node {0} not found")]
    NodeNotFound(String),

    /// Random client requested from an empty cluster.
    #[error("Cluster has no live nodes")]
    EmptyCluster,

    /// Node identifier already registered.
    #[error("Node {0} is already registered")]
    DuplicateNode(String),

    /// Port already owned by a registered node.
    #[error("Port {0} is already owned by another node")]
    DuplicatePort(u16),

    /// Next port would exceed the u16 range.
    #[error("Port range exhausted: base={base}, requested={requested}")]
    PortExhausted { base: u16, requested: usize },

    /// Invalid node count.
    #[error("Invalid node count: {0} (must be >= 1)")]
    InvalidNodeCount(usize),

    /// Process or container spawn error.
    #[error("Failed to spawn node {node}: {reason}")]
    SpawnFailed { node: String, reason: String },

    /// Forced termination failed.
    #[error("Failed to terminate node on port {port}: {reason}")]
    TerminateFailed { port: u16, reason: String },

    /// Node API error outside of health probing.
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, Error>;
