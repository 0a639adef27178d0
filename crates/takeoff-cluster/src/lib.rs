//! Local cluster management for take-off test runs.
//!
//! Starts, probes and tears down service nodes on consecutive ports:
//! - [`Cluster`] owns the live nodes and hands out per-node API clients
//! - [`ProcessSupervisor`] decides how a node runs (local process or container)
//! - [`HealthProber`] blocks until a fresh node answers its health check

pub mod cluster;
pub mod error;
pub mod node;
pub mod probe;
mod registry;
pub mod supervisor;

pub use cluster::Cluster;
pub use error::{Error, Result};
pub use node::{HandleKind, NodeHandle, NodeInfo, NodeStatus, node_name};
pub use probe::{HealthProber, RetryPolicy};
pub use supervisor::{ContainerSupervisor, LocalProcessSupervisor, ProcessSupervisor};
