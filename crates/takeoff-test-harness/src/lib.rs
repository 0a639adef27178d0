//! Test support for the take-off harness crates.
//!
//! Runs fake reservation nodes inside the test process so the client,
//! cluster and scenario crates can be exercised without the external
//! service:
//!
//! ```ignore
//! let (mut cluster, supervisor) = fake_cluster(FakeTakeOff::new(), 4)?;
//! let names = cluster.start_nodes(2)?;
//! supervisor.crash(cluster.node(&names[0])?.port);
//! ```

pub mod http;
pub mod ports;
pub mod service;
pub mod stub;
pub mod supervisor;

pub use http::{HttpServer, Request, Response};
pub use ports::free_base_port;
pub use service::{FakeTakeOff, ResponseFilter};
pub use stub::StubServer;
pub use supervisor::InProcessSupervisor;

use std::io;
use std::time::Duration;

use takeoff_cluster::{Cluster, HealthProber, RetryPolicy};

/// Probe policy sized for in-process nodes.
pub fn fast_prober() -> HealthProber {
    HealthProber::new(RetryPolicy::fixed(50, Duration::from_millis(20)))
}

/// Empty cluster of fake nodes with room for `max_nodes` nodes on free
/// ports, plus a handle on its supervisor.
pub fn fake_cluster(
    service: FakeTakeOff,
    max_nodes: u16,
) -> io::Result<(Cluster, InProcessSupervisor)> {
    let base_port = free_base_port(max_nodes)?;
    let supervisor = InProcessSupervisor::new(service);
    let cluster = Cluster::new(base_port, Box::new(supervisor.clone()), fast_prober());
    Ok((cluster, supervisor))
}
