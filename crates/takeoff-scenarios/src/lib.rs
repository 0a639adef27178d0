//! Concurrent, failure-injecting scenarios against a take-off cluster.
//!
//! - [`checks`]: cross-node propagation, coordinator failover, contention
//! - [`fanout`]: parallel request issuance on a dedicated thread pool
//! - [`scenarios`]: the reference scenarios built from those checks

pub mod checks;
pub mod error;
pub mod fanout;
pub mod scenarios;

pub use checks::{
    ContentionReport, FailoverReport, assert_propagated, check_coordinator_failover,
    expect_outcome, run_contention,
};
pub use error::{Result, ScenarioError};
pub use fanout::fan_out;
pub use scenarios::{
    Outcome, Scenario, ScenarioOptions, booking_lifecycle, concurrent_bookings,
    coordinator_failover, run,
};

use takeoff_cluster::Cluster;
use takeoff_config::HarnessConfig;
use tracing::warn;

/// Port distance between the clusters of consecutive scenarios.
pub const PORT_STRIDE: u16 = 20;

/// Runs `scenario` on a fresh cluster at `base_port + index * PORT_STRIDE`
/// and tears the cluster down afterwards, pass or fail.
pub fn run_isolated(
    config: &HarnessConfig,
    scenario: Scenario,
    index: usize,
    options: &ScenarioOptions,
) -> Result<Outcome> {
    let base_port = u16::try_from(index)
        .ok()
        .and_then(|i| i.checked_mul(PORT_STRIDE))
        .and_then(|offset| config.cluster.base_port.checked_add(offset))
        .ok_or(takeoff_cluster::Error::PortExhausted {
            base: config.cluster.base_port,
            requested: index.saturating_mul(usize::from(PORT_STRIDE)),
        })?;

    let nodes = scenario.node_count(options);
    if nodes > usize::from(PORT_STRIDE) {
        warn!(
            %scenario,
            nodes,
            stride = PORT_STRIDE,
            "scenario ports overlap the next scenario's range"
        );
    }

    let mut cluster = Cluster::from_config_at(config, base_port)?;
    let outcome = run(scenario, &mut cluster, options);

    if let Err(e) = cluster.stop_all() {
        warn!(%scenario, error = %e, "teardown failed");
        if outcome.is_ok() {
            return Err(e.into());
        }
    }
    outcome
}
