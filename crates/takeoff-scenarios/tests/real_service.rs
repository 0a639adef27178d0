//! Reference scenarios against the real take-off service.
//!
//! Nodes are launched as configured in `takeoff.toml` (by default
//! `elixir ... mix phx.server` from `../iasc-take-off`). Run with
//! `cargo test -p takeoff-scenarios -- --ignored --test-threads=1`.

use takeoff_config::HarnessConfig;
use takeoff_scenarios::{Outcome, Scenario, ScenarioOptions, run_isolated};

fn config() -> HarnessConfig {
    HarnessConfig::load().expect("harness configuration should load")
}

#[test]
#[ignore = "Requires a take-off service checkout"]
fn test_booking_lifecycle_on_real_service() {
    let config = config();
    let options = ScenarioOptions::from(&config.scenario);

    let outcome = run_isolated(&config, Scenario::Lifecycle, 0, &options).unwrap();
    assert_eq!(outcome, Outcome::Lifecycle);
}

#[test]
#[ignore = "Requires a take-off service checkout"]
fn test_coordinator_failover_on_real_service() {
    let config = config();
    let options = ScenarioOptions::from(&config.scenario);

    let outcome = run_isolated(&config, Scenario::Failover, 1, &options).unwrap();
    let Outcome::Failover(report) = outcome else {
        panic!("expected a failover report");
    };
    assert_ne!(report.previous.node, report.current.node);
}

#[test]
#[ignore = "Requires a take-off service checkout"]
fn test_concurrent_bookings_on_real_service() {
    let config = config();
    let options = ScenarioOptions::from(&config.scenario);

    let outcome = run_isolated(&config, Scenario::Contention, 2, &options).unwrap();
    let Outcome::Contention(report) = outcome else {
        panic!("expected a contention report");
    };
    assert_eq!(report.accepted, 2);
    assert_eq!(report.refused(), options.attempts - 2);
}
