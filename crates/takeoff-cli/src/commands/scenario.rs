//! Scenario runner.

use anyhow::{Context, Result, anyhow, bail};
use takeoff_config::HarnessConfig;
use takeoff_scenarios::{Outcome, Scenario, ScenarioOptions, run_isolated};
use tracing::error;

/// Command-line overrides applied on top of the loaded configuration.
#[derive(Debug, Default)]
pub struct Overrides {
    pub nodes: Option<usize>,
    pub attempts: Option<usize>,
    pub base_port: Option<u16>,
    pub no_settle: bool,
}

/// Parses `lifecycle`, `failover`, `contention` or `all`.
fn select(name: &str) -> Result<Vec<Scenario>> {
    if name == "all" {
        return Ok(Scenario::ALL.to_vec());
    }
    let scenario = name.parse::<Scenario>().map_err(|e| anyhow!(e))?;
    Ok(vec![scenario])
}

fn options(config: &HarnessConfig, overrides: &Overrides) -> Result<ScenarioOptions> {
    let mut options = ScenarioOptions::from(&config.scenario);
    if let Some(nodes) = overrides.nodes {
        options.nodes = nodes;
    }
    if let Some(attempts) = overrides.attempts {
        options.attempts = attempts;
    }
    if options.nodes == 0 || options.attempts == 0 {
        bail!("--nodes and --attempts must be at least 1");
    }
    if overrides.no_settle {
        options = options.without_settling();
    }
    Ok(options)
}

fn summary(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Lifecycle => "flight booked until closed".to_string(),
        Outcome::Failover(report) => format!(
            "coordinator moved from {} to {}",
            report.previous.node, report.current.node
        ),
        Outcome::Contention(report) => format!(
            "{} of {} bookings accepted, {} refused",
            report.accepted,
            report.attempts,
            report.refused()
        ),
    }
}

/// Runs the selected scenarios, each on its own cluster.
pub fn run(project: &str, name: &str, overrides: &Overrides) -> Result<()> {
    let scenarios = select(name)?;

    let mut config =
        HarnessConfig::load_from_dir(project).context("Failed to load configuration")?;
    if let Some(base_port) = overrides.base_port {
        config.cluster.base_port = base_port;
    }
    let options = options(&config, overrides)?;

    let mut failed = Vec::new();
    for (index, scenario) in scenarios.into_iter().enumerate() {
        match run_isolated(&config, scenario, index, &options) {
            Ok(outcome) => println!("PASS {scenario}: {}", summary(&outcome)),
            Err(e) => {
                error!(%scenario, error = %e, "scenario failed");
                println!("FAIL {scenario}: {e}");
                failed.push(scenario.name());
            }
        }
    }

    if !failed.is_empty() {
        bail!("{} scenario(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all() {
        assert_eq!(select("all").unwrap(), Scenario::ALL.to_vec());
        assert_eq!(select("failover").unwrap(), vec![Scenario::Failover]);
        assert!(select("nope").is_err());
    }

    #[test]
    fn test_overrides_replace_configured_options() {
        let config = HarnessConfig::default();
        let overrides = Overrides {
            nodes: Some(3),
            attempts: Some(8),
            no_settle: true,
            ..Overrides::default()
        };

        let options = options(&config, &overrides).unwrap();
        assert_eq!(options.nodes, 3);
        assert_eq!(options.attempts, 8);
        assert!(options.settle_after_create.is_zero());
    }

    #[test]
    fn test_zero_nodes_rejected() {
        let overrides = Overrides {
            nodes: Some(0),
            ..Overrides::default()
        };
        assert!(options(&HarnessConfig::default(), &overrides).is_err());
    }
}
