//! Configuration management commands.

use anyhow::{Context, Result, bail};
use takeoff_config::HarnessConfig;

/// Show the effective configuration.
pub fn show(project: &str, format: &str) -> Result<()> {
    let config = HarnessConfig::load_from_dir(project).context("Failed to load configuration")?;

    match format {
        "toml" => println!("{}", config.to_toml()?),
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        other => bail!("Unknown format '{other}'. Expected toml or json."),
    }
    Ok(())
}
