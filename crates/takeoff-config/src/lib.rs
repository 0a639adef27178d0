//! Configuration for the take-off cluster harness
//!
//! Sources, highest precedence first:
//! 1. Environment variables (`TAKEOFF_` prefix, `__` between sections,
//!    e.g. `TAKEOFF_CLUSTER__BASE_PORT=27300`)
//! 2. takeoff.local.toml (gitignored, local overrides)
//! 3. takeoff.toml (project config)
//! 4. ~/.config/takeoff/config.toml (user defaults)
//! 5. Built-in defaults
//!
//! The built-in defaults launch the Elixir service from a sibling
//! `iasc-take-off` checkout as detached BEAM nodes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Placeholder replaced by the node's port in launch templates.
pub const PORT_PLACEHOLDER: &str = "{port}";
/// Placeholder replaced by the node's name (`node-<port>`).
pub const NAME_PLACEHOLDER: &str = "{name}";
/// Placeholder replaced by the cluster host.
pub const HOST_PLACEHOLDER: &str = "{host}";

/// Main harness configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub cluster: ClusterSettings,
    pub probe: ProbeSettings,
    pub supervisor: SupervisorSettings,
    pub scenario: ScenarioSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// First port handed out; node N gets `base_port + N`.
    pub base_port: u16,
    /// Host the nodes listen on, used for client URLs.
    pub host: String,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            base_port: 27220,
            host: "127.0.0.1".to_string(),
        }
    }
}

/// Health probe retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub max_attempts: u32,
    pub interval_ms: u64,
    pub backoff: Backoff,
    /// Upper bound for a single wait when backing off exponentially.
    pub max_interval_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval_ms: 2000,
            backoff: Backoff::Fixed,
            max_interval_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backoff {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub kind: SupervisorKind,
    pub process: ProcessSettings,
    pub container: ContainerSettings,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            kind: SupervisorKind::Process,
            process: ProcessSettings::default(),
            container: ContainerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SupervisorKind {
    Process,
    Container,
}

/// How to launch a node as a local process.
///
/// `args` and `env` may contain `{port}`, `{name}` and `{host}`.
/// `env` entries are `KEY=VALUE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSettings {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// The launcher daemonizes and exits; the node is killed by port.
    pub detached: bool,
    /// Directory for per-node stdout/stderr logs.
    pub log_dir: Option<PathBuf>,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            program: "elixir".to_string(),
            args: vec![
                "--erl".to_string(),
                "-detached".to_string(),
                "--name".to_string(),
                format!("{NAME_PLACEHOLDER}@{HOST_PLACEHOLDER}"),
                "-S".to_string(),
                "mix".to_string(),
                "phx.server".to_string(),
            ],
            env: vec![format!("PORT={PORT_PLACEHOLDER}")],
            working_dir: Some(PathBuf::from("../iasc-take-off")),
            detached: true,
            log_dir: None,
        }
    }
}

/// How to launch a node as a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// Container CLI (`docker`, `podman`).
    pub runtime: String,
    pub image: String,
    /// Network mode; `host` skips port publishing.
    pub network: Option<String>,
    /// Port the service listens on inside the container.
    pub container_port: u16,
    pub env: Vec<String>,
    pub args: Vec<String>,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            image: "iasc-take-off:latest".to_string(),
            network: Some("host".to_string()),
            container_port: 4000,
            env: vec![
                format!("PORT={PORT_PLACEHOLDER}"),
                format!("NODE_NAME={NAME_PLACEHOLDER}"),
            ],
            args: Vec::new(),
        }
    }
}

/// Parameters of the reference scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioSettings {
    /// Nodes started by the contention scenario.
    pub nodes: usize,
    /// Concurrent bookings issued by the contention scenario.
    pub attempts: usize,
    pub settle_after_create_ms: u64,
    pub settle_after_stop_ms: u64,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            nodes: 10,
            attempts: 30,
            settle_after_create_ms: 2000,
            settle_after_stop_ms: 1000,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from a specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Rejects settings the harness cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.cluster.base_port == 0 {
            return invalid("cluster.base_port must be > 0");
        }
        if self.cluster.host.is_empty() {
            return invalid("cluster.host must not be empty");
        }
        if self.probe.max_attempts == 0 {
            return invalid("probe.max_attempts must be >= 1");
        }
        if self.scenario.nodes == 0 || self.scenario.attempts == 0 {
            return invalid("scenario.nodes and scenario.attempts must be >= 1");
        }

        match self.supervisor.kind {
            SupervisorKind::Process => {
                if self.supervisor.process.program.is_empty() {
                    return invalid("supervisor.process.program must not be empty");
                }
                check_env(&self.supervisor.process.env, "supervisor.process.env")
            }
            SupervisorKind::Container => {
                if self.supervisor.container.image.is_empty() {
                    return invalid("supervisor.container.image must not be empty");
                }
                if self.supervisor.container.runtime.is_empty() {
                    return invalid("supervisor.container.runtime must not be empty");
                }
                check_env(&self.supervisor.container.env, "supervisor.container.env")
            }
        }
    }

    /// Resolve relative paths against `base_dir`
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();
        let process = &mut self.supervisor.process;

        if let Some(dir) = process.working_dir.as_mut().filter(|d| d.is_relative()) {
            *dir = base.join(&*dir);
        }
        if let Some(dir) = process.log_dir.as_mut().filter(|d| d.is_relative()) {
            *dir = base.join(&*dir);
        }
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Splits `KEY=VALUE` entries.
pub fn parse_env_entries(entries: &[String]) -> Result<Vec<(String, String)>> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(ConfigError::Validation(format!(
                "environment entry '{entry}' is not KEY=VALUE"
            ))),
        })
        .collect()
}

fn check_env(entries: &[String], field: &str) -> Result<()> {
    parse_env_entries(entries)
        .map(|_| ())
        .map_err(|e| ConfigError::Validation(format!("{field}: {e}")))
}

fn invalid(message: &str) -> Result<()> {
    Err(ConfigError::Validation(message.to_string()))
}
