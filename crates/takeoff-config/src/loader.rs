//! Configuration loader with multi-source merging

use crate::{HarnessConfig, Paths, Result};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    env_vars: Option<HashMap<String, String>>,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader rooted at the current directory
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "TAKEOFF".to_string(),
            env_vars: None,
            include_user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "TAKEOFF")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Read environment overrides from `vars` instead of the process
    /// environment
    pub fn with_env_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.env_vars = Some(vars);
        self
    }

    /// Skip ~/.config/takeoff/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<HarnessConfig> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = HarnessConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config
        if self.include_user_config {
            if let Ok(user_config_file) = Paths::new().user_config_file() {
                builder = builder.add_source(
                    config::File::from(user_config_file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        // 3. Project config (takeoff.toml)
        builder = builder.add_source(
            config::File::from(Paths::project_config_file(&self.project_dir))
                .required(false)
                .format(config::FileFormat::Toml),
        );

        // 4. Local config (takeoff.local.toml, gitignored)
        builder = builder.add_source(
            config::File::from(Paths::local_config_file(&self.project_dir))
                .required(false)
                .format(config::FileFormat::Toml),
        );

        // 5. Environment (TAKEOFF_CLUSTER__BASE_PORT=...)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(self.env_vars.clone()),
        );

        let mut harness_config: HarnessConfig = builder.build()?.try_deserialize()?;
        harness_config.resolve_paths(&self.project_dir);
        harness_config.validate()?;

        debug!(
            project_dir = %self.project_dir.display(),
            base_port = harness_config.cluster.base_port,
            "loaded harness configuration"
        );
        Ok(harness_config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
