//! take-off cluster harness CLI.
//!
//! Starts real take-off nodes, drives the reference scenarios against them
//! and tears them down again.
//!
//! # Quick Start
//!
//! ```bash
//! # Inspect the effective configuration
//! takeoff config show
//!
//! # Race 30 bookings across 10 nodes
//! takeoff scenario contention --nodes 10 --attempts 30
//!
//! # Run every scenario, each on its own port range
//! takeoff scenario all
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// take-off harness - black-box scenarios for the flight reservation cluster.
#[derive(Parser)]
#[command(name = "takeoff")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a reference scenario against a fresh cluster.
    Scenario {
        /// Scenario to run: lifecycle, failover, contention or all.
        name: String,

        /// Node count of the contention scenario.
        #[arg(short, long)]
        nodes: Option<usize>,

        /// Concurrent bookings of the contention scenario.
        #[arg(short, long)]
        attempts: Option<usize>,

        /// First port of the cluster.
        #[arg(long)]
        base_port: Option<u16>,

        /// Skip the settle delays after flight creation and node shutdown.
        #[arg(long)]
        no_settle: bool,

        /// Project directory holding takeoff.toml.
        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Configuration management.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show {
        /// Project directory holding takeoff.toml.
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Output format: toml or json.
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scenario {
            name,
            nodes,
            attempts,
            base_port,
            no_settle,
            project,
        } => commands::scenario::run(
            &project,
            &name,
            &commands::scenario::Overrides {
                nodes,
                attempts,
                base_port,
                no_settle,
            },
        ),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show { project, format } => commands::config::show(&project, &format),
        },
    }
}
