#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use smsroute::{Simulator, SimulatorConfig};
use smsroute_common::{internal, logging};

/// Route a batch of SMS through simulated IMS and circuit-switched links
#[derive(Parser, Debug)]
#[command(name = "smsroute")]
#[command(about = "Simulate outbound SMS routing", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file to use instead of the default search locations
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let config_content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
    let config: SimulatorConfig = ron::from_str(&config_content)?;
    let simulator = Simulator::new(config)?;

    tokio::select! {
        outcomes = simulator.run() => {
            let outcomes = outcomes?;
            println!(
                "{}",
                ron::ser::to_string_pretty(&outcomes, ron::ser::PrettyConfig::default())?
            );
        }
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered, abandoning the run");
        }
    }

    Ok(())
}

/// Find the configuration file using the following precedence:
/// 1. `SMSROUTE_CONFIG` environment variable
/// 2. ./smsroute.config.ron (current working directory)
/// 3. /etc/smsroute/smsroute.config.ron (system-wide config)
fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var("SMSROUTE_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "SMSROUTE_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        PathBuf::from("./smsroute.config.ron"),
        PathBuf::from("/etc/smsroute/smsroute.config.ron"),
    ];

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - SMSROUTE_CONFIG environment variable\n{paths_tried}"
    )
}
