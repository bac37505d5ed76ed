// zeekagent entrypoint
//!
//! Initialization, the event bridge and shutdown live in `lifecycle` so this
//! file remains a thin orchestrator.

use anyhow::Result;
use log::info;
use std::env;
use zeekagent_server::config::AgentConfig;
use zeekagent_server::lifecycle::{bootstrap, run};
use zeekagent_server::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Optional first argument: path to config.toml
    let config_path = env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());

    // Load configuration (fallback to defaults when config file missing)
    let config = match AgentConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: Failed to load {}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    // Logging before any other side effects
    logging::init_logging(&config.logging)?;

    info!(
        "zeekagent v{} starting (node {})",
        env!("CARGO_PKG_VERSION"),
        config.agent.node_id
    );

    let components = bootstrap(&config).await?;

    // Run until ctrl-c or end of input
    run(&config, components).await
}
