/*
prefnews - single-binary main.rs
This binary serves the municipal news RSS feed, rebuilding it on demand
behind a TTL cache. There is no background worker: the first request after
cache expiry pays the regeneration cost.
*/

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use common::Config;
use prefnews::server;

#[derive(Parser, Debug)]
#[command(
    name = "prefnews",
    about = "Single-binary RSS bridge for the São Paulo city hall news portal"
)]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Resolve config paths: shipped defaults plus an optional local override.
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() {
            Some(p)
        } else {
            None
        }
    };

    let config = match Config::load_with_defaults(
        if default_path.exists() {
            Some(&default_path)
        } else {
            None
        },
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(%e, "failed to load configuration");
            return Err(e);
        }
    };
    info!(default = ?default_path, override_file = ?override_path, "configuration loaded");

    let state = match server::build_state(config) {
        Ok(s) => s,
        Err(e) => {
            error!(%e, "failed to initialize application state");
            return Err(e);
        }
    };
    info!(sources = state.sources.len(), "application state initialized");

    server::launch_rocket(state).await
}
