// src/main.rs

//! The main entry point for the HA substrate daemon binary.

use anyhow::Result;
use ha_substrate::config::Config;
use ha_substrate::server::{self, Mode};
use std::env;
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("ha-substrate version {VERSION}");
        return Ok(());
    }

    // Selects which of the three daemon modes this process runs, mirroring
    // how the teacher's single binary switches between normal-server mode
    // and `--warden` mode via a CLI flag.
    let mode_str = args
        .iter()
        .position(|arg| arg == "--mode")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("attrd");

    let Some(mode) = Mode::parse(mode_str) else {
        eprintln!("Usage: ha-substrate --mode <attrd|executor|proxy> --config /path/to/config.toml");
        std::process::exit(1);
    };

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    let config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(1);
        }
    };

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .compact()
        .with_ansi(true)
        .init();

    if let Err(e) = server::run(mode, config).await {
        error!("runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
