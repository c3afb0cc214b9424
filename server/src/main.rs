//! V Panel server binary
//!
//! Loads configuration (defaults < YAML < `V_*` env < CLI flags), sets up
//! tracing, builds the service graph and serves the HTTP surface with
//! graceful shutdown.

#![forbid(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::info;
use vpanel_core::PanelConfig;
use vpanel_server::{build_router, state::AppState, sweepers};

#[derive(Parser, Debug)]
#[command(
    name = "vpanel-server",
    version,
    about = "Multi-protocol proxy management panel",
    author = "V Panel Team"
)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen host, overrides configuration
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overrides configuration
    #[arg(long)]
    port: Option<u16>,

    /// Log level, overrides configuration
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = PanelConfig::load(cli.config.as_deref())
        .context("configuration is invalid; refusing to start")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }

    init_tracing(&config.log.level, &config.log.format);
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::build(config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    sweepers::spawn(state.clone(), shutdown_rx);

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "vpanel-server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    Ok(())
}
