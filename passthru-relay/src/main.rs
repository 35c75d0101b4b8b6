//! passthru-relay binary entry point.
//!
//! Usage:
//! ```bash
//! passthru-relay --config passthru.toml
//! passthru-relay --bind 127.0.0.1:8000 --public-host files.example.org --public-scheme https
//! passthru-relay --help
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use passthru_relay::config::Config;
use passthru_relay::http::{build_router, health};
use passthru_relay::{logging, PassthruRelay};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Default configuration file, read only if it exists.
const DEFAULT_CONFIG: &str = "passthru.toml";

/// Rendezvous and streaming relay for one-shot file handoff.
#[derive(Parser, Debug)]
#[command(name = "passthru-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: passthru.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind to this address:port
    #[arg(long)]
    bind: Option<String>,

    /// Hostname clients use to reach the relay (shown in links)
    #[arg(long)]
    public_host: Option<String>,

    /// Scheme clients use to reach the relay (shown in links)
    #[arg(long)]
    public_scheme: Option<String>,

    /// Log the X-Forwarded-For address instead of the socket peer
    #[arg(long)]
    trust_forwarded_for: bool,

    /// Log file (default: stderr)
    #[arg(long)]
    logfile: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None if PathBuf::from(DEFAULT_CONFIG).exists() => {
                Config::from_file(&PathBuf::from(DEFAULT_CONFIG))?
            }
            None => Config::default(),
        };

        if let Some(bind) = &self.bind {
            config.server.bind_address = bind.clone();
        }
        if let Some(host) = &self.public_host {
            config.server.public_host = Some(host.clone());
        }
        if let Some(scheme) = &self.public_scheme {
            config.server.public_scheme = Some(scheme.clone());
        }
        if self.trust_forwarded_for {
            config.server.trust_forwarded_for = true;
        }
        if let Some(logfile) = &self.logfile {
            config.logging.file = Some(logfile.clone());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    logging::init(&config.logging)?;
    health::init_start_time();

    let bind_address = config.server.bind_address.clone();
    let relay = Arc::new(PassthruRelay::new(config));
    let app = build_router(relay.clone());

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;

    tracing::info!(
        "passthru-relay v{} listening on {} (peer wait: {}s)",
        env!("CARGO_PKG_VERSION"),
        bind_address,
        relay.wait_timeout().as_secs()
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed")?;

    tracing::info!("passthru-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
