// =============================================================================
// marketcrebirth — Market Data & News Aggregation Daemon
// =============================================================================
//
// Ingests REST, RSS/Atom, and streaming-socket market-data and news sources,
// normalizes into DataPoints/NewsItems, persists to an embedded SQLite store,
// and serves a throttled in-memory snapshot over an HTTP API and a local
// Unix-socket API.
// =============================================================================

mod api;
mod config;
mod error;
mod health;
mod models;
mod rest_mapping;
mod scheduler;
mod store;

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::scheduler::Scheduler;
use crate::store::{SqliteStore, Store};

#[derive(Debug, Parser)]
#[command(name = "marketcrebirth", version, about = "Market data and news aggregation daemon")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: String,

    /// Override the HTTP listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Disable the HTTP API.
    #[arg(long)]
    no_http: bool,

    /// Disable the local Unix-socket API.
    #[arg(long)]
    no_unix: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "fatal startup error");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    info!("marketcrebirth starting up");

    let mut config = Config::load(&cli.config).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        Config::default()
    });

    if let Some(port) = cli.port {
        let host = config
            .http_bind
            .rsplit_once(':')
            .map(|(h, _)| h.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.http_bind = format!("{host}:{port}");
    }
    let config = Arc::new(config);

    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&config.db_path)
            .map_err(|e| anyhow::anyhow!("failed to open store at {}: {e}", config.db_path))?,
    );

    let scheduler = Scheduler::new(Arc::clone(&config), store);
    let mut handles = scheduler.spawn_all();

    if !cli.no_http {
        let app = api::http::router(Arc::clone(&scheduler));
        let listener = tokio::net::TcpListener::bind(&config.http_bind)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind http listener {}: {e}", config.http_bind))?;
        info!(addr = %config.http_bind, "http api listening");
        let http_scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move {
            let serve = axum::serve(listener, app);
            tokio::select! {
                res = serve => { if let Err(e) = res { error!(error = %e, "http server error"); } }
                _ = http_scheduler.cancel.cancelled() => {}
            }
        }));
    }

    if !cli.no_unix {
        let unix_scheduler = Arc::clone(&scheduler);
        let socket_path = config.unix_socket_path.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = api::unix::serve(unix_scheduler, &socket_path).await {
                error!(error = %e, "unix socket server error");
            }
        }));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    scheduler.shutdown();

    for handle in handles {
        let _ = handle.await;
    }

    info!("marketcrebirth shut down cleanly");
    Ok(())
}
