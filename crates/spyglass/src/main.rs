//! # spyglass
//!
//! Spyglass server binary — opens the store, builds the engine, registers
//! adapters, and starts the HTTP/WebSocket server.

#![deny(unsafe_code)]

mod scripted;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use spyglass_engine::adapter::AdapterRegistry;
use spyglass_engine::{EngineConfig, SessionEngine};
use spyglass_events::{ConnectionConfig, EventStore};
use spyglass_server::{ServerConfig, SpyglassServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::scripted::ScriptedAdapter;

/// Spyglass session viewer backend.
#[derive(Parser, Debug)]
#[command(name = "spyglass", about = "Spyglass session viewer backend")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "7878")]
    port: u16,

    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Recent-event cache capacity per session.
    #[arg(long, default_value = "100")]
    cache_capacity: usize,

    /// Maximum concurrently running agent instances.
    #[arg(long, default_value = "8")]
    max_running: usize,
}

impl Cli {
    fn default_db_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".spyglass").join("spyglass.db")
    }
}

fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let db_path = cli.db_path.clone().unwrap_or_else(Cli::default_db_path);
    ensure_parent_dir(&db_path)?;
    let db_path_str = db_path
        .to_str()
        .context("database path is not valid UTF-8")?;
    let store = Arc::new(
        EventStore::open_file(db_path_str, &ConnectionConfig::default())
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?,
    );
    info!(db_path = %db_path.display(), "store opened");

    let mut adapters = AdapterRegistry::new();
    adapters.register(Arc::new(ScriptedAdapter));

    let engine = SessionEngine::new(
        store,
        adapters,
        EngineConfig {
            cache_capacity: cli.cache_capacity,
            max_running: cli.max_running,
            ..EngineConfig::default()
        },
    );
    info!(agent_types = ?engine.agent_types(), "engine ready");

    let mut config = ServerConfig {
        host: cli.host,
        port: cli.port,
        ..ServerConfig::default()
    };
    config.apply_env_overrides();

    let mut server = SpyglassServer::new(config.clone(), engine);
    if let Some(handle) = spyglass_server::metrics::install_recorder() {
        server = server.with_metrics(handle);
    }

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!(addr = %listener.local_addr()?, "spyglass listening");

    axum::serve(listener, server.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
