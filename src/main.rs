//! Co-op Platformer Server - Authoritative multiplayer platformer server
//!
//! This is the main entry point for the game server. It handles:
//! - WebSocket connections for room membership, input and state updates
//! - HTTP endpoints for health and the level catalog
//! - Serving the browser client when a static directory is configured

mod app;
mod config;
mod game;
mod http;
mod util;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::game::LevelCatalog;
use crate::http::build_router;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Co-op Platformer Server");
    info!("Server address: {}", config.server_addr);
    info!(
        tick_rate = config.rooms.game.tick_rate,
        snapshot_interval_ticks = config.rooms.snapshot_interval_ticks,
        default_capacity = config.rooms.default_capacity,
        max_players_per_room = config.rooms.max_players_per_room,
        "Room settings"
    );

    let catalog = load_catalog(&config)?;
    if catalog.is_empty() {
        warn!("Level catalog is empty, rooms will load empty levels");
    }
    info!(levels = catalog.len(), "Level catalog loaded");

    // Create application state
    let state = AppState::new(config.clone(), Arc::new(catalog));

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Levels from `LEVELS_PATH`, or the built-in set
fn load_catalog(config: &Config) -> anyhow::Result<LevelCatalog> {
    match &config.levels_path {
        Some(path) => LevelCatalog::from_path(path)
            .with_context(|| format!("loading levels from {}", path.display())),
        None => LevelCatalog::builtin().context("loading built-in levels"),
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
