//! Serpent - multiplayer snake game server binary.

use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Serpent Arena Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration: explicit path argument, else ./config.toml
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            server::Config::load_from(&path)?
        }
        None => server::Config::load()?,
    };
    let (cols, rows) = config.grid.dimensions();
    info!("Loaded configuration");
    info!("  Name: {}", config.server.name);
    info!("  Port: {}", config.server.port);
    info!("  Grid: {}x{} ({} portals)", cols, rows, config.portals.len());
    info!("  Tick: {}ms", config.server.tick_interval_ms);
    info!(
        "  Apples: {} (ttl {})",
        config.apple.target_count,
        if config.apple.ttl_enabled { config.apple.lifetime_ticks.to_string() } else { "off".to_string() }
    );
    info!(
        "  Boost cooldown: {}",
        if config.boost.cooldown_enabled { config.boost.cooldown_ticks.to_string() } else { "off".to_string() }
    );

    server::run(config).await?;

    Ok(())
}
