//! Coin cache service entry point
//!
//! Startup sequence:
//! 1. Load .env and initialize logging
//! 2. Load config.yaml (defaults if absent) and apply env overrides
//! 3. Open the SQLite store
//! 4. Start Prohibitor, Trader, Miner on a shared event bus
//! 5. Serve the read API
//! 6. Ctrl+C graceful shutdown

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use coin_cache::adapters::{CoinService, UpbitService};
use coin_cache::config::{self, constants};
use coin_cache::core::{CoinQueryService, EventBus, Miner, Prohibitor, Trader};
use coin_cache::server::{self, AppState};
use coin_cache::storage::{CoinRepository, KvRepository, SqliteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenvy::dotenv().ok();
    config::init_logging();

    info!("=== Coin Cache ===");

    // 1. Configuration
    let config_path = constants::config_path();
    let mut config = match config::load_config_or_default(&config_path) {
        Ok((cfg, true)) => {
            info!(path = %config_path.display(), "Config loaded");
            cfg
        }
        Ok((cfg, false)) => {
            warn!(path = %config_path.display(), "Config file not found, using defaults");
            cfg
        }
        Err(e) => {
            error!(error = %e, "Configuration failed");
            std::process::exit(1);
        }
    };
    if let Some(path) = constants::store_path_override() {
        config.store.path = path;
    }
    if let Some(port) = constants::api_port_override() {
        config.api.port = port;
    }

    // 2. Collaborators
    let store = SqliteStore::open(&config.store.path)
        .with_context(|| format!("opening store at {}", config.store.path))?;
    let repo: Arc<dyn CoinRepository> = Arc::new(KvRepository::new(store));
    let service: Arc<dyn CoinService> = Arc::new(UpbitService::new(config.service.clone())?);
    let bus = Arc::new(EventBus::new());

    // 3. Components, bans first so the other two never act on stale ban state
    let schedule = &config.schedule;
    let prohibitor = Prohibitor::new(repo.clone(), bus.clone());
    prohibitor.start(schedule.ban_sweep_interval()).await?;

    let trader = Trader::new(service.clone(), repo.clone(), bus.clone(), schedule.refresh_interval())?;
    trader.start();

    let miner = Miner::new(service, repo.clone(), bus);
    miner.start(schedule.reconcile_interval()).await?;

    // 4. Read API
    let server_handle = if config.api.enabled {
        let state = AppState {
            queries: CoinQueryService::new(repo),
        };
        let port = config.api.port;
        Some(tokio::spawn(async move {
            if let Err(e) = server::start_server(state, port).await {
                error!(error = %e, "Read API server failed");
            }
        }))
    } else {
        info!("Read API disabled");
        None
    };

    // 5. Wait for Ctrl+C, then stop ticking producers first
    info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let timeout = schedule.shutdown_timeout();
    if let Err(e) = miner.stop(timeout).await {
        warn!(error = %e, "Miner did not stop cleanly");
    }
    if let Err(e) = trader.stop(timeout).await {
        warn!(error = %e, "Trader did not stop cleanly");
    }
    if let Err(e) = prohibitor.stop(timeout).await {
        warn!(error = %e, "Prohibitor did not stop cleanly");
    }
    if let Some(handle) = server_handle {
        handle.abort();
    }

    info!("=== Shutdown complete ===");
    Ok(())
}
