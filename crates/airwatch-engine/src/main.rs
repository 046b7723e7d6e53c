//! Engine binary for Airwatch.
//!
//! Wires the feeds, the stream merger, and the observer server together
//! from configuration, then runs until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `airwatch-config.yaml` (or the path given
//!    as the first argument), applying environment overrides
//! 2. Initialize structured logging (tracing)
//! 3. Create the event store
//! 4. Build the HTTP backfill and the configured live transport
//! 5. Start the merger session over the backfill window
//! 6. Start the Observer API server over the query gateway
//! 7. Log session notices until `Ctrl-C`, then stop everything

mod error;
mod logging;
mod session;

use std::path::PathBuf;
use std::sync::Arc;

use airwatch_core::{AirwatchConfig, QueryGateway, StreamMerger};
use airwatch_feeds::{HttpBackfill, LiveFeed};
use airwatch_observer::{AppState, QueryDefaults, ServerConfig, SessionView, spawn_observer};
use airwatch_store::EventStore;
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::EngineError;

/// Config file looked up in the working directory when no path is given.
const DEFAULT_CONFIG_PATH: &str = "airwatch-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    logging::init(&config.logging)?;
    info!("airwatch-engine starting");
    info!(
        backfill_url = %config.feeds.backfill_url,
        live_url = %config.feeds.live_url,
        live_transport = ?config.feeds.live_transport,
        backfill_window_minutes = config.backfill.window_minutes,
        "Configuration loaded"
    );

    // 3. Create the event store.
    let store = Arc::new(EventStore::with_capacity(config.store.broadcast_capacity).map_err(EngineError::from)?);

    // 4. Build feed transports.
    let backfill = Arc::new(
        HttpBackfill::new(&config.feeds.backfill_url, config.feeds.request_timeout()).map_err(EngineError::from)?,
    );
    let live = LiveFeed::from_config(&config.feeds, &backfill).map_err(EngineError::from)?;
    info!(transport = live.name(), endpoint = %backfill.endpoint(), "Feed transports ready");

    // 5. Start the merger session.
    let policy = config.reconnect.policy().map_err(EngineError::from)?;
    let merger = StreamMerger::new(Arc::clone(&store), HttpBackfill::clone(&backfill), live, policy);
    let handle = merger
        .start(config.backfill.window(), None, None)
        .await
        .map_err(EngineError::from)?;
    info!(session = %handle.id(), "Merger session started");

    // 6. Start the Observer API server.
    let gateway = QueryGateway::new(Arc::clone(&store)).with_density_debounce(config.density.debounce());
    let app_state = AppState::new(gateway, QueryDefaults::from_config(&config))
        .with_session(SessionView::new(handle.watch_status(), handle.counters()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let observer = spawn_observer(
        &ServerConfig::from_config(&config.observer),
        Arc::new(app_state),
        shutdown_rx,
    )
    .await
    .map_err(EngineError::from)?;
    info!(addr = %observer.local_addr(), "Observer API server started");

    // 7. Run until Ctrl-C.
    session::supervise(handle, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C, shutting down");
        }
        info!("shutdown requested");
    })
    .await;

    shutdown_tx.send_replace(true);
    observer.join().await;

    info!(events = store.len().await, "airwatch-engine shutdown complete");
    Ok(())
}

/// Load configuration from the first argument or `airwatch-config.yaml`.
///
/// A missing default file yields the built-in defaults; a missing file
/// named explicitly is an error.
fn load_config() -> Result<AirwatchConfig, EngineError> {
    let explicit = std::env::args_os().nth(1).map(PathBuf::from);
    let path = explicit.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if explicit.is_none() && !path.exists() {
        let mut config = AirwatchConfig::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        return Ok(config);
    }
    Ok(AirwatchConfig::from_file(&path)?)
}
