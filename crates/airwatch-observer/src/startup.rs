//! Observer server startup helper for embedding in the engine.
//!
//! Provides [`spawn_observer`] which binds the listen address eagerly and
//! then serves on a background Tokio task, so bind failures surface to the
//! caller instead of inside the task.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError, bind, serve};
use crate::state::AppState;

/// Errors that can occur when spawning the Observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// A running Observer server.
#[derive(Debug)]
pub struct ObserverHandle {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ObserverHandle {
    /// The bound address (useful with port `0`).
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server task to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Observer server task failed");
        }
    }
}

/// Bind `config` and serve on a background task until `shutdown` turns
/// `true` or its sender is dropped.
pub async fn spawn_observer(
    config: &ServerConfig,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<ObserverHandle, StartupError> {
    let listener = bind(config).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("no local address: {e}")))?;

    let signal = async move {
        // A dropped sender also ends the server.
        let _ = shutdown.wait_for(|stop| *stop).await;
    };
    let task = tokio::spawn(async move {
        if let Err(e) = serve(listener, state, signal).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(%addr, "Observer server spawned on background task");
    Ok(ObserverHandle { addr, task })
}
