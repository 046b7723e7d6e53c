//! Observer API server for the Airwatch anomaly stream.
//!
//! This crate provides an Axum HTTP server that exposes the
//! [`QueryGateway`](airwatch_core::QueryGateway) to rendering clients:
//!
//! - **REST endpoints** for time-range, location, and density queries,
//!   plus merger session status
//! - **`WebSocket` endpoints** for replay-then-push anomaly delivery
//!   (`/ws/anomalies`) and live, debounced density (`/ws/density`)
//!
//! # Architecture
//!
//! Handlers never touch the event store directly. Every request goes
//! through the gateway, which validates arguments and answers from a
//! snapshot, so the observer never blocks ingestion. Errors are rendered
//! as `{"error": ..., "status": ...}` JSON bodies.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::ObserverError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::{ObserverHandle, StartupError, spawn_observer};
pub use state::{AppState, QueryDefaults, SessionReport, SessionView};
