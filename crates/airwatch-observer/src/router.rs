//! Axum router construction for the Observer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS enabled for the map frontend and request tracing.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the Observer server.
///
/// The router includes:
/// - `GET /api/anomalies/timerange` -- events in a time range
/// - `GET /api/anomalies/recent` -- events in the recent window
/// - `GET /api/anomalies/location` -- events near a point
/// - `GET /api/anomalies/density` -- density grid over a box
/// - `GET /api/status` -- store and session state
/// - `GET /ws/anomalies` -- replay-then-push event stream
/// - `GET /ws/density` -- live density stream
///
/// CORS allows any origin; the frontend is served from a different port.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // REST API
        .route("/api/anomalies/timerange", get(handlers::timerange))
        .route("/api/anomalies/recent", get(handlers::recent))
        .route("/api/anomalies/location", get(handlers::location))
        .route("/api/anomalies/density", get(handlers::density))
        .route("/api/status", get(handlers::status))
        // WebSocket
        .route("/ws/anomalies", get(ws::ws_anomalies))
        .route("/ws/density", get(ws::ws_density))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
