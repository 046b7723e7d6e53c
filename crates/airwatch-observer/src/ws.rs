//! `WebSocket` handlers for live anomaly and density streaming.
//!
//! | Route | Client sends | Server pushes |
//! |-------|--------------|---------------|
//! | `/ws/anomalies[?lat&lon&radius]` | nothing | held events, then one frame per admission |
//! | `/ws/density[?minLat..&cellSize]` | bounding boxes as JSON | a [`DensityUpdate`] per change |
//!
//! Query parameters are validated before the upgrade, so a bad request is
//! answered with the usual JSON error body and status 400. On `/ws/density`
//! an invalid box message is answered with an error frame and the
//! connection stays open.

use std::sync::Arc;

use airwatch_core::{DensityView, EventSubscription, GatewayError, LiveDensity};
use airwatch_geo::check_resolution;
use airwatch_types::{BoundingBox, ConsumerId, Coordinate};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ObserverError;
use crate::handlers::{DensityQuery, DensityUpdate, LocationQuery, optional_number, parse_bounds, parse_number};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// /ws/anomalies
// ---------------------------------------------------------------------------

/// Upgrade to an anomaly stream, optionally scoped to a radius.
///
/// `lat` and `lon` must be given together. A `radius` alone is centred on
/// the configured default observer; a position alone uses the default
/// radius.
///
/// # Route
///
/// `GET /ws/anomalies`
pub async fn ws_anomalies(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<LocationQuery>,
) -> Result<Response, ObserverError> {
    let position = match (params.lat.as_deref(), params.lon.as_deref()) {
        (Some(lat), Some(lon)) => Some(Coordinate::new(parse_number("lat", lat)?, parse_number("lon", lon)?)),
        (None, None) => None,
        _ => {
            return Err(ObserverError::InvalidQuery(
                "lat and lon must be given together".to_owned(),
            ));
        }
    };
    let radius_km = optional_number("radius", params.radius.as_deref())?;
    let observer = match (position, radius_km) {
        (None, Some(_)) => Some(state.defaults.observer),
        (position, _) => position,
    };

    let subscription = state.gateway.subscribe(observer, radius_km).await?;
    Ok(ws.on_upgrade(move |socket| stream_anomalies(socket, subscription)))
}

/// Forward each subscription event as a JSON text frame until either side
/// goes away.
async fn stream_anomalies(mut socket: WebSocket, mut subscription: EventSubscription) {
    let consumer = ConsumerId::new();
    debug!(%consumer, replay = subscription.pending_replay(), "anomaly stream client connected");

    loop {
        tokio::select! {
            event = subscription.next() => {
                let Some(event) = event else {
                    debug!(%consumer, "event store closed, ending anomaly stream");
                    break;
                };
                if !send_json(&mut socket, &*event).await {
                    break;
                }
            }
            msg = socket.recv() => {
                if !keep_open(&mut socket, msg).await {
                    break;
                }
            }
        }
    }

    if subscription.lagged() > 0 {
        warn!(%consumer, missed = subscription.lagged(), "anomaly stream client fell behind");
    }
    debug!(%consumer, "anomaly stream client disconnected");
}

// ---------------------------------------------------------------------------
// /ws/density
// ---------------------------------------------------------------------------

/// Upgrade to a live density stream.
///
/// The initial box may be given as query parameters; otherwise the first
/// box message from the client starts the view. Every later box message
/// moves it, debounced on the server.
///
/// # Route
///
/// `GET /ws/density`
pub async fn ws_density(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<DensityQuery>,
) -> Result<Response, ObserverError> {
    let cell_size = optional_number("cellSize", params.cell_size.as_deref())?.unwrap_or(state.defaults.cell_size_deg);
    check_resolution(cell_size).map_err(GatewayError::from)?;

    let any_edge = params.min_lat.is_some()
        || params.min_lon.is_some()
        || params.max_lat.is_some()
        || params.max_lon.is_some();
    let initial = if any_edge { Some(parse_bounds(&params)?) } else { None };

    Ok(ws.on_upgrade(move |socket| stream_density(socket, state, initial, cell_size)))
}

async fn stream_density(mut socket: WebSocket, state: Arc<AppState>, initial: Option<BoundingBox>, cell_size: f64) {
    let consumer = ConsumerId::new();
    debug!(%consumer, cell_size, "density stream client connected");

    let mut live: Option<LiveDensity> = None;
    if let Some(bounds) = initial {
        live = open_view(&mut socket, &state, bounds, cell_size).await;
    }

    loop {
        tokio::select! {
            view = next_view(&mut live) => {
                let Some(view) = view else {
                    debug!(%consumer, "density view stopped");
                    break;
                };
                if !send_json(&mut socket, &DensityUpdate::from(&view)).await {
                    break;
                }
            }
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<BoundingBox>(text.as_str()) {
                    Ok(bounds) => match &live {
                        Some(view) => {
                            if !view.set_bounds(bounds).await {
                                break;
                            }
                        }
                        None => live = open_view(&mut socket, &state, bounds, cell_size).await,
                    },
                    Err(e) => {
                        let reason = format!("invalid bounding box: {e}");
                        if !send_error(&mut socket, &reason).await {
                            break;
                        }
                    }
                },
                other => {
                    if !keep_open(&mut socket, other).await {
                        break;
                    }
                }
            },
        }
    }

    if let Some(view) = live {
        view.stop().await;
    }
    debug!(%consumer, "density stream client disconnected");
}

/// Start a view and push its initial state. `None` if the start failed.
async fn open_view(
    socket: &mut WebSocket,
    state: &AppState,
    bounds: BoundingBox,
    cell_size: f64,
) -> Option<LiveDensity> {
    match state.gateway.watch_density(bounds, cell_size).await {
        Ok(view) => {
            send_json(socket, &DensityUpdate::from(&view.current())).await;
            Some(view)
        }
        Err(e) => {
            send_error(socket, &e.to_string()).await;
            None
        }
    }
}

/// The next published view, or never if no view is open yet.
async fn next_view(live: &mut Option<LiveDensity>) -> Option<DensityView> {
    match live {
        Some(view) => view.changed().await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Serialize and send one text frame. `false` once the client is gone.
async fn send_json<T: Serialize + ?Sized>(socket: &mut WebSocket, value: &T) -> bool {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "failed to serialize frame");
            return true;
        }
    };
    if socket.send(Message::Text(json.into())).await.is_err() {
        debug!("WebSocket client disconnected (send failed)");
        return false;
    }
    true
}

async fn send_error(socket: &mut WebSocket, reason: &str) -> bool {
    send_json(socket, &serde_json::json!({ "error": reason, "status": 400 })).await
}

/// Handle a client frame that carries no request. `false` to end the stream.
async fn keep_open(socket: &mut WebSocket, msg: Option<Result<Message, axum::Error>>) -> bool {
    match msg {
        Some(Ok(Message::Close(_))) | None => false,
        Some(Ok(Message::Ping(data))) => socket.send(Message::Pong(data)).await.is_ok(),
        Some(Err(e)) => {
            debug!(error = %e, "WebSocket error");
            false
        }
        // Clients of this stream have nothing to say.
        Some(Ok(_)) => true,
    }
}
