//! REST API endpoint handlers for the Observer server.
//!
//! All handlers read through the [`QueryGateway`](airwatch_core::QueryGateway)
//! held in [`AppState`]. Query parameters arrive as raw strings and are
//! parsed here so that malformed input yields the JSON error body rather
//! than Axum's plain-text rejection.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/anomalies/timerange?start&end` | Events in an RFC 3339 range |
//! | `GET` | `/api/anomalies/recent` | Events in the configured recent window |
//! | `GET` | `/api/anomalies/location?lat&lon[&radius]` | Events near a point |
//! | `GET` | `/api/anomalies/density?minLat&minLon&maxLat&maxLon[&cellSize][&format]` | Density grid |
//! | `GET` | `/api/status` | Store size and merger session state |

use std::collections::BTreeMap;
use std::sync::Arc;

use airwatch_core::DensityView;
use airwatch_geo::DensityIndex;
use airwatch_types::{AnomalyEvent, BoundingBox, Coordinate};
use axum::Json;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ObserverError;
use crate::state::{AppState, SessionReport};

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/anomalies/timerange`.
#[derive(Debug, Default, Deserialize)]
pub struct TimeRangeQuery {
    /// Range start, RFC 3339.
    pub start: Option<String>,
    /// Range end, RFC 3339.
    pub end: Option<String>,
}

/// Query parameters for `GET /api/anomalies/location` and `/ws/anomalies`.
#[derive(Debug, Default, Deserialize)]
pub struct LocationQuery {
    /// Observer latitude.
    pub lat: Option<String>,
    /// Observer longitude.
    pub lon: Option<String>,
    /// Radius in kilometres.
    pub radius: Option<String>,
}

/// Query parameters for `GET /api/anomalies/density` and `/ws/density`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DensityQuery {
    /// Southern edge.
    pub min_lat: Option<String>,
    /// Western edge.
    pub min_lon: Option<String>,
    /// Northern edge.
    pub max_lat: Option<String>,
    /// Eastern edge.
    pub max_lon: Option<String>,
    /// Cell size in degrees.
    pub cell_size: Option<String>,
    /// `remote` for the flat `"lat_lon" -> count` mapping.
    pub format: Option<String>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

/// One non-empty density cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensityCell {
    /// Cell row, northward from the box's southern edge.
    pub row: u32,
    /// Cell column, eastward from the box's western edge.
    pub col: u32,
    /// Latitude of the cell's south-west corner.
    pub latitude: f64,
    /// Longitude of the cell's south-west corner.
    pub longitude: f64,
    /// Events in the cell.
    pub count: u64,
}

/// A density grid as served to rendering clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DensityBody {
    /// The box the grid covers.
    pub bounds: BoundingBox,
    /// Cell size in degrees.
    pub cell_size: f64,
    /// Events inside the box.
    pub total: u64,
    /// Non-empty cells, row-major.
    pub cells: Vec<DensityCell>,
}

impl From<&DensityIndex> for DensityBody {
    fn from(index: &DensityIndex) -> Self {
        let cells = index
            .counts()
            .iter()
            .map(|(&key, &count)| {
                let origin = index.cell_origin(key);
                DensityCell {
                    row: key.row,
                    col: key.col,
                    latitude: origin.latitude,
                    longitude: origin.longitude,
                    count,
                }
            })
            .collect();
        Self {
            bounds: index.bounds(),
            cell_size: index.cell_size_deg(),
            total: index.total(),
            cells,
        }
    }
}

/// A live density update pushed over `/ws/density`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensityUpdate {
    /// Box-change rebuilds so far.
    pub generation: u64,
    /// Highest admission sequence reflected.
    pub watermark: u64,
    /// The grid.
    pub density: DensityBody,
}

impl From<&DensityView> for DensityUpdate {
    fn from(view: &DensityView) -> Self {
        Self {
            generation: view.generation,
            watermark: view.watermark,
            density: DensityBody::from(&view.index),
        }
    }
}

/// Body of `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBody {
    /// Events held by the store.
    pub events: usize,
    /// Admissions so far.
    pub watermark: u64,
    /// The attached merger session, if any.
    pub session: Option<SessionReport>,
}

// ---------------------------------------------------------------------------
// GET /api/anomalies/timerange
// ---------------------------------------------------------------------------

/// Events with `start <= time <= end`, oldest first.
pub async fn timerange(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TimeRangeQuery>,
) -> Result<Json<Vec<AnomalyEvent>>, ObserverError> {
    let (Some(start), Some(end)) = (params.start.as_deref(), params.end.as_deref()) else {
        return Err(ObserverError::InvalidQuery(
            "missing required query parameters: start, end".to_owned(),
        ));
    };
    let start = parse_time("start", start)?;
    let end = parse_time("end", end)?;

    let snapshot = state.gateway.time_range(start, end).await?;
    Ok(Json(owned(snapshot.iter())))
}

// ---------------------------------------------------------------------------
// GET /api/anomalies/recent
// ---------------------------------------------------------------------------

/// Events from the configured recent window, oldest first.
pub async fn recent(State(state): State<Arc<AppState>>) -> Result<Json<Vec<AnomalyEvent>>, ObserverError> {
    let snapshot = state.gateway.recent(state.defaults.recent_window).await?;
    Ok(Json(owned(snapshot.iter())))
}

// ---------------------------------------------------------------------------
// GET /api/anomalies/location
// ---------------------------------------------------------------------------

/// Events within `radius` km of (`lat`, `lon`), oldest first.
///
/// `radius` falls back to the configured default.
pub async fn location(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LocationQuery>,
) -> Result<Json<Vec<AnomalyEvent>>, ObserverError> {
    let (Some(lat), Some(lon)) = (params.lat.as_deref(), params.lon.as_deref()) else {
        return Err(ObserverError::InvalidQuery(
            "missing required query parameters: lat, lon".to_owned(),
        ));
    };
    let observer = Coordinate::new(parse_number("lat", lat)?, parse_number("lon", lon)?);
    let radius_km = optional_number("radius", params.radius.as_deref())?.unwrap_or(state.defaults.radius_km);

    let events = state.gateway.nearby(observer, radius_km).await?;
    Ok(Json(owned(events.iter())))
}

// ---------------------------------------------------------------------------
// GET /api/anomalies/density
// ---------------------------------------------------------------------------

/// Density of held events over a bounding box.
///
/// With `format=remote` the body is the flat `"lat_lon" -> count` mapping;
/// otherwise it is a [`DensityBody`].
pub async fn density(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DensityQuery>,
) -> Result<Response, ObserverError> {
    let bounds = parse_bounds(&params)?;
    let cell_size = optional_number("cellSize", params.cell_size.as_deref())?.unwrap_or(state.defaults.cell_size_deg);
    let remote = match params.format.as_deref() {
        None | Some("grid") => false,
        Some("remote") => true,
        Some(other) => {
            return Err(ObserverError::InvalidQuery(format!(
                "unknown format {other:?}, expected \"grid\" or \"remote\""
            )));
        }
    };

    let index = state.gateway.density(bounds, cell_size).await?;
    if remote {
        let keys: BTreeMap<String, u64> = index.to_remote_keys();
        Ok(Json(keys).into_response())
    } else {
        Ok(Json(DensityBody::from(&index)).into_response())
    }
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Store size and, when attached, the merger session's state.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusBody> {
    let store = state.gateway.store();
    Json(StatusBody {
        events: store.len().await,
        watermark: store.watermark().await,
        session: state.session.as_ref().map(crate::state::SessionView::report),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn owned<'a, I>(events: I) -> Vec<AnomalyEvent>
where
    I: IntoIterator<Item = &'a Arc<AnomalyEvent>>,
{
    events.into_iter().map(|event| AnomalyEvent::clone(event)).collect()
}

fn parse_time(name: &str, raw: &str) -> Result<DateTime<Utc>, ObserverError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ObserverError::InvalidQuery(format!("invalid {name} time {raw:?} (use RFC 3339): {e}")))
}

pub(crate) fn parse_number(name: &str, raw: &str) -> Result<f64, ObserverError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ObserverError::InvalidQuery(format!("invalid numeric value for {name}: {raw:?}")))
}

pub(crate) fn optional_number(name: &str, raw: Option<&str>) -> Result<Option<f64>, ObserverError> {
    raw.map(|raw| parse_number(name, raw)).transpose()
}

pub(crate) fn parse_bounds(params: &DensityQuery) -> Result<BoundingBox, ObserverError> {
    let (Some(min_lat), Some(min_lon), Some(max_lat), Some(max_lon)) = (
        params.min_lat.as_deref(),
        params.min_lon.as_deref(),
        params.max_lat.as_deref(),
        params.max_lon.as_deref(),
    ) else {
        return Err(ObserverError::InvalidQuery(
            "missing required query parameters: minLat, minLon, maxLat, maxLon".to_owned(),
        ));
    };
    let bounds = BoundingBox::new(
        parse_number("minLat", min_lat)?,
        parse_number("minLon", min_lon)?,
        parse_number("maxLat", max_lat)?,
        parse_number("maxLon", max_lon)?,
    )
    .map_err(airwatch_core::GatewayError::from)?;
    Ok(bounds)
}
