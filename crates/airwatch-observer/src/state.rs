//! Shared application state for the Observer API server.
//!
//! [`AppState`] holds the query gateway every handler reads through, the
//! defaults applied when a request omits optional parameters, and, when a
//! merger session is running, a view of its status and counters.

use std::sync::Arc;
use std::time::Duration;

use airwatch_core::{AirwatchConfig, CounterSnapshot, MergerCounters, MergerStatus, QueryGateway};
use airwatch_types::Coordinate;
use serde::Serialize;
use tokio::sync::watch;

/// Values used when a request leaves a parameter out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryDefaults {
    /// Observer position for `/ws/anomalies` when only a radius is given.
    pub observer: Coordinate,
    /// Radius for location queries without `radius`.
    pub radius_km: f64,
    /// Window of `/api/anomalies/recent`.
    pub recent_window: Duration,
    /// Cell size for density queries without `cellSize`.
    pub cell_size_deg: f64,
}

impl QueryDefaults {
    /// Defaults taken from the `observer` and `density` config sections.
    pub const fn from_config(config: &AirwatchConfig) -> Self {
        Self {
            observer: config.observer.default_observer(),
            radius_km: config.observer.default_radius_km,
            recent_window: config.observer.recent_window(),
            cell_size_deg: config.density.cell_size_deg,
        }
    }
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self::from_config(&AirwatchConfig::default())
    }
}

/// Read side of a running merger session.
#[derive(Debug, Clone)]
pub struct SessionView {
    status: watch::Receiver<MergerStatus>,
    counters: Arc<MergerCounters>,
}

impl SessionView {
    /// Wrap a session's status receiver and counters.
    pub const fn new(status: watch::Receiver<MergerStatus>, counters: Arc<MergerCounters>) -> Self {
        Self { status, counters }
    }

    /// The session's state right now.
    pub fn report(&self) -> SessionReport {
        SessionReport {
            status: self.status.borrow().clone(),
            counters: self.counters.snapshot(),
        }
    }
}

/// JSON body of a session's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Backfill and live feed states.
    pub status: MergerStatus,
    /// Admission counters.
    pub counters: CounterSnapshot,
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Read surface over the session store.
    pub gateway: QueryGateway,
    /// Parameter defaults.
    pub defaults: QueryDefaults,
    /// The merger session feeding the store, if one is attached.
    pub session: Option<SessionView>,
}

impl AppState {
    /// State without an attached session.
    pub const fn new(gateway: QueryGateway, defaults: QueryDefaults) -> Self {
        Self {
            gateway,
            defaults,
            session: None,
        }
    }

    /// Attach a running session's status view.
    #[must_use]
    pub fn with_session(mut self, session: SessionView) -> Self {
        self.session = Some(session);
        self
    }
}
