//! Selection of events within a geodesic radius of an observer.
//!
//! [`RadiusFilter`] is validated once and then applied to any number of
//! events. It holds no events itself: callers pass a snapshot and re-run the
//! filter when the store reports new admissions.

use airwatch_types::{AnomalyEvent, Coordinate};

use crate::distance::distance_km;
use crate::error::GeometryError;

/// Radius applied when an observer position is given without one.
pub const DEFAULT_RADIUS_KM: f64 = 25.0;

/// A validated observer position and search radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusFilter {
    observer: Coordinate,
    radius_km: f64,
}

impl RadiusFilter {
    /// Validate the observer and radius.
    ///
    /// # Errors
    ///
    /// - [`GeometryError::NonFinite`] if the observer has a non-finite component
    /// - [`GeometryError::InvalidRadius`] if the radius is negative or non-finite
    pub fn new(observer: Coordinate, radius_km: f64) -> Result<Self, GeometryError> {
        if !observer.is_finite() {
            return Err(GeometryError::NonFinite);
        }
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(GeometryError::InvalidRadius(radius_km));
        }
        Ok(Self {
            observer,
            radius_km,
        })
    }

    /// The observer position.
    pub const fn observer(&self) -> Coordinate {
        self.observer
    }

    /// The search radius in kilometres.
    pub const fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /// Whether `event` carries a location within the radius (inclusive).
    ///
    /// Events without coordinates never match.
    pub fn matches(&self, event: &AnomalyEvent) -> bool {
        event.location().is_some_and(|point| {
            distance_km(
                self.observer.latitude,
                self.observer.longitude,
                point.latitude,
                point.longitude,
            )
            .is_ok_and(|d| d <= self.radius_km)
        })
    }

    /// Keep the matching events, preserving input order.
    pub fn apply<I>(&self, events: I) -> Vec<I::Item>
    where
        I: IntoIterator,
        I::Item: AsRef<AnomalyEvent>,
    {
        events
            .into_iter()
            .filter(|e| self.matches(e.as_ref()))
            .collect()
    }
}

/// Build an optional filter from optional scope arguments.
///
/// | observer | radius | result |
/// |----------|--------|--------|
/// | none | none | `None` (unscoped) |
/// | some | none | filter with [`DEFAULT_RADIUS_KM`] |
/// | some | some | filter |
/// | none | some | [`GeometryError::MissingObserver`] |
pub fn scope(observer: Option<Coordinate>, radius_km: Option<f64>) -> Result<Option<RadiusFilter>, GeometryError> {
    match (observer, radius_km) {
        (None, None) => Ok(None),
        (None, Some(_)) => Err(GeometryError::MissingObserver),
        (Some(point), radius) => RadiusFilter::new(point, radius.unwrap_or(DEFAULT_RADIUS_KM)).map(Some),
    }
}

/// One-shot form of [`RadiusFilter::apply`].
///
/// # Errors
///
/// Fails only when the observer or radius is invalid; events lacking
/// coordinates are dropped, not reported.
pub fn filter<I>(events: I, observer: Coordinate, radius_km: f64) -> Result<Vec<I::Item>, GeometryError>
where
    I: IntoIterator,
    I::Item: AsRef<AnomalyEvent>,
{
    Ok(RadiusFilter::new(observer, radius_km)?.apply(events))
}
