//! The anomaly event record and its deduplication identity.
//!
//! [`AnomalyEvent`] is immutable once constructed: every constructor path
//! (direct, serde, raw JSON validation) enforces the same invariants, so a
//! value of this type is always admissible to the event store.
//!
//! On the wire an event is the flat JSON object produced by the upstream
//! anomaly processor:
//!
//! ```json
//! {"parameter":"pm25","value":81.2,"time":"2025-04-01T10:00:00Z",
//!  "latitude":41.01,"longitude":29.02,"description":"spike"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::geometry::Coordinate;
use crate::validation::ValidationError;

/// Wire representation of an anomaly event.
///
/// This is the unchecked shape exchanged with feeds and rendering surfaces.
/// Convert into [`AnomalyEvent`] with [`TryFrom`] to enforce invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AnomalyRecord {
    /// Measured parameter name (e.g. `pm25`, `no2`).
    pub parameter: String,
    /// Measured value.
    pub value: f64,
    /// Observation instant (RFC 3339 on the wire).
    pub time: DateTime<Utc>,
    /// Latitude of the sensor, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Longitude of the sensor, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Human-readable reason the value was classified as anomalous.
    #[serde(default)]
    pub description: String,
}

/// A validated, immutable anomaly event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "AnomalyRecord", try_from = "AnomalyRecord")]
pub struct AnomalyEvent {
    parameter: String,
    value: f64,
    timestamp: DateTime<Utc>,
    location: Option<Coordinate>,
    description: String,
}

impl AnomalyEvent {
    /// Build an event, enforcing the record invariants.
    ///
    /// - `parameter` must contain a non-whitespace character
    /// - `value` must be finite
    /// - `location`, when present, must be finite and within degree ranges
    pub fn new(
        parameter: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
        location: Option<Coordinate>,
        description: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let parameter = parameter.into();
        if parameter.trim().is_empty() {
            return Err(ValidationError::EmptyParameter);
        }
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue);
        }
        if let Some(point) = location {
            if !point.is_in_range() {
                return Err(ValidationError::CoordinateOutOfRange {
                    latitude: point.latitude,
                    longitude: point.longitude,
                });
            }
        }
        Ok(Self {
            parameter,
            value,
            timestamp,
            location,
            description: description.into(),
        })
    }

    /// Measured parameter name.
    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    /// Measured value.
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Observation instant.
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Sensor position, if the record carried one.
    pub const fn location(&self) -> Option<Coordinate> {
        self.location
    }

    /// Classification description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The deduplication identity of this event.
    pub fn identity(&self) -> EventIdentity {
        EventIdentity {
            parameter: self.parameter.clone(),
            timestamp: self.timestamp,
            latitude_bits: self.location.map(|p| coordinate_bits(p.latitude)),
            longitude_bits: self.location.map(|p| coordinate_bits(p.longitude)),
        }
    }
}

// Lets views accept owned events, references, and `Arc`s alike.
impl AsRef<Self> for AnomalyEvent {
    fn as_ref(&self) -> &Self {
        self
    }
}

impl TryFrom<AnomalyRecord> for AnomalyEvent {
    type Error = ValidationError;

    fn try_from(record: AnomalyRecord) -> Result<Self, Self::Error> {
        let location = match (record.latitude, record.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinate::new(latitude, longitude)),
            (None, None) => None,
            _ => return Err(ValidationError::PartialCoordinates),
        };
        Self::new(
            record.parameter,
            record.value,
            record.time,
            location,
            record.description,
        )
    }
}

impl From<AnomalyEvent> for AnomalyRecord {
    fn from(event: AnomalyEvent) -> Self {
        Self {
            parameter: event.parameter,
            value: event.value,
            time: event.timestamp,
            latitude: event.location.map(|p| p.latitude),
            longitude: event.location.map(|p| p.longitude),
            description: event.description,
        }
    }
}

/// The tuple two deliveries must share to be the same occurrence:
/// `(parameter, timestamp, latitude, longitude)`.
///
/// Coordinates are compared by bit pattern so the identity is `Eq + Hash`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventIdentity {
    parameter: String,
    timestamp: DateTime<Utc>,
    latitude_bits: Option<u64>,
    longitude_bits: Option<u64>,
}

/// Bit pattern of a coordinate component with `-0.0` folded into `0.0`.
fn coordinate_bits(component: f64) -> u64 {
    // -0.0 + 0.0 == +0.0 under round-to-nearest.
    (component + 0.0).to_bits()
}
