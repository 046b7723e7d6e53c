//! Geographic primitives: coordinates, bounding boxes, and grid cell keys.
//!
//! These are plain value types. Distance math and grid bucketing live in
//! `airwatch-geo`; this module only guarantees that a [`BoundingBox`] is
//! well-formed once constructed.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A point on the Earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Coordinate {
    /// Latitude in degrees, `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in degrees, `[-180, 180]`.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate without validation.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Both components are finite numbers.
    pub const fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Both components are finite and inside the valid degree ranges.
    pub fn is_in_range(&self) -> bool {
        self.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Reasons a bounding box can be rejected at construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoundsError {
    /// One of the four edges is `NaN` or infinite.
    #[error("bounding box edges must be finite")]
    NonFinite,

    /// The minimum edge lies past the maximum edge on one axis.
    #[error("bounding box {axis} range is inverted: min {min} > max {max}")]
    Inverted {
        /// `"latitude"` or `"longitude"`.
        axis: &'static str,
        /// The supplied minimum.
        min: f64,
        /// The supplied maximum.
        max: f64,
    },
}

/// An axis-aligned latitude/longitude rectangle.
///
/// Invariants: all edges finite, `min_lat <= max_lat`, `min_lon <= max_lon`.
/// Degenerate boxes (`min == max`) are valid and describe a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawBounds")]
pub struct BoundingBox {
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
}

/// Unchecked wire shape used to route deserialization through [`BoundingBox::new`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBounds {
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
}

impl TryFrom<RawBounds> for BoundingBox {
    type Error = BoundsError;

    fn try_from(raw: RawBounds) -> Result<Self, Self::Error> {
        Self::new(raw.min_lat, raw.min_lon, raw.max_lat, raw.max_lon)
    }
}

impl BoundingBox {
    /// Build a bounding box, rejecting non-finite or inverted edges.
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Result<Self, BoundsError> {
        if ![min_lat, min_lon, max_lat, max_lon]
            .iter()
            .all(|edge| edge.is_finite())
        {
            return Err(BoundsError::NonFinite);
        }
        if min_lat > max_lat {
            return Err(BoundsError::Inverted {
                axis: "latitude",
                min: min_lat,
                max: max_lat,
            });
        }
        if min_lon > max_lon {
            return Err(BoundsError::Inverted {
                axis: "longitude",
                min: min_lon,
                max: max_lon,
            });
        }
        Ok(Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        })
    }

    /// Southern edge.
    pub const fn min_lat(&self) -> f64 {
        self.min_lat
    }

    /// Western edge.
    pub const fn min_lon(&self) -> f64 {
        self.min_lon
    }

    /// Northern edge.
    pub const fn max_lat(&self) -> f64 {
        self.max_lat
    }

    /// Eastern edge.
    pub const fn max_lon(&self) -> f64 {
        self.max_lon
    }

    /// Latitude extent in degrees (zero for a degenerate box).
    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Longitude extent in degrees (zero for a degenerate box).
    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Whether `point` lies inside the box. All four edges are inclusive.
    pub fn contains(&self, point: &Coordinate) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.latitude)
            && (self.min_lon..=self.max_lon).contains(&point.longitude)
    }
}

/// Key of one density grid cell relative to a bounding box origin.
///
/// `row` counts cells northward from `min_lat`, `col` counts cells eastward
/// from `min_lon`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub struct GridCellKey {
    /// Cell index along the latitude axis.
    pub row: u32,
    /// Cell index along the longitude axis.
    pub col: u32,
}

impl GridCellKey {
    /// Create a key from its row and column.
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl core::fmt::Display for GridCellKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}
