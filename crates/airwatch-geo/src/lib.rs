//! Geospatial views over the Airwatch anomaly stream.
//!
//! Everything here is a pure function of its inputs: no I/O, no clocks, no
//! shared state. The live views in `airwatch-core` call into this crate on
//! snapshots taken from the event store.
//!
//! # Modules
//!
//! - [`distance`] -- Haversine great-circle distance on a 6371 km sphere
//! - [`radius`] -- Selection of events within a radius of an observer
//! - [`density`] -- Per-cell event counts over a bounding box, plus the
//!   remote `"lat_lon"` key convention
//! - [`error`] -- Error types for geometric and density inputs

pub mod density;
pub mod distance;
pub mod error;
pub mod radius;

pub use density::{
    DEFAULT_CELL_SIZE_DEG, DensityIndex, DensityMap, cell_key, check_resolution, compute,
};
pub use distance::{CoordinateExt, EARTH_RADIUS_KM, distance_km};
pub use error::{DensityError, GeometryError};
pub use radius::{DEFAULT_RADIUS_KM, RadiusFilter, filter, scope};
