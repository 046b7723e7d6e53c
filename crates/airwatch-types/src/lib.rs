//! Shared type definitions for the Airwatch anomaly stream.
//!
//! This crate is the single source of truth for the values that flow between
//! feeds, the event store, the geospatial views, and the observer surface.
//! Wire types are exported to `TypeScript` via `ts-rs` for the map frontend.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for sessions and consumers
//! - [`geometry`] -- Coordinates, bounding boxes, and grid cell keys
//! - [`event`] -- The anomaly event record and its deduplication identity
//! - [`validation`] -- Schema validation of raw feed records

pub mod event;
pub mod geometry;
pub mod ids;
pub mod validation;

// Re-export all public types at crate root for convenience.
pub use event::{AnomalyEvent, AnomalyRecord, EventIdentity};
pub use geometry::{BoundingBox, BoundsError, Coordinate, GridCellKey};
pub use ids::{ConsumerId, SubscriptionId};
pub use validation::{ValidationError, decode_payload, split_payload, validate_record};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for the wire types.

    #[test]
    fn export_bindings() {
        // Importing the types triggers generation into `bindings/`
        // relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::SubscriptionId::export_all();
        let _ = crate::ids::ConsumerId::export_all();
        let _ = crate::geometry::Coordinate::export_all();
        let _ = crate::geometry::GridCellKey::export_all();
        let _ = crate::event::AnomalyRecord::export_all();
    }
}
