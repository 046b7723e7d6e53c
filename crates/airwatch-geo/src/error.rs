//! Error types for the `airwatch-geo` crate.
//!
//! Both enums describe caller mistakes that are fatal to the single call
//! that made them and never to the session around it.

/// Invalid geometric input to a distance or radius computation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    /// A coordinate component was `NaN` or infinite.
    #[error("coordinate components must be finite")]
    NonFinite,

    /// A search radius was negative or not a finite number.
    #[error("radius must be a finite, non-negative number of kilometres (got {0})")]
    InvalidRadius(f64),

    /// A radius was supplied without the observer position it is centred on.
    #[error("a search radius needs an observer position")]
    MissingObserver,
}

/// Invalid input to a density grid computation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DensityError {
    /// The cell size was zero, negative, or not finite.
    #[error("invalid grid resolution: cell size must be > 0 degrees (got {0})")]
    InvalidGridResolution(f64),

    /// A remote `"lat_lon"` cell key could not be parsed.
    #[error("invalid remote cell key: {0:?}")]
    InvalidCellKey(String),
}
