//! Great-circle distance on a spherical Earth.

use airwatch_types::Coordinate;

use crate::error::GeometryError;

/// Mean Earth radius used by the haversine formula, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres between two points given in degrees.
///
/// The result is exactly symmetric in its arguments and exactly zero for
/// identical points. Any `NaN` or infinite input yields
/// [`GeometryError::NonFinite`].
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Result<f64, GeometryError> {
    if ![lat1, lon1, lat2, lon2].iter().all(|v| v.is_finite()) {
        return Err(GeometryError::NonFinite);
    }

    // Absolute deltas keep the result bit-identical under argument swap.
    let d_lat = (lat2 - lat1).abs().to_radians();
    let d_lon = (lon2 - lon1).abs().to_radians();

    let sin_lat = (d_lat / 2.0).sin();
    let sin_lon = (d_lon / 2.0).sin();
    let h = sin_lon.mul_add(
        sin_lon * (lat1.to_radians().cos() * lat2.to_radians().cos()),
        sin_lat * sin_lat,
    )
    .clamp(0.0, 1.0);

    Ok(EARTH_RADIUS_KM * 2.0 * h.sqrt().atan2((1.0 - h).sqrt()))
}

/// Distance helpers on [`Coordinate`].
pub trait CoordinateExt {
    /// Haversine distance to `other` in kilometres.
    fn distance_to(&self, other: &Coordinate) -> Result<f64, GeometryError>;
}

impl CoordinateExt for Coordinate {
    fn distance_to(&self, other: &Coordinate) -> Result<f64, GeometryError> {
        distance_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn identical_points_are_zero_apart() {
        assert_eq!(distance_km(41.0, 29.0, 41.0, 29.0).unwrap(), 0.0);
        assert_eq!(distance_km(-33.9, 151.2, -33.9, 151.2).unwrap(), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            (41.0, 29.0, 41.3, 29.0),
            (41.0, 29.0, 41.0, 29.2),
            (-33.86, 151.21, 51.5, -0.12),
            (89.9, 0.0, -89.9, 179.9),
            (0.0, -179.5, 0.0, 179.5),
        ];
        for (a_lat, a_lon, b_lat, b_lon) in pairs {
            assert_eq!(
                distance_km(a_lat, a_lon, b_lat, b_lon).unwrap(),
                distance_km(b_lat, b_lon, a_lat, a_lon).unwrap(),
            );
        }
    }

    #[test]
    fn known_distances() {
        // 0.2 degrees of longitude at 41N.
        let east = distance_km(41.0, 29.0, 41.0, 29.2).unwrap();
        assert!((east - 16.78).abs() < 0.1, "got {east}");

        // 0.3 degrees of latitude.
        let north = distance_km(41.0, 29.0, 41.3, 29.0).unwrap();
        assert!((north - 33.36).abs() < 0.1, "got {north}");
    }

    #[test]
    fn non_finite_inputs_are_rejected() {
        assert_eq!(
            distance_km(f64::NAN, 29.0, 41.0, 29.0).unwrap_err(),
            GeometryError::NonFinite
        );
        assert_eq!(
            distance_km(41.0, 29.0, 41.0, f64::NEG_INFINITY).unwrap_err(),
            GeometryError::NonFinite
        );
    }

    #[test]
    fn coordinate_helper_matches_free_function() {
        let a = Coordinate::new(41.0, 29.0);
        let b = Coordinate::new(41.3, 29.0);
        assert_eq!(
            a.distance_to(&b).unwrap(),
            distance_km(41.0, 29.0, 41.3, 29.0).unwrap()
        );
    }
}
