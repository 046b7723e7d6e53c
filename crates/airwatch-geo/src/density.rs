//! Spatial histogram of events over fixed-size cells inside a bounding box.
//!
//! Cells are anchored at the box's south-west corner: an event at
//! `(lat, lon)` lands in row `floor((lat - min_lat) / cell)` and column
//! `floor((lon - min_lon) / cell)`. Points on the northern or eastern edge
//! are clamped into the last row or column so that every point the box
//! contains is counted exactly once.
//!
//! # Representations
//!
//! - [`DensityMap`]: sparse `GridCellKey -> count`, zero cells omitted
//! - Remote form: `"lat_lon" -> count`, the convention used by the upstream
//!   density endpoint. Keys are the south-west corner of the cell, printed
//!   with as many decimals as the cell size and the box's south-west corner
//!   need (two for the default 0.01 degree grid on an aligned box, e.g.
//!   `"41.01_29.05"`; three for a box starting at `41.003`). Corners that
//!   need more than eight decimals are printed at full precision.

use std::collections::BTreeMap;

use airwatch_types::{AnomalyEvent, BoundingBox, Coordinate, GridCellKey};
use tracing::debug;

use crate::error::DensityError;

/// Default cell edge length in degrees.
pub const DEFAULT_CELL_SIZE_DEG: f64 = 0.01;

/// Tolerance applied to cell-index arithmetic so decimal coordinates that
/// sit on a cell boundary (e.g. `41.01` on a 0.01 grid) are not pushed into
/// the previous cell by binary rounding.
const EDGE_EPSILON: f64 = 1e-9;

/// Largest number of decimals used when printing remote keys.
const MAX_KEY_DECIMALS: usize = 8;

/// Sparse density counts keyed by grid cell.
pub type DensityMap = BTreeMap<GridCellKey, u64>;

/// Reject cell sizes that are not strictly positive and finite.
pub fn check_resolution(cell_size_deg: f64) -> Result<(), DensityError> {
    if cell_size_deg.is_finite() && cell_size_deg > 0.0 {
        Ok(())
    } else {
        Err(DensityError::InvalidGridResolution(cell_size_deg))
    }
}

/// Compute the sparse density of `events` inside `bounds`.
///
/// Events without coordinates or outside the box are ignored.
///
/// # Errors
///
/// Returns [`DensityError::InvalidGridResolution`] for a non-positive or
/// non-finite `cell_size_deg`.
pub fn compute<I>(events: I, bounds: BoundingBox, cell_size_deg: f64) -> Result<DensityMap, DensityError>
where
    I: IntoIterator,
    I::Item: AsRef<AnomalyEvent>,
{
    let mut index = DensityIndex::new(bounds, cell_size_deg)?;
    index.rebuild(events);
    Ok(index.into_counts())
}

/// Cell key for `point`, or `None` when the point lies outside `bounds`.
///
/// `cell_size_deg` must already have passed [`check_resolution`].
pub fn cell_key(bounds: &BoundingBox, cell_size_deg: f64, point: &Coordinate) -> Option<GridCellKey> {
    if !bounds.contains(point) {
        return None;
    }
    Some(GridCellKey::new(
        axis_index(point.latitude - bounds.min_lat(), bounds.lat_span(), cell_size_deg),
        axis_index(point.longitude - bounds.min_lon(), bounds.lon_span(), cell_size_deg),
    ))
}

/// Number of cells needed to cover `span` degrees (at least one).
fn cells_along(span: f64, cell_size_deg: f64) -> f64 {
    (span / cell_size_deg - EDGE_EPSILON).ceil().max(1.0)
}

/// Index of the cell holding `offset` on an axis of length `span`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn axis_index(offset: f64, span: f64, cell_size_deg: f64) -> u32 {
    let last = cells_along(span, cell_size_deg) - 1.0;
    let raw = (offset / cell_size_deg + EDGE_EPSILON).floor();
    // Clamped into [0, last]; `as` saturates beyond u32::MAX.
    raw.clamp(0.0, last) as u32
}

/// Decimals needed to print `value` exactly, or `None` past
/// [`MAX_KEY_DECIMALS`].
fn decimals_needed(value: f64) -> Option<usize> {
    let mut scale = 1.0_f64;
    for decimals in 0..=MAX_KEY_DECIMALS {
        let scaled = value * scale;
        if (scaled - scaled.round()).abs() < EDGE_EPSILON * scale.max(1.0) {
            return Some(decimals);
        }
        scale *= 10.0;
    }
    None
}

/// Decimals that print every cell corner of `bounds` exactly, or `None`
/// when only full precision will do.
fn key_decimals(bounds: &BoundingBox, cell_size_deg: f64) -> Option<usize> {
    let cell = decimals_needed(cell_size_deg)?;
    let lat = decimals_needed(bounds.min_lat())?;
    let lon = decimals_needed(bounds.min_lon())?;
    Some(cell.max(lat).max(lon))
}

/// Cell whose south-west corner is a remote key.
///
/// The corner is read at the cell's centre, so a printed corner a rounding
/// error outside the box still lands in its own cell. Keys more than half a
/// cell outside the box are rejected.
fn remote_cell(bounds: &BoundingBox, cell_size_deg: f64, corner: &Coordinate) -> Option<GridCellKey> {
    let row = remote_axis(corner.latitude - bounds.min_lat(), bounds.lat_span(), cell_size_deg)?;
    let col = remote_axis(corner.longitude - bounds.min_lon(), bounds.lon_span(), cell_size_deg)?;
    Some(GridCellKey::new(row, col))
}

fn remote_axis(offset: f64, span: f64, cell_size_deg: f64) -> Option<u32> {
    let half = cell_size_deg * 0.5;
    if offset < -half || offset > span + half {
        return None;
    }
    Some(axis_index((offset + half).clamp(0.0, span), span, cell_size_deg))
}

/// A density histogram scoped to one bounding box and one cell size.
///
/// Supports full rebuilds (when the box changes) and O(1) incremental
/// admission (when new events arrive inside an unchanged box).
#[derive(Debug, Clone, PartialEq)]
pub struct DensityIndex {
    bounds: BoundingBox,
    cell_size_deg: f64,
    counts: DensityMap,
    total: u64,
}

impl DensityIndex {
    /// Create an empty index.
    ///
    /// # Errors
    ///
    /// Returns [`DensityError::InvalidGridResolution`] for a bad cell size.
    pub fn new(bounds: BoundingBox, cell_size_deg: f64) -> Result<Self, DensityError> {
        check_resolution(cell_size_deg)?;
        Ok(Self {
            bounds,
            cell_size_deg,
            counts: DensityMap::new(),
            total: 0,
        })
    }

    /// The box this index covers.
    pub const fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Cell edge length in degrees.
    pub const fn cell_size_deg(&self) -> f64 {
        self.cell_size_deg
    }

    /// Count one event. Returns the cell it landed in, or `None` if the
    /// event has no coordinates or lies outside the box.
    pub fn admit(&mut self, event: &AnomalyEvent) -> Option<GridCellKey> {
        let point = event.location()?;
        let key = cell_key(&self.bounds, self.cell_size_deg, &point)?;
        self.bump(key, 1);
        Some(key)
    }

    /// Discard all counts and recount `events` from scratch.
    pub fn rebuild<I>(&mut self, events: I)
    where
        I: IntoIterator,
        I::Item: AsRef<AnomalyEvent>,
    {
        self.counts.clear();
        self.total = 0;
        for event in events {
            self.admit(event.as_ref());
        }
    }

    /// Count for one cell (zero when absent).
    pub fn get(&self, key: GridCellKey) -> u64 {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    /// The sparse counts.
    pub const fn counts(&self) -> &DensityMap {
        &self.counts
    }

    /// Consume the index and return its counts.
    pub fn into_counts(self) -> DensityMap {
        self.counts
    }

    /// Sum of all cell counts.
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// South-west corner of a cell.
    pub fn cell_origin(&self, key: GridCellKey) -> Coordinate {
        Coordinate::new(
            f64::from(key.row).mul_add(self.cell_size_deg, self.bounds.min_lat()),
            f64::from(key.col).mul_add(self.cell_size_deg, self.bounds.min_lon()),
        )
    }

    /// Render the counts in the remote `"lat_lon"` key convention.
    pub fn to_remote_keys(&self) -> BTreeMap<String, u64> {
        let decimals = key_decimals(&self.bounds, self.cell_size_deg);
        self.counts
            .iter()
            .map(|(key, count)| {
                let origin = self.cell_origin(*key);
                let text = match decimals {
                    Some(prec) => format!("{:.prec$}_{:.prec$}", origin.latitude, origin.longitude),
                    None => format!("{}_{}", origin.latitude, origin.longitude),
                };
                (text, *count)
            })
            .collect()
    }

    /// Reshape a remote `"lat_lon" -> count` mapping into grid form.
    ///
    /// Each key is read as a cell corner and bucketed by that cell's centre,
    /// so keys produced by [`to_remote_keys`](Self::to_remote_keys) map back
    /// to their own cells. Keys more than half a cell outside the box are
    /// skipped.
    ///
    /// # Errors
    ///
    /// - [`DensityError::InvalidGridResolution`] for a bad cell size
    /// - [`DensityError::InvalidCellKey`] for a key that is not two
    ///   `_`-separated numbers
    pub fn from_remote<'a, I>(remote: I, bounds: BoundingBox, cell_size_deg: f64) -> Result<Self, DensityError>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let mut index = Self::new(bounds, cell_size_deg)?;
        for (raw_key, count) in remote {
            let point = parse_remote_key(raw_key)?;
            match remote_cell(&index.bounds, index.cell_size_deg, &point) {
                Some(key) => index.bump(key, count),
                None => debug!(key = raw_key, "remote density cell outside bounds, skipped"),
            }
        }
        Ok(index)
    }

    fn bump(&mut self, key: GridCellKey, by: u64) {
        if by == 0 {
            return;
        }
        let slot = self.counts.entry(key).or_insert(0);
        *slot = slot.saturating_add(by);
        self.total = self.total.saturating_add(by);
    }
}

fn parse_remote_key(raw: &str) -> Result<Coordinate, DensityError> {
    let invalid = || DensityError::InvalidCellKey(raw.to_owned());
    let (lat, lon) = raw.split_once('_').ok_or_else(invalid)?;
    let latitude: f64 = lat.trim().parse().map_err(|_e| invalid())?;
    let longitude: f64 = lon.trim().parse().map_err(|_e| invalid())?;
    let point = Coordinate::new(latitude, longitude);
    if point.is_finite() {
        Ok(point)
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn event_at(lat: f64, lon: f64) -> AnomalyEvent {
        let t = Utc.timestamp_opt(1_743_500_000, 0).unwrap();
        AnomalyEvent::new("pm25", 50.0, t, Some(Coordinate::new(lat, lon)), "").unwrap()
    }

    fn sample_box() -> BoundingBox {
        BoundingBox::new(41.0, 29.0, 41.1, 29.1).unwrap()
    }

    #[test]
    fn partition_example() {
        let events = [
            event_at(41.01, 29.02),
            event_at(41.06, 29.07),
            event_at(41.5, 29.5), // outside
        ];
        let grid = compute(&events, sample_box(), 0.05).unwrap();

        assert_eq!(grid.get(&GridCellKey::new(0, 0)), Some(&1));
        assert_eq!(grid.get(&GridCellKey::new(1, 1)), Some(&1));
        assert_eq!(grid.values().sum::<u64>(), 2);
    }

    #[test]
    fn zero_cells_are_omitted() {
        let grid = compute([event_at(41.01, 29.02)], sample_box(), 0.01).unwrap();
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn north_east_edge_is_clamped_into_last_cell() {
        let grid = compute([event_at(41.1, 29.1)], sample_box(), 0.05).unwrap();
        assert_eq!(grid.get(&GridCellKey::new(1, 1)), Some(&1));
    }

    #[test]
    fn degenerate_box_is_a_single_cell() {
        let bounds = BoundingBox::new(41.0, 29.0, 41.0, 29.0).unwrap();
        let grid = compute([event_at(41.0, 29.0), event_at(41.0, 29.0)], bounds, 0.01).unwrap();
        assert_eq!(grid.get(&GridCellKey::new(0, 0)), Some(&2));
    }

    #[test]
    fn non_positive_resolution_is_rejected() {
        for bad in [0.0, -0.01, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                compute(std::iter::empty::<AnomalyEvent>(), sample_box(), bad),
                Err(DensityError::InvalidGridResolution(_))
            ));
        }
    }

    #[test]
    fn incremental_admission_matches_rebuild() {
        let events: Vec<_> = (0..20)
            .map(|i| event_at(41.0 + f64::from(i) * 0.004, 29.0 + f64::from(i) * 0.003))
            .collect();

        let mut incremental = DensityIndex::new(sample_box(), 0.02).unwrap();
        for e in &events {
            incremental.admit(e);
        }
        let mut rebuilt = DensityIndex::new(sample_box(), 0.02).unwrap();
        rebuilt.rebuild(&events);

        assert_eq!(incremental, rebuilt);
        assert_eq!(incremental.total(), 20);
    }

    #[test]
    fn remote_keys_use_corner_with_grid_decimals() {
        let mut index = DensityIndex::new(sample_box(), 0.01).unwrap();
        index.admit(&event_at(41.013, 29.057));
        let remote = index.to_remote_keys();
        assert_eq!(remote.get("41.01_29.05"), Some(&1));
    }

    #[test]
    fn remote_keys_reshape_to_same_counts() {
        let mut index = DensityIndex::new(sample_box(), 0.01).unwrap();
        for e in [event_at(41.013, 29.057), event_at(41.099, 29.0), event_at(41.013, 29.051)] {
            index.admit(&e);
        }
        let remote = index.to_remote_keys();
        let back = DensityIndex::from_remote(
            remote.iter().map(|(k, v)| (k.as_str(), *v)),
            sample_box(),
            0.01,
        )
        .unwrap();
        assert_eq!(back.counts(), index.counts());
    }

    #[test]
    fn remote_keys_follow_an_unaligned_box() {
        let bounds = BoundingBox::new(41.003, 29.003, 41.1, 29.1).unwrap();
        let mut index = DensityIndex::new(bounds, 0.01).unwrap();
        index.admit(&event_at(41.004, 29.004));
        index.admit(&event_at(41.0145, 29.0145));
        assert_eq!(index.get(GridCellKey::new(0, 0)), 1);
        assert_eq!(index.get(GridCellKey::new(1, 1)), 1);

        let remote = index.to_remote_keys();
        assert_eq!(remote.get("41.003_29.003"), Some(&1));
        assert_eq!(remote.get("41.013_29.013"), Some(&1));

        let back = DensityIndex::from_remote(remote.iter().map(|(k, v)| (k.as_str(), *v)), bounds, 0.01).unwrap();
        assert_eq!(back.counts(), index.counts());
        assert_eq!(back.total(), 2);
    }

    #[test]
    fn remote_keys_keep_full_precision_for_arbitrary_corners() {
        let bounds = BoundingBox::new(41.003_141_592_6, 29.002_718_281_8, 41.1, 29.1).unwrap();
        let mut index = DensityIndex::new(bounds, 0.01).unwrap();
        for e in [event_at(41.004, 29.004), event_at(41.0531, 29.0777), event_at(41.1, 29.1)] {
            index.admit(&e);
        }
        let remote = index.to_remote_keys();
        let back = DensityIndex::from_remote(remote.iter().map(|(k, v)| (k.as_str(), *v)), bounds, 0.01).unwrap();
        assert_eq!(back.counts(), index.counts());
        assert_eq!(back.total(), 3);
    }

    #[test]
    fn malformed_remote_key_is_rejected() {
        let err = DensityIndex::from_remote([("41.01-29.05", 3)], sample_box(), 0.01).unwrap_err();
        assert_eq!(err, DensityError::InvalidCellKey(String::from("41.01-29.05")));
    }
}
