//! Query gateway: the read surface over the session store.
//!
//! Rendering collaborators never touch the store directly. Every query
//! validates its arguments, takes a snapshot, and derives its view from it.
//!
//! # Queries
//!
//! | Method | Returns |
//! |--------|---------|
//! | [`time_range`](QueryGateway::time_range) | events with `start <= time <= end` |
//! | [`recent`](QueryGateway::recent) | events in `[now - window, now]` |
//! | [`nearby`](QueryGateway::nearby) | events within a radius of an observer |
//! | [`density`](QueryGateway::density) | one-shot density index over a box |
//! | [`subscribe`](QueryGateway::subscribe) | replay then push, optionally scoped |
//! | [`watch_density`](QueryGateway::watch_density) | live, debounced density view |

use std::sync::Arc;
use std::time::Duration;

use airwatch_geo::{DensityIndex, RadiusFilter, scope};
use airwatch_store::{EventSnapshot, EventStore};
use airwatch_types::{AnomalyEvent, BoundingBox, Coordinate};
use chrono::{DateTime, Utc};

use crate::density::LiveDensity;
use crate::error::GatewayError;
use crate::subscription::EventSubscription;

/// Default quiet period for live density box changes.
pub const DEFAULT_DENSITY_DEBOUNCE: Duration = Duration::from_secs(1);

/// Read-only query surface over an [`EventStore`].
#[derive(Debug, Clone)]
pub struct QueryGateway {
    store: Arc<EventStore>,
    density_debounce: Duration,
}

impl QueryGateway {
    /// Gateway over `store` with the default density debounce.
    pub const fn new(store: Arc<EventStore>) -> Self {
        Self {
            store,
            density_debounce: DEFAULT_DENSITY_DEBOUNCE,
        }
    }

    /// Override the quiet period used by [`watch_density`](Self::watch_density).
    #[must_use]
    pub const fn with_density_debounce(mut self, quiet: Duration) -> Self {
        self.density_debounce = quiet;
        self
    }

    /// The underlying store.
    pub const fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Events with `start <= timestamp <= end`, in timestamp order.
    pub async fn time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<EventSnapshot, GatewayError> {
        if start > end {
            return Err(GatewayError::InvalidRange { start, end });
        }
        Ok(self.store.range_query(start, end).await)
    }

    /// Events from the last `window`, in timestamp order.
    pub async fn recent(&self, window: Duration) -> Result<EventSnapshot, GatewayError> {
        let end = Utc::now();
        let start = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| end.checked_sub_signed(w))
            .ok_or(GatewayError::WindowTooLarge)?;
        self.time_range(start, end).await
    }

    /// Held events within `radius_km` of `observer`, in timestamp order.
    pub async fn nearby(&self, observer: Coordinate, radius_km: f64) -> Result<Vec<Arc<AnomalyEvent>>, GatewayError> {
        let filter = RadiusFilter::new(observer, radius_km)?;
        Ok(filter.apply(self.store.all().await))
    }

    /// One-shot density of held events over `bounds`.
    pub async fn density(&self, bounds: BoundingBox, cell_size_deg: f64) -> Result<DensityIndex, GatewayError> {
        let mut index = DensityIndex::new(bounds, cell_size_deg)?;
        index.rebuild(&self.store.all().await);
        Ok(index)
    }

    /// Subscribe to held and future events, optionally scoped to a radius.
    ///
    /// A position without a radius uses the default radius; a radius
    /// without a position is rejected.
    pub async fn subscribe(
        &self,
        observer: Option<Coordinate>,
        radius_km: Option<f64>,
    ) -> Result<EventSubscription, GatewayError> {
        let filter = scope(observer, radius_km)?;
        Ok(EventSubscription::new(self.store.subscribe_with_replay().await, filter))
    }

    /// Start a live density view over `bounds`.
    pub async fn watch_density(&self, bounds: BoundingBox, cell_size_deg: f64) -> Result<LiveDensity, GatewayError> {
        Ok(LiveDensity::start(Arc::clone(&self.store), bounds, cell_size_deg, self.density_debounce).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use airwatch_geo::{DensityError, GeometryError};
    use airwatch_types::GridCellKey;
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_743_500_000 + secs, 0).unwrap()
    }

    fn event(secs: i64, location: Option<(f64, f64)>) -> AnomalyEvent {
        AnomalyEvent::new(
            "pm25",
            55.0,
            at(secs),
            location.map(|(lat, lon)| Coordinate::new(lat, lon)),
            "",
        )
        .unwrap()
    }

    async fn gateway_with(events: Vec<AnomalyEvent>) -> QueryGateway {
        let store = Arc::new(EventStore::new());
        for e in events {
            store.insert(e).await;
        }
        QueryGateway::new(store)
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let gateway = gateway_with(vec![]).await;
        assert_eq!(
            gateway.time_range(at(10), at(0)).await.unwrap_err(),
            GatewayError::InvalidRange {
                start: at(10),
                end: at(0)
            }
        );
    }

    #[tokio::test]
    async fn time_range_is_inclusive() {
        let gateway = gateway_with(vec![
            event(0, None),
            event(10, None),
            event(20, None),
        ])
        .await;
        assert_eq!(gateway.time_range(at(0), at(10)).await.unwrap().len(), 2);
        assert_eq!(gateway.time_range(at(10), at(10)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recent_uses_wall_clock() {
        let store = Arc::new(EventStore::new());
        let now = Utc::now();
        store
            .insert(AnomalyEvent::new("no2", 1.0, now - chrono::Duration::minutes(5), None, "").unwrap())
            .await;
        store
            .insert(AnomalyEvent::new("no2", 1.0, now - chrono::Duration::hours(5), None, "").unwrap())
            .await;
        let gateway = QueryGateway::new(store);
        let recent = gateway.recent(Duration::from_secs(2 * 3600)).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn nearby_drops_far_and_unlocated_events() {
        let gateway = gateway_with(vec![
            event(0, Some((41.0, 29.2))),
            event(1, Some((41.3, 29.0))),
            event(2, None),
        ])
        .await;
        let near = gateway.nearby(Coordinate::new(41.0, 29.0), 25.0).await.unwrap();
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].timestamp(), at(0));

        assert!(matches!(
            gateway.nearby(Coordinate::new(41.0, 29.0), -1.0).await,
            Err(GatewayError::Geometry(GeometryError::InvalidRadius(_)))
        ));
    }

    #[tokio::test]
    async fn density_counts_and_validates() {
        let gateway = gateway_with(vec![
            event(0, Some((41.01, 29.02))),
            event(1, Some((41.06, 29.07))),
        ])
        .await;
        let bounds = BoundingBox::new(41.0, 29.0, 41.1, 29.1).unwrap();

        let index = gateway.density(bounds, 0.05).await.unwrap();
        assert_eq!(index.get(GridCellKey::new(0, 0)), 1);
        assert_eq!(index.get(GridCellKey::new(1, 1)), 1);

        assert!(matches!(
            gateway.density(bounds, -0.5).await,
            Err(GatewayError::Density(DensityError::InvalidGridResolution(_)))
        ));
    }

    #[tokio::test]
    async fn radius_without_observer_is_rejected() {
        let gateway = gateway_with(vec![]).await;
        assert!(matches!(
            gateway.subscribe(None, Some(10.0)).await,
            Err(GatewayError::Geometry(GeometryError::MissingObserver))
        ));
    }
}
