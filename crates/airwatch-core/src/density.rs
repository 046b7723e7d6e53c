//! Live density view for one consumer.
//!
//! A [`LiveDensity`] owns one background task and one [`DensityIndex`]. The
//! task reacts to three inputs:
//!
//! | Input | Reaction |
//! |-------|----------|
//! | bounding-box change | debounced, then full rebuild from a store snapshot |
//! | admission inside the current box | incremental `admit` |
//! | broadcast lag | full rebuild with the current box |
//!
//! Every admission carries a sequence number. The index remembers the
//! highest sequence it reflects, so an admission that a rebuild snapshot
//! already contained is not counted a second time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use airwatch_geo::{DensityError, DensityIndex, check_resolution};
use airwatch_store::{Admission, EventStore, ReplaySubscription};
use airwatch_types::BoundingBox;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::debounce::Debouncer;

/// Box changes buffered between the consumer and the task.
const BOX_CHANNEL_CAPACITY: usize = 32;

/// One published state of a live density view.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityView {
    /// The counts, scoped to their box and cell size.
    pub index: DensityIndex,
    /// Highest admission sequence reflected in `index`.
    pub watermark: u64,
    /// Number of box-change rebuilds so far.
    pub generation: u64,
}

/// A density index kept current against the event store.
///
/// Dropping the value stops its task.
#[derive(Debug)]
pub struct LiveDensity {
    boxes: mpsc::Sender<BoundingBox>,
    view: watch::Receiver<DensityView>,
    recomputes: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl LiveDensity {
    /// Build the initial index for `bounds` and start tracking admissions.
    ///
    /// Box changes submitted through [`set_bounds`](Self::set_bounds) wait
    /// for `quiet` without a newer change before the index is rebuilt.
    pub async fn start(
        store: Arc<EventStore>,
        bounds: BoundingBox,
        cell_size_deg: f64,
        quiet: Duration,
    ) -> Result<Self, DensityError> {
        check_resolution(cell_size_deg)?;

        let ReplaySubscription { snapshot, receiver } = store.subscribe_with_replay().await;
        let mut index = DensityIndex::new(bounds, cell_size_deg)?;
        index.rebuild(&snapshot);
        let initial = DensityView {
            index,
            watermark: snapshot.watermark(),
            generation: 0,
        };

        let (boxes_tx, boxes_rx) = mpsc::channel(BOX_CHANNEL_CAPACITY);
        let (view_tx, view_rx) = watch::channel(initial.clone());
        let recomputes = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            store,
            current: initial,
            view: view_tx,
            recomputes: Arc::clone(&recomputes),
        };
        let task = tokio::spawn(worker.run(boxes_rx, receiver, Debouncer::new(quiet)));

        Ok(Self {
            boxes: boxes_tx,
            view: view_rx,
            recomputes,
            task,
        })
    }

    /// Submit a new bounding box. Returns `false` if the task has stopped.
    pub async fn set_bounds(&self, bounds: BoundingBox) -> bool {
        self.boxes.send(bounds).await.is_ok()
    }

    /// The latest published view.
    pub fn current(&self) -> DensityView {
        self.view.borrow().clone()
    }

    /// Wait for the next published view. `None` once the task has stopped.
    pub async fn changed(&mut self) -> Option<DensityView> {
        self.view.changed().await.ok()?;
        Some(self.view.borrow_and_update().clone())
    }

    /// An independent receiver of published views.
    pub fn watch(&self) -> watch::Receiver<DensityView> {
        self.view.clone()
    }

    /// Completed box-change rebuilds.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes.load(Ordering::Relaxed)
    }

    /// Stop the task and wait for it to finish.
    pub async fn stop(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for LiveDensity {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Worker {
    store: Arc<EventStore>,
    current: DensityView,
    view: watch::Sender<DensityView>,
    recomputes: Arc<AtomicU64>,
}

impl Worker {
    async fn run(
        mut self,
        mut boxes: mpsc::Receiver<BoundingBox>,
        mut admissions: broadcast::Receiver<Admission>,
        mut debouncer: Debouncer<BoundingBox>,
    ) {
        loop {
            tokio::select! {
                change = boxes.recv() => match change {
                    Some(bounds) => debouncer.push(bounds),
                    None => break,
                },
                bounds = debouncer.ready() => {
                    self.rebuild(bounds).await;
                    let generation = self.recomputes.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                    self.current.generation = generation;
                    self.publish();
                }
                admission = admissions.recv() => match admission {
                    Ok(admission) => {
                        if admission.seq <= self.current.watermark {
                            continue;
                        }
                        self.current.watermark = admission.seq;
                        if self.current.index.admit(&admission.event).is_some() {
                            self.publish();
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "density view lagged, rebuilding");
                        let bounds = self.current.index.bounds();
                        self.rebuild(bounds).await;
                        self.publish();
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("live density task finished");
    }

    async fn rebuild(&mut self, bounds: BoundingBox) {
        let snapshot = self.store.all().await;
        let cell = self.current.index.cell_size_deg();
        match DensityIndex::new(bounds, cell) {
            Ok(mut index) => {
                index.rebuild(&snapshot);
                debug!(events = snapshot.len(), cells = index.counts().len(), "density rebuilt");
                self.current.index = index;
                self.current.watermark = snapshot.watermark();
            }
            // Resolution was checked at start and never changes.
            Err(e) => warn!(error = %e, "density rebuild skipped"),
        }
    }

    fn publish(&self) {
        self.view.send_replace(self.current.clone());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use airwatch_types::{AnomalyEvent, Coordinate, GridCellKey};
    use chrono::{TimeZone, Utc};

    use super::*;

    fn event(secs: i64, lat: f64, lon: f64) -> AnomalyEvent {
        AnomalyEvent::new(
            "pm25",
            70.0,
            Utc.timestamp_opt(1_743_500_000_i64.saturating_add(secs), 0).unwrap(),
            Some(Coordinate::new(lat, lon)),
            "",
        )
        .unwrap()
    }

    fn bounds(min_lat: f64, min_lon: f64) -> BoundingBox {
        BoundingBox::new(min_lat, min_lon, min_lat + 0.1, min_lon + 0.1).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_box_changes_causes_one_rebuild_with_last_box() {
        let store = Arc::new(EventStore::new());
        let live = LiveDensity::start(Arc::clone(&store), bounds(41.0, 29.0), 0.05, Duration::from_secs(1))
            .await
            .unwrap();

        for step in 1..=5_u32 {
            assert!(live.set_bounds(bounds(41.0 + f64::from(step) * 0.01, 29.0)).await);
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(live.recompute_count(), 1);
        assert_eq!(live.current().index.bounds(), bounds(41.0 + 5.0 * 0.01, 29.0));
    }

    #[tokio::test(start_paused = true)]
    async fn admissions_update_incrementally() {
        let store = Arc::new(EventStore::new());
        store.insert(event(0, 41.01, 29.02)).await;
        let mut live = LiveDensity::start(Arc::clone(&store), bounds(41.0, 29.0), 0.05, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(live.current().index.total(), 1);

        store.insert(event(1, 41.06, 29.07)).await;
        let view = live.changed().await.unwrap();
        assert_eq!(view.index.get(GridCellKey::new(1, 1)), 1);
        assert_eq!(view.index.total(), 2);
        assert_eq!(live.recompute_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rebuild_does_not_double_count() {
        let store = Arc::new(EventStore::new());
        let live = LiveDensity::start(Arc::clone(&store), bounds(41.0, 29.0), 0.05, Duration::from_millis(100))
            .await
            .unwrap();

        live.set_bounds(bounds(41.0, 29.0)).await;
        for secs in 0..10 {
            store.insert(event(secs, 41.02, 29.02)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        let view = live.current();
        assert_eq!(view.index.total(), 10);
        assert_eq!(view.watermark, 10);
    }

    #[tokio::test]
    async fn invalid_resolution_is_rejected() {
        let store = Arc::new(EventStore::new());
        let err = LiveDensity::start(store, bounds(41.0, 29.0), 0.0, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, DensityError::InvalidGridResolution(0.0));
    }
}
