//! In-memory event store with identity deduplication and ordered range scans.
//!
//! Events are keyed by `(timestamp, seq)` where `seq` is the admission
//! sequence number, so iteration is timestamp order with ties broken by
//! admission order. A separate identity set makes re-delivery of the same
//! occurrence (from either feed) a no-op.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use airwatch_types::{AnomalyEvent, EventIdentity};
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, broadcast};
use tracing::trace;

use crate::error::StoreError;

/// Default capacity of the admission broadcast channel.
///
/// A subscriber that falls further behind than this receives
/// [`broadcast::error::RecvError::Lagged`] and must account for the gap.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// One committed admission, broadcast to subscribers in commit order.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Strictly increasing admission sequence number, starting at 1.
    pub seq: u64,
    /// The admitted event.
    pub event: Arc<AnomalyEvent>,
}

/// A finite, immutable view of the store taken at one instant.
///
/// Snapshots own their event handles, so they can be iterated any number of
/// times and outlive further admissions without observing them.
#[derive(Debug, Clone, Default)]
pub struct EventSnapshot {
    events: Vec<Arc<AnomalyEvent>>,
    watermark: u64,
}

impl EventSnapshot {
    /// Iterate the events in timestamp order.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<AnomalyEvent>> {
        self.events.iter()
    }

    /// Number of events in the snapshot.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the snapshot holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The events as a slice.
    pub fn as_slice(&self) -> &[Arc<AnomalyEvent>] {
        &self.events
    }

    /// Highest admission sequence number reflected in the snapshot
    /// (0 when nothing had been admitted yet).
    pub const fn watermark(&self) -> u64 {
        self.watermark
    }

    /// Consume the snapshot into its event handles.
    pub fn into_vec(self) -> Vec<Arc<AnomalyEvent>> {
        self.events
    }
}

impl<'a> IntoIterator for &'a EventSnapshot {
    type Item = &'a Arc<AnomalyEvent>;
    type IntoIter = std::slice::Iter<'a, Arc<AnomalyEvent>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl IntoIterator for EventSnapshot {
    type Item = Arc<AnomalyEvent>;
    type IntoIter = std::vec::IntoIter<Arc<AnomalyEvent>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

/// The store contents plus a receiver positioned exactly after them.
///
/// Every admission is either in `snapshot` or will arrive on `receiver`,
/// never both and never neither.
#[derive(Debug)]
pub struct ReplaySubscription {
    /// Events held at subscription time, in timestamp order.
    pub snapshot: EventSnapshot,
    /// Admissions committed after the snapshot.
    pub receiver: broadcast::Receiver<Admission>,
}

#[derive(Debug, Default)]
struct Inner {
    ordered: BTreeMap<(DateTime<Utc>, u64), Arc<AnomalyEvent>>,
    seen: HashSet<EventIdentity>,
    last_seq: u64,
}

impl Inner {
    fn snapshot<'a, I>(&self, events: I) -> EventSnapshot
    where
        I: Iterator<Item = &'a Arc<AnomalyEvent>>,
    {
        EventSnapshot {
            events: events.cloned().collect(),
            watermark: self.last_seq,
        }
    }
}

/// Session-scoped, deduplicating, time-ordered store of anomaly events.
///
/// Cheap to share behind an [`Arc`]. All methods take `&self`.
#[derive(Debug)]
pub struct EventStore {
    inner: RwLock<Inner>,
    admissions: broadcast::Sender<Admission>,
}

impl EventStore {
    /// Create an empty store with [`DEFAULT_BROADCAST_CAPACITY`].
    pub fn new() -> Self {
        let (admissions, _) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            admissions,
        }
    }

    /// Create an empty store whose admission broadcast buffers `capacity`
    /// messages per subscriber.
    pub fn with_capacity(capacity: usize) -> Result<Self, StoreError> {
        if capacity == 0 {
            return Err(StoreError::ZeroCapacity);
        }
        let (admissions, _) = broadcast::channel(capacity);
        Ok(Self {
            inner: RwLock::new(Inner::default()),
            admissions,
        })
    }

    /// Admit `event` unless an event with the same identity is already held.
    ///
    /// Returns `true` if the event was newly admitted. The identity check,
    /// the insert, and the broadcast all happen under one write guard, so
    /// concurrent inserts of the same occurrence admit it exactly once and
    /// subscribers see admissions in commit order.
    pub async fn insert(&self, event: AnomalyEvent) -> bool {
        let identity = event.identity();
        let mut inner = self.inner.write().await;
        if inner.seen.contains(&identity) {
            trace!(parameter = event.parameter(), time = %event.timestamp(), "duplicate event ignored");
            return false;
        }

        let seq = inner.last_seq.saturating_add(1);
        inner.last_seq = seq;
        let event = Arc::new(event);
        inner.ordered.insert((event.timestamp(), seq), Arc::clone(&event));
        inner.seen.insert(identity);

        // Err only means nobody is subscribed right now.
        let _ = self.admissions.send(Admission { seq, event });
        true
    }

    /// All events with `start <= timestamp <= end`, ascending by timestamp
    /// with ties in admission order. An inverted range yields an empty
    /// snapshot.
    pub async fn range_query(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> EventSnapshot {
        let inner = self.inner.read().await;
        if start > end {
            return EventSnapshot {
                events: Vec::new(),
                watermark: inner.last_seq,
            };
        }
        inner.snapshot(inner.ordered.range((start, 0)..=(end, u64::MAX)).map(|(_, e)| e))
    }

    /// Every held event, in timestamp order.
    pub async fn all(&self) -> EventSnapshot {
        let inner = self.inner.read().await;
        inner.snapshot(inner.ordered.values())
    }

    /// Number of held events.
    pub async fn len(&self) -> usize {
        self.inner.read().await.ordered.len()
    }

    /// Whether the store holds no events.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.ordered.is_empty()
    }

    /// Sequence number of the most recent admission (0 if none).
    pub async fn watermark(&self) -> u64 {
        self.inner.read().await.last_seq
    }

    /// Receive admissions committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Admission> {
        self.admissions.subscribe()
    }

    /// Capture the current contents together with a receiver for every
    /// later admission.
    ///
    /// The receiver is created while the read guard is held, and admissions
    /// are broadcast under the write guard, so no admission falls between
    /// the snapshot and the receiver.
    pub async fn subscribe_with_replay(&self) -> ReplaySubscription {
        let inner = self.inner.read().await;
        let receiver = self.admissions.subscribe();
        ReplaySubscription {
            snapshot: inner.snapshot(inner.ordered.values()),
            receiver,
        }
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}
