//! Replay-then-push event subscriptions.
//!
//! An [`EventSubscription`] first yields the events the store held when it
//! was created, then one event per later admission, in admission order. A
//! [`RadiusFilter`] may scope both phases. Admissions missed because the
//! consumer fell behind the broadcast buffer are counted and logged.

use std::collections::VecDeque;
use std::sync::Arc;

use airwatch_geo::RadiusFilter;
use airwatch_store::{Admission, ReplaySubscription};
use airwatch_types::AnomalyEvent;
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// A consumer's view of the event stream.
#[derive(Debug)]
pub struct EventSubscription {
    replay: VecDeque<Arc<AnomalyEvent>>,
    receiver: broadcast::Receiver<Admission>,
    filter: Option<RadiusFilter>,
    watermark: u64,
    lagged: u64,
}

impl EventSubscription {
    /// Build a subscription from a store replay, optionally scoped.
    pub fn new(replay: ReplaySubscription, filter: Option<RadiusFilter>) -> Self {
        let ReplaySubscription { snapshot, receiver } = replay;
        let watermark = snapshot.watermark();
        let replay = snapshot
            .into_iter()
            .filter(|event| filter.is_none_or(|f| f.matches(event)))
            .collect();
        Self {
            replay,
            receiver,
            filter,
            watermark,
            lagged: 0,
        }
    }

    /// The next matching event, or `None` once the store is gone.
    ///
    /// Cancel safe during the push phase.
    pub async fn next(&mut self) -> Option<Arc<AnomalyEvent>> {
        if let Some(event) = self.replay.pop_front() {
            return Some(event);
        }
        loop {
            match self.receiver.recv().await {
                Ok(admission) => {
                    if admission.seq <= self.watermark {
                        continue;
                    }
                    self.watermark = admission.seq;
                    if self.filter.is_none_or(|f| f.matches(&admission.event)) {
                        return Some(admission.event);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    self.lagged = self.lagged.saturating_add(missed);
                    warn!(missed, total_missed = self.lagged, "subscriber lagged behind admissions");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Replayed events not yet taken.
    pub fn pending_replay(&self) -> usize {
        self.replay.len()
    }

    /// Admissions skipped because this consumer fell behind.
    pub const fn lagged(&self) -> u64 {
        self.lagged
    }

    /// The scope applied to this subscription, if any.
    pub const fn filter(&self) -> Option<&RadiusFilter> {
        self.filter.as_ref()
    }

    /// Adapt into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Arc<AnomalyEvent>> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            let event = sub.next().await?;
            Some((event, sub))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use airwatch_store::EventStore;
    use airwatch_types::Coordinate;
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;

    use super::*;

    fn event(secs: i64, lat: f64, lon: f64) -> AnomalyEvent {
        AnomalyEvent::new(
            "pm25",
            70.0,
            Utc.timestamp_opt(1_743_500_000 + secs, 0).unwrap(),
            Some(Coordinate::new(lat, lon)),
            "",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn replays_then_pushes_without_gap_or_duplicate() {
        let store = EventStore::new();
        store.insert(event(0, 41.0, 29.0)).await;
        store.insert(event(1, 41.0, 29.0)).await;

        let mut sub = EventSubscription::new(store.subscribe_with_replay().await, None);
        store.insert(event(2, 41.0, 29.0)).await;
        store.insert(event(1, 41.0, 29.0)).await; // duplicate

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(sub.next().await.unwrap().timestamp().timestamp() - 1_743_500_000);
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(20), sub.next())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn scope_applies_to_replay_and_push() {
        let store = EventStore::new();
        store.insert(event(0, 41.0, 29.0)).await;
        store.insert(event(1, 41.3, 29.0)).await; // ~33 km away

        let filter = RadiusFilter::new(Coordinate::new(41.0, 29.0), 25.0).unwrap();
        let sub = EventSubscription::new(store.subscribe_with_replay().await, Some(filter));
        assert_eq!(sub.pending_replay(), 1);

        store.insert(event(2, 41.3, 29.0)).await;
        store.insert(event(3, 41.0, 29.2)).await; // ~17 km away

        let got: Vec<_> = sub
            .into_stream()
            .take(2)
            .map(|e| e.timestamp().timestamp() - 1_743_500_000)
            .collect()
            .await;
        assert_eq!(got, vec![0, 3]);
    }

    #[tokio::test]
    async fn lag_is_counted() {
        let store = EventStore::with_capacity(2).unwrap();
        let mut sub = EventSubscription::new(store.subscribe_with_replay().await, None);
        for secs in 0..5 {
            store.insert(event(secs, 41.0, 29.0)).await;
        }

        // The buffer kept the two newest admissions.
        let first = sub.next().await.unwrap();
        assert_eq!(first.timestamp().timestamp() - 1_743_500_000, 3);
        assert_eq!(sub.lagged(), 3);
    }
}
