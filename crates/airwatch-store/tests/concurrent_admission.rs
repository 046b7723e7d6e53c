//! Concurrent admission against a shared store.

#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

use std::sync::Arc;

use airwatch_store::EventStore;
use airwatch_types::{AnomalyEvent, Coordinate};
use chrono::{TimeZone, Utc};

fn event(secs: i64) -> AnomalyEvent {
    AnomalyEvent::new(
        "pm25",
        12.5,
        Utc.timestamp_opt(1_743_500_000 + secs, 0).unwrap(),
        Some(Coordinate::new(41.02, 29.01)),
        "",
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_occurrence_from_many_tasks_is_admitted_once() {
    let store = Arc::new(EventStore::new());
    let mut tasks = Vec::new();
    for _ in 0..32 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move { store.insert(event(0)).await }));
    }

    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(store.len().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_feeds_converge_to_the_union() {
    let store = Arc::new(EventStore::new());

    // Two feeds deliver overlapping windows: [0, 60) and [40, 100).
    let backfill = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for secs in 0..60 {
                store.insert(event(secs)).await;
            }
        })
    };
    let live = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for secs in (40..100).rev() {
                store.insert(event(secs)).await;
            }
        })
    };
    backfill.await.unwrap();
    live.await.unwrap();

    let all = store.all().await;
    assert_eq!(all.len(), 100);
    assert!(
        all.as_slice()
            .windows(2)
            .all(|w| w[0].timestamp() <= w[1].timestamp())
    );
}
