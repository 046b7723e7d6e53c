//! Stream merger: backfill and live feeds into one event store.
//!
//! A session runs two tasks against the same [`EventStore`]:
//!
//! ```text
//! BackfillSource --fetch [now - window, now]--+
//!                                             +--> validate --> EventStore::insert
//! LiveSource --connect / next_payload loop----+
//!      ^                                  |
//!      +---- Backoff (1s .. 30s, +-20%) <-+ on error or close
//! ```
//!
//! Neither task waits for the other: live admissions are visible while the
//! backfill is still in flight, and a backfill failure never stops the live
//! loop. The store deduplicates events the two feeds have in common.
//!
//! # Observability
//!
//! | Surface | Contents |
//! |---------|----------|
//! | [`MergerStatus`] (watch) | current backfill and live state |
//! | [`MergerNotice`] (channel) | one message per lifecycle transition or dropped record |
//! | [`MergerCounters`] | admitted, duplicates, rejected, reconnects |

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use airwatch_geo::scope;
use airwatch_store::EventStore;
use airwatch_types::{
    AnomalyEvent, Coordinate, SubscriptionId, ValidationError, decode_payload, validate_record,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, BackoffPolicy};
use crate::error::{BackfillError, FeedUnavailable, MergerError, SourceError};
use crate::source::{BackfillSource, LiveConnection, LivePayload, LiveSource};
use crate::subscription::EventSubscription;

/// Notices buffered for a session handle that is not reading them.
const NOTICE_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Status, notices, counters
// ---------------------------------------------------------------------------

/// Which feed a record arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedChannel {
    /// The bounded historical fetch.
    Backfill,
    /// The live push.
    Live,
}

/// State of the session's backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BackfillState {
    /// Fetch in flight.
    Pending,
    /// Fetch finished and its records were merged.
    Complete {
        /// Records returned by the source.
        received: u64,
        /// Records newly admitted to the store.
        admitted: u64,
    },
    /// Fetch failed; see the matching [`MergerNotice::BackfillFailed`].
    Failed {
        /// Rendered error.
        error: String,
    },
    /// Session stopped before the fetch finished.
    Cancelled,
}

/// State of the session's live feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LiveState {
    /// Opening a connection.
    Connecting,
    /// Connection open and delivering.
    Connected,
    /// Waiting before the next attempt.
    Reconnecting {
        /// 1-based attempt number that follows the wait.
        attempt: u32,
        /// Wait in milliseconds.
        delay_ms: u64,
    },
    /// Retry ceiling reached; the feed is down for this session.
    Unavailable {
        /// Failed attempts.
        attempts: u32,
    },
    /// Session stopped.
    Stopped,
}

/// Combined session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergerStatus {
    /// Backfill state.
    pub backfill: BackfillState,
    /// Live feed state.
    pub live: LiveState,
}

impl MergerStatus {
    const fn starting() -> Self {
        Self {
            backfill: BackfillState::Pending,
            live: LiveState::Connecting,
        }
    }
}

/// A discrete event in a session's life.
#[derive(Debug, Clone, PartialEq)]
pub enum MergerNotice {
    /// The backfill finished.
    BackfillComplete {
        /// Records returned by the source.
        received: u64,
        /// Records newly admitted.
        admitted: u64,
    },
    /// The backfill failed. Sent at most once per session.
    BackfillFailed(BackfillError),
    /// A live connection opened.
    LiveConnected,
    /// A live connection failed or closed and a retry is scheduled.
    ReconnectScheduled {
        /// 1-based attempt number that follows the wait.
        attempt: u32,
        /// The wait.
        delay: Duration,
        /// Why the previous attempt ended.
        error: SourceError,
    },
    /// The live feed reached its retry ceiling.
    FeedUnavailable(FeedUnavailable),
    /// A record was refused by validation and dropped.
    RecordRejected {
        /// Feed the record arrived on.
        channel: FeedChannel,
        /// Why it was refused.
        error: ValidationError,
    },
}

/// Running totals for a session, readable at any time.
#[derive(Debug, Default)]
pub struct MergerCounters {
    admitted: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
    reconnects: AtomicU64,
    notices_dropped: AtomicU64,
}

/// Point-in-time copy of [`MergerCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Events newly admitted by this session.
    pub admitted: u64,
    /// Valid events already held by the store.
    pub duplicates: u64,
    /// Records refused by validation.
    pub rejected: u64,
    /// Reconnect waits scheduled by the live loop.
    pub reconnects: u64,
    /// Notices discarded because the handle's buffer was full.
    pub notices_dropped: u64,
}

impl MergerCounters {
    /// Read all counters.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            notices_dropped: self.notices_dropped.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Merger
// ---------------------------------------------------------------------------

/// Merges a backfill source and a live source into a shared store.
#[derive(Debug)]
pub struct StreamMerger<B, L> {
    store: Arc<EventStore>,
    backfill: Arc<B>,
    live: Arc<L>,
    policy: BackoffPolicy,
}

impl<B: BackfillSource, L: LiveSource> StreamMerger<B, L> {
    /// Create a merger writing into `store`.
    pub fn new(store: Arc<EventStore>, backfill: B, live: L, policy: BackoffPolicy) -> Self {
        Self {
            store,
            backfill: Arc::new(backfill),
            live: Arc::new(live),
            policy,
        }
    }

    /// The store this merger writes into.
    pub const fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Start a session: backfill `[now - backfill_window, now]` and follow
    /// the live feed, concurrently.
    ///
    /// `observer` and `radius_km` scope only the returned handle's event
    /// subscription; every valid event is admitted to the store regardless.
    pub async fn start(
        &self,
        backfill_window: Duration,
        observer: Option<Coordinate>,
        radius_km: Option<f64>,
    ) -> Result<SubscriptionHandle, MergerError> {
        let filter = scope(observer, radius_km)?;
        let window = chrono::Duration::from_std(backfill_window).map_err(|_e| MergerError::WindowTooLarge)?;
        let end = Utc::now();
        let start = end.checked_sub_signed(window).ok_or(MergerError::WindowTooLarge)?;

        let id = SubscriptionId::new();
        // Subscribe before either task runs so no admission is missed.
        let events = EventSubscription::new(self.store.subscribe_with_replay().await, filter);

        let (status_tx, status_rx) = watch::channel(MergerStatus::starting());
        let (notice_tx, notice_rx) = mpsc::channel(NOTICE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(MergerCounters::default());
        let status = Arc::new(status_tx);

        let ingest = Ingest {
            session: id,
            store: Arc::clone(&self.store),
            counters: Arc::clone(&counters),
            notices: notice_tx,
            status,
        };

        let backfill_task = tokio::spawn(run_backfill(
            Arc::clone(&self.backfill),
            ingest.clone(),
            start,
            end,
            shutdown_rx.clone(),
        ));
        let live_task = tokio::spawn(run_live(
            Arc::clone(&self.live),
            ingest,
            Backoff::new(self.policy),
            shutdown_rx,
        ));

        info!(session = %id, %start, %end, "merger session started");

        Ok(SubscriptionHandle {
            id,
            events,
            status: status_rx,
            notices: notice_rx,
            counters,
            shutdown: shutdown_tx,
            tasks: vec![backfill_task, live_task],
        })
    }
}

/// Stop a session and release both feeds.
pub async fn stop(handle: SubscriptionHandle) {
    handle.stop().await;
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A running merger session.
///
/// Dropping the handle aborts both feed tasks; [`stop`](Self::stop) asks
/// them to close their connections first and waits for them.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    events: EventSubscription,
    status: watch::Receiver<MergerStatus>,
    notices: mpsc::Receiver<MergerNotice>,
    counters: Arc<MergerCounters>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Session identifier.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The session's event subscription (replay, then push).
    pub const fn events(&mut self) -> &mut EventSubscription {
        &mut self.events
    }

    /// Next event from the session's subscription.
    pub async fn next_event(&mut self) -> Option<Arc<AnomalyEvent>> {
        self.events.next().await
    }

    /// Current session status.
    pub fn status(&self) -> MergerStatus {
        self.status.borrow().clone()
    }

    /// An independent receiver of status changes.
    pub fn watch_status(&self) -> watch::Receiver<MergerStatus> {
        self.status.clone()
    }

    /// Next notice. `None` once both tasks have finished and the buffer is
    /// drained.
    pub async fn next_notice(&mut self) -> Option<MergerNotice> {
        self.notices.recv().await
    }

    /// Next notice if one is already buffered.
    pub fn try_notice(&mut self) -> Option<MergerNotice> {
        self.notices.try_recv().ok()
    }

    /// Shared counters, readable after the handle is gone.
    pub fn counters(&self) -> Arc<MergerCounters> {
        Arc::clone(&self.counters)
    }

    /// Signal both tasks to stop and wait for them.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        // Unblocks a task waiting for notice buffer space.
        self.notices.close();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(session = %self.id, error = %e, "merger task ended abnormally");
            }
        }
        info!(session = %self.id, "merger session stopped");
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Shared admission path for both tasks.
#[derive(Clone)]
struct Ingest {
    session: SubscriptionId,
    store: Arc<EventStore>,
    counters: Arc<MergerCounters>,
    notices: mpsc::Sender<MergerNotice>,
    status: Arc<watch::Sender<MergerStatus>>,
}

impl Ingest {
    /// Admit one validated record. Returns whether it was new.
    async fn admit(&self, channel: FeedChannel, record: Result<AnomalyEvent, ValidationError>) -> bool {
        match record {
            Ok(event) => {
                if self.store.insert(event).await {
                    MergerCounters::bump(&self.counters.admitted);
                    true
                } else {
                    MergerCounters::bump(&self.counters.duplicates);
                    false
                }
            }
            Err(error) => {
                MergerCounters::bump(&self.counters.rejected);
                warn!(session = %self.session, ?channel, error = %error, "record rejected");
                self.notify(MergerNotice::RecordRejected { channel, error });
                false
            }
        }
    }

    /// Split and admit one live payload. Returns the number newly admitted.
    async fn admit_payload(&self, payload: LivePayload) -> u64 {
        let records = match payload {
            LivePayload::Text(text) => match decode_payload(&text) {
                Ok(records) => records,
                Err(error) => vec![Err(error)],
            },
            LivePayload::Records(values) => values.iter().map(validate_record).collect(),
        };
        let mut admitted = 0_u64;
        for record in records {
            if self.admit(FeedChannel::Live, record).await {
                admitted = admitted.saturating_add(1);
            }
        }
        admitted
    }

    fn set_backfill(&self, state: BackfillState) {
        self.status.send_modify(|s| s.backfill = state);
    }

    fn set_live(&self, state: LiveState) {
        self.status.send_modify(|s| s.live = state);
    }

    /// Queue a notice without blocking the feed.
    fn notify(&self, notice: MergerNotice) {
        match self.notices.try_send(notice) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                MergerCounters::bump(&self.counters.notices_dropped);
            }
        }
    }

    /// Queue a lifecycle notice, waiting for buffer space if needed.
    async fn notify_lifecycle(&self, notice: MergerNotice) {
        // Err only means the handle is gone.
        let _ = self.notices.send(notice).await;
    }
}

/// Resolves once the session is told to stop (or its handle is gone).
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn run_backfill<B: BackfillSource>(
    source: Arc<B>,
    ingest: Ingest,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    mut shutdown: watch::Receiver<bool>,
) {
    let fetched = tokio::select! {
        result = source.fetch(start, end) => result,
        () = stopped(&mut shutdown) => {
            ingest.set_backfill(BackfillState::Cancelled);
            return;
        }
    };

    match fetched {
        Ok(records) => {
            let received = u64::try_from(records.len()).unwrap_or(u64::MAX);
            let mut admitted = 0_u64;
            for record in &records {
                if ingest.admit(FeedChannel::Backfill, validate_record(record)).await {
                    admitted = admitted.saturating_add(1);
                }
            }
            info!(session = %ingest.session, received, admitted, "backfill complete");
            ingest.set_backfill(BackfillState::Complete { received, admitted });
            ingest
                .notify_lifecycle(MergerNotice::BackfillComplete { received, admitted })
                .await;
        }
        Err(source) => {
            let error = BackfillError { start, end, source };
            warn!(session = %ingest.session, error = %error, "backfill failed");
            ingest.set_backfill(BackfillState::Failed {
                error: error.to_string(),
            });
            ingest.notify_lifecycle(MergerNotice::BackfillFailed(error)).await;
        }
    }
}

async fn run_live<L: LiveSource>(
    source: Arc<L>,
    ingest: Ingest,
    mut backoff: Backoff,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let connected = tokio::select! {
            result = source.connect() => result,
            () = stopped(&mut shutdown) => break,
        };

        let ended_by = match connected {
            Ok(mut connection) => {
                backoff.reset();
                ingest.set_live(LiveState::Connected);
                ingest.notify(MergerNotice::LiveConnected);
                debug!(session = %ingest.session, "live feed connected");

                let ended_by = loop {
                    tokio::select! {
                        next = connection.next_payload() => match next {
                            Some(Ok(payload)) => {
                                ingest.admit_payload(payload).await;
                            }
                            Some(Err(e)) => break Some(e),
                            None => break None,
                        },
                        () = stopped(&mut shutdown) => {
                            connection.close().await;
                            ingest.set_live(LiveState::Stopped);
                            return;
                        }
                    }
                };
                connection.close().await;
                ended_by.unwrap_or(SourceError::Closed)
            }
            Err(e) => e,
        };

        let Some(delay) = backoff.next_delay() else {
            // Every scheduled retry failed, plus the attempt before them.
            let attempts = backoff.attempt().saturating_add(1);
            let unavailable = FeedUnavailable {
                attempts,
                last_error: ended_by,
            };
            warn!(session = %ingest.session, error = %unavailable, "live feed unavailable");
            ingest.set_live(LiveState::Unavailable { attempts });
            ingest
                .notify_lifecycle(MergerNotice::FeedUnavailable(unavailable))
                .await;
            return;
        };

        let attempt = backoff.attempt();
        MergerCounters::bump(&ingest.counters.reconnects);
        warn!(
            session = %ingest.session,
            attempt,
            ?delay,
            error = %ended_by,
            "live feed lost, reconnecting"
        );
        ingest.set_live(LiveState::Reconnecting {
            attempt,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        });
        ingest.notify(MergerNotice::ReconnectScheduled {
            attempt,
            delay,
            error: ended_by,
        });

        tokio::select! {
            () = tokio::time::sleep(delay) => ingest.set_live(LiveState::Connecting),
            () = stopped(&mut shutdown) => break,
        }
    }
    ingest.set_live(LiveState::Stopped);
}
