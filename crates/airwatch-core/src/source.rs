//! Feed source traits and the polling live adapter.
//!
//! The merger is written against these traits, never against a transport.
//! Concrete HTTP and `WebSocket` implementations live in `airwatch-feeds`;
//! tests drive the merger with scripted in-memory sources.
//!
//! | Trait | Delivers |
//! |-------|----------|
//! | [`BackfillSource`] | one bounded batch of raw records for a time window |
//! | [`LiveSource`] | a [`LiveConnection`] yielding payloads until it fails or closes |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::error::SourceError;

/// One unit of live delivery, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum LivePayload {
    /// An undecoded text frame: a JSON record or an array of records.
    Text(String),
    /// Already-decoded raw records.
    Records(Vec<Value>),
}

/// A source of historical records for a bounded time window.
pub trait BackfillSource: Send + Sync + 'static {
    /// Fetch raw records with `start <= time <= end`.
    ///
    /// Records are returned undecoded; validation happens in the merger so
    /// that one malformed element never discards its siblings.
    fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Value>, SourceError>> + Send;
}

/// A source of live pushes.
pub trait LiveSource: Send + Sync + 'static {
    /// The connection type produced by [`connect`](Self::connect).
    type Connection: LiveConnection;

    /// Open a new connection.
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, SourceError>> + Send;
}

/// An open live connection.
pub trait LiveConnection: Send + 'static {
    /// Wait for the next payload.
    ///
    /// `None` means the peer closed the connection cleanly; `Some(Err(_))`
    /// means it failed. Either way the merger reconnects.
    fn next_payload(&mut self) -> impl Future<Output = Option<Result<LivePayload, SourceError>>> + Send;

    /// Release the connection.
    fn close(self) -> impl Future<Output = ()> + Send;
}

// ---------------------------------------------------------------------------
// Polling adapter
// ---------------------------------------------------------------------------

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// A live source made from a backfill source polled on a fixed interval.
///
/// Each poll fetches `[previous poll end, now]`; the boundary instant is
/// fetched twice and deduplicated by the store.
#[derive(Debug, Clone)]
pub struct PollingLive<B> {
    source: Arc<B>,
    interval: Duration,
}

impl<B: BackfillSource> PollingLive<B> {
    /// Poll `source` every `interval`.
    pub const fn new(source: Arc<B>, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// The polling interval.
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl<B: BackfillSource> LiveSource for PollingLive<B> {
    type Connection = PollingConnection<B>;

    async fn connect(&self) -> Result<Self::Connection, SourceError> {
        Ok(PollingConnection {
            source: Arc::clone(&self.source),
            interval: self.interval,
            since: Utc::now(),
        })
    }
}

/// Connection state of a [`PollingLive`] source.
#[derive(Debug)]
pub struct PollingConnection<B> {
    source: Arc<B>,
    interval: Duration,
    since: DateTime<Utc>,
}

impl<B> PollingConnection<B> {
    /// Start of the window the next poll will request.
    pub const fn since(&self) -> DateTime<Utc> {
        self.since
    }
}

impl<B: BackfillSource> LiveConnection for PollingConnection<B> {
    async fn next_payload(&mut self) -> Option<Result<LivePayload, SourceError>> {
        tokio::time::sleep(self.interval).await;
        let until = Utc::now().max(self.since);
        match self.source.fetch(self.since, until).await {
            Ok(records) => {
                debug!(since = %self.since, until = %until, records = records.len(), "poll complete");
                self.since = until;
                Some(Ok(LivePayload::Records(records)))
            }
            Err(e) => Some(Err(e)),
        }
    }

    async fn close(self) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingBackfill {
        calls: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    impl BackfillSource for RecordingBackfill {
        async fn fetch(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Value>, SourceError> {
            self.calls.lock().unwrap().push((start, end));
            Ok(vec![serde_json::json!({"parameter": "pm25", "value": 1, "time": end.to_rfc3339()})])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polling_advances_its_window() {
        let backfill = Arc::new(RecordingBackfill::default());
        let live = PollingLive::new(Arc::clone(&backfill), Duration::from_secs(30));
        let mut conn = live.connect().await.unwrap();
        let opened = conn.since();

        for _ in 0..3 {
            let payload = conn.next_payload().await.unwrap().unwrap();
            assert!(matches!(payload, LivePayload::Records(ref r) if r.len() == 1));
        }

        let calls = backfill.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].0, opened);
        assert_eq!(calls[1].0, calls[0].1);
        assert_eq!(calls[2].0, calls[1].1);
        assert!(calls.iter().all(|(start, end)| start <= end));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_failure_keeps_the_window() {
        struct Failing;
        impl BackfillSource for Failing {
            async fn fetch(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<Value>, SourceError> {
                Err(SourceError::Transport("reset".to_owned()))
            }
        }

        let live = PollingLive::new(Arc::new(Failing), DEFAULT_POLL_INTERVAL);
        let mut conn = live.connect().await.unwrap();
        let before = conn.since();
        assert!(conn.next_payload().await.unwrap().is_err());
        assert_eq!(conn.since(), before);
    }
}
