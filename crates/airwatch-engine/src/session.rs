//! Merger session supervision.
//!
//! The engine holds the session handle and drains its notices into the
//! log until shutdown.

use std::future::Future;

use airwatch_core::{MergerNotice, SubscriptionHandle};
use tracing::{debug, error, info, warn};

/// Log one notice.
pub fn log_notice(notice: &MergerNotice) {
    match notice {
        MergerNotice::BackfillComplete { received, admitted } => {
            info!(received, admitted, "backfill complete");
        }
        MergerNotice::BackfillFailed(e) => {
            error!(error = %e, "backfill failed, continuing with live feed only");
        }
        MergerNotice::LiveConnected => info!("live feed connected"),
        MergerNotice::ReconnectScheduled { attempt, delay, error } => {
            warn!(attempt, ?delay, %error, "live feed lost, reconnect scheduled");
        }
        MergerNotice::FeedUnavailable(e) => {
            error!(error = %e, "live feed unavailable, serving held events only");
        }
        MergerNotice::RecordRejected { channel, error } => {
            debug!(?channel, %error, "record rejected");
        }
    }
}

/// Drain notices until `shutdown` resolves, then stop the session.
pub async fn supervise<F>(mut handle: SubscriptionHandle, shutdown: F)
where
    F: Future<Output = ()>,
{
    let session = handle.id();
    tokio::pin!(shutdown);
    let mut notices_open = true;

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            notice = handle.next_notice(), if notices_open => match notice {
                Some(notice) => log_notice(&notice),
                None => {
                    debug!(%session, "session tasks finished");
                    notices_open = false;
                }
            },
        }
    }

    let counters = handle.counters().snapshot();
    handle.stop().await;
    info!(
        %session,
        admitted = counters.admitted,
        duplicates = counters.duplicates,
        rejected = counters.rejected,
        reconnects = counters.reconnects,
        notices_dropped = counters.notices_dropped,
        "session stopped"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use airwatch_core::{
        BackfillSource, BackoffPolicy, LiveConnection, LivePayload, LiveSource, SourceError, StreamMerger,
    };
    use airwatch_store::EventStore;
    use chrono::{DateTime, Utc};
    use serde_json::{Value, json};

    use super::*;

    struct OneRecordBackfill;

    impl BackfillSource for OneRecordBackfill {
        async fn fetch(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<Vec<Value>, SourceError> {
            Ok(vec![json!({
                "parameter": "pm25",
                "value": 88.0,
                "time": "2025-04-01T10:00:00Z",
                "latitude": 41.0,
                "longitude": 29.0
            })])
        }
    }

    struct IdleLive;

    struct IdleConnection;

    impl LiveSource for IdleLive {
        type Connection = IdleConnection;

        async fn connect(&self) -> Result<IdleConnection, SourceError> {
            Ok(IdleConnection)
        }
    }

    impl LiveConnection for IdleConnection {
        async fn next_payload(&mut self) -> Option<Result<LivePayload, SourceError>> {
            std::future::pending().await
        }

        async fn close(self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn supervise_stops_the_session_on_shutdown() {
        let store = Arc::new(EventStore::new());
        let merger = StreamMerger::new(
            Arc::clone(&store),
            OneRecordBackfill,
            IdleLive,
            BackoffPolicy::default(),
        );
        let handle = merger.start(Duration::from_secs(3600), None, None).await.unwrap();
        let status = handle.watch_status();

        supervise(handle, tokio::time::sleep(Duration::from_millis(100))).await;

        assert_eq!(store.len().await, 1);
        assert_eq!(status.borrow().live, airwatch_core::LiveState::Stopped);
    }
}
