//! Configured live transport.
//!
//! The merger is generic over one [`LiveSource`] type, while the transport
//! is chosen at startup from configuration. [`LiveFeed`] bridges the two
//! with enum dispatch, so the choice costs neither a trait object nor a
//! second merger instantiation.

use std::sync::Arc;

use airwatch_core::config::FeedsConfig;
use airwatch_core::{
    LiveConnection, LivePayload, LiveSource, LiveTransport, PollingConnection, PollingLive, SourceError,
};

use crate::error::FeedError;
use crate::http::HttpBackfill;
use crate::ws::{WsConnection, WsLive};

/// The live transport selected by configuration.
#[derive(Debug, Clone)]
pub enum LiveFeed {
    /// Push delivery over a `WebSocket`.
    WebSocket(WsLive),
    /// The historical API polled on a fixed interval.
    Polling(PollingLive<HttpBackfill>),
}

impl LiveFeed {
    /// Build the transport named by `config.live_transport`.
    ///
    /// Polling reuses `backfill` so both channels share one HTTP client.
    pub fn from_config(config: &FeedsConfig, backfill: &Arc<HttpBackfill>) -> Result<Self, FeedError> {
        match config.live_transport {
            LiveTransport::Websocket => Ok(Self::WebSocket(WsLive::new(&config.live_url)?)),
            LiveTransport::Polling => Ok(Self::Polling(PollingLive::new(
                Arc::clone(backfill),
                config.poll_interval(),
            ))),
        }
    }

    /// Transport name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::WebSocket(_) => "websocket",
            Self::Polling(_) => "polling",
        }
    }
}

impl LiveSource for LiveFeed {
    type Connection = LiveFeedConnection;

    async fn connect(&self) -> Result<Self::Connection, SourceError> {
        match self {
            Self::WebSocket(ws) => ws.connect().await.map(LiveFeedConnection::WebSocket),
            Self::Polling(polling) => polling.connect().await.map(LiveFeedConnection::Polling),
        }
    }
}

/// A connection opened by a [`LiveFeed`].
pub enum LiveFeedConnection {
    /// An open `WebSocket`.
    WebSocket(WsConnection),
    /// A polling cursor.
    Polling(PollingConnection<HttpBackfill>),
}

impl LiveConnection for LiveFeedConnection {
    async fn next_payload(&mut self) -> Option<Result<LivePayload, SourceError>> {
        match self {
            Self::WebSocket(conn) => conn.next_payload().await,
            Self::Polling(conn) => conn.next_payload().await,
        }
    }

    async fn close(self) {
        match self {
            Self::WebSocket(conn) => conn.close().await,
            Self::Polling(conn) => conn.close().await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn feeds(transport: LiveTransport, live_url: &str) -> FeedsConfig {
        FeedsConfig {
            live_transport: transport,
            live_url: live_url.to_owned(),
            ..FeedsConfig::default()
        }
    }

    fn backfill() -> Arc<HttpBackfill> {
        Arc::new(HttpBackfill::new("http://localhost:8081", Duration::from_secs(1)).unwrap())
    }

    #[test]
    fn websocket_transport_from_config() {
        let feed = LiveFeed::from_config(&feeds(LiveTransport::Websocket, "ws://localhost:8000/ws/live"), &backfill())
            .unwrap();
        assert_eq!(feed.name(), "websocket");
    }

    #[test]
    fn polling_transport_uses_configured_interval() {
        let mut config = feeds(LiveTransport::Polling, "");
        config.poll_interval_secs = 5;
        match LiveFeed::from_config(&config, &backfill()).unwrap() {
            LiveFeed::Polling(polling) => assert_eq!(polling.interval(), Duration::from_secs(5)),
            LiveFeed::WebSocket(_) => panic!("expected polling transport"),
        }
    }

    #[test]
    fn bad_websocket_url_is_rejected() {
        assert!(LiveFeed::from_config(&feeds(LiveTransport::Websocket, "http://nope"), &backfill()).is_err());
    }
}
