//! `WebSocket` live source.
//!
//! Each text frame carries one raw record or an array of records and is
//! handed to the merger as [`LivePayload::Text`]. Binary and control frames
//! carry no records and are skipped. A close frame or end of stream ends
//! the connection cleanly; any protocol or I/O error fails it.

use airwatch_core::{LiveConnection, LivePayload, LiveSource, SourceError};
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

use crate::error::FeedError;

/// Live source over a `WebSocket` endpoint.
#[derive(Debug, Clone)]
pub struct WsLive {
    url: String,
}

impl WsLive {
    /// Source connecting to `url` (`ws://` or `wss://`).
    pub fn new(url: &str) -> Result<Self, FeedError> {
        let scheme = url.split_once("://").map(|(scheme, _)| scheme);
        if !matches!(scheme, Some("ws" | "wss")) {
            return Err(FeedError::InvalidUrl {
                url: url.to_owned(),
                reason: "expected a ws:// or wss:// URL".to_owned(),
            });
        }
        Ok(Self { url: url.to_owned() })
    }

    /// The endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl LiveSource for WsLive {
    type Connection = WsConnection;

    async fn connect(&self) -> Result<Self::Connection, SourceError> {
        let (stream, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SourceError::Connect {
                endpoint: self.url.clone(),
                reason: e.to_string(),
            })?;
        info!(url = %self.url, status = %response.status(), "live feed connected");
        Ok(WsConnection { stream })
    }
}

/// An open `WebSocket` connection.
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl LiveConnection for WsConnection {
    async fn next_payload(&mut self) -> Option<Result<LivePayload, SourceError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(LivePayload::Text(text.as_str().to_owned()))),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "live feed sent close frame");
                    return None;
                }
                Ok(Message::Binary(bytes)) => debug!(len = bytes.len(), "binary frame skipped"),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(SourceError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "live feed close handshake failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn only_websocket_schemes_are_accepted() {
        assert_eq!(WsLive::new("ws://localhost:8000/ws/live").unwrap().url(), "ws://localhost:8000/ws/live");
        assert!(WsLive::new("wss://feeds.example.org/live").is_ok());
        assert!(matches!(
            WsLive::new("http://localhost:8000/ws/live"),
            Err(FeedError::InvalidUrl { .. })
        ));
        assert!(WsLive::new("localhost:8000").is_err());
    }
}
