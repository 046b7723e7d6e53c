//! Concrete feed transports for Airwatch.
//!
//! Implements the source traits from `airwatch-core` over real networks:
//!
//! | Type | Trait | Transport |
//! |------|-------|-----------|
//! | [`HttpBackfill`] | `BackfillSource` | `reqwest` GET against the time-range API |
//! | [`WsLive`] | `LiveSource` | `tokio-tungstenite` client, one payload per text frame |
//! | [`LiveFeed`] | `LiveSource` | `WsLive` or polled `HttpBackfill`, chosen by config |
//!
//! # Modules
//!
//! - [`error`] -- Construction errors for transports
//! - [`http`] -- HTTP backfill source
//! - [`live`] -- Configured live transport
//! - [`ws`] -- `WebSocket` live source

pub mod error;
pub mod http;
pub mod live;
pub mod ws;

pub use error::FeedError;
pub use http::HttpBackfill;
pub use live::{LiveFeed, LiveFeedConnection};
pub use ws::{WsConnection, WsLive};
