//! Error types for feed sources, the stream merger, and the query gateway.
//!
//! | Error | Raised by | Effect |
//! |-------|-----------|--------|
//! | [`SourceError`] | a feed transport | fails one fetch or one connection |
//! | [`BackfillError`] | the merger's backfill task | reported once, live feed unaffected |
//! | [`FeedUnavailable`] | the merger's live task | live feed stops, store keeps its events |
//! | [`MergerError`] | `StreamMerger::start` | session not started |
//! | [`GatewayError`] | `QueryGateway` | that query only |

use airwatch_geo::{DensityError, GeometryError};
use airwatch_types::BoundsError;
use chrono::{DateTime, Utc};

/// A transport-level failure inside one feed channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The endpoint could not be reached or the handshake failed.
    #[error("cannot connect to {endpoint}: {reason}")]
    Connect {
        /// URL or description of the endpoint.
        endpoint: String,
        /// Underlying cause.
        reason: String,
    },

    /// The endpoint answered with a non-success HTTP status.
    #[error("{endpoint} answered with HTTP {status}")]
    Status {
        /// URL of the endpoint.
        endpoint: String,
        /// HTTP status code.
        status: u16,
    },

    /// An established connection failed mid-stream.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was not a JSON document of the expected shape.
    #[error("undecodable response: {0}")]
    Decode(String),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,
}

/// The historical fetch for a session failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("backfill of [{start}, {end}] failed: {source}")]
pub struct BackfillError {
    /// Requested window start.
    pub start: DateTime<Utc>,
    /// Requested window end.
    pub end: DateTime<Utc>,
    /// Transport cause.
    pub source: SourceError,
}

/// The live feed exhausted its retry ceiling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("live feed unavailable after {attempts} attempts: {last_error}")]
pub struct FeedUnavailable {
    /// Consecutive failed attempts.
    pub attempts: u32,
    /// The failure that ended the last attempt.
    pub last_error: SourceError,
}

/// Failure to start a merger session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MergerError {
    /// The observer or radius scoping the session's subscription is invalid.
    #[error("invalid subscription scope: {0}")]
    Scope(#[from] GeometryError),

    /// The backfill window does not fit in a calendar duration.
    #[error("backfill window is too large")]
    WindowTooLarge,
}

/// Failure of a single gateway query.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// A time range whose start lies after its end.
    #[error("invalid time range: start {start} is after end {end}")]
    InvalidRange {
        /// Requested start.
        start: DateTime<Utc>,
        /// Requested end.
        end: DateTime<Utc>,
    },

    /// Invalid observer position or radius.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Invalid density grid parameters.
    #[error(transparent)]
    Density(#[from] DensityError),

    /// Invalid bounding box.
    #[error(transparent)]
    Bounds(#[from] BoundsError),

    /// A window too large to subtract from the current time.
    #[error("window is too large")]
    WindowTooLarge,
}
