//! Error types for building feed transports.
//!
//! Failures while a transport is running are reported as
//! [`airwatch_core::SourceError`] so the merger can apply its retry policy.
//! [`FeedError`] covers the step before that: turning configuration into
//! a usable client.

/// A feed transport could not be constructed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The configured URL is not usable for this transport.
    #[error("invalid feed URL {url:?}: {reason}")]
    InvalidUrl {
        /// The URL as configured.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),
}
