//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: airwatch_core::ConfigError,
    },

    /// The global tracing subscriber could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },

    /// The event store could not be created.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: airwatch_store::StoreError,
    },

    /// A feed transport could not be built from config.
    #[error("feed error: {source}")]
    Feed {
        /// The underlying feed error.
        #[from]
        source: airwatch_feeds::FeedError,
    },

    /// The merger session could not be started.
    #[error("merger error: {source}")]
    Merger {
        /// The underlying merger error.
        #[from]
        source: airwatch_core::MergerError,
    },

    /// Observer API server failed to start.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying startup error.
        #[from]
        source: airwatch_observer::StartupError,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal error: {message}")]
    Signal {
        /// Description of the failure.
        message: String,
    },
}
