//! Stream reconciliation and live geospatial views for Airwatch.
//!
//! This crate owns the session logic between the feeds and the observer:
//! it merges the backfill and live channels into the event store, keeps
//! density views current, and answers queries.
//!
//! # Architecture
//!
//! ```text
//! BackfillSource --+
//!                  +--> StreamMerger --> EventStore --> QueryGateway --> observer
//! LiveSource ------+                         |
//!                                            +--> LiveDensity (debounced rebuilds)
//!                                            +--> EventSubscription (replay + push)
//! ```
//!
//! # Modules
//!
//! - [`backoff`] -- Exponential reconnect backoff with jitter
//! - [`config`] -- Configuration loading from `airwatch-config.yaml`
//! - [`debounce`] -- Trailing-edge debouncer for bounding-box changes
//! - [`density`] -- [`LiveDensity`], a per-consumer density view
//! - [`error`] -- Source, merger, and gateway errors
//! - [`gateway`] -- [`QueryGateway`], the read surface
//! - [`merger`] -- [`StreamMerger`] and its session handle
//! - [`source`] -- Feed source traits and the polling live adapter
//! - [`subscription`] -- [`EventSubscription`], replay-then-push delivery

pub mod backoff;
pub mod config;
pub mod debounce;
pub mod density;
pub mod error;
pub mod gateway;
pub mod merger;
pub mod source;
pub mod subscription;

pub use backoff::{Backoff, BackoffPolicy};
pub use config::{AirwatchConfig, ConfigError, LiveTransport};
pub use debounce::Debouncer;
pub use density::{DensityView, LiveDensity};
pub use error::{BackfillError, FeedUnavailable, GatewayError, MergerError, SourceError};
pub use gateway::QueryGateway;
pub use merger::{
    BackfillState, CounterSnapshot, FeedChannel, LiveState, MergerCounters, MergerNotice,
    MergerStatus, StreamMerger, SubscriptionHandle, stop,
};
pub use source::{
    BackfillSource, LiveConnection, LivePayload, LiveSource, PollingConnection, PollingLive,
};
pub use subscription::EventSubscription;
