//! Session event store for the Airwatch anomaly stream.
//!
//! The store is the single source of truth for every anomaly admitted during
//! a session. Both feeds write into it; every view (time range, radius,
//! density, subscriptions) reads from it.
//!
//! # Architecture
//!
//! ```text
//! backfill feed --+
//!                 +--> EventStore::insert --(dedup by identity)--> ordered map
//! live feed ------+            |
//!                              +--> broadcast<Admission> --> subscribers
//! ```
//!
//! Admission takes a single write lock for the identity check, the insert,
//! and the broadcast, so subscribers observe admissions in exactly the order
//! they were committed.
//!
//! # Modules
//!
//! - [`event_store`] -- [`EventStore`], [`Admission`], [`EventSnapshot`]
//! - [`error`] -- [`StoreError`]

pub mod error;
pub mod event_store;

pub use error::StoreError;
pub use event_store::{
    Admission, DEFAULT_BROADCAST_CAPACITY, EventSnapshot, EventStore, ReplaySubscription,
};
